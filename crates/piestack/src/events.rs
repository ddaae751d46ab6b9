#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    ConfigReload,
    Click(usize),
    Query(String),
}

impl AppEvent {
    /// Parses one line of interactive input: `click <index>`, `reload`, or a query string.
    pub fn parse_command(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if line == "reload" {
            return Some(Self::ConfigReload);
        }
        if let Some(index) = line.strip_prefix("click ") {
            return index.trim().parse().ok().map(Self::Click);
        }
        Some(Self::Query(line.to_string()))
    }
}
