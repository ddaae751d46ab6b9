use crate::params::{Environment, MAX_SLICES, Params, round2};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::form_urlencoded;
use wedge::{Slice, SliceColor, SliceLabel};

pub const SLICE_COUNT: &str = "n";
pub const INNER_RADIUS: &str = "dnt";
pub const OUTER_RADIUS: &str = "r";
pub const CORNER_RADIUS: &str = "cr";
pub const PAD_ANGLE: &str = "ang";
pub const ALL_HEIGHTS: &str = "ah";
pub const LABEL_POSITION: &str = "vlp";
pub const AMBIENT: &str = "amb";
pub const SPOT: &str = "spt";
pub const ENVIRONMENT: &str = "env";
pub const ROUGHNESS: &str = "rgh";
pub const METALNESS: &str = "met";
pub const BLOOM: &str = "blm";
pub const BLOOM_STRENGTH: &str = "bls";
pub const BLOOM_RADIUS: &str = "blr";
pub const BLOOM_THRESHOLD: &str = "blt";
pub const BACKGROUND: &str = "bg";
pub const SPIN: &str = "spn";
pub const TITLE: &str = "t";
pub const TITLE_MAX_WIDTH: &str = "tmw";
pub const TITLE_OFFSET: &str = "tof";
pub const SHOW_VALUES: &str = "show_values";
pub const PERCENT_VALUES: &str = "pct_values";

const SLICE_PREFIXES: [&str; 6] = ["v", "c", "l", "x", "h", "o"];

pub fn value_key(i: usize) -> String {
    format!("v{i}")
}

pub fn color_key(i: usize) -> String {
    format!("c{i}")
}

pub fn label_key(i: usize) -> String {
    format!("l{i}")
}

pub fn explode_key(i: usize) -> String {
    format!("x{i}")
}

pub fn height_key(i: usize) -> String {
    format!("h{i}")
}

pub fn offset_key(i: usize) -> String {
    format!("o{i}")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("'{key}': '{value}' is not a number")]
    InvalidNumber { key: String, value: String },
    #[error("'{key}': '{value}' is not a color")]
    InvalidColor { key: String, value: String },
    #[error("'{key}': unknown environment preset '{value}'")]
    UnknownEnvironment { key: String, value: String },
}

/// A value as it is written into the query string.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Number(f64),
    Count(usize),
    Bool(bool),
    Color(SliceColor),
    Text(String),
    Environment(Environment),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{}", round2(*v)),
            Self::Count(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Color(c) => write!(f, "{c}"),
            Self::Text(s) => f.write_str(s),
            Self::Environment(e) => write!(f, "{e}"),
        }
    }
}

impl From<f64> for QueryValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for QueryValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<SliceColor> for QueryValue {
    fn from(c: SliceColor) -> Self {
        Self::Color(c)
    }
}

fn entry(key: impl Into<String>, value: impl Into<QueryValue>) -> (String, QueryValue) {
    (key.into(), value.into())
}

/// Every key/value pair describing `params`, in a stable order.
pub fn pairs(params: &Params) -> Vec<(String, QueryValue)> {
    let chart = &params.chart;
    let g = &chart.geometry;
    let p = &params.presentation;

    let mut out = vec![
        entry(SLICE_COUNT, QueryValue::Count(chart.slices.len())),
        entry(ALL_HEIGHTS, chart.all_heights),
    ];
    for (i, slice) in chart.slices.iter().enumerate() {
        out.push(entry(value_key(i), slice.value));
        out.push(entry(color_key(i), slice.color));
        if let Some(label) = slice.caption() {
            out.push(entry(label_key(i), QueryValue::Text(label.to_string())));
        }
        out.push(entry(explode_key(i), slice.exploded));
        out.push(entry(height_key(i), slice.height));
        out.push(entry(offset_key(i), slice.offset));
    }
    out.extend([
        entry(INNER_RADIUS, g.inner_radius),
        entry(OUTER_RADIUS, g.outer_radius),
        entry(CORNER_RADIUS, g.corner_radius),
        entry(PAD_ANGLE, g.pad_angle),
        entry(LABEL_POSITION, chart.label_position),
        entry(AMBIENT, p.lighting.ambient),
        entry(SPOT, p.lighting.spot),
        entry(ENVIRONMENT, QueryValue::Environment(p.lighting.environment)),
        entry(ROUGHNESS, p.material.roughness),
        entry(METALNESS, p.material.metalness),
        entry(BLOOM, p.bloom.enabled),
        entry(BLOOM_STRENGTH, p.bloom.strength),
        entry(BLOOM_RADIUS, p.bloom.radius),
        entry(BLOOM_THRESHOLD, p.bloom.threshold),
        entry(BACKGROUND, p.background),
        entry(SPIN, p.spin_speed),
        entry(TITLE, QueryValue::Text(p.title.text.clone())),
        entry(TITLE_MAX_WIDTH, p.title.max_width),
        entry(TITLE_OFFSET, p.title.offset),
        entry(SHOW_VALUES, p.show_values),
        entry(PERCENT_VALUES, p.values_as_percent),
    ]);
    out
}

pub fn encode(params: &Params) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs(params) {
        serializer.append_pair(&key, &value.to_string());
    }
    serializer.finish()
}

struct Query(HashMap<String, String>);

impl Query {
    fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self(
            form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    fn number(&self, key: &str) -> Result<Option<f64>, QueryError> {
        self.0
            .get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| QueryError::InvalidNumber {
                        key: key.to_string(),
                        value: raw.clone(),
                    })
            })
            .transpose()
    }

    // Anything but the literal "true" reads as false.
    fn flag(&self, key: &str) -> Option<bool> {
        self.0.get(key).map(|raw| raw == "true")
    }

    fn color(&self, key: &str) -> Result<Option<SliceColor>, QueryError> {
        self.0
            .get(key)
            .map(|raw| {
                SliceColor::from_str(raw.trim()).map_err(|_| QueryError::InvalidColor {
                    key: key.to_string(),
                    value: raw.clone(),
                })
            })
            .transpose()
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn environment(&self, key: &str) -> Result<Option<Environment>, QueryError> {
        self.0
            .get(key)
            .map(|raw| {
                Environment::from_str(raw.trim()).map_err(|_| QueryError::UnknownEnvironment {
                    key: key.to_string(),
                    value: raw.clone(),
                })
            })
            .transpose()
    }
}

fn apply<T>(target: &mut T, parsed: Result<Option<T>, QueryError>) {
    match parsed {
        Ok(Some(v)) => *target = v,
        Ok(None) => {}
        Err(e) => log::warn!("Ignoring query parameter: {}", e),
    }
}

fn apply_flag(target: &mut bool, parsed: Option<bool>) {
    if let Some(v) = parsed {
        *target = v;
    }
}

/// Overlays the parameters found in `query` onto `defaults`.
///
/// Missing keys keep their default. Malformed values are logged and skipped. The result is
/// clamped to the ranges the control panel allows.
pub fn decode(query: &str, defaults: &Params) -> Params {
    let q = Query::parse(query);
    let mut params = defaults.clone();
    let chart = &mut params.chart;

    apply(&mut chart.all_heights, q.number(ALL_HEIGHTS));
    match q.number(SLICE_COUNT) {
        Ok(Some(n)) => chart.set_slice_count(n.max(0.0).round() as usize),
        Ok(None) => {}
        Err(e) => log::warn!("Ignoring query parameter: {}", e),
    }

    for (i, slice) in chart.slices.iter_mut().enumerate() {
        decode_slice(&q, i, slice);
    }

    let g = &mut chart.geometry;
    apply(&mut g.inner_radius, q.number(INNER_RADIUS));
    apply(&mut g.outer_radius, q.number(OUTER_RADIUS));
    apply(&mut g.corner_radius, q.number(CORNER_RADIUS));
    apply(&mut g.pad_angle, q.number(PAD_ANGLE));
    apply(&mut chart.label_position, q.number(LABEL_POSITION));

    let p = &mut params.presentation;
    apply(&mut p.lighting.ambient, q.number(AMBIENT));
    apply(&mut p.lighting.spot, q.number(SPOT));
    apply(&mut p.lighting.environment, q.environment(ENVIRONMENT));
    apply(&mut p.material.roughness, q.number(ROUGHNESS));
    apply(&mut p.material.metalness, q.number(METALNESS));
    apply_flag(&mut p.bloom.enabled, q.flag(BLOOM));
    apply(&mut p.bloom.strength, q.number(BLOOM_STRENGTH));
    apply(&mut p.bloom.radius, q.number(BLOOM_RADIUS));
    apply(&mut p.bloom.threshold, q.number(BLOOM_THRESHOLD));
    apply(&mut p.background, q.color(BACKGROUND));
    apply(&mut p.spin_speed, q.number(SPIN));
    if let Some(title) = q.text(TITLE) {
        p.title.text = title.to_string();
    }
    apply(&mut p.title.max_width, q.number(TITLE_MAX_WIDTH));
    apply(&mut p.title.offset, q.number(TITLE_OFFSET));
    apply_flag(&mut p.show_values, q.flag(SHOW_VALUES));
    apply_flag(&mut p.values_as_percent, q.flag(PERCENT_VALUES));

    params.clamped()
}

fn decode_slice(q: &Query, i: usize, slice: &mut Slice) {
    apply(&mut slice.value, q.number(&value_key(i)));
    apply(&mut slice.color, q.color(&color_key(i)));
    if let Some(label) = q.text(&label_key(i)) {
        slice.label = (!label.trim().is_empty()).then(|| SliceLabel::new(label));
    }
    apply_flag(&mut slice.exploded, q.flag(&explode_key(i)));
    apply(&mut slice.height, q.number(&height_key(i)));
    apply(&mut slice.offset, q.number(&offset_key(i)));
}

/// Mirrors parameter changes into a query string.
///
/// Writes are ignored until the sync is initialized, so the first render cannot overwrite
/// the parameters a shared link was opened with.
#[derive(Debug, Clone, Default)]
pub struct UrlSync {
    entries: Vec<(String, String)>,
    initialized: bool,
}

impl UrlSync {
    pub fn new(query: &str, initialized: bool) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let entries = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self {
            entries,
            initialized,
        }
    }

    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Sets `key`, returning `false` when the write was dropped because the sync is not
    /// initialized yet.
    pub fn write(&mut self, key: &str, value: impl Into<QueryValue>) -> bool {
        if !self.initialized {
            return false;
        }
        let value = value.into().to_string();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Writes every parameter and drops per-slice keys past the current slice count.
    pub fn write_params(&mut self, params: &Params) -> bool {
        if !self.initialized {
            return false;
        }
        let n = params.chart.slices.len();
        self.entries.retain(|(k, _)| !is_slice_key_past(k, n));
        for (i, slice) in params.chart.slices.iter().enumerate() {
            if slice.caption().is_none() {
                self.entries.retain(|(k, _)| *k != label_key(i));
            }
        }
        for (key, value) in pairs(params) {
            self.write(&key, value);
        }
        true
    }

    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.entries.iter())
            .finish()
    }
}

fn is_slice_key_past(key: &str, count: usize) -> bool {
    SLICE_PREFIXES.iter().any(|prefix| {
        key.strip_prefix(prefix)
            .and_then(|rest| rest.parse::<usize>().ok())
            .is_some_and(|i| i >= count && i < MAX_SLICES)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::palette_color;
    use crate::resolver::OutlineRequest;

    #[test]
    fn test_numbers_are_rounded() {
        assert_eq!(QueryValue::Number(0.123456).to_string(), "0.12");
        assert_eq!(QueryValue::Number(150.0).to_string(), "150");
        assert_eq!(QueryValue::Number(-0.001).to_string(), "0");
        assert_eq!(QueryValue::Color(palette_color(0)).to_string(), "#f43f5e");
    }

    #[test]
    fn test_decode_applies_known_keys() {
        let params = decode(
            "?n=3&v0=2&v2=0.25&c1=%2300ff00&x1=true&h0=1.2&l2=Other&r=200&ang=0&env=studio&blm=true&t=Sales",
            &Params::default(),
        );
        let chart = &params.chart;
        assert_eq!(chart.slices.len(), 3);
        assert_eq!(chart.slices[0].value, 2.0);
        assert_eq!(chart.slices[2].value, 0.25);
        assert_eq!(chart.slices[1].color, SliceColor::rgb(0, 255, 0));
        assert!(chart.slices[1].exploded);
        assert!(!chart.slices[0].exploded);
        assert_eq!(chart.slices[0].height, 1.2);
        assert_eq!(chart.slices[2].caption().map(|l| l.as_str()), Some("Other"));
        assert_eq!(chart.geometry.outer_radius, 200.0);
        assert_eq!(chart.geometry.pad_angle, 0.0);
        assert_eq!(params.presentation.lighting.environment, Environment::Studio);
        assert!(params.presentation.bloom.enabled);
        assert_eq!(params.presentation.title.text, "Sales");
    }

    #[test]
    fn test_decode_skips_malformed_values() {
        let defaults = Params::default();
        let params = decode("v0=abc&c0=red&env=moon&r=NaN&blm=yes", &defaults);
        assert_eq!(params.chart.slices[0].value, defaults.chart.slices[0].value);
        assert_eq!(params.chart.slices[0].color, defaults.chart.slices[0].color);
        assert_eq!(params.chart.geometry.outer_radius, 150.0);
        assert_eq!(params.presentation.lighting.environment, Environment::Night);
        assert!(!params.presentation.bloom.enabled);
    }

    #[test]
    fn test_decode_clamps_ranges() {
        let params = decode("n=50&r=10&spn=7", &Params::default());
        assert_eq!(params.chart.slices.len(), MAX_SLICES);
        assert_eq!(params.chart.geometry.outer_radius, 50.0);
        assert_eq!(params.presentation.spin_speed, 1.0);
    }

    #[test]
    fn test_decode_keeps_inner_radius_below_outer() {
        let params = decode("dnt=90&r=60", &Params::default());
        let geometry = &params.chart.geometry;
        assert_eq!(geometry.inner_radius, 59.0);
        assert_eq!(geometry.outer_radius, 60.0);
        assert!(
            OutlineRequest::from_chart(&params.chart)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_round_trip() {
        let mut params = Params::default();
        params.chart.slices[1] = params.chart.slices[1]
            .clone()
            .with_label("Rent & bills")
            .exploded(true);
        params.chart.geometry.corner_radius = 12.0;
        params.presentation.title.text = "Q3 = done?".to_string();

        let decoded = decode(&encode(&params), &Params::default());
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_writes_before_init_are_ignored() {
        let mut sync = UrlSync::new("?r=200", false);
        assert!(!sync.write(OUTER_RADIUS, 150.0));
        assert_eq!(sync.get(OUTER_RADIUS), Some("200"));

        sync.mark_initialized();
        assert!(sync.write(OUTER_RADIUS, 123.456));
        assert!(sync.write(&explode_key(2), true));
        assert_eq!(sync.query_string(), "r=123.46&x2=true");
    }

    #[test]
    fn test_write_params_drops_removed_slices() {
        let mut params = Params::default();
        let mut sync = UrlSync::new("", true);
        sync.write_params(&params);
        assert!(sync.get("v3").is_some());

        params.chart.set_slice_count(2);
        sync.write_params(&params);
        assert!(sync.get("v3").is_none());
        assert!(sync.get("h2").is_none());
        assert_eq!(sync.get(SLICE_COUNT), Some("2"));
        assert_eq!(decode(&sync.query_string(), &Params::default()), params);
    }
}
