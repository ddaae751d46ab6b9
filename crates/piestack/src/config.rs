use directories::ProjectDirs;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wedge::DEFAULT_SEGMENTS_PER_TURN;

use crate::motion::SpringConfig;
use crate::params::{ChartParameters, Params, Presentation};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub spring: SpringConfig,
    /// Ticks per second when running continuously.
    pub frame_rate: f64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            spring: SpringConfig::WOBBLY,
            frame_rate: 60.0,
        }
    }
}

impl AnimationConfig {
    pub fn frame_seconds(&self) -> f64 {
        1.0 / self.frame_rate.clamp(1.0, 240.0)
    }

    /// Keeps the spring integrable: positive mass and a precision it can actually reach.
    pub fn clamped(mut self) -> Self {
        let fallback = SpringConfig::WOBBLY;
        let finite_or = |v: f64, f: f64| if v.is_finite() { v } else { f };
        let spring = &mut self.spring;
        spring.tension = finite_or(spring.tension, fallback.tension).clamp(1.0, 2000.0);
        spring.friction = finite_or(spring.friction, fallback.friction).clamp(0.0, 500.0);
        spring.mass = finite_or(spring.mass, fallback.mass).clamp(0.01, 100.0);
        spring.precision = finite_or(spring.precision, fallback.precision).clamp(1e-6, 1.0);
        self.frame_rate = finite_or(self.frame_rate, 60.0).clamp(1.0, 240.0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MeshConfig {
    pub segments_per_turn: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            segments_per_turn: DEFAULT_SEGMENTS_PER_TURN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chart: ChartParameters,
    #[serde(default)]
    pub presentation: Presentation,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub mesh: MeshConfig,
}

impl Config {
    /// Chart and presentation parameters, clamped to the ranges the controls allow.
    pub fn params(&self) -> Params {
        Params {
            chart: self.chart.clone(),
            presentation: self.presentation.clone(),
        }
        .clamped()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine config directory")]
    ConfigDirNotFound,
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
}

pub fn get_config_path() -> Result<std::path::PathBuf, ConfigError> {
    let proj_dirs =
        ProjectDirs::from("org", "piestack", "piestack").ok_or(ConfigError::ConfigDirNotFound)?;
    Ok(proj_dirs.config_dir().join("config.toml"))
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let s = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("PIESTACK"))
        .build()?;

    Ok(s.try_deserialize()?)
}

/// Loads the user's config, falling back to built-in defaults when it is missing or broken.
pub fn load_or_default() -> Config {
    if let Ok(path) = get_config_path()
        && !path.exists()
    {
        log::info!("No config at {}, using defaults", path.display());
        return Config::default();
    }

    match load_config() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    }
}

pub fn write_default_config() -> std::io::Result<std::path::PathBuf> {
    let path =
        get_config_path().map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e))?;
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent)?;
    }
    if !path.exists() {
        fs_err::write(&path, DEFAULT_CONFIG)?;
    }
    Ok(path)
}

const DEFAULT_CONFIG: &str = include_str!("default_config.toml");

use crate::events::AppEvent;
use async_channel::Sender;

pub async fn run_async_watcher(tx: Sender<AppEvent>) {
    let config_path = match get_config_path() {
        Ok(p) => p,
        Err(e) => {
            log::error!("Config watcher error: {}", e);
            return;
        }
    };
    let config_dir = match config_path.parent() {
        Some(p) => p.to_path_buf(),
        None => return,
    };

    if let Err(e) = fs_err::create_dir_all(&config_dir) {
        log::error!("Failed to create config directory for watching: {}", e);
        return;
    }

    let (bridge_tx, bridge_rx) = async_channel::unbounded();

    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            let _ = bridge_tx.send_blocking(res);
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            log::error!("Failed to create watcher: {}", e);
            return;
        }
    };

    if let Err(e) = watcher.watch(&config_dir, RecursiveMode::NonRecursive) {
        log::error!("Failed to watch config directory: {}", e);
        return;
    }
    log::info!("Watching {} for changes", config_path.display());

    while let Ok(res) = bridge_rx.recv().await {
        match res {
            Ok(event) => {
                let meaningful_event = matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                );

                if meaningful_event
                    && event.paths.iter().any(|p| p == &config_path)
                    && tx.send(AppEvent::ConfigReload).await.is_err()
                {
                    break;
                }
            }
            Err(e) => log::error!("Watch error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::Spring;
    use crate::params::Environment;
    use wedge::SliceColor;

    #[test]
    fn test_default_config_matches_defaults() {
        let parsed: Config = config::Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let toml = r##"
            [chart]
            label_position = 0.8

            [[chart.slices]]
            value = 2
            color = "#00ff00"
            label = "Green"
            explode = true

            [[chart.slices]]
            value = 1.5

            [chart.geometry]
            inner_radius = 40
            outer_radius = 150
            corner_radius = 4
            pad_angle = 0.02

            [presentation.lighting]
            environment = "Studio"
        "##;
        let parsed: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let chart = &parsed.chart;
        assert_eq!(chart.slices.len(), 2);
        assert_eq!(chart.slices[0].color, SliceColor::rgb(0, 255, 0));
        assert!(chart.slices[0].exploded);
        assert_eq!(chart.slices[1].height, 0.5);
        assert_eq!(chart.geometry.inner_radius, 40.0);
        assert_eq!(chart.label_position, 0.8);
        assert_eq!(chart.all_heights, 0.5);
        assert_eq!(
            parsed.presentation.lighting.environment,
            Environment::Studio
        );
        assert_eq!(parsed.presentation.lighting.ambient, 0.2);
        assert_eq!(parsed.animation, AnimationConfig::default());
    }

    #[test]
    fn test_params_are_clamped() {
        let mut config = Config::default();
        config.chart.geometry.outer_radius = 1000.0;
        assert_eq!(config.params().chart.geometry.outer_radius, 300.0);
    }

    #[test]
    fn test_animation_is_clamped() {
        let mut animation = AnimationConfig::default();
        animation.spring.mass = 0.0;
        animation.spring.precision = 0.0;
        animation.spring.tension = f64::NAN;
        animation.frame_rate = 0.0;

        let animation = animation.clamped();
        assert_eq!(animation.spring.mass, 0.01);
        assert_eq!(animation.spring.precision, 1e-6);
        assert_eq!(animation.spring.tension, SpringConfig::WOBBLY.tension);
        assert_eq!(animation.frame_rate, 1.0);
        assert_eq!(AnimationConfig::default().clamped(), AnimationConfig::default());

        let mut spring = Spring::new(0.0, animation.spring);
        spring.set_target(1.0);
        for _ in 0..10_000 {
            spring.step(1.0 / 60.0);
        }
        assert!(spring.is_settled());
        assert_eq!(spring.value(), 1.0);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = std::env::temp_dir().join("piestack-config-test-missing");
        let config = load_config_from(&dir.join("config.toml")).unwrap();
        assert_eq!(config.mesh.segments_per_turn, DEFAULT_SEGMENTS_PER_TURN);
    }
}
