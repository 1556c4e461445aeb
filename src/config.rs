//! Simulation Configuration
//!
//! JSON file read once at startup. Every field is optional; missing fields
//! take the defaults below. Start values go through the same clamping as
//! the runtime `set_start_*` controls.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::game::input::AdmissionPolicy;
use crate::game::movement::MovementConfig;
use crate::game::registry::EntityCounts;
use crate::game::state::{RuleConfig, SessionDefaults};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Cause
        source: std::io::Error,
    },

    /// File is not valid JSON for this schema.
    #[error("invalid config {path}: {source}")]
    Json {
        /// Config path
        path: PathBuf,
        /// Cause
        source: serde_json::Error,
    },

    /// A value is out of range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Everything the binary needs to run a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// WebSocket endpoint
    pub bind_addr: SocketAddr,
    /// Drive the session through a client (false = headless)
    pub visualization: bool,
    /// How often a blocked wait logs that it is still waiting
    pub ack_poll_interval_ms: u64,
    /// Timer divisor: one timer unit per N ticks
    pub ticks_per_second: u64,
    /// Level grids, addressed 1-based in this order
    pub level_files: Vec<PathBuf>,
    /// Lives at session start
    pub start_lives: i64,
    /// Timer at spawn
    pub start_time: i64,
    /// Level at session start
    pub start_level: i64,
    /// Ticks to run before exiting
    pub iterations: u64,
    /// Keep only the first input per ack window
    pub single_input_per_tick: bool,
    /// Pre-allocated instances per kind (default: enough for every layout)
    pub entity_counts: Option<EntityCounts>,
    /// Lane movement and dive cycle
    pub movement: MovementConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8181)),
            visualization: true,
            ack_poll_interval_ms: 100,
            ticks_per_second: 5,
            level_files: Vec::new(),
            start_lives: 5,
            start_time: 60,
            start_level: 1,
            iterations: 10_000,
            single_input_per_tick: true,
            entity_counts: None,
            movement: MovementConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Parse a config document. Relative level paths stay as written.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read, parse and validate a config file. Relative level paths are
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base) = path.parent() {
            config.level_files = config.level_files
                .into_iter()
                .map(|file| if file.is_relative() { base.join(file) } else { file })
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject unusable values and clamp start values into range.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.level_files.is_empty() {
            return Err(ConfigError::Invalid("level_files must list at least one grid".into()));
        }
        if self.ticks_per_second == 0 {
            return Err(ConfigError::Invalid("ticks_per_second must be positive".into()));
        }

        let defaults = self.session_defaults();
        let clamped = (defaults.start_time as i64, defaults.start_lives as i64, defaults.start_level as i64);
        if clamped != (self.start_time, self.start_lives, self.start_level) {
            warn!(
                "Start values clamped: time {} -> {}, lives {} -> {}, level {} -> {}",
                self.start_time, clamped.0, self.start_lives, clamped.1, self.start_level, clamped.2
            );
            (self.start_time, self.start_lives, self.start_level) = clamped;
        }
        Ok(())
    }

    /// Clamped session defaults.
    pub fn session_defaults(&self) -> SessionDefaults {
        SessionDefaults::clamped(self.start_time, self.start_lives, self.start_level)
    }

    /// Rule parameters.
    pub fn rules(&self) -> RuleConfig {
        RuleConfig {
            ticks_per_second: self.ticks_per_second,
            movement: self.movement,
        }
    }

    /// Input admission policy.
    pub fn admission(&self) -> AdmissionPolicy {
        AdmissionPolicy::from_single_input(self.single_input_per_tick)
    }

    /// Wait-log cadence.
    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = SimulationConfig::from_json(r#"{"level_files": ["a.csv"]}"#).unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8181");
        assert_eq!(config.ticks_per_second, 5);
        assert_eq!(config.iterations, 10_000);
        assert!(config.visualization);
        assert_eq!(config.admission(), AdmissionPolicy::FirstPerTick);
        assert_eq!(config.movement, MovementConfig::default());
    }

    #[test]
    fn test_validate_clamps_start_values() {
        let mut config = SimulationConfig::from_json(
            r#"{"level_files": ["a.csv"], "start_time": 5000, "start_lives": 0, "start_level": -2}"#,
        ).unwrap();
        config.validate().unwrap();
        assert_eq!((config.start_time, config.start_lives, config.start_level), (999, 1, 1));
        assert_eq!(config.session_defaults(), SessionDefaults { start_time: 999, start_lives: 1, start_level: 1 });
    }

    #[test]
    fn test_validate_rejects_zero_divisor() {
        let mut config = SimulationConfig::from_json(r#"{"level_files": ["a.csv"], "ticks_per_second": 0}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_requires_levels() {
        let mut config = SimulationConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_movement_and_counts() {
        let config = SimulationConfig::from_json(
            r#"{"level_files": ["a.csv"], "movement": {"car_period": 3}, "entity_counts": {"cars": 7}}"#,
        ).unwrap();
        assert_eq!(config.movement.car_period, 3);
        assert_eq!(config.movement.log_period, 2);
        assert_eq!(config.entity_counts.unwrap().cars, 7);
        assert_eq!(config.entity_counts.unwrap().logs, 0);
    }

    #[test]
    fn test_load_resolves_relative_levels() {
        let dir = std::env::temp_dir().join(format!("frogger-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{"level_files": ["level1.csv"], "visualization": false}"#).unwrap();

        let config = SimulationConfig::load(&path).unwrap();
        assert_eq!(config.level_files, vec![dir.join("level1.csv")]);
        assert!(!config.visualization);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_shipped_config_and_levels_load() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.json");
        let config = SimulationConfig::load(&path).unwrap();
        let store = crate::game::layout::LayoutStore::load(&config.level_files).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SimulationConfig::load(Path::new("/nonexistent/frogger.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
