//! Node configuration, loaded once from the shared `config.json`.
//!
//! The file is shared with the connection substrate; this module reads
//! only the `sampleApp` section and ignores every other key.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::actions::ActionTable;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level layout of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    sample_app: ScheduleConfig,
}

/// Scheduling parameters for one node. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    /// Directory service host:port (or full base URL)
    pub directory: String,

    /// How many peers to ask the directory for per discovery call
    #[serde(alias = "numPeers")]
    pub target_peer_count: usize,

    /// Remote peers required before the scheduler starts
    #[serde(default = "default_min_peer_count")]
    pub min_peer_count: usize,

    /// Fixed sleep between two scheduled actions
    #[serde(alias = "activityPeriodSecs")]
    pub action_interval_seconds: f64,

    /// Number of scheduled actions before draining
    #[serde(default = "default_total_actions")]
    pub total_actions: u64,

    /// Relative weight of each action
    #[serde(default)]
    pub actions: ActionTable,
}

fn default_min_peer_count() -> usize {
    1
}

fn default_total_actions() -> u64 {
    100
}

impl ScheduleConfig {
    /// Reads and validates the config at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parses and validates a config document.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(contents)?;
        file.sample_app.validate()?;
        Ok(file.sample_app)
    }

    /// Checks the invariants the scheduler relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.trim().is_empty() {
            return Err(ConfigError::Invalid("directory must not be empty".into()));
        }
        if self.target_peer_count == 0 {
            return Err(ConfigError::Invalid("targetPeerCount must be at least 1".into()));
        }
        if !self.action_interval_seconds.is_finite() || self.action_interval_seconds <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "actionIntervalSeconds must be a positive number, got {}",
                self.action_interval_seconds
            )));
        }
        Duration::try_from_secs_f64(self.action_interval_seconds).map_err(|e| {
            ConfigError::Invalid(format!(
                "actionIntervalSeconds {} is out of range: {}",
                self.action_interval_seconds, e
            ))
        })?;
        if self.actions.is_disabled() {
            return Err(ConfigError::Invalid("at least one action needs a non-zero weight".into()));
        }
        Ok(())
    }

    /// The sleep between two ticks.
    ///
    /// Saturates at `Duration::MAX` if the field was changed after
    /// validation to a value that does not fit.
    pub fn action_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.action_interval_seconds).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use std::io::Write;

    const FULL: &str = r#"{
        "libp2p": { "port": 4001 },
        "sampleApp": {
            "directory": "127.0.0.1:8080",
            "targetPeerCount": 10,
            "minPeerCount": 3,
            "actionIntervalSeconds": 2.5,
            "totalActions": 40,
            "actions": { "connect": 2, "idle": 0, "query": 1 }
        }
    }"#;

    #[test]
    fn test_parse_full_config() {
        let cfg = ScheduleConfig::from_json(FULL).unwrap();
        assert_eq!(cfg.directory, "127.0.0.1:8080");
        assert_eq!(cfg.target_peer_count, 10);
        assert_eq!(cfg.min_peer_count, 3);
        assert_eq!(cfg.total_actions, 40);
        assert_eq!(cfg.action_interval(), Duration::from_millis(2500));
        assert_eq!(cfg.actions.weight(Action::Connect), 2);
        assert_eq!(cfg.actions.weight(Action::Idle), 0);
        assert_eq!(cfg.actions.weight(Action::SendData), 0);
    }

    #[test]
    fn test_legacy_keys_and_defaults() {
        let cfg = ScheduleConfig::from_json(
            r#"{"sampleApp": {"directory": "dir:80", "numPeers": 5, "activityPeriodSecs": 1}}"#,
        )
        .unwrap();
        assert_eq!(cfg.target_peer_count, 5);
        assert_eq!(cfg.min_peer_count, 1);
        assert_eq!(cfg.total_actions, 100);
        assert_eq!(cfg.action_interval(), Duration::from_secs(1));
        for action in Action::ALL {
            assert_eq!(cfg.actions.weight(action), 1);
        }
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        let err = ScheduleConfig::from_json(
            r#"{"sampleApp": {"directory": "d", "numPeers": 5, "activityPeriodSecs": 0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_interval_beyond_duration_range() {
        let err = ScheduleConfig::from_json(
            r#"{"sampleApp": {"directory": "d", "numPeers": 5, "activityPeriodSecs": 1e20}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_action_interval_saturates_instead_of_panicking() {
        let mut cfg = ScheduleConfig::from_json(FULL).unwrap();
        cfg.action_interval_seconds = 1e20;
        assert_eq!(cfg.action_interval(), Duration::MAX);
    }

    #[test]
    fn test_rejects_all_zero_weights() {
        let err = ScheduleConfig::from_json(
            r#"{"sampleApp": {"directory": "d", "numPeers": 5, "activityPeriodSecs": 1,
                "actions": {"connect": 0}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let err = ScheduleConfig::from_json(r#"{"other": {}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let cfg = ScheduleConfig::load(file.path()).unwrap();
        assert_eq!(cfg.min_peer_count, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ScheduleConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
