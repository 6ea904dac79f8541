//! Store tuning.
//!
//! Every field has a default, so a config file only needs the keys it wants
//! to change:
//!
//! ```json
//! {
//!   "debounceMs": 250,
//!   "backupKeep": 10,
//!   "retention": { "commandHistory": 2000 }
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::retention::RetentionPolicy;
use super::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Quiet period before pending mutations are written.
    pub debounce_ms: u64,
    /// Interval between automatic backups. Zero disables them.
    pub backup_interval_secs: u64,
    /// Number of backups kept after pruning.
    pub backup_keep: usize,
    /// Primary file name inside the data directory.
    pub file_name: String,
    /// Backup file name prefix.
    pub backup_prefix: String,
    pub retention: RetentionPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            backup_interval_secs: 6 * 60 * 60,
            backup_keep: 5,
            file_name: "keeper.json".to_string(),
            backup_prefix: "keeper".to_string(),
            retention: RetentionPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Load a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn backup_interval(&self) -> Option<Duration> {
        (self.backup_interval_secs > 0).then(|| Duration::from_secs(self.backup_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_values() {
        let config = StoreConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.backup_interval(), Some(Duration::from_secs(21_600)));
        assert_eq!(config.backup_keep, 5);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keeper.config.json");
        fs::write(
            &path,
            r#"{ "debounceMs": 50, "retention": { "commandHistory": 10 } }"#,
        )
        .unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.retention.command_history, 10);
        assert_eq!(
            config.retention.player_actions,
            RetentionPolicy::default().player_actions
        );
        assert_eq!(config.file_name, "keeper.json");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn zero_interval_disables_backups() {
        let config = StoreConfig {
            backup_interval_secs: 0,
            ..StoreConfig::default()
        };
        assert!(config.backup_interval().is_none());
    }
}
