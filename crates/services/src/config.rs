//! Runtime configuration: defaults, an optional TOML file, then environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_DB_URL: &str = "STUDY_DB_URL";
pub const ENV_DEBOUNCE_MS: &str = "STUDY_DEBOUNCE_MS";
pub const ENV_LOG: &str = "STUDY_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// `SQLite` URL or bare file path.
    pub db_url: String,
    /// Quiet period before a scheduled save is written.
    pub debounce_ms: u64,
    /// Timer tick period.
    pub tick_interval_ms: u64,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            db_url: "sqlite://study.sqlite3".to_owned(),
            debounce_ms: 500,
            tick_interval_ms: 1000,
            log_filter: "info".to_owned(),
        }
    }
}

impl StudyConfig {
    /// Defaults, overlaid with `path` when given, then with process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or an
    /// override has an unusable value.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Read` or `ConfigError::Parse`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnv` for a non-numeric debounce.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ENV_DB_URL).filter(|v| !v.trim().is_empty()) {
            self.db_url = url;
        }
        if let Some(raw) = lookup(ENV_DEBOUNCE_MS) {
            self.debounce_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_DEBOUNCE_MS,
                value: raw.clone(),
            })?;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
        Ok(())
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = StudyConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn file_values_fill_missing_fields_from_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "debounce_ms = 250\ndb_url = \"sqlite://other.db\"").unwrap();

        let config = StudyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.db_url, "sqlite://other.db");
        assert_eq!(config.tick_interval_ms, 1000);
    }

    #[test]
    fn env_overrides_file_and_rejects_garbage() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_DEBOUNCE_MS, "20"), (ENV_LOG, "services=debug")]);
        let mut config = StudyConfig::default();
        config
            .apply_env(|var| env.get(var).map(|v| (*v).to_owned()))
            .unwrap();
        assert_eq!(config.debounce_ms, 20);
        assert_eq!(config.log_filter, "services=debug");
        assert_eq!(config.db_url, StudyConfig::default().db_url);

        let err = config
            .apply_env(|var| (var == ENV_DEBOUNCE_MS).then(|| "soon".to_owned()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_DEBOUNCE_MS, .. }));
    }

    #[test]
    fn unreadable_or_invalid_file_is_an_error() {
        let missing = StudyConfig::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "debounce_ms = \"fast\"").unwrap();
        assert!(matches!(
            StudyConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
