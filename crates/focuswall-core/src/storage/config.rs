//! TOML-based application configuration.
//!
//! Stores machine-wide preferences:
//! - Website filter process and proxy settings
//! - Elapsed-time persistence interval
//! - Remote update check
//!
//! Timer durations are per workspace and live in the database instead.
//! Configuration is stored at `~/.config/focuswall/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;
use crate::timer::TICK_RESOLUTION_MS;

/// External filtering proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Path or name of the proxy binary.
    #[serde(default = "default_binary_path")]
    pub binary_path: String,
    #[serde(default = "default_listening_port")]
    pub listening_port: u16,
    /// macOS network service whose proxy settings are changed.
    #[serde(default = "default_proxy_service")]
    pub proxy_service: String,
    /// How long an interrupted proxy may take to exit before it is killed.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Elapsed time is written to the database whenever it reaches a multiple of this.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(default = "default_true")]
    pub check_on_startup: bool,
    #[serde(default = "default_release_url")]
    pub release_url: String,
    #[serde(default = "default_update_timeout_ms")]
    pub timeout_ms: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/focuswall/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub update: UpdateConfig,
}

// Default functions
fn default_binary_path() -> String {
    "mitmdump".into()
}
fn default_listening_port() -> u16 {
    8080
}
fn default_proxy_service() -> String {
    "Wi-Fi".into()
}
fn default_grace_period_ms() -> u64 {
    3000
}
fn default_command_timeout_ms() -> u64 {
    5000
}
fn default_flush_interval_ms() -> u64 {
    5000
}
fn default_true() -> bool {
    true
}
fn default_release_url() -> String {
    "https://api.github.com/repos/focuswall/focuswall/releases/latest".into()
}
fn default_update_timeout_ms() -> u64 {
    5000
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            listening_port: default_listening_port(),
            proxy_service: default_proxy_service(),
            grace_period_ms: default_grace_period_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            check_on_startup: true,
            release_url: default_release_url(),
            timeout_ms: default_update_timeout_ms(),
        }
    }
}

impl FilterConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let (parents, leaf) = match key.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        if let Some(parents) = parents {
            for part in parents.split('.') {
                current = current.get_mut(part).ok_or_else(unknown)?;
            }
        }

        let obj = current.as_object_mut().ok_or_else(unknown)?;
        let existing = obj.get(leaf).ok_or_else(unknown)?;
        let new_value = match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
            ),
            serde_json::Value::Number(_) => serde_json::Value::Number(
                value
                    .parse::<u64>()
                    .map_err(|e| invalid(e.to_string()))?
                    .into(),
            ),
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
            }
            _ => serde_json::Value::String(value.into()),
        };
        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// A missing file yields the defaults, which are written back.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Self =
                    toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the field.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message,
            })
        };
        let flush = self.session.flush_interval_ms;
        if flush == 0 || flush % TICK_RESOLUTION_MS != 0 {
            return invalid(
                "session.flush_interval_ms",
                format!("must be a positive multiple of {TICK_RESOLUTION_MS}, got {flush}"),
            );
        }
        if self.filter.listening_port == 0 {
            return invalid("filter.listening_port", "must not be 0".into());
        }
        for (key, ms) in [
            ("filter.grace_period_ms", self.filter.grace_period_ms),
            ("filter.command_timeout_ms", self.filter.command_timeout_ms),
            ("update.timeout_ms", self.update.timeout_ms),
        ] {
            if ms == 0 {
                return invalid(key, "must be greater than 0".into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.filter.listening_port, 8080);
        assert_eq!(parsed.session.flush_interval_ms, 5000);
        assert!(parsed.update.check_on_startup);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[filter]\nlistening_port = 9000\n").unwrap();
        assert_eq!(parsed.filter.listening_port, 9000);
        assert_eq!(parsed.filter.binary_path, "mitmdump");
        assert_eq!(parsed.session.flush_interval_ms, 5000);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("filter.listening_port").as_deref(), Some("8080"));
        assert_eq!(cfg.get("filter.binary_path").as_deref(), Some("mitmdump"));
        assert_eq!(cfg.get("update.check_on_startup").as_deref(), Some("true"));
        assert!(cfg.get("filter.missing_key").is_none());
    }

    #[test]
    fn set_updates_typed_values() {
        let mut cfg = Config::default();
        cfg.set("filter.listening_port", "9191").unwrap();
        cfg.set("update.check_on_startup", "false").unwrap();
        cfg.set("filter.proxy_service", "Ethernet").unwrap();
        assert_eq!(cfg.filter.listening_port, 9191);
        assert!(!cfg.update.check_on_startup);
        assert_eq!(cfg.filter.proxy_service, "Ethernet");
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("filter.nonexistent_key", "value"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.set("", "value"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.set("update.check_on_startup", "not_a_bool").is_err());
        // Port does not fit in u16.
        assert!(cfg.set("filter.listening_port", "70000").is_err());
        assert_eq!(cfg.filter.listening_port, 8080);
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.filter.listening_port, 8080);
        assert!(path.exists());

        let mut cfg = cfg;
        cfg.set("session.flush_interval_ms", "10000").unwrap();
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().session.flush_interval_ms, 10000);
    }

    #[test]
    fn load_from_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[filter\nbroken").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn flush_interval_must_be_whole_ticks() {
        let mut cfg = Config::default();
        for bad in ["0", "150"] {
            let err = cfg.set("session.flush_interval_ms", bad).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "session.flush_interval_ms"));
        }
        assert_eq!(cfg.session.flush_interval_ms, 5000);
        cfg.set("session.flush_interval_ms", "2000").unwrap();
        assert_eq!(cfg.session.flush_interval_ms, 2000);
    }

    #[test]
    fn invalid_file_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[filter]\nlistening_port = 0\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
