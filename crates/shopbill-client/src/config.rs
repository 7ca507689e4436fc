//! # Client Configuration
//!
//! ## Load Order (later overrides earlier)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Defaults                                                            │
//! │  2. shopbill.toml in the platform config dir (or an explicit path)      │
//! │  3. Environment                                                         │
//! │       SHOPBILL_API_URL               api.base_url                       │
//! │       SHOPBILL_PROBE_TIMEOUT_MS      api.probe_timeout_ms               │
//! │       SHOPBILL_REQUEST_TIMEOUT_SECS  api.request_timeout_secs           │
//! │       SHOPBILL_DATA_DIR              storage.data_dir                   │
//! │  4. validate()                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example File
//! ```toml
//! [api]
//! base_url = "https://billing.example.com/api"
//! probe_timeout_ms = 5000
//! request_timeout_secs = 30
//!
//! [storage]
//! data_dir = "/var/lib/shopbill"
//!
//! [reminders]
//! min_age_days = 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};

/// Config file name inside the platform config directory.
pub const CONFIG_FILE: &str = "shopbill.toml";

/// Upper bound for `reminders.min_age_days` (about ten years).
pub const MAX_REMINDER_AGE_DAYS: u32 = 3_650;

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_min_age_days() -> u32 {
    1
}

// =============================================================================
// Sections
// =============================================================================

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Deadline for the startup profile probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Deadline for every other request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            probe_timeout_ms: default_probe_timeout_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ApiSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Where `shopbill.db` lives. Platform data dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderSettings {
    /// Bills younger than this are not reminded about.
    #[serde(default = "default_min_age_days")]
    pub min_age_days: u32,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        ReminderSettings {
            min_age_days: default_min_age_days(),
        }
    }
}

// =============================================================================
// ClientConfig
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub reminders: ReminderSettings,
}

impl ClientConfig {
    /// Loads defaults, then the file, then the environment, then validates.
    pub fn load(config_path: Option<PathBuf>) -> ClientResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading client config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads config or falls back to defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load client config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Writes the config as TOML, creating the parent directory.
    pub fn save(&self, config_path: Option<PathBuf>) -> ClientResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ClientError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ClientError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ClientError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Client config saved");
        Ok(())
    }

    pub fn validate(&self) -> ClientResult<()> {
        let url = url::Url::parse(&self.api.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.probe_timeout_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "probe_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(ClientError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.reminders.min_age_days > MAX_REMINDER_AGE_DAYS {
            return Err(ClientError::InvalidConfig(format!(
                "min_age_days must be at most {}, got {}",
                MAX_REMINDER_AGE_DAYS, self.reminders.min_age_days
            )));
        }

        Ok(())
    }

    /// Applies overrides from `lookup` (the process environment in `load`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SHOPBILL_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Some(ms) = lookup("SHOPBILL_PROBE_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(ms) => self.api.probe_timeout_ms = ms,
                Err(_) => warn!(value = %ms, "Ignoring invalid SHOPBILL_PROBE_TIMEOUT_MS"),
            }
        }

        if let Some(secs) = lookup("SHOPBILL_REQUEST_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => self.api.request_timeout_secs = secs,
                Err(_) => warn!(value = %secs, "Ignoring invalid SHOPBILL_REQUEST_TIMEOUT_SECS"),
            }
        }

        if let Some(dir) = lookup("SHOPBILL_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "shopbill", "shopbill")
    }

    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Directory holding the device database.
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(".shopbill"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.api.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.reminders.min_age_days, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ClientConfig::default();

        config.api.base_url = "ftp://files.example.com".to_string();
        assert!(matches!(config.validate(), Err(ClientError::InvalidUrl(_))));

        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.api.base_url = "https://billing.example.com/api".to_string();
        config.api.probe_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ClientError::InvalidConfig(_))));

        config.api.probe_timeout_ms = 5_000;
        config.api.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reminder_age_is_bounded() {
        let mut config = ClientConfig::default();

        config.reminders.min_age_days = MAX_REMINDER_AGE_DAYS;
        assert!(config.validate().is_ok());

        config.reminders.min_age_days = u32::MAX;
        assert!(matches!(config.validate(), Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("SHOPBILL_API_URL", "https://b.example.com/api"),
            ("SHOPBILL_PROBE_TIMEOUT_MS", "1500"),
            ("SHOPBILL_REQUEST_TIMEOUT_SECS", "soon"),
            ("SHOPBILL_DATA_DIR", "/tmp/shopbill-data"),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api.base_url, "https://b.example.com/api");
        assert_eq!(config.api.probe_timeout_ms, 1_500);
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/shopbill-data"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://billing.example.com/api"
            "#,
        )
        .unwrap();
        assert_eq!(config.api.probe_timeout_ms, 5_000);
        assert_eq!(config.storage.data_dir, None);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir()
            .join(format!("shopbill-config-{}", std::process::id()))
            .join(CONFIG_FILE);

        let mut config = ClientConfig::default();
        config.reminders.min_age_days = 7;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[api]"));
        let loaded: ClientConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.reminders.min_age_days, 7);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
