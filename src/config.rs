use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::limits;
use crate::domain::{LanguageSet, ScheduleState};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub library: LibraryConfig,

    pub scheduler: SchedulerConfig,

    pub credentials: Credentials,

    pub notifications: NotificationConfig,

    pub provider: ProviderConfig,

    pub server: ServerConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// "pretty" or "json"
    pub log_format: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Per-subscriber buffer of the live event feed (default: 100)
    pub event_bus_buffer_size: usize,

    /// Number of log events kept for late joiners (default: 1000)
    pub log_history_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 2,
            event_bus_buffer_size: limits::DEFAULT_EVENT_BUFFER,
            log_history_size: limits::DEFAULT_LOG_HISTORY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub search_paths: Vec<String>,

    pub languages: Vec<String>,
}

impl LibraryConfig {
    #[must_use]
    pub fn language_set(&self) -> LanguageSet {
        LanguageSet::new(self.languages.as_slice())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    pub interval_minutes: i64,

    /// Seconds to wait after startup before the tick loop begins (default: 5)
    pub startup_delay_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 60,
            startup_delay_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub opensubtitles: ProviderAuth,

    pub opensubtitlescom: ProviderAuth,

    pub addic7ed: ProviderAuth,

    /// Fields taken from the environment, never written back to disk.
    #[serde(skip)]
    env_overrides: Vec<EnvOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EnvOverride {
    key: &'static str,
    env_value: String,
    file_value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderAuth {
    pub username: String,

    pub password: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
}

impl Credentials {
    /// Credentials from the environment take priority over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let keep_api_key = !self.opensubtitlescom.api_key.is_empty();
        let mut applied = Vec::new();

        for (key, target) in self.env_fields() {
            if key == "OPENSUBTITLES_API_KEY" && keep_api_key {
                continue;
            }
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                let file_value = std::mem::replace(target, value.clone());
                applied.push(EnvOverride {
                    key,
                    env_value: value,
                    file_value,
                });
            }
        }

        self.env_overrides = applied;
    }

    fn env_fields(&mut self) -> [(&'static str, &mut String); 7] {
        [
            ("OPENSUBTITLES_USERNAME", &mut self.opensubtitles.username),
            ("OPENSUBTITLES_PASSWORD", &mut self.opensubtitles.password),
            ("OPENSUBTITLESCOM_USERNAME", &mut self.opensubtitlescom.username),
            ("OPENSUBTITLESCOM_PASSWORD", &mut self.opensubtitlescom.password),
            ("ADDIC7ED_USERNAME", &mut self.addic7ed.username),
            ("ADDIC7ED_PASSWORD", &mut self.addic7ed.password),
            ("OPENSUBTITLES_API_KEY", &mut self.opensubtitlescom.api_key),
        ]
    }

    /// The credentials as they should appear on disk: every field still
    /// holding its environment value goes back to what the file had.
    #[must_use]
    pub fn without_env_overrides(&self) -> Self {
        let mut persisted = self.clone();
        let overrides = std::mem::take(&mut persisted.env_overrides);

        for (key, target) in persisted.env_fields() {
            if let Some(o) = overrides.iter().find(|o| o.key == key)
                && *target == o.env_value
            {
                target.clone_from(&o.file_value);
            }
        }
        persisted
    }

    /// Replaces masked secrets in `self` with the values from `current`.
    ///
    /// Environment overrides of `current` carry over so they stay off disk.
    pub fn restore_masked(&mut self, current: &Self, mask: &str) {
        self.env_overrides.clone_from(&current.env_overrides);

        let pairs = [
            (&mut self.opensubtitles, &current.opensubtitles),
            (&mut self.opensubtitlescom, &current.opensubtitlescom),
            (&mut self.addic7ed, &current.addic7ed),
        ];

        for (incoming, existing) in pairs {
            if incoming.password == mask {
                incoming.password.clone_from(&existing.password);
            }
            if incoming.api_key == mask {
                incoming.api_key.clone_from(&existing.api_key);
            }
        }
    }

    #[must_use]
    pub fn masked(&self, mask: &str) -> Self {
        let hide = |auth: &ProviderAuth| ProviderAuth {
            username: auth.username.clone(),
            password: if auth.password.is_empty() {
                String::new()
            } else {
                mask.to_string()
            },
            api_key: if auth.api_key.is_empty() {
                String::new()
            } else {
                mask.to_string()
            },
        };

        Self {
            opensubtitles: hide(&self.opensubtitles),
            opensubtitlescom: hide(&self.opensubtitlescom),
            addic7ed: hide(&self.addic7ed),
            env_overrides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,

    pub webhook_url: String,

    pub notify_on_start: bool,

    pub notify_on_completion: bool,

    pub notify_on_errors: bool,

    /// Append the raw error text to failure notifications
    pub include_errors: bool,

    /// "auto", "discord", "slack" or "generic"
    pub webhook_type: String,

    pub title: String,

    pub timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            notify_on_start: true,
            notify_on_completion: true,
            notify_on_errors: true,
            include_errors: true,
            webhook_type: "auto".to_string(),
            title: crate::constants::DEFAULT_NOTIFICATION_TITLE.to_string(),
            timeout_seconds: crate::constants::intervals::WEBHOOK_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Executable used to search and download subtitles
    pub binary: String,

    pub extra_args: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            binary: "subliminal".to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5000,
            cors_allowed_origins: vec![
                "http://localhost:5000".to_string(),
                "http://127.0.0.1:5000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.credentials.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.credentials.apply_env_overrides();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut persisted = self.clone();
        persisted.credentials = self.credentials.without_env_overrides();

        let content = toml::to_string_pretty(&persisted)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    /// The path a loaded config would be written back to.
    #[must_use]
    pub fn resolve_path() -> PathBuf {
        Self::config_paths()
            .into_iter()
            .find(|p| p.exists())
            .unwrap_or_else(Self::default_config_path)
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("subtitlarr").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".subtitlarr").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing(path: Option<&Path>) -> Result<bool> {
        let path = path.map_or_else(Self::default_config_path, Path::to_path_buf);
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.enabled && self.scheduler.interval_minutes <= 0 {
            anyhow::bail!("Scheduler interval must be > 0 when the schedule is enabled");
        }

        if self.scheduler.interval_minutes > limits::MAX_SCHEDULE_INTERVAL_MINUTES {
            anyhow::bail!(
                "Scheduler interval must be at most {} minutes",
                limits::MAX_SCHEDULE_INTERVAL_MINUTES
            );
        }

        if self.notifications.enabled && !self.notifications.webhook_url.is_empty() {
            url::Url::parse(&self.notifications.webhook_url)
                .with_context(|| format!("Invalid webhook URL: {}", self.notifications.webhook_url))?;
        }

        if !matches!(
            self.notifications.webhook_type.as_str(),
            "auto" | "discord" | "slack" | "generic"
        ) {
            anyhow::bail!(
                "Unknown webhook type '{}' (expected auto, discord, slack or generic)",
                self.notifications.webhook_type
            );
        }

        if self.provider.binary.trim().is_empty() {
            anyhow::bail!("Provider binary cannot be empty");
        }

        Ok(())
    }

    #[must_use]
    pub const fn schedule_state(&self) -> ScheduleState {
        ScheduleState {
            enabled: self.scheduler.enabled,
            interval_minutes: self.scheduler.interval_minutes,
        }
    }

    /// Copy safe to hand to HTTP clients.
    #[must_use]
    pub fn redacted(&self, mask: &str) -> Self {
        let mut config = self.clone();
        config.credentials = self.credentials.masked(mask);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.interval_minutes, 60);
        assert_eq!(config.general.log_history_size, 1000);
        assert_eq!(config.notifications.webhook_type, "auto");
        assert_eq!(config.notifications.timeout_seconds, 10);
        assert_eq!(config.provider.binary, "subliminal");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[library]"));
        assert!(toml_str.contains("[scheduler]"));
        assert!(toml_str.contains("[notifications]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [library]
            search_paths = ["/media/tv"]
            languages = ["en", "es"]

            [scheduler]
            enabled = true
            interval_minutes = 30

            [credentials.addic7ed]
            username = "user"
            password = "secret"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.library.search_paths, vec!["/media/tv"]);
        assert_eq!(config.scheduler.interval_minutes, 30);
        assert_eq!(config.credentials.addic7ed.username, "user");
        assert_eq!(config.general.log_level, "info");

        let schedule = config.schedule_state();
        assert!(schedule.enabled);
        assert_eq!(schedule.interval_minutes, 30);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.scheduler.enabled = true;
        config.scheduler.interval_minutes = 0;
        assert!(config.validate().is_err());

        config.scheduler.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_huge_interval() {
        let mut config = Config::default();
        config.scheduler.enabled = true;
        config.scheduler.interval_minutes = limits::MAX_SCHEDULE_INTERVAL_MINUTES;
        assert!(config.validate().is_ok());

        config.scheduler.interval_minutes = i64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_webhook() {
        let mut config = Config::default();
        config.notifications.enabled = true;
        config.notifications.webhook_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.notifications.webhook_url = "https://example.com/hook".to_string();
        assert!(config.validate().is_ok());

        config.notifications.webhook_type = "teams".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ADDIC7ED_USERNAME", "env-user"),
            ("OPENSUBTITLES_API_KEY", "key-123"),
            ("OPENSUBTITLES_PASSWORD", ""),
        ]);

        let mut creds = Credentials::default();
        creds.opensubtitles.password = "from-file".to_string();
        creds.apply_overrides(|k| env.get(k).map(ToString::to_string));

        assert_eq!(creds.addic7ed.username, "env-user");
        assert_eq!(creds.opensubtitlescom.api_key, "key-123");
        assert_eq!(creds.opensubtitles.password, "from-file");
    }

    #[test]
    fn test_env_credentials_are_not_persisted() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ADDIC7ED_USERNAME", "env-user"),
            ("ADDIC7ED_PASSWORD", "env-secret"),
            ("OPENSUBTITLES_API_KEY", "env-key"),
        ]);

        let mut config = Config::default();
        config.credentials.addic7ed.username = "file-user".to_string();
        config.credentials.opensubtitles.username = "edited".to_string();
        config.credentials.apply_overrides(|k| env.get(k).map(ToString::to_string));
        assert_eq!(config.credentials.addic7ed.password, "env-secret");

        // The caller replaces one env-sourced value; that edit is kept.
        let mut updated = config.redacted("***");
        updated.credentials.addic7ed.username = "typed-in".to_string();
        updated.credentials.restore_masked(&config.credentials, "***");
        assert_eq!(updated.credentials.addic7ed.password, "env-secret");

        let path = std::env::temp_dir()
            .join(format!("subtitlarr-config-{}", uuid::Uuid::new_v4()))
            .join("config.toml");
        updated.save_to_path(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();

        assert!(!content.contains("env-secret"));
        assert!(!content.contains("env-key"));
        assert!(content.contains("typed-in"));
        assert!(content.contains("edited"));
        assert_eq!(updated.credentials.addic7ed.password, "env-secret");

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_mask_and_restore() {
        let mut creds = Credentials::default();
        creds.addic7ed.username = "user".to_string();
        creds.addic7ed.password = "hunter2".to_string();
        creds.opensubtitlescom.api_key = "abc".to_string();

        let mut masked = creds.masked("***");
        assert_eq!(masked.addic7ed.username, "user");
        assert_eq!(masked.addic7ed.password, "***");
        assert_eq!(masked.opensubtitles.password, "");

        masked.restore_masked(&creds, "***");
        assert_eq!(masked.addic7ed.password, "hunter2");
        assert_eq!(masked.opensubtitlescom.api_key, "abc");
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let path = std::env::temp_dir()
            .join(format!("subtitlarr-config-{}", uuid::Uuid::new_v4()))
            .join("config.toml");

        let mut config = Config::default();
        config.library.languages = vec!["fr".to_string()];
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.library.languages, vec!["fr"]);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
