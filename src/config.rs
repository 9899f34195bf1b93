use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "COMPLEXAPP";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub chat_url: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_url: String::new(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl BackendConfig {
    pub fn chat_endpoint(&self) -> String {
        if !self.chat_url.trim().is_empty() {
            return self.chat_url.trim().to_string();
        }
        let base = self.base_url.trim();
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        }
    }
}

fn default_base_url() -> String {
    crate::api::DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_user_agent() -> String {
    format!("complexapp-tui/{}", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_search_debounce", with = "humantime_serde")]
    pub search_debounce: Duration,
    #[serde(default, with = "humantime_serde")]
    pub flash_ttl: Option<Duration>,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            search_debounce: default_search_debounce(),
            flash_ttl: default_flash_ttl(),
        }
    }
}

fn default_search_debounce() -> Duration {
    crate::search::DEFAULT_DEBOUNCE
}

fn default_flash_ttl() -> Option<Duration> {
    Some(Duration::from_secs(5))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("complexapp-tui").join("complexapp-tui.log"))
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        anyhow::ensure!(path.exists(), "config file {} does not exist", path.display());
        let from_file = read_config_file(path)?;
        cfg = merge_config(cfg, from_file);
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.backend.base_url.is_empty() {
        base.backend.base_url = other.backend.base_url;
    }
    if !other.backend.chat_url.is_empty() {
        base.backend.chat_url = other.backend.chat_url;
    }
    if !other.backend.timeout.is_zero() {
        base.backend.timeout = other.backend.timeout;
    }
    if !other.backend.user_agent.is_empty() {
        base.backend.user_agent = other.backend.user_agent;
    }

    base.ui.search_debounce = other.ui.search_debounce;
    base.ui.flash_ttl = other.ui.flash_ttl;

    if other.storage.path.is_some() {
        base.storage.path = other.storage.path;
    }

    if !other.logging.level.is_empty() {
        base.logging.level = other.logging.level;
    }
    if other.logging.file.is_some() {
        base.logging.file = other.logging.file;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let vars: HashMap<String, String> = env::vars().collect();
    apply_env_map(cfg, prefix, &vars);
}

fn apply_env_map(cfg: &mut Config, prefix: &str, vars: &HashMap<String, String>) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value.clone());
        }
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "backend.base_url" => cfg.backend.base_url = value,
        "backend.chat_url" => cfg.backend.chat_url = value,
        "backend.user_agent" => cfg.backend.user_agent = value,
        "backend.timeout" => match humantime::parse_duration(&value) {
            Ok(duration) => cfg.backend.timeout = duration,
            Err(err) => tracing::warn!(%key, %err, "ignoring invalid duration"),
        },
        "ui.search_debounce" => match humantime::parse_duration(&value) {
            Ok(duration) => cfg.ui.search_debounce = duration,
            Err(err) => tracing::warn!(%key, %err, "ignoring invalid duration"),
        },
        "ui.flash_ttl" => {
            if matches!(value.as_str(), "" | "none" | "off") {
                cfg.ui.flash_ttl = None;
            } else if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.flash_ttl = Some(duration);
            }
        }
        "storage.path" => cfg.storage.path = Some(PathBuf::from(value)),
        "logging.level" => cfg.logging.level = value,
        "logging.file" => cfg.logging.file = Some(PathBuf::from(value)),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("complexapp-tui").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_without_files() {
        let cfg = Config::default();
        assert_eq!(cfg.backend.base_url, crate::api::DEFAULT_BASE_URL);
        assert_eq!(cfg.backend.timeout, Duration::from_secs(20));
        assert_eq!(cfg.ui.search_debounce, Duration::from_millis(750));
        assert!(cfg.backend.user_agent.starts_with("complexapp-tui/"));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "backend:\n  base_url: https://complexapp.example\n  timeout: 5s\nui:\n  search_debounce: 300ms\n  flash_ttl: 2s\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("COMPLEXAPP_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.backend.base_url, "https://complexapp.example");
        assert_eq!(cfg.backend.timeout, Duration::from_secs(5));
        assert_eq!(cfg.ui.search_debounce, Duration::from_millis(300));
        assert_eq!(cfg.ui.flash_ttl, Some(Duration::from_secs(2)));
        assert_eq!(cfg.backend.chat_endpoint(), "wss://complexapp.example");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = load(LoadOptions {
            config_file: Some(dir.path().join("absent.yaml")),
            env_prefix: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn env_overrides() {
        let mut cfg = Config::default();
        let vars = HashMap::from([
            ("COMPLEXAPP_UI__SEARCH_DEBOUNCE".to_string(), "200ms".to_string()),
            ("COMPLEXAPP_BACKEND__TIMEOUT".to_string(), "3s".to_string()),
            ("COMPLEXAPP_UI__FLASH_TTL".to_string(), "off".to_string()),
            ("OTHER_BACKEND__TIMEOUT".to_string(), "9s".to_string()),
        ]);
        apply_env_map(&mut cfg, "COMPLEXAPP", &vars);
        assert_eq!(cfg.ui.search_debounce, Duration::from_millis(200));
        assert_eq!(cfg.backend.timeout, Duration::from_secs(3));
        assert_eq!(cfg.ui.flash_ttl, None);
    }

    #[test]
    fn explicit_chat_url_wins() {
        let backend = BackendConfig {
            chat_url: "ws://chat.local:9000".into(),
            ..BackendConfig::default()
        };
        assert_eq!(backend.chat_endpoint(), "ws://chat.local:9000");
        assert_eq!(
            BackendConfig::default().chat_endpoint(),
            "wss://react-app-backend-api.herokuapp.com/"
        );
    }
}
