use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::EntityKey;
use crate::error::SearchError;
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "gbif-nl.json";
pub const DEFAULT_MODEL: &str = "o4-mini-2025-04-16";
pub const DEFAULT_ORACLE_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_GBIF_API_BASE: &str = "https://api.gbif.org/v1";

/// On-disk config. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub oracle_url: Option<String>,
    #[serde(default)]
    pub gbif_api_base: Option<String>,
    #[serde(default)]
    pub institution_key: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub model: String,
    pub oracle_url: String,
    pub gbif_api_base: String,
    pub institution_key: Option<EntityKey>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            oracle_url: DEFAULT_ORACLE_URL.to_string(),
            gbif_api_base: DEFAULT_GBIF_API_BASE.to_string(),
            institution_key: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    pub fn require_api_key(&self) -> Result<&str, SearchError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(SearchError::MissingApiKey)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the config file, then environment variables.
    pub fn resolve(path: Option<&str>) -> Result<Settings, SearchError> {
        let config = match Self::locate(path) {
            Some(config_path) => {
                debug!(path = %config_path, "loading config");
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| SearchError::ConfigRead(config_path.clone().into_std_path_buf()))?;
                serde_json::from_str(&content)
                    .map_err(|err| SearchError::ConfigParse(err.to_string()))?
            }
            None => Config::default(),
        };
        let settings = Self::resolve_config(config)?;
        Ok(Self::apply_env(settings, |name| std::env::var(name).ok()))
    }

    fn locate(path: Option<&str>) -> Option<Utf8PathBuf> {
        if let Some(path) = path {
            return Some(Utf8PathBuf::from(path));
        }
        let local = Utf8PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".config")
                        .join("gbif-nl")
                        .join("config.json"),
                )
                .ok()
            })
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> Result<Settings, SearchError> {
        let defaults = Settings::default();
        let timeout = match config.timeout_secs {
            Some(0) => {
                return Err(SearchError::InvalidSetting(
                    "timeout_secs must be greater than zero".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.timeout,
        };
        Ok(Settings {
            api_key: non_blank(config.api_key),
            model: non_blank(config.model).unwrap_or(defaults.model),
            oracle_url: non_blank(config.oracle_url).unwrap_or(defaults.oracle_url),
            gbif_api_base: non_blank(config.gbif_api_base).unwrap_or(defaults.gbif_api_base),
            institution_key: non_blank(config.institution_key).map(EntityKey::new),
            timeout,
            retry: config.retry.unwrap_or(defaults.retry),
        })
    }

    /// Environment overrides, read through `lookup`.
    pub fn apply_env<L>(mut settings: Settings, lookup: L) -> Settings
    where
        L: Fn(&str) -> Option<String>,
    {
        if let Some(value) = non_blank(lookup("GBIF_CHAT_OPENAI_API_KEY")) {
            settings.api_key = Some(value);
        }
        if let Some(value) = non_blank(lookup("GBIF_CHAT_MODEL")) {
            settings.model = value;
        }
        if let Some(value) = non_blank(lookup("INSTITUTION_KEY")) {
            settings.institution_key = Some(EntityKey::new(value));
        }
        if let Some(value) = non_blank(lookup("GBIF_API_BASE")) {
            settings.gbif_api_base = value;
        }
        settings
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
