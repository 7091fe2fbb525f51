//! Environment configuration and the YAML platform registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use radar_core::Platform;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_PLAYLISTS: &[&str] = &[
    "PLcXpkI9A-RZI6FhydNz3JBt_-p_i25Cbr",
    "PLcXpkI9A-RZLUfBSNp-YQBCOezZKbDSgB",
    "PLcXpkI9A-RZIZ6lsE0KCcLWeKNoG45fYr",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{feature} requires {key} to be set")]
    MissingCredential { feature: &'static str, key: &'static str },
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct RadarConfig {
    pub data_dir: PathBuf,
    pub registry_path: PathBuf,
    pub http_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub watch_cron: String,
    pub youtube_api_key: Option<String>,
    pub youtube_playlists: Vec<String>,
    pub email_api_key: Option<String>,
    pub sms_api_key: Option<String>,
}

impl RadarConfig {
    /// Reads the process environment, after loading `.env` when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_vars(|key| vars.get(key).cloned())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let data_dir = non_empty("RADAR_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./.contest-radar"));
        Ok(Self {
            registry_path: non_empty("RADAR_PLATFORMS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("platforms.yaml")),
            http_timeout_secs: parse_secs(non_empty("RADAR_HTTP_TIMEOUT_SECS"), "RADAR_HTTP_TIMEOUT_SECS", 20)?,
            fetch_timeout_secs: parse_secs(non_empty("RADAR_FETCH_TIMEOUT_SECS"), "RADAR_FETCH_TIMEOUT_SECS", 30)?,
            user_agent: non_empty("RADAR_USER_AGENT").unwrap_or_else(|| "contest-radar/0.1".to_string()),
            watch_cron: non_empty("RADAR_WATCH_CRON").unwrap_or_else(|| "0 0 * * * *".to_string()),
            youtube_api_key: non_empty("YOUTUBE_API_KEY"),
            youtube_playlists: non_empty("RADAR_YOUTUBE_PLAYLISTS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| DEFAULT_PLAYLISTS.iter().map(|s| s.to_string()).collect()),
            email_api_key: non_empty("RADAR_EMAIL_API_KEY"),
            sms_api_key: non_empty("RADAR_SMS_API_KEY"),
            data_dir,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn require_youtube_key(&self) -> Result<&str, ConfigError> {
        self.youtube_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential {
                feature: "solution matching",
                key: "YOUTUBE_API_KEY",
            })
    }
}

fn parse_secs(raw: Option<String>, key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            message: "must be greater than zero".to_string(),
        }),
        Ok(v) => Ok(v),
        Err(e) => Err(ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformRegistry {
    pub platforms: Vec<PlatformConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub platform: Platform,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub listing_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self {
            platforms: Platform::ALL
                .into_iter()
                .map(|platform| PlatformConfig {
                    platform,
                    enabled: true,
                    listing_url: None,
                    notes: None,
                })
                .collect(),
        }
    }
}

impl PlatformRegistry {
    /// Loads the registry; a missing file means every platform with its
    /// default endpoint.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            return Ok(Self::default());
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let registry: PlatformRegistry = serde_yaml::from_str(text)?;
        let mut seen = Vec::new();
        for entry in &registry.platforms {
            if seen.contains(&entry.platform) {
                anyhow::bail!("platform {} listed more than once", entry.platform);
            }
            seen.push(entry.platform);
        }
        Ok(registry)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &PlatformConfig> {
        self.platforms.iter().filter(|p| p.enabled)
    }
}
