use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::monitor::WatchedUris;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub geo: GeoConfig,
    pub telegram: TelegramConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Access log that is tailed for watched URI hits
    pub log_path: PathBuf,
    pub watched_uris: Vec<String>,
    /// Skip content that already exists when the process starts
    #[serde(default)]
    pub start_at_end: bool,
    /// Consecutive failed passes tolerated before the loop gives up
    #[serde(default = "MonitorConfig::default_max_tail_failures")]
    pub max_tail_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    pub base_url: String,
    #[serde(default = "GeoConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub api_url: String,
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Explicit operator log file. When unset the binary picks a default location.
    pub log_file: Option<PathBuf>,
}

impl MonitorConfig {
    const fn default_max_tail_failures() -> u32 {
        3
    }

    pub fn watched_uris(&self) -> WatchedUris {
        WatchedUris::new(self.watched_uris.iter().cloned())
    }
}

impl GeoConfig {
    const fn default_timeout_secs() -> u64 {
        5
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_path = lookup("LOG_PATH")
            .map(PathBuf::from)
            .context("LOG_PATH must be set to the monitored access log")?;

        let bot_token = lookup("MY_TOKEN")
            .or_else(|| lookup("TELEGRAM_BOT_TOKEN"))
            .context("MY_TOKEN (or TELEGRAM_BOT_TOKEN) must be set")?;
        let chat_id = lookup("CHAT_ID").context("CHAT_ID must be set")?;
        let api_url = lookup("TELEGRAM_API_URL")
            .unwrap_or_else(|| "https://api.telegram.org".to_string());

        let geo_base_url =
            lookup("GEO_LOOKUP_URL").unwrap_or_else(|| "https://ipinfo.io".to_string());
        let geo_timeout_secs = match lookup("GEO_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("GEO_TIMEOUT_SECS must be a number, got '{v}'"))?,
            None => GeoConfig::default_timeout_secs(),
        };

        let watched_uris = match lookup("WATCHED_URIS") {
            Some(list) => {
                let uris: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if uris.is_empty() {
                    tracing::warn!("WATCHED_URIS is empty, falling back to the default set");
                    WatchedUris::default_uris()
                } else {
                    uris
                }
            }
            None => WatchedUris::default_uris(),
        };

        let start_at_end = lookup("START_AT_END")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let max_tail_failures = match lookup("MAX_TAIL_FAILURES") {
            Some(v) => {
                let n = v
                    .parse::<u32>()
                    .with_context(|| format!("MAX_TAIL_FAILURES must be a number, got '{v}'"))?;
                if n == 0 {
                    tracing::warn!("MAX_TAIL_FAILURES is 0, falling back to the default");
                    MonitorConfig::default_max_tail_failures()
                } else {
                    n
                }
            }
            None => MonitorConfig::default_max_tail_failures(),
        };

        let log_file = lookup("MONITOR_LOG_FILE").map(PathBuf::from);

        Ok(Config {
            monitor: MonitorConfig {
                log_path,
                watched_uris,
                start_at_end,
                max_tail_failures,
            },
            geo: GeoConfig {
                base_url: geo_base_url,
                timeout_secs: geo_timeout_secs,
            },
            telegram: TelegramConfig {
                api_url,
                bot_token,
                chat_id,
            },
            diagnostics: DiagnosticsConfig { log_file },
        })
    }
}
