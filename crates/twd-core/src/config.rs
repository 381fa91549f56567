use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per fetch or transfer (including the first).
    pub max_attempts: u32,
    /// Base delay in milliseconds; attempt `n` waits `n * base_delay_ms`.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1500,
        }
    }
}

/// Global configuration loaded from `~/.config/twd/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwdConfig {
    /// Maximum number of threads processed at the same time.
    pub max_concurrent: usize,
    /// Scheduler period in seconds.
    pub tick_interval_secs: u64,
    /// Delay before the first scheduler tick after startup.
    pub initial_tick_delay_secs: u64,
    /// How long a complete-looking thread waits before it is re-checked and closed.
    pub stuck_threshold_secs: u64,
    /// Maximum number of entries kept in the download history.
    pub history_capacity: usize,
    /// History entries older than this are purged.
    pub history_retention_days: u64,
    /// How often the history purge runs.
    pub history_purge_interval_hours: u64,
    /// Catalog threads older than this are never admitted.
    pub discovery_max_age_days: u64,
    /// Wall-clock bound for a single image transfer attempt.
    pub transfer_timeout_secs: u64,
    /// Pause after each newly downloaded image.
    pub post_download_pause_ms: u64,
    /// Quiet period for coalescing observer updates.
    pub ui_debounce_ms: u64,
    /// Minimum spacing between two bulk resume requests.
    pub resume_cooldown_ms: u64,
    /// Base URL of the JSON API (catalog and thread documents).
    pub api_base: String,
    /// Base URL images are served from.
    pub media_base: String,
    /// Directory downloads are written under. Defaults to the working directory.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for TwdConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            tick_interval_secs: 60,
            initial_tick_delay_secs: 6,
            stuck_threshold_secs: 300,
            history_capacity: 18_000,
            history_retention_days: 7,
            history_purge_interval_hours: 24,
            discovery_max_age_days: 7,
            transfer_timeout_secs: 15,
            post_download_pause_ms: 500,
            ui_debounce_ms: 600,
            resume_cooldown_ms: 2000,
            api_base: "https://a.4cdn.org".to_string(),
            media_base: "https://i.4cdn.org".to_string(),
            download_dir: None,
            retry: None,
        }
    }
}

impl TwdConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = self.retry.clone().unwrap_or_default();
        RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            base_delay: Duration::from_millis(retry.base_delay_ms),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn initial_tick_delay(&self) -> Duration {
        Duration::from_secs(self.initial_tick_delay_secs)
    }

    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_secs(self.stuck_threshold_secs)
    }

    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_days * 24 * 60 * 60)
    }

    pub fn history_purge_interval(&self) -> Duration {
        Duration::from_secs(self.history_purge_interval_hours.max(1) * 60 * 60)
    }

    pub fn discovery_max_age(&self) -> Duration {
        Duration::from_secs(self.discovery_max_age_days * 24 * 60 * 60)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs.max(1))
    }

    pub fn post_download_pause(&self) -> Duration {
        Duration::from_millis(self.post_download_pause_ms)
    }

    pub fn ui_debounce(&self) -> Duration {
        Duration::from_millis(self.ui_debounce_ms)
    }

    pub fn resume_cooldown(&self) -> Duration {
        Duration::from_millis(self.resume_cooldown_ms)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("twd")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TwdConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = TwdConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: TwdConfig = toml::from_str(&data)?;
    Ok(cfg)
}
