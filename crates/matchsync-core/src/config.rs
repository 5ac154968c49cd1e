//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, the cache location, and the tunables of the sync engine (flush
//! delay, busy-indicator delay, staleness cooldowns, per-resource TTLs).
//!
//! Configuration is stored at `~/.config/matchsync/config.json`. A `.env`
//! file or `MATCHSYNC_API_BASE` in the environment overrides the API base.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "matchsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base`
const API_BASE_ENV: &str = "MATCHSYNC_API_BASE";

const DEFAULT_API_BASE: &str = "https://api.matchsync.app";

/// Deferred durable writes fire after this delay.
const DEFAULT_FLUSH_DELAY_MS: u64 = 50;

/// Operations faster than this never show the busy indicator.
const DEFAULT_BUSY_DELAY_MS: u64 = 300;

/// Minimum spacing between fingerprint checks of one scope.
const DEFAULT_META_COOLDOWN_SECS: u64 = 15;

/// A listing refreshed this recently is trusted over a drifted fingerprint.
const DEFAULT_RACE_WINDOW_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    /// Overrides the platform cache directory when set.
    pub cache_dir: Option<PathBuf>,
    pub flush_delay_ms: u64,
    pub busy_delay_ms: u64,
    pub meta_cooldown_secs: u64,
    pub race_window_secs: u64,
    pub ttl: TtlConfig,
    pub cleanup: CleanupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            cache_dir: None,
            flush_delay_ms: DEFAULT_FLUSH_DELAY_MS,
            busy_delay_ms: DEFAULT_BUSY_DELAY_MS,
            meta_cooldown_secs: DEFAULT_META_COOLDOWN_SECS,
            race_window_secs: DEFAULT_RACE_WINDOW_SECS,
            ttl: TtlConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

/// Per-resource freshness windows, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub seasons_secs: u64,
    pub players_secs: u64,
    pub open_matches_secs: u64,
    pub past_matches_secs: u64,
    pub leaderboard_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            seasons_secs: 10 * 60,
            players_secs: 6 * 60 * 60,
            open_matches_secs: 60,
            past_matches_secs: 10 * 60,
            leaderboard_secs: 5 * 60,
        }
    }
}

impl TtlConfig {
    pub fn seasons(&self) -> Duration {
        Duration::from_secs(self.seasons_secs)
    }

    pub fn players(&self) -> Duration {
        Duration::from_secs(self.players_secs)
    }

    pub fn open_matches(&self) -> Duration {
        Duration::from_secs(self.open_matches_secs)
    }

    pub fn past_matches(&self) -> Duration {
        Duration::from_secs(self.past_matches_secs)
    }

    pub fn leaderboard(&self) -> Duration {
        Duration::from_secs(self.leaderboard_secs)
    }
}

/// Limits applied by [`crate::cache::cleanup_caches`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub match_detail_max_items: usize,
    pub match_detail_max_age_days: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            match_detail_max_items: 80,
            match_detail_max_age_days: 30,
        }
    }
}

impl Config {
    /// Load the config from the default location, falling back to defaults
    /// when no file exists, then apply environment overrides.
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_api_base_override(std::env::var(API_BASE_ENV).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_api_base_override(&mut self, value: Option<String>) {
        if let Some(base) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            debug!(api_base = %base, "API base overridden from environment");
            self.api_base = base;
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn busy_delay(&self) -> Duration {
        Duration::from_millis(self.busy_delay_ms)
    }

    pub fn meta_cooldown(&self) -> Duration {
        Duration::from_secs(self.meta_cooldown_secs)
    }

    /// Race window in milliseconds, comparable with cache timestamps.
    pub fn race_window_ms(&self) -> i64 {
        i64::try_from(self.race_window_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }
}
