use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::locate::profile::LocatorProfile;

/// Consecutive non-advancing iterations that trigger a page reload.
pub const STALL_THRESHOLD: u32 = 5;

/// Consecutive failed recoveries after which a traversal is aborted.
pub const MAX_FAILED_RECOVERIES: u32 = 2;

/// Seconds to wait for the operator to clear login/verification pages.
pub const AUTH_TIMEOUT_SECS: u64 = 180;

/// Minimum width/height (in CSS pixels) for a media candidate.
pub const MIN_MEDIA_DIMENSION: u32 = 100;

/// Default upper bound on the number of records collected per album.
pub const DEFAULT_ITEM_CAP: usize = 2000;

/// File name of the checkpoint written inside each album directory.
pub const CHECKPOINT_FILE_NAME: &str = "media_urls.json";

/// Browser-like user agent sent with payload requests.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Pacing preset shared by traversal ("grab") and download steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SpeedPreset {
    Slow,
    #[default]
    Medium,
    Fast,
}

impl SpeedPreset {
    /// Pause after each page interaction during traversal.
    pub fn grab_delay(self) -> Duration {
        match self {
            SpeedPreset::Slow => Duration::from_millis(1000),
            SpeedPreset::Medium => Duration::from_millis(500),
            SpeedPreset::Fast => Duration::from_millis(200),
        }
    }

    /// Pause between successive download attempts.
    pub fn download_delay(self) -> Duration {
        match self {
            SpeedPreset::Slow => Duration::from_millis(500),
            SpeedPreset::Medium => Duration::from_millis(300),
            SpeedPreset::Fast => Duration::from_millis(100),
        }
    }
}

/// Top-level configuration for the harvest engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub speed: SpeedPreset,
    /// Maximum number of records kept per album.
    pub item_cap: usize,
    pub stall_threshold: u32,
    pub max_failed_recoveries: u32,
    pub auth_timeout_secs: u64,
    pub auth_poll_ms: u64,
    /// Upper bound for a single navigation, reload or key press.
    pub navigation_timeout_secs: u64,
    /// Upper bound for a single payload transfer, body included.
    pub fetch_timeout_secs: u64,
    pub min_media_dimension: u32,
    pub checkpoint_file_name: String,
    pub user_agent: String,
    pub profile: LocatorProfile,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speed: SpeedPreset::Medium,
            item_cap: DEFAULT_ITEM_CAP,
            stall_threshold: STALL_THRESHOLD,
            max_failed_recoveries: MAX_FAILED_RECOVERIES,
            auth_timeout_secs: AUTH_TIMEOUT_SECS,
            auth_poll_ms: 1000,
            navigation_timeout_secs: 30,
            fetch_timeout_secs: 60,
            min_media_dimension: MIN_MEDIA_DIMENSION,
            checkpoint_file_name: CHECKPOINT_FILE_NAME.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            profile: LocatorProfile::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn grab_delay(&self) -> Duration {
        self.speed.grab_delay()
    }

    pub fn download_delay(&self) -> Duration {
        self.speed.download_delay()
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn auth_poll_interval(&self) -> Duration {
        Duration::from_millis(self.auth_poll_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_presets() {
        assert_eq!(SpeedPreset::Slow.grab_delay(), Duration::from_secs(1));
        assert_eq!(SpeedPreset::Medium.download_delay(), Duration::from_millis(300));
        assert_eq!(SpeedPreset::Fast.grab_delay(), Duration::from_millis(200));
        assert_eq!(SpeedPreset::default(), SpeedPreset::Medium);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "speed": "Fast", "item_cap": 10 }"#).unwrap();
        assert_eq!(config.speed, SpeedPreset::Fast);
        assert_eq!(config.item_cap, 10);
        assert_eq!(config.stall_threshold, STALL_THRESHOLD);
        assert_eq!(config.checkpoint_file_name, CHECKPOINT_FILE_NAME);
        assert!(!config.profile.blocked_patterns.is_empty());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "auth_timeout_secs": 5 }"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.auth_timeout(), Duration::from_secs(5));
        assert!(EngineConfig::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}
