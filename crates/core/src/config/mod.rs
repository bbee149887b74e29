use std::{path::Path, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{marker::MarkerStyle, Result};

pub const API_URL_ENV: &str = "QUAKE_REPLAY_API_URL";
pub const API_KEY_ENV: &str = "QUAKE_REPLAY_API_KEY";
pub const PLATES_URL_ENV: &str = "QUAKE_REPLAY_PLATES_URL";

const DEFAULT_PLATES_URL: &str =
    "https://raw.githubusercontent.com/fraxen/tectonicplates/master/GeoJSON/PB2002_boundaries.json";

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub overlay: OverlayConfig,
    pub playback: PlaybackConfig,
    pub marker: MarkerStyle,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to their
    /// defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        tracing::debug!(?path, "loaded configuration file");
        Ok(config)
    }

    /// Loads the file when one is given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides from a variable lookup. Takes the lookup as a closure
    /// so tests do not have to touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.source.api_url = Some(url);
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.source.api_key = Some(key);
        }
        if let Some(url) = lookup(PLATES_URL_ENV).filter(|v| !v.is_empty()) {
            self.overlay.url = url;
        }
    }
}

/// Where seismic events come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub default_start: NaiveDate,
    pub default_end: NaiveDate,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            timeout_secs: 30,
            default_start: NaiveDate::from_ymd_opt(2025, 8, 17).unwrap_or_default(),
            default_end: NaiveDate::from_ymd_opt(2025, 8, 21).unwrap_or_default(),
        }
    }
}

/// Settings for the plate boundary overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub url: String,
    pub visible_on_start: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PLATES_URL.to_string(),
            visible_on_start: true,
        }
    }
}

/// Timing of the reveal animation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub base_interval_ms: u64,
    pub speeds: Vec<u32>,
}

impl PlaybackConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 500,
            speeds: vec![1, 2, 4, 8],
        }
    }
}
