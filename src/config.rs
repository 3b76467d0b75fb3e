//! Engine configuration.

use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the snapshot files.
    pub data_dir: PathBuf,

    /// Seconds between dispatch cycles.
    /// Default: 60
    pub poll_interval_secs: u64,

    /// Number of posts requested from the feed per cycle.
    /// Default: 100
    pub fetch_limit: usize,

    /// Max deliveries in flight during one fan-out.
    /// Default: 8
    pub fanout_concurrency: usize,

    /// Soft per-cycle deadline. Overruns are logged, never cancelled.
    /// Default: 30
    pub cycle_soft_deadline_secs: Option<u64>,

    /// Posts published before this unix time never become news/update
    /// watermarks.
    pub ignore_posts_before: u64,

    /// Abuse guard policy.
    pub guard: GuardConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            poll_interval_secs: 60,
            fetch_limit: 100,
            fanout_concurrency: 8,
            cycle_soft_deadline_secs: Some(30),
            ignore_posts_before: 0,
            guard: GuardConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_limit == 0 {
            return Err(EngineError::InvalidFetchLimit(self.fetch_limit));
        }
        if self.poll_interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }
        if self.fanout_concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "fanout_concurrency must be greater than 0".into(),
            ));
        }
        self.guard.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cycle_soft_deadline(&self) -> Option<Duration> {
        self.cycle_soft_deadline_secs.map(Duration::from_secs)
    }
}

/// Reactivation rate limiting policy.
///
/// The exact thresholds are product decisions; defaults are conservative.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Trailing window length in seconds.
    /// Default: 60
    pub window_secs: u64,

    /// Attempts allowed inside one window.
    /// Default: 5
    pub max_attempts: u32,

    /// Strikes after which the subscriber is banned (None = never).
    pub strikes_to_ban: Option<u32>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_attempts: 5,
            strikes_to_ban: None,
        }
    }
}

impl GuardConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_secs == 0 || self.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "guard window and max_attempts must be greater than 0".into(),
            ));
        }
        if self.strikes_to_ban == Some(0) {
            return Err(EngineError::InvalidConfig(
                "strikes_to_ban must be greater than 0 when set".into(),
            ));
        }
        Ok(())
    }
}
