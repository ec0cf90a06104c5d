//! Simple config loader using TOML and serde.
//! The config struct is intentionally small and typed; transport and
//! persistence collaborators carry their own configuration.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::Result;

/// Default capacity of the outbound snapshot notification channel.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 256;

/// Default capacity of the ROI trigger channel.
pub const DEFAULT_TRIGGER_CAPACITY: usize = 64;

/// Contract function that performs a full exit (tokens plus yield).
pub const DEFAULT_FULL_EXIT_FN: &str = "withdrawTokensAndYield";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Bounded capacity of the snapshot notification channel. When the
    /// consumer lags, newer notifications are dropped rather than
    /// stalling block ingestion.
    pub notify_capacity: Option<usize>,

    /// Bounded capacity of the ROI trigger channel.
    pub trigger_capacity: Option<usize>,

    /// Contract function name treated as a full exit.
    pub full_exit_fn: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            notify_capacity: Some(DEFAULT_NOTIFY_CAPACITY),
            trigger_capacity: Some(DEFAULT_TRIGGER_CAPACITY),
            full_exit_fn: Some(DEFAULT_FULL_EXIT_FN.to_string()),
        }
    }
}

impl Config {
    pub fn notify_capacity(&self) -> usize {
        self.notify_capacity.unwrap_or(DEFAULT_NOTIFY_CAPACITY)
    }

    pub fn trigger_capacity(&self) -> usize {
        self.trigger_capacity.unwrap_or(DEFAULT_TRIGGER_CAPACITY)
    }

    pub fn full_exit_fn(&self) -> &str {
        self.full_exit_fn.as_deref().unwrap_or(DEFAULT_FULL_EXIT_FN)
    }
}

/// Load config from a TOML file path.
/// If file is missing or parse fails, an error is returned.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let p = path.as_ref();
    let s = fs::read_to_string(p)?;
    let cfg: Config = toml::from_str(&s)?;
    Ok(cfg)
}
