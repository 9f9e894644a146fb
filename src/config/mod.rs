//! Configuration for the preparation core.
//!
//! Loading and merging of configuration files is the application's concern;
//! this module owns the typed settings and the process-global handle they
//! are published through.

mod duration;
mod general;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use serde_derive::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub use duration::Duration;
pub use general::General;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub general: General,
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Config, ConfigError> {
        toml::from_str(raw).map_err(ConfigError::Parse)
    }
}

/// The process-wide configuration. Read-optimized; replaced wholesale on
/// reload.
static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

pub fn get_config() -> Arc<Config> {
    CONFIG.load_full()
}

pub fn set_config(config: Config) {
    CONFIG.store(Arc::new(config));
}
