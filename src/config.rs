//! Engine configuration
//!
//! Layered with figment: built-in defaults, then a TOML file, then
//! `TURNFX_`-prefixed environment variables.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File read when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "turnfx.toml";

/// Prefix for environment overrides (`TURNFX_SEED=42`)
pub const ENV_PREFIX: &str = "TURNFX_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dice seed; `None` draws from OS entropy
    pub seed: Option<u64>,
    /// Post every roll to the notification channel
    pub announce_rolls: bool,
    /// Fallback tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            announce_rolls: true,
            log_filter: "turnfx=info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Provider stack for `path` (or [`DEFAULT_CONFIG_FILE`] if absent)
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load configuration. An explicit path must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
        }
        Self::figment(path).extract().map_err(|e| ConfigError::Invalid(Box::new(e)))
    }
}
