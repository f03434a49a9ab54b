//! TOML configuration for the engine and the command-line runner.
//!
//! Every field is optional; an empty file yields the defaults.
//!
//! ```toml
//! rules = "rules.json"
//!
//! [engine]
//! max_steps = 10000
//! clear_arcs_moniker = "clear-arcs"
//! ```

use crate::constants::CLEAR_ARCS_MONIKER;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default bound on facts processed by one `run_assert` call.
pub const DEFAULT_MAX_STEPS: usize = 10_000;

/// Engine behavior knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum facts processed per run; `None` removes the bound.
    pub max_steps: Option<usize>,
    /// Head word of the control fact that empties the arc set.
    pub clear_arcs_moniker: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: Some(DEFAULT_MAX_STEPS),
            clear_arcs_moniker: CLEAR_ARCS_MONIKER.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_clear_arcs_moniker(mut self, moniker: impl Into<String>) -> Self {
        self.clear_arcs_moniker = moniker.into();
        self
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rule file loaded by the command-line runner. Relative paths are
    /// resolved against the config file's directory.
    pub rules: Option<PathBuf>,
    pub engine: EngineConfig,
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads `path`, resolving a relative `rules` path against its directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let (Some(rules), Some(dir)) = (config.rules.as_ref(), path.parent()) {
            if rules.is_relative() {
                config.rules = Some(dir.join(rules));
            }
        }
        Ok(config)
    }
}
