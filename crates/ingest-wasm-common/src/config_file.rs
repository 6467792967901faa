//! Configuration file structures for ingest-wasm.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ModuleEntry`]: The guest module to load
//! - [`LogConfig`]: Log output settings for the CLI

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ProcessorConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [processor]
/// max_cached_sessions = 8
///
/// [processor.params]
/// target_field = "message"
///
/// [processor.execution]
/// max_fuel = 5_000_000
/// timeout_ms = 50
///
/// [module]
/// path = "./modify_fields.wasm"
///
/// [log]
/// filter = "info"
/// json = false
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Processor configuration (pool, engine, and execution settings).
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Guest module to load.
    ///
    /// The CLI lets a positional argument override this.
    #[serde(default)]
    pub module: Option<ModuleEntry>,

    /// Log output configuration.
    #[serde(default)]
    pub log: LogConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// The guest module to load.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleEntry {
    /// Path to the WebAssembly module file.
    ///
    /// Binary modules are expected; the CLI also accepts `.wat` text.
    pub path: PathBuf,
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "defaults::log_filter")]
    pub filter: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: defaults::log_filter(),
            json: false,
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn log_filter() -> String {
        "info,ingest_wasm=debug".to_string()
    }
}
