//! Configuration structures for ingest-wasm.
//!
//! This module defines configuration options for various components:
//! - [`ProcessorConfig`]: Top-level processor configuration
//! - [`EngineConfig`]: Wasmtime engine settings (metering, interruption)
//! - [`ExecutionConfig`]: Per-call execution limits (fuel, memory, timeout)

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ProcessorError, Value};

/// Top-level processor configuration.
///
/// It can be loaded from files (TOML, JSON) or built in code.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessorConfig {
    /// Maximum number of idle sessions kept warm for reuse.
    ///
    /// This bounds idle memory only. Concurrent callers beyond this number
    /// still get a session; it is simply not cached afterwards.
    #[serde(default = "defaults::max_cached_sessions")]
    pub max_cached_sessions: usize,

    /// Guest-specific parameters. Reserved; not interpreted by the processor.
    #[serde(default)]
    pub params: BTreeMap<String, Value>,

    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-call execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_cached_sessions: defaults::max_cached_sessions(),
            params: BTreeMap::new(),
            engine: EngineConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl ProcessorConfig {
    /// Set the idle session cache capacity.
    #[must_use]
    pub fn with_max_cached_sessions(mut self, max_cached_sessions: usize) -> Self {
        self.max_cached_sessions = max_cached_sessions;
        self
    }

    /// Check settings that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ProcessorError> {
        if self.engine.epoch_interruption && self.engine.epoch_tick_ms == 0 {
            return Err(ProcessorError::invalid_config(
                "engine.epoch_tick_ms must be greater than 0",
            ));
        }
        if self.execution.max_memory_mb == 0 {
            return Err(ProcessorError::invalid_config(
                "execution.max_memory_mb must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Wasmtime engine configuration.
///
/// These settings are fixed when the engine is created and apply to every
/// session built from it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable fuel metering.
    ///
    /// When enabled, every `process` call gets `execution.max_fuel` units.
    #[serde(default = "defaults::fuel_metering")]
    pub fuel_metering: bool,

    /// Enable epoch-based interruption.
    ///
    /// This interrupts guest execution based on wall time rather than fuel.
    #[serde(default = "defaults::epoch_interruption")]
    pub epoch_interruption: bool,

    /// Interval between epoch increments in milliseconds.
    #[serde(default = "defaults::epoch_tick_ms")]
    pub epoch_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuel_metering: defaults::fuel_metering(),
            epoch_interruption: defaults::epoch_interruption(),
            epoch_tick_ms: defaults::epoch_tick_ms(),
        }
    }
}

impl EngineConfig {
    /// Get the epoch tick interval as a `Duration`.
    pub fn epoch_tick(&self) -> Duration {
        Duration::from_millis(self.epoch_tick_ms)
    }
}

/// Per-call execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Fuel granted to each `process` call.
    ///
    /// Only effective when `engine.fuel_metering` is enabled.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Wall-clock deadline for each `process` call in milliseconds.
    ///
    /// Only effective when `engine.epoch_interruption` is enabled.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum linear memory per session in megabytes.
    #[serde(default = "defaults::max_memory_mb")]
    pub max_memory_mb: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            timeout_ms: defaults::timeout_ms(),
            max_memory_mb: defaults::max_memory_mb(),
        }
    }
}

impl ExecutionConfig {
    /// Get the memory limit in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize) * 1024 * 1024
    }
}

/// Default value functions for serde.
mod defaults {
    pub fn max_cached_sessions() -> usize {
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }

    pub const fn fuel_metering() -> bool {
        true
    }

    pub const fn epoch_interruption() -> bool {
        true
    }

    pub const fn epoch_tick_ms() -> u64 {
        1
    }

    pub const fn max_fuel() -> u64 {
        10_000_000
    }

    pub const fn timeout_ms() -> u64 {
        100
    }

    pub const fn max_memory_mb() -> u32 {
        128
    }
}
