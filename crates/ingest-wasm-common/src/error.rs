//! Error types for ingest-wasm.
//!
//! This module defines two error families using `thiserror`:
//! - [`ProcessorError`]: Errors reported to the embedding application
//! - [`HostCallError`]: Errors inside a host function, converted to a [`Status`]
//!   before they reach the guest

use std::io;

use thiserror::Error;

use crate::Status;

/// Errors reported to the caller of the processor.
///
/// Construction errors (`Io`, `CompilationFailed`, `Instantiation`,
/// `ExportResolution`, `InvalidConfig`) are fatal to the processor being
/// built. Everything else is scoped to a single `process` call.
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Reading the module bytes failed.
    #[error("Failed to read module data: {0}")]
    Io(#[from] io::Error),

    /// The module bytes could not be compiled.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The compiled module could not be instantiated against the host ABI.
    #[error("Instantiation failed: {reason}")]
    Instantiation {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// A required guest export is missing or has the wrong signature.
    #[error("Failed to resolve guest export '{export}': {reason}")]
    ExportResolution {
        /// Name of the export.
        export: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The guest `process` export returned a status other than OK.
    #[error("Process failed with status {}", Status::describe(*code))]
    ProcessingFailed {
        /// Raw status code returned by the guest.
        code: i32,
    },

    /// The guest trapped or otherwise faulted during a call.
    #[error("{message}")]
    InvocationFault {
        /// The fault as reported by the engine.
        message: String,
        /// Trap code if available.
        code: Option<String>,
    },

    /// Execution exhausted the configured fuel limit.
    #[error("Fuel exhausted: CPU limit exceeded")]
    FuelExhausted,

    /// Execution exceeded the configured deadline.
    #[error("Execution timeout after {duration_ms}ms")]
    ExecutionTimeout {
        /// The deadline in milliseconds.
        duration_ms: u64,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// Errors raised while servicing a host function call.
///
/// These never leave the host function: they are logged and converted to a
/// [`Status`] with [`HostCallError::status`].
#[derive(Error, Debug)]
pub enum HostCallError {
    /// A guest-supplied address range falls outside linear memory.
    #[error(
        "Memory access out of bounds: address {address}, length {length}, memory size {memory_size}"
    )]
    MemoryAccess {
        /// Guest address.
        address: i64,
        /// Requested length.
        length: i64,
        /// Current linear memory size in bytes.
        memory_size: usize,
    },

    /// Guest bytes that must be UTF-8 are not.
    #[error("Invalid UTF-8 in guest memory: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A field value could not be encoded as JSON.
    #[error("Failed to serialize value: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Guest-supplied bytes are not a valid JSON value.
    #[error("Failed to deserialize value: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// The guest allocator failed or returned an unusable region.
    #[error("Guest malloc of {size} bytes failed: {reason}")]
    Allocation {
        /// Requested size in bytes.
        size: usize,
        /// Description of the failure.
        reason: String,
    },

    /// The host function was called while no event was bound.
    #[error("No event is bound to the session")]
    NoEventBound,

    /// The session has not resolved its guest exports yet.
    #[error("Guest exports are not resolved")]
    ExportsUnavailable,
}

impl ProcessorError {
    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `Instantiation` error.
    pub fn instantiation(reason: impl Into<String>) -> Self {
        Self::Instantiation {
            reason: reason.into(),
        }
    }

    /// Create a new `ExportResolution` error.
    pub fn export_resolution(export: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExportResolution {
            export: export.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `InvocationFault` error.
    pub fn invocation_fault(message: impl Into<String>, code: Option<String>) -> Self {
        Self::InvocationFault {
            message: message.into(),
            code,
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Status returned by the guest, when this is a processing failure.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::ProcessingFailed { code } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if this error happened while building the processor.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::CompilationFailed { .. }
                | Self::Instantiation { .. }
                | Self::ExportResolution { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Returns `true` if this error indicates an execution limit was hit.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::FuelExhausted | Self::ExecutionTimeout { .. })
    }
}

impl HostCallError {
    /// Create a new `MemoryAccess` error.
    pub fn memory_access(address: impl Into<i64>, length: impl Into<i64>, memory_size: usize) -> Self {
        Self::MemoryAccess {
            address: address.into(),
            length: length.into(),
            memory_size,
        }
    }

    /// Create a new `Allocation` error.
    pub fn allocation(size: usize, reason: impl Into<String>) -> Self {
        Self::Allocation {
            size,
            reason: reason.into(),
        }
    }

    /// Status reported to the guest for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::MemoryAccess { .. } | Self::InvalidUtf8(_) | Self::Deserialization(_) => {
                Status::InvalidArgument
            }
            Self::Serialization(_)
            | Self::Allocation { .. }
            | Self::NoEventBound
            | Self::ExportsUnavailable => Status::InternalFailure,
        }
    }
}
