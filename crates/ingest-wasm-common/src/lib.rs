//! Common types, errors, and configuration for ingest-wasm.
//!
//! This crate provides the vocabulary shared by the host and the embedding
//! application:
//! - [`Status`]: the result code exchanged with guest modules
//! - [`Value`], [`Event`], [`Host`]: the data and capabilities a guest works on
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for processor settings

pub mod capability;
pub mod config;
pub mod config_file;
pub mod error;
pub mod status;
pub mod value;

pub use capability::{Event, Host, SystemHost};
pub use config::{EngineConfig, ExecutionConfig, ProcessorConfig};
pub use config_file::{ConfigFile, ConfigFileError, LogConfig, ModuleEntry};
pub use error::{HostCallError, ProcessorError};
pub use status::Status;
pub use value::Value;
