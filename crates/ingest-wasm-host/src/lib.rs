//! Host functions implementation for ingest-wasm.
//!
//! This crate provides the host side of the guest ABI. Guest modules import
//! these functions from the `elastic` module to read and write fields of the
//! event being processed, emit logs, and read the host clock.
//!
//! # Modules
//!
//! - [`memory`]: Bounds-checked reads and writes of guest linear memory
//! - [`abi`]: The four host functions and their status mapping
//! - [`logging`]: Guest log level mapping and emission
//! - [`linker`]: Registration on a session linker
//!
//! # Safety Model
//!
//! Every pointer and length supplied by a guest is validated against the
//! guest's current memory size before use. A bad pointer is reported back to
//! the guest as `InvalidArgument`; it never panics or traps the host.

pub mod abi;
pub mod linker;
pub mod logging;
pub mod memory;

pub use linker::{HOST_MODULE, create_session_factory, register_all};
pub use logging::{LogLevel, LoggingHost};
pub use memory::GuestMemory;
