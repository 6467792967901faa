//! Event processing with sandboxed WebAssembly guests.
//!
//! A [`Processor`] compiles a guest module once and runs its `process` export
//! against events supplied by the caller. Guests read and write event fields,
//! log, and read the clock through the host ABI in `ingest-wasm-host`.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use ingest_wasm_common::{ProcessorConfig, SystemHost, Value};
//! use ingest_wasm_processor::Processor;
//!
//! let bytes = std::fs::read("pipeline.wasm")?;
//! let processor = Processor::from_bytes(Arc::new(SystemHost), &bytes, ProcessorConfig::default())?;
//!
//! let mut event: BTreeMap<String, Value> = BTreeMap::new();
//! event.insert("message".into(), Value::from("hello"));
//! processor.process(&mut event)?;
//! ```

pub mod processor;

pub use ingest_wasm_common::{Event, Host, ProcessorConfig, ProcessorError, Status, SystemHost, Value};
pub use processor::{PoolStats, Processor};
