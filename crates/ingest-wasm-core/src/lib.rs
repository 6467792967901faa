//! Core Wasmtime runtime for ingest-wasm.
//!
//! This crate provides the guest execution machinery:
//! - [`WasmEngine`]: Configured Wasmtime engine with fuel and epoch limits
//! - [`CompiledModule`]: Compiled guest module, shared by all sessions
//! - [`SessionContext`]: Per-session state seen by host functions
//! - [`SessionFactory`] and [`Session`]: Instantiation and guest calls
//! - [`SessionPool`]: Bounded cache of warm sessions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                WasmEngine + CompiledModule              │
//! │  (Compiled once, shared read-only by every session)     │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │            SessionFactory (Linker + host ABI)           │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │         SessionPool<Session<E>> (idle free list)        │
//! │  Session = Store<SessionContext<E>> + Instance          │
//! │  - Bound event (one call at a time)                     │
//! │  - Linear memory, fuel, deadline                        │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod module;
pub mod pool;
pub mod session;
pub mod store;

pub use engine::{EpochTicker, WasmEngine};
pub use module::CompiledModule;
pub use pool::{Pooled, SessionPool};
pub use session::{MALLOC_EXPORT, MEMORY_EXPORT, PROCESS_EXPORT, Session, SessionFactory};
pub use store::{ExecutionBudget, GuestExports, SessionContext};
