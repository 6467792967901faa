//! Per-session execution context and store management.
//!
//! This module provides:
//! - [`SessionContext`]: Per-session state reachable from host functions
//! - [`GuestExports`]: Guest exports the host ABI calls back into
//! - [`ExecutionBudget`]: Fuel and deadline granted to each guest call

use std::sync::Arc;

use wasmtime::{Memory, Store, StoreLimits, StoreLimitsBuilder, TypedFunc};

use crate::WasmEngine;
use ingest_wasm_common::{Event, ExecutionConfig, Host, ProcessorError};

/// Per-session execution context.
///
/// This is the data of a session's Wasmtime [`Store`]. Host functions receive
/// it through [`wasmtime::Caller`] on every call, so they never capture
/// session state themselves.
///
/// The bound event is present only while the guest `process` export runs.
pub struct SessionContext<E> {
    /// Session identifier for tracing.
    session_id: String,

    /// Host services (clock).
    host: Arc<dyn Host>,

    /// Event being processed, if any.
    event: Option<E>,

    /// Guest exports, set once instantiation has resolved them.
    exports: Option<GuestExports>,

    /// Resource limits enforced by the store.
    limits: StoreLimits,
}

/// Guest exports used by host functions.
#[derive(Clone)]
pub struct GuestExports {
    /// Guest allocator: `malloc(size) -> address`.
    pub malloc: TypedFunc<i32, i32>,

    /// Guest linear memory.
    pub memory: Memory,
}

impl<E: Event> SessionContext<E> {
    /// Create a new context with no event bound.
    pub fn new(session_id: String, host: Arc<dyn Host>, execution: &ExecutionConfig) -> Self {
        let limits = StoreLimitsBuilder::new()
            .memory_size(execution.max_memory_bytes())
            .instances(1)
            .build();

        Self {
            session_id,
            host,
            event: None,
            exports: None,
            limits,
        }
    }

    /// Session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Host services.
    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    /// The bound event.
    pub fn event(&self) -> Option<&E> {
        self.event.as_ref()
    }

    /// The bound event, mutably.
    pub fn event_mut(&mut self) -> Option<&mut E> {
        self.event.as_mut()
    }

    /// Resolved guest exports.
    pub fn exports(&self) -> Option<&GuestExports> {
        self.exports.as_ref()
    }

    /// Returns `true` if an event is bound.
    pub fn has_event(&self) -> bool {
        self.event.is_some()
    }

    /// Bind `event`, replacing any previous one.
    pub(crate) fn bind_event(&mut self, event: E) {
        self.event = Some(event);
    }

    /// Release the bound event.
    pub(crate) fn unbind_event(&mut self) -> Option<E> {
        self.event.take()
    }

    pub(crate) fn set_exports(&mut self, exports: GuestExports) {
        self.exports = Some(exports);
    }
}

/// Fuel and deadline granted to a single guest call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionBudget {
    /// Fuel units, when fuel metering is enabled.
    pub fuel: Option<u64>,

    /// Deadline in epoch ticks, when epoch interruption is enabled.
    pub epoch_ticks: Option<u64>,

    /// The configured deadline, for error reporting.
    pub timeout_ms: u64,
}

impl ExecutionBudget {
    /// Derive the per-call budget from the engine and execution settings.
    pub fn new(engine: &WasmEngine, execution: &ExecutionConfig) -> Self {
        let config = engine.config();

        let fuel = config.fuel_metering.then_some(execution.max_fuel);
        let epoch_ticks = config.epoch_interruption.then(|| {
            // Round up so a deadline shorter than one tick still gets a tick
            execution
                .timeout_ms
                .div_ceil(config.epoch_tick_ms.max(1))
                .max(1)
        });

        Self {
            fuel,
            epoch_ticks,
            timeout_ms: execution.timeout_ms,
        }
    }

    /// Reset the store's fuel and deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if fuel cannot be set on the store.
    pub fn apply<T>(&self, store: &mut Store<T>) -> Result<(), ProcessorError> {
        if let Some(fuel) = self.fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| ProcessorError::invalid_config(format!("Failed to set fuel: {e}")))?;
        }
        if let Some(ticks) = self.epoch_ticks {
            store.set_epoch_deadline(ticks);
        }
        Ok(())
    }
}

/// Create a new Wasmtime store for a session.
///
/// # Arguments
///
/// * `engine` - The shared Wasmtime engine
/// * `budget` - Fuel and deadline for instantiation
/// * `context` - The session context
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store<E: Event>(
    engine: &WasmEngine,
    budget: &ExecutionBudget,
    context: SessionContext<E>,
) -> Result<Store<SessionContext<E>>, ProcessorError> {
    let mut store = Store::new(engine.inner(), context);
    store.limiter(|ctx| &mut ctx.limits);

    // Instantiation may run a start function, so it gets a budget too
    budget.apply(&mut store)?;

    Ok(store)
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel<T>(store: &Store<T>) -> Option<u64> {
    store.get_fuel().ok()
}
