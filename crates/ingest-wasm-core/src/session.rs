//! Guest session lifecycle.
//!
//! A [`Session`] is one instantiated guest module with its resolved exports,
//! ready to process one event at a time. Sessions are built by a
//! [`SessionFactory`], which owns the compiled module and the linker holding
//! the host ABI:
//!
//! 1. Create a store with the session context and resource limits
//! 2. Instantiate the module against the linker
//! 3. Resolve `malloc`, `process`, and `memory`, checking their signatures
//!
//! A missing or mismatched export fails session creation; no partially
//! usable session is ever returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, instrument, warn};
use uuid::Uuid;
use wasmtime::{Instance, Linker, Store, Trap, TypedFunc, WasmParams, WasmResults};

use crate::CompiledModule;
use crate::WasmEngine;
use crate::store::{
    ExecutionBudget, GuestExports, SessionContext, create_store, get_remaining_fuel,
};
use ingest_wasm_common::{Event, ExecutionConfig, Host, ProcessorError, Status};

/// Guest allocator export: `(size: i32) -> i32`.
pub const MALLOC_EXPORT: &str = "malloc";

/// Guest entry point export: `() -> i32`.
pub const PROCESS_EXPORT: &str = "process";

/// Guest linear memory export.
pub const MEMORY_EXPORT: &str = "memory";

/// Builds sessions for one compiled module.
///
/// # Thread Safety
///
/// `SessionFactory` is immutable once host functions are registered and can
/// be shared across threads. Each session it creates has its own [`Store`].
pub struct SessionFactory<E> {
    engine: WasmEngine,
    linker: Linker<SessionContext<E>>,
    module: CompiledModule,
    host: Arc<dyn Host>,
    execution: ExecutionConfig,
    budget: ExecutionBudget,
}

impl<E: Event> SessionFactory<E> {
    /// Create a new session factory with an empty linker.
    ///
    /// # Arguments
    ///
    /// * `engine` - The engine the module was compiled with
    /// * `module` - The compiled guest module
    /// * `host` - Host services shared by all sessions
    /// * `execution` - Per-call execution limits
    pub fn new(
        engine: WasmEngine,
        module: CompiledModule,
        host: Arc<dyn Host>,
        execution: ExecutionConfig,
    ) -> Self {
        let linker = Linker::new(engine.inner());
        let budget = ExecutionBudget::new(&engine, &execution);

        Self {
            engine,
            linker,
            module,
            host,
            execution,
            budget,
        }
    }

    /// Get a mutable reference to the linker.
    ///
    /// Use this to register host functions before creating sessions.
    pub fn linker_mut(&mut self) -> &mut Linker<SessionContext<E>> {
        &mut self.linker
    }

    /// Instantiate the module into a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Instantiation fails (e.g. the guest imports an unknown function)
    /// - A required export is missing or has the wrong signature
    #[instrument(skip(self), fields(content_hash = %self.module.content_hash()))]
    pub fn create(&self) -> Result<Session<E>, ProcessorError> {
        let session_id = Uuid::new_v4().to_string();
        let context = SessionContext::new(session_id.clone(), Arc::clone(&self.host), &self.execution);
        let mut store = create_store(&self.engine, &self.budget, context)?;

        let instance = self
            .linker
            .instantiate(&mut store, self.module.as_module())
            .map_err(|e| {
                ProcessorError::instantiation(format!("Failed to create WASM module instance: {e:#}"))
            })?;

        let malloc = resolve_func::<_, i32, i32>(&instance, &mut store, MALLOC_EXPORT, 1, 1)?;
        let process = resolve_func::<_, (), i32>(&instance, &mut store, PROCESS_EXPORT, 0, 1)?;
        let memory = instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .ok_or_else(|| {
                ProcessorError::export_resolution(MEMORY_EXPORT, "memory export not found")
            })?;

        store
            .data_mut()
            .set_exports(GuestExports { malloc, memory });

        debug!(session_id = %session_id, "Session created");

        Ok(Session {
            id: session_id,
            store,
            process,
            budget: self.budget,
        })
    }
}

impl<E> std::fmt::Debug for SessionFactory<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("module", &self.module)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

/// One instantiated guest module bound to host capabilities.
///
/// A session processes exactly one event at a time; `&mut self` on
/// [`Session::guest_process`] enforces that.
pub struct Session<E> {
    id: String,
    store: Store<SessionContext<E>>,
    process: TypedFunc<(), i32>,
    budget: ExecutionBudget,
}

impl<E: Event> Session<E> {
    /// Run the guest `process` export against `event`.
    ///
    /// The event is moved into the session for the duration of the call and
    /// moved back before returning, whatever the outcome. Host functions
    /// invoked by the guest during the call see this event and no other.
    ///
    /// Returns the raw status code from the guest.
    ///
    /// # Errors
    ///
    /// Returns an error if the guest traps, runs out of fuel, or exceeds its
    /// deadline.
    pub fn guest_process(&mut self, event: &mut E) -> Result<i32, ProcessorError>
    where
        E: Default,
    {
        self.store.data_mut().bind_event(std::mem::take(event));

        let result = self
            .budget
            .apply(&mut self.store)
            .and_then(|()| self.call_process());

        match self.store.data_mut().unbind_event() {
            Some(bound) => *event = bound,
            None => error!(session_id = %self.id, "Event was not bound after guest call"),
        }

        result
    }

    fn call_process(&mut self) -> Result<i32, ProcessorError> {
        let start = Instant::now();
        let result = self.process.call(&mut self.store, ());
        let duration = start.elapsed();

        match result {
            Ok(code) => {
                debug!(
                    session_id = %self.id,
                    status = %Status::describe(code),
                    duration_us = duration.as_micros(),
                    "Guest process returned"
                );
                Ok(code)
            }
            Err(err) => Err(self.classify_fault(&err, duration)),
        }
    }

    fn classify_fault(&self, error: &wasmtime::Error, duration: Duration) -> ProcessorError {
        match error.downcast_ref::<Trap>() {
            Some(Trap::OutOfFuel) => {
                warn!(
                    session_id = %self.id,
                    duration_ms = duration.as_millis(),
                    "Guest process terminated: fuel exhausted"
                );
                ProcessorError::FuelExhausted
            }
            Some(Trap::Interrupt) => {
                warn!(
                    session_id = %self.id,
                    duration_ms = duration.as_millis(),
                    "Guest process terminated: deadline exceeded"
                );
                ProcessorError::ExecutionTimeout {
                    duration_ms: self.budget.timeout_ms,
                }
            }
            _ => {
                let (message, code) = extract_trap_info(error);
                error!(
                    session_id = %self.id,
                    duration_ms = duration.as_millis(),
                    trap_message = %message,
                    "Guest process trapped"
                );
                ProcessorError::invocation_fault(message, code)
            }
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The session context.
    pub fn context(&self) -> &SessionContext<E> {
        self.store.data()
    }

    /// Remaining fuel after the last call, when fuel metering is enabled.
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.budget.fuel.and_then(|_| get_remaining_fuel(&self.store))
    }
}

impl<E> std::fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Look up an exported function and check its arity and types.
fn resolve_func<T, Params, Results>(
    instance: &Instance,
    store: &mut Store<T>,
    name: &str,
    param_arity: usize,
    result_arity: usize,
) -> Result<TypedFunc<Params, Results>, ProcessorError>
where
    Params: WasmParams,
    Results: WasmResults,
{
    let func = instance
        .get_func(&mut *store, name)
        .ok_or_else(|| ProcessorError::export_resolution(name, "function export not found"))?;

    let ty = func.ty(&*store);
    if ty.params().len() != param_arity {
        return Err(ProcessorError::export_resolution(
            name,
            format!(
                "must accept {param_arity} parameter(s) but has {}",
                ty.params().len()
            ),
        ));
    }
    if ty.results().len() != result_arity {
        return Err(ProcessorError::export_resolution(
            name,
            format!(
                "must return {result_arity} value(s) but has {}",
                ty.results().len()
            ),
        ));
    }

    func.typed::<Params, Results>(&*store)
        .map_err(|e| ProcessorError::export_resolution(name, format!("unexpected signature: {e}")))
}

/// Extract human-readable trap information.
fn extract_trap_info(error: &wasmtime::Error) -> (String, Option<String>) {
    let message = format!("{error:#}");

    // Try to get the trap code
    let code = error.downcast_ref::<Trap>().map(|trap| format!("{trap:?}"));

    (message, code)
}
