//! The event processor.
//!
//! [`Processor`] compiles a guest module once and processes events by running
//! the guest's `process` export in pooled sessions. It is `Send + Sync`; any
//! number of threads may call [`Processor::process`] on a shared instance.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use ingest_wasm_common::{Event, Host, ProcessorConfig, ProcessorError, Status, Value};
use ingest_wasm_core::{CompiledModule, EpochTicker, Session, SessionPool, WasmEngine};
use ingest_wasm_host::create_session_factory;

/// Point-in-time counters for the session pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum number of idle sessions kept.
    pub capacity: usize,
    /// Idle sessions currently cached.
    pub idle: usize,
    /// Sessions built on demand since construction, excluding the seed.
    pub created: usize,
}

/// Runs a guest module against events.
pub struct Processor<E> {
    pool: SessionPool<Session<E>>,
    content_hash: String,
    params: BTreeMap<String, Value>,
    /// Advances the engine epoch while the processor is alive.
    _ticker: Option<EpochTicker>,
}

impl<E: Event + Default> Processor<E> {
    /// Build a processor from guest bytecode.
    ///
    /// The module is compiled once and one session is created eagerly, so a
    /// module with missing or mismatched exports is rejected here rather than
    /// on the first event.
    ///
    /// # Arguments
    ///
    /// * `host` - Host services shared by every session
    /// * `reader` - Source of the WebAssembly binary
    /// * `config` - Processor configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the bytecode cannot
    /// be read or compiled, or the first session cannot be created.
    pub fn new(
        host: Arc<dyn Host>,
        reader: impl Read,
        config: ProcessorConfig,
    ) -> Result<Self, ProcessorError> {
        config.validate()?;
        let engine = WasmEngine::new(&config.engine)?;
        let module = CompiledModule::from_reader(engine.inner(), reader)?;
        Self::with_module(engine, module, host, config)
    }

    /// Build a processor from an in-memory WebAssembly binary.
    ///
    /// # Errors
    ///
    /// As [`Processor::new`].
    pub fn from_bytes(
        host: Arc<dyn Host>,
        bytes: &[u8],
        config: ProcessorConfig,
    ) -> Result<Self, ProcessorError> {
        Self::new(host, bytes, config)
    }

    /// Build a processor from WebAssembly text.
    ///
    /// # Errors
    ///
    /// As [`Processor::new`].
    pub fn from_wat(
        host: Arc<dyn Host>,
        wat: &str,
        config: ProcessorConfig,
    ) -> Result<Self, ProcessorError> {
        config.validate()?;
        let engine = WasmEngine::new(&config.engine)?;
        let module = CompiledModule::from_wat(engine.inner(), wat)?;
        Self::with_module(engine, module, host, config)
    }

    #[instrument(skip_all, fields(content_hash = %module.content_hash()))]
    fn with_module(
        engine: WasmEngine,
        module: CompiledModule,
        host: Arc<dyn Host>,
        config: ProcessorConfig,
    ) -> Result<Self, ProcessorError> {
        let content_hash = module.content_hash().to_string();
        let ticker = engine.start_epoch_ticker()?;

        let factory = Arc::new(create_session_factory::<E>(
            engine,
            module,
            host,
            config.execution.clone(),
        )?);
        let seed = factory.create()?;
        let pool = SessionPool::with_seed(seed, config.max_cached_sessions, move || {
            factory.create()
        });

        info!(
            max_cached_sessions = config.max_cached_sessions,
            epoch_ticker = ticker.is_some(),
            "Processor ready"
        );

        Ok(Self {
            pool,
            content_hash,
            params: config.params,
            _ticker: ticker,
        })
    }

    /// Run the guest against `event`, letting it read and modify fields.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::ProcessingFailed`] if the guest returns a
    /// status other than OK, and the guest's fault if it traps or exceeds its
    /// fuel or deadline. In every case the session goes back to the pool.
    pub fn process(&self, event: &mut E) -> Result<(), ProcessorError> {
        let start = Instant::now();
        let mut session = self.pool.acquire()?;
        let code = session.guest_process(event)?;

        debug!(
            session_id = %session.id(),
            status = %Status::describe(code),
            duration_us = start.elapsed().as_micros(),
            "Event processed"
        );

        if code == Status::Ok.code() {
            Ok(())
        } else {
            Err(ProcessorError::ProcessingFailed { code })
        }
    }
}

impl<E> Processor<E> {
    /// Reserved configuration parameters, as supplied.
    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// Hash of the guest bytecode.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Current session pool counters.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.pool.capacity(),
            idle: self.pool.idle_count(),
            created: self.pool.created_count(),
        }
    }
}

impl<E> std::fmt::Debug for Processor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("content_hash", &self.content_hash)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
