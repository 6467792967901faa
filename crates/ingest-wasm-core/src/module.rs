//! WebAssembly module compilation.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's [`Module`]
//! that handles compiling guest bytecode once so every session can share it.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::Read;
use std::time::Instant;

use tracing::{info, instrument};
use wasmtime::{Engine, Module};

use ingest_wasm_common::ProcessorError;

const WASM_MAGIC: &[u8] = b"\0asm";
const WASM_VERSION: &[u8] = &[0x01, 0x00, 0x00, 0x00];

/// A compiled WebAssembly module.
///
/// # Thread Safety
///
/// `CompiledModule` is immutable after compilation and cheap to clone; all
/// sessions instantiate from the same underlying Wasmtime module.
#[derive(Clone)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    inner: Module,

    /// Hash of the original module bytes.
    content_hash: String,
}

impl CompiledModule {
    /// Compile a module from WebAssembly bytes.
    ///
    /// # Arguments
    ///
    /// * `engine` - The Wasmtime engine to use for compilation
    /// * `bytes` - The raw WebAssembly bytes
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails (e.g., invalid Wasm).
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, ProcessorError> {
        Self::check_header(bytes)?;
        Self::compile(engine, bytes, "Module")
    }

    /// Read a module from `reader` and compile it.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Io`] if reading fails, otherwise as
    /// [`CompiledModule::from_bytes`].
    pub fn from_reader(engine: &Engine, mut reader: impl Read) -> Result<Self, ProcessorError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(engine, &bytes)
    }

    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for tests and hand-written guests.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or compilation fails.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, ProcessorError> {
        Self::compile(engine, wat.as_bytes(), "WAT module")
    }

    fn compile(engine: &Engine, bytes: &[u8], kind: &str) -> Result<Self, ProcessorError> {
        let start = Instant::now();

        let module = Module::new(engine, bytes).map_err(|e| {
            ProcessorError::compilation_failed(format!("{kind} compilation failed: {e}"))
        })?;

        let content_hash = compute_hash(bytes);
        let duration = start.elapsed();

        info!(
            content_hash = %content_hash,
            duration_ms = duration.as_millis(),
            "{kind} compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
        })
    }

    /// Get the content hash of the original module bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get the inner Wasmtime module.
    pub fn as_module(&self) -> &Module {
        &self.inner
    }

    /// Names of the module's exports.
    pub fn export_names(&self) -> Vec<&str> {
        self.inner.exports().map(|e| e.name()).collect()
    }

    /// Reject input that is not a version 1 WebAssembly binary before
    /// handing it to the compiler.
    fn check_header(bytes: &[u8]) -> Result<(), ProcessorError> {
        let Some((magic, version)) = bytes.get(..8).map(|header| header.split_at(4)) else {
            return Err(ProcessorError::compilation_failed(format!(
                "not a WebAssembly binary: {} byte(s) is shorter than the header",
                bytes.len()
            )));
        };
        if magic != WASM_MAGIC {
            return Err(ProcessorError::compilation_failed(
                "not a WebAssembly binary: missing \\0asm magic",
            ));
        }
        if version != WASM_VERSION {
            return Err(ProcessorError::compilation_failed(format!(
                "unsupported WebAssembly binary version {version:02x?}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
