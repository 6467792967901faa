//! Host function registration for Wasmtime linkers.
//!
//! This module registers the host ABI on a session linker, enabling guest
//! modules to call into the host while processing an event.

use std::sync::Arc;

use wasmtime::{Caller, Linker};

use crate::abi;
use ingest_wasm_common::{Event, ExecutionConfig, Host, ProcessorError};
use ingest_wasm_core::{CompiledModule, SessionContext, SessionFactory, WasmEngine};

/// Import module name for every host function.
pub const HOST_MODULE: &str = "elastic";

/// Register all host functions on a session linker.
///
/// This registers the following host functions:
/// - `elastic::elastic_get_field(key_ptr, key_len, out_ptr_addr, out_len_addr) -> i32`
/// - `elastic::elastic_put_field(key_ptr, key_len, value_ptr, value_len) -> i32`
/// - `elastic::elastic_log(level, msg_ptr, msg_len) -> i32`
/// - `elastic::elastic_get_current_time_nanoseconds(out_addr) -> i32`
///
/// Every function returns a status code (`0` = OK).
///
/// # Arguments
///
/// * `linker` - The Wasmtime linker to register functions on
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all<E: Event>(
    linker: &mut Linker<SessionContext<E>>,
) -> Result<(), ProcessorError> {
    register_fields(linker)?;
    register_logging(linker)?;
    register_clock(linker)?;
    Ok(())
}

/// Register `elastic_get_field` and `elastic_put_field`.
pub fn register_fields<E: Event>(
    linker: &mut Linker<SessionContext<E>>,
) -> Result<(), ProcessorError> {
    linker
        .func_wrap(
            HOST_MODULE,
            "elastic_get_field",
            |mut caller: Caller<'_, SessionContext<E>>,
             key_ptr: i32,
             key_len: i32,
             out_ptr_addr: i32,
             out_len_addr: i32|
             -> i32 {
                let result =
                    abi::get_field(&mut caller, key_ptr, key_len, out_ptr_addr, out_len_addr);
                abi::into_status_code(caller.data().session_id(), "elastic_get_field", result)
            },
        )
        .map_err(|e| registration_failed("elastic_get_field", &e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "elastic_put_field",
            |mut caller: Caller<'_, SessionContext<E>>,
             key_ptr: i32,
             key_len: i32,
             value_ptr: i32,
             value_len: i32|
             -> i32 {
                let result = abi::put_field(&mut caller, key_ptr, key_len, value_ptr, value_len);
                abi::into_status_code(caller.data().session_id(), "elastic_put_field", result)
            },
        )
        .map_err(|e| registration_failed("elastic_put_field", &e))?;

    Ok(())
}

/// Register `elastic_log`.
///
/// # Memory Protocol
///
/// The guest passes:
/// - `level`: Log level (0=trace, 1=debug, 2=info, 3=warn, 4=error)
/// - `msg_ptr`: Pointer to the message in guest memory
/// - `msg_len`: Length of the message in bytes (UTF-8, decoded lossily)
pub fn register_logging<E: Event>(
    linker: &mut Linker<SessionContext<E>>,
) -> Result<(), ProcessorError> {
    linker
        .func_wrap(
            HOST_MODULE,
            "elastic_log",
            |mut caller: Caller<'_, SessionContext<E>>,
             level: i32,
             msg_ptr: i32,
             msg_len: i32|
             -> i32 { abi::log(&mut caller, level, msg_ptr, msg_len).code() },
        )
        .map_err(|e| registration_failed("elastic_log", &e))?;

    Ok(())
}

/// Register `elastic_get_current_time_nanoseconds`.
pub fn register_clock<E: Event>(
    linker: &mut Linker<SessionContext<E>>,
) -> Result<(), ProcessorError> {
    linker
        .func_wrap(
            HOST_MODULE,
            "elastic_get_current_time_nanoseconds",
            |mut caller: Caller<'_, SessionContext<E>>, out_addr: i32| -> i32 {
                let result = abi::get_current_time_nanoseconds(&mut caller, out_addr);
                abi::into_status_code(
                    caller.data().session_id(),
                    "elastic_get_current_time_nanoseconds",
                    result,
                )
            },
        )
        .map_err(|e| registration_failed("elastic_get_current_time_nanoseconds", &e))?;

    Ok(())
}

/// Build a session factory with the full host ABI registered.
///
/// # Errors
///
/// Returns an error if host function registration fails.
pub fn create_session_factory<E: Event>(
    engine: WasmEngine,
    module: CompiledModule,
    host: Arc<dyn Host>,
    execution: ExecutionConfig,
) -> Result<SessionFactory<E>, ProcessorError> {
    let mut factory = SessionFactory::new(engine, module, host, execution);
    register_all(factory.linker_mut())?;
    Ok(factory)
}

fn registration_failed(name: &str, error: &wasmtime::Error) -> ProcessorError {
    ProcessorError::invalid_config(format!("Failed to register {name} function: {error}"))
}
