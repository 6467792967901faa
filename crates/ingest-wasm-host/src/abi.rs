//! The host side of the guest ABI.
//!
//! Each function here backs one `elastic_*` import. They take the raw
//! pointer and length arguments the guest passed, marshal data through the
//! guest's linear memory, and report the outcome as a [`Status`]. Failures
//! are returned as [`HostCallError`] and turned into a status code by
//! [`into_status_code`] at the linker boundary; a misbehaving guest never
//! traps or panics the host through these functions.

use tracing::{trace, warn};
use wasmtime::Caller;

use crate::logging::{LoggingHost, level_from_i32};
use crate::memory::{GuestMemory, guest_length, guest_u32};
use ingest_wasm_common::{Event, HostCallError, Status, Value};
use ingest_wasm_core::{GuestExports, SessionContext};

/// Size of an address or length written back to the guest.
const OUT_PARAM_SIZE: usize = 4;

fn exports<E: Event>(
    caller: &Caller<'_, SessionContext<E>>,
) -> Result<GuestExports, HostCallError> {
    caller
        .data()
        .exports()
        .cloned()
        .ok_or(HostCallError::ExportsUnavailable)
}

/// Read a field of the bound event into a guest-allocated buffer.
///
/// On success the buffer address is written at `out_ptr_addr` and its length
/// at `out_len_addr`, both as little-endian `u32`. An absent field returns
/// [`Status::NotFound`] without calling the guest allocator.
pub fn get_field<E: Event>(
    caller: &mut Caller<'_, SessionContext<E>>,
    key_ptr: i32,
    key_len: i32,
    out_ptr_addr: i32,
    out_len_addr: i32,
) -> Result<Status, HostCallError> {
    let exports = exports(caller)?;
    let memory = GuestMemory::new(exports.memory);

    let key = memory.read_string(&*caller, key_ptr, key_len)?;
    let event = caller.data().event().ok_or(HostCallError::NoEventBound)?;
    let Some(value) = event.get_field(&key) else {
        trace!(key = %key, "Field not found");
        return Ok(Status::NotFound);
    };

    let payload = value.to_json().map_err(HostCallError::Serialization)?;

    memory.check(&*caller, out_ptr_addr, OUT_PARAM_SIZE)?;
    memory.check(&*caller, out_len_addr, OUT_PARAM_SIZE)?;

    let size = guest_length(payload.len())
        .ok_or_else(|| HostCallError::allocation(payload.len(), "payload exceeds guest address space"))?;
    let address = exports
        .malloc
        .call(&mut *caller, size)
        .map_err(|e| HostCallError::allocation(payload.len(), format!("guest malloc failed: {e:#}")))?;

    // The allocator is guest code; its result gets no more trust than any
    // other guest pointer
    memory.write(&mut *caller, address, &payload).map_err(|_| {
        HostCallError::allocation(
            payload.len(),
            format!("guest malloc returned an unusable region at {}", guest_u32(address)),
        )
    })?;

    memory.write_u32(&mut *caller, out_ptr_addr, guest_u32(address))?;
    memory.write_u32(&mut *caller, out_len_addr, guest_u32(size))?;

    trace!(key = %key, length = payload.len(), "Field read");
    Ok(Status::Ok)
}

/// Decode a JSON value from guest memory and store it on the bound event.
pub fn put_field<E: Event>(
    caller: &mut Caller<'_, SessionContext<E>>,
    key_ptr: i32,
    key_len: i32,
    value_ptr: i32,
    value_len: i32,
) -> Result<Status, HostCallError> {
    let memory = GuestMemory::new(exports(caller)?.memory);

    let key = memory.read_string(&*caller, key_ptr, key_len)?;
    let bytes = memory.read(&*caller, value_ptr, value_len)?;
    let value = Value::from_json(&bytes).map_err(HostCallError::Deserialization)?;

    caller
        .data_mut()
        .event_mut()
        .ok_or(HostCallError::NoEventBound)?
        .put_field(&key, value);

    trace!(key = %key, "Field written");
    Ok(Status::Ok)
}

/// Emit a guest log message.
///
/// Always returns [`Status::Ok`]. A message that cannot be read is reported
/// as a host warning and otherwise ignored.
pub fn log<E: Event>(
    caller: &mut Caller<'_, SessionContext<E>>,
    level: i32,
    msg_ptr: i32,
    msg_len: i32,
) -> Status {
    let session_id = caller.data().session_id();

    let bytes = exports(caller)
        .and_then(|exports| GuestMemory::new(exports.memory).read(&*caller, msg_ptr, msg_len));

    match bytes {
        Ok(bytes) => {
            let message = String::from_utf8_lossy(&bytes);
            LoggingHost::log(session_id, level_from_i32(level), &message);
        }
        Err(err) => {
            warn!(session_id, level, error = %err, "Dropped unreadable guest log message");
        }
    }

    Status::Ok
}

/// Write the host's current time, in nanoseconds, at `out_addr` as a
/// little-endian `i64`.
pub fn get_current_time_nanoseconds<E: Event>(
    caller: &mut Caller<'_, SessionContext<E>>,
    out_addr: i32,
) -> Result<Status, HostCallError> {
    let memory = GuestMemory::new(exports(caller)?.memory);
    let now = caller.data().host().current_time_nanos();

    memory.write_i64(&mut *caller, out_addr, now)?;
    Ok(Status::Ok)
}

/// Flatten a host function result into the `i32` status returned to the
/// guest, logging failures.
pub fn into_status_code(
    session_id: &str,
    function: &str,
    result: Result<Status, HostCallError>,
) -> i32 {
    match result {
        Ok(status) => status.code(),
        Err(err) => {
            let status = err.status();
            warn!(
                session_id,
                function,
                status = %status,
                error = %err,
                "Host call failed"
            );
            status.code()
        }
    }
}
