//! Bounds-checked access to guest linear memory.
//!
//! Every pointer and length a guest hands to a host function goes through
//! [`checked_range`] before any byte is touched. A range that does not fit in
//! the guest's current memory is reported as
//! [`HostCallError::MemoryAccess`]; it never panics the host.

use std::ops::Range;

use wasmtime::{AsContext, AsContextMut, Memory};

use ingest_wasm_common::HostCallError;

/// Validate a guest `(address, length)` pair against the memory size.
///
/// Wasm32 pointers are unsigned, so both values are read as `u32`: a guest
/// address above 2 GiB arrives as a negative `i32` and is still valid when it
/// fits. Ranges whose end exceeds `memory_size` are rejected.
pub fn checked_range(
    address: i32,
    length: i32,
    memory_size: usize,
) -> Result<Range<usize>, HostCallError> {
    let start = guest_u32(address);
    let len = guest_u32(length);
    let out_of_bounds = || HostCallError::memory_access(start, len, memory_size);

    let start_index = usize::try_from(start).map_err(|_| out_of_bounds())?;
    let len_index = usize::try_from(len).map_err(|_| out_of_bounds())?;
    let end = start_index.checked_add(len_index).ok_or_else(out_of_bounds)?;

    if end > memory_size {
        return Err(out_of_bounds());
    }
    Ok(start_index..end)
}

/// Reinterpret an `i32` ABI value as the unsigned wasm32 quantity it carries.
pub(crate) fn guest_u32(value: i32) -> u32 {
    u32::from_ne_bytes(value.to_ne_bytes())
}

/// Convert a host-side length into the `i32` the ABI carries.
pub(crate) fn guest_length(length: usize) -> Option<i32> {
    u32::try_from(length)
        .ok()
        .map(|len| i32::from_ne_bytes(len.to_ne_bytes()))
}

/// A guest's exported linear memory.
#[derive(Debug, Clone, Copy)]
pub struct GuestMemory {
    memory: Memory,
}

impl GuestMemory {
    /// Wrap a guest memory export.
    pub fn new(memory: Memory) -> Self {
        Self { memory }
    }

    /// Current size of the memory in bytes.
    pub fn size<S: AsContext>(&self, store: &S) -> usize {
        self.memory.data_size(store.as_context())
    }

    /// Copy `length` bytes starting at `address` out of guest memory.
    pub fn read<S: AsContext>(
        &self,
        store: &S,
        address: i32,
        length: i32,
    ) -> Result<Vec<u8>, HostCallError> {
        let data = self.memory.data(store.as_context());
        let range = checked_range(address, length, data.len())?;
        Ok(data[range].to_vec())
    }

    /// Read a UTF-8 string out of guest memory.
    pub fn read_string<S: AsContext>(
        &self,
        store: &S,
        address: i32,
        length: i32,
    ) -> Result<String, HostCallError> {
        let bytes = self.read(store, address, length)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Check that `length` bytes at `address` are addressable without
    /// touching them.
    pub fn check<S: AsContext>(
        &self,
        store: &S,
        address: i32,
        length: usize,
    ) -> Result<(), HostCallError> {
        let size = self.size(store);
        let length = guest_length(length)
            .ok_or_else(|| HostCallError::memory_access(guest_u32(address), i64::MAX, size))?;
        checked_range(address, length, size).map(|_| ())
    }

    /// Copy `bytes` into guest memory at `address`.
    pub fn write<S: AsContextMut>(
        &self,
        store: &mut S,
        address: i32,
        bytes: &[u8],
    ) -> Result<(), HostCallError> {
        let data = self.memory.data_mut(store.as_context_mut());
        let size = data.len();
        let length = guest_length(bytes.len())
            .ok_or_else(|| HostCallError::memory_access(guest_u32(address), i64::MAX, size))?;
        let range = checked_range(address, length, size)?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Write a little-endian `u32` at `address`.
    pub fn write_u32<S: AsContextMut>(
        &self,
        store: &mut S,
        address: i32,
        value: u32,
    ) -> Result<(), HostCallError> {
        self.write(store, address, &value.to_le_bytes())
    }

    /// Write a little-endian `i64` at `address`.
    pub fn write_i64<S: AsContextMut>(
        &self,
        store: &mut S,
        address: i32,
        value: i64,
    ) -> Result<(), HostCallError> {
        self.write(store, address, &value.to_le_bytes())
    }
}
