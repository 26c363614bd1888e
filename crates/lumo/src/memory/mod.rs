//! Linear memory access for the codec.
//!
//! The codec only needs three things from a guest: its bytes, mutable bytes,
//! and the exported allocator. [`WasmMemory`] provides them from a live
//! instance; [`LinearBuffer`] provides them in-process for marshaling without
//! a guest.

use wasmtime::{AsContextMut, Memory, TypedFunc};

use crate::error::{Error, Result};

/// Byte-addressable memory plus a monotonic allocator.
///
/// Allocations are never released: memory grows for the lifetime of the
/// instance.
pub trait GuestMemory {
    fn data(&self) -> &[u8];
    fn data_mut(&mut self) -> &mut [u8];
    /// Reserve `size` bytes and return the base address.
    fn alloc(&mut self, size: u32) -> Result<u32>;

    /// Read the 4-byte slot at `address`.
    fn read_slot(&self, address: i64) -> Result<[u8; 4]> {
        let start = checked_start(address)?;
        let bytes = self
            .data()
            .get(start..start + 4)
            .ok_or_else(|| Error::layout(address, "slot past end of memory"))?;
        let mut slot = [0u8; 4];
        slot.copy_from_slice(bytes);
        Ok(slot)
    }

    fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<()> {
        let start = address as usize;
        let target = self
            .data_mut()
            .get_mut(start..start + bytes.len())
            .ok_or_else(|| Error::layout(address, "write past end of memory"))?;
        target.copy_from_slice(bytes);
        Ok(())
    }

    /// Bytes from `address` up to, not including, the first zero byte.
    fn read_cstr(&self, address: i64) -> Result<&[u8]> {
        let start = checked_start(address)?;
        let tail = self
            .data()
            .get(start..)
            .ok_or_else(|| Error::layout(address, "string starts past end of memory"))?;
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::layout(address, "unterminated string"))?;
        Ok(&tail[..len])
    }
}

fn checked_start(address: i64) -> Result<usize> {
    usize::try_from(address).map_err(|_| Error::layout(address, "negative address"))
}

/// Handle to the live guest instance that libraries are bound to.
#[derive(Clone)]
pub struct InstanceHandle {
    pub memory: Memory,
    pub malloc: TypedFunc<i32, i32>,
}

/// Guest memory reached through an engine store context.
pub struct WasmMemory<C> {
    ctx: C,
    handle: InstanceHandle,
}

impl<C: AsContextMut> WasmMemory<C> {
    pub fn new(ctx: C, handle: InstanceHandle) -> Self {
        WasmMemory { ctx, handle }
    }
}

impl<C> GuestMemory for WasmMemory<C>
where
    C: AsContextMut,
    C::Data: 'static,
{
    fn data(&self) -> &[u8] {
        self.handle.memory.data(&self.ctx)
    }

    fn data_mut(&mut self) -> &mut [u8] {
        self.handle.memory.data_mut(self.ctx.as_context_mut())
    }

    fn alloc(&mut self, size: u32) -> Result<u32> {
        let size = i32::try_from(size)
            .map_err(|_| Error::layout(size as i64, "allocation larger than address space"))?;
        let address = self
            .handle
            .malloc
            .call(self.ctx.as_context_mut(), size)
            .map_err(Error::from_trap)?;
        u32::try_from(address).map_err(|_| Error::layout(address, "malloc returned a negative address"))
    }
}

/// In-process linear memory with a bump allocator.
#[derive(Debug, Clone)]
pub struct LinearBuffer {
    bytes: Vec<u8>,
    next: u32,
}

impl LinearBuffer {
    /// An empty buffer whose first allocation starts at `base`.
    pub fn new(base: u32) -> Self {
        LinearBuffer {
            bytes: vec![0; base as usize],
            next: base,
        }
    }

    /// Address the next allocation will return.
    pub fn next_address(&self) -> u32 {
        self.next
    }
}

impl Default for LinearBuffer {
    fn default() -> Self {
        // Keep address 0 unused so a zero pointer is never a valid block.
        LinearBuffer::new(8)
    }
}

impl GuestMemory for LinearBuffer {
    fn data(&self) -> &[u8] {
        &self.bytes
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn alloc(&mut self, size: u32) -> Result<u32> {
        let address = self.next;
        let end = address
            .checked_add(size)
            .ok_or_else(|| Error::layout(address, "allocation overflows address space"))?;
        if end as usize > self.bytes.len() {
            self.bytes.resize(end as usize, 0);
        }
        self.next = end;
        Ok(address)
    }
}

/// Memory for a library that has not been bound to an instance yet.
pub struct Detached<'a> {
    pub module: &'a str,
}

impl GuestMemory for Detached<'_> {
    fn data(&self) -> &[u8] {
        &[]
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut []
    }

    fn alloc(&mut self, _size: u32) -> Result<u32> {
        Err(Error::Unbound {
            module: self.module.to_string(),
        })
    }

    fn read_slot(&self, _address: i64) -> Result<[u8; 4]> {
        Err(Error::Unbound {
            module: self.module.to_string(),
        })
    }

    fn read_cstr(&self, _address: i64) -> Result<&[u8]> {
        Err(Error::Unbound {
            module: self.module.to_string(),
        })
    }
}
