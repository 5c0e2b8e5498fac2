//! Host-side destination buffers for device-to-host transfers.

use arrow_buffer::{Buffer, MutableBuffer};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::error::{DeviceError, Result};

/// An owned host byte region that a stream copies device bytes into.
///
/// Cloning shares the region: a stream keeps a clone for every transfer it has
/// not completed yet. The contents are only meaningful after the stream that
/// targets the buffer has been synchronized, which is why the bytes can only be
/// read by freezing the buffer with [`HostBuffer::into_buffer`].
#[derive(Clone)]
pub struct HostBuffer {
    bytes: Arc<Mutex<MutableBuffer>>,
    len: usize,
}

impl HostBuffer {
    /// Allocate a zero-filled buffer of `len` bytes (64-byte aligned).
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(MutableBuffer::from_len_zeroed(len))),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `src` into the buffer starting at `offset`.
    pub fn write_at(&self, offset: usize, src: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(src.len())
            .filter(|&end| end <= self.len)
            .ok_or_else(|| DeviceError::out_of_bounds(offset, src.len(), self.len))?;
        let mut bytes = self.bytes.lock();
        bytes.as_slice_mut()[offset..end].copy_from_slice(src);
        Ok(())
    }

    /// Run `f` over the raw bytes while holding the buffer lock.
    ///
    /// Backends that hand the destination pointer to a driver use this; the
    /// pointer stays valid until the last clone is dropped.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut bytes = self.bytes.lock();
        f(bytes.as_slice_mut())
    }

    /// Number of handles sharing this buffer, including `self`.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.bytes)
    }

    /// Freeze into an immutable Arrow buffer.
    ///
    /// Fails with [`DeviceError::TransferPending`] while a stream still holds
    /// the buffer as the destination of an incomplete transfer.
    pub fn into_buffer(self) -> Result<Buffer> {
        let bytes = Arc::try_unwrap(self.bytes).map_err(|_| DeviceError::TransferPending)?;
        Ok(bytes.into_inner().into())
    }
}

impl fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuffer")
            .field("len", &self.len)
            .field("handles", &self.handle_count())
            .finish()
    }
}

/// Allocator for the host buffers an export writes into.
pub trait HostAllocator: Send + Sync + fmt::Debug {
    fn allocate(&self, len: usize) -> Result<HostBuffer>;
}

/// Allocates from the global allocator without limit.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl HostAllocator for SystemAllocator {
    fn allocate(&self, len: usize) -> Result<HostBuffer> {
        Ok(HostBuffer::zeroed(len))
    }
}

/// Hands out at most `budget` bytes over its lifetime.
#[derive(Debug)]
pub struct BoundedAllocator {
    remaining: Mutex<usize>,
}

impl BoundedAllocator {
    pub fn new(budget: usize) -> Self {
        Self {
            remaining: Mutex::new(budget),
        }
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.lock()
    }
}

impl HostAllocator for BoundedAllocator {
    fn allocate(&self, len: usize) -> Result<HostBuffer> {
        let mut remaining = self.remaining.lock();
        if len > *remaining {
            return Err(DeviceError::Allocation {
                requested: len,
                available: *remaining,
            });
        }
        *remaining -= len;
        Ok(HostBuffer::zeroed(len))
    }
}
