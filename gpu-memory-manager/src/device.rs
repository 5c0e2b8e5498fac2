//! Backend-neutral handles to device memory and execution streams.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{DeviceError, Result};
use crate::host::HostBuffer;

/// One owned allocation in device memory.
pub trait DeviceAllocation: Send + Sync + fmt::Debug {
    /// Length in bytes.
    fn len(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a device allocation. Cloning never copies device memory;
/// the allocation is released when the last handle is dropped.
#[derive(Clone, Debug)]
pub struct DeviceBuffer {
    inner: Arc<dyn DeviceAllocation>,
}

impl DeviceBuffer {
    pub fn new<A: DeviceAllocation + 'static>(allocation: A) -> Self {
        Self {
            inner: Arc::new(allocation),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the whole allocation.
    pub fn as_slice(&self) -> DeviceSlice<'_> {
        DeviceSlice {
            buffer: self,
            offset: 0,
            len: self.len(),
        }
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<DeviceSlice<'_>> {
        self.as_slice().subslice(offset, len)
    }

    /// Access the backend-specific allocation.
    pub fn downcast<A: DeviceAllocation + 'static>(&self) -> Option<&A> {
        self.inner.as_any().downcast_ref::<A>()
    }

    pub fn ptr_eq(&self, other: &DeviceBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A borrowed, bounds-checked byte range of a [`DeviceBuffer`].
#[derive(Clone, Copy, Debug)]
pub struct DeviceSlice<'a> {
    buffer: &'a DeviceBuffer,
    offset: usize,
    len: usize,
}

impl<'a> DeviceSlice<'a> {
    pub fn buffer(&self) -> &'a DeviceBuffer {
        self.buffer
    }

    /// Byte offset into the underlying allocation.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Narrow to `len` bytes starting `offset` bytes into this slice.
    pub fn subslice(&self, offset: usize, len: usize) -> Result<DeviceSlice<'a>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(DeviceSlice {
                buffer: self.buffer,
                offset: self.offset + offset,
                len,
            }),
            _ => Err(DeviceError::out_of_bounds(offset, len, self.len)),
        }
    }
}

/// A device that owns memory and hands out execution streams.
pub trait Device: Send + Sync + fmt::Debug {
    fn name(&self) -> String;

    /// Allocate `len` zero-filled bytes.
    fn allocate(&self, len: usize) -> Result<DeviceBuffer>;

    /// Copy host bytes into a fresh allocation, blocking until done.
    fn upload(&self, bytes: &[u8]) -> Result<DeviceBuffer>;

    /// Read device bytes back to the host, blocking until done.
    fn download(&self, src: DeviceSlice<'_>) -> Result<Vec<u8>>;

    /// Copy a device range into a fresh allocation.
    fn copy_within_device(&self, src: DeviceSlice<'_>) -> Result<DeviceBuffer>;

    fn create_stream(&self) -> Result<Arc<dyn DeviceStream>>;
}

/// An ordered execution stream for device-to-host transfers.
///
/// Transfers run in issue order relative to each other. Nothing written into a
/// destination [`HostBuffer`] may be read until [`DeviceStream::synchronize`]
/// has returned.
pub trait DeviceStream: Send + Sync + fmt::Debug {
    fn id(&self) -> usize;

    /// Issue a non-blocking copy of `src` into the front of `dst`.
    ///
    /// The stream keeps `src`'s allocation and `dst` alive until the copy has
    /// completed.
    fn copy_to_host_async(&self, src: DeviceSlice<'_>, dst: &HostBuffer) -> Result<()>;

    /// Block until every transfer issued so far has completed.
    fn synchronize(&self) -> Result<()>;

    /// Transfers issued but not yet known to be complete.
    fn pending_transfers(&self) -> usize;
}
