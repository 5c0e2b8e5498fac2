//! Host-backed device used when no accelerator is present.
//!
//! Memory lives in ordinary host allocations, but the device keeps the
//! semantics the export path depends on: allocations are accounted against a
//! memory limit, and stream copies are only carried out when the stream is
//! synchronized, so a destination buffer really is unpopulated until the join.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::device::{Device, DeviceAllocation, DeviceBuffer, DeviceSlice, DeviceStream};
use crate::error::{DeviceError, Result};
use crate::host::HostBuffer;
use crate::transfer_queue::{TransferQueue, TransferRequest};

#[derive(Debug, Clone)]
pub struct SimDeviceConfig {
    /// Maximum device memory that may be allocated at once (bytes)
    pub memory_limit: usize,
    /// Maximum transfers a stream accepts before it must be synchronized
    pub max_in_flight_transfers: usize,
}

impl Default for SimDeviceConfig {
    fn default() -> Self {
        Self {
            memory_limit: 8 * 1024 * 1024 * 1024, // 8GB
            max_in_flight_transfers: 1024,
        }
    }
}

#[derive(Debug)]
pub struct SimDevice {
    config: SimDeviceConfig,
    in_use: Arc<AtomicUsize>,
    next_stream: AtomicUsize,
}

#[derive(Debug)]
struct SimAllocation {
    bytes: Box<[u8]>,
    in_use: Arc<AtomicUsize>,
}

impl DeviceAllocation for SimAllocation {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for SimAllocation {
    fn drop(&mut self) {
        self.in_use.fetch_sub(self.bytes.len(), Ordering::SeqCst);
    }
}

impl SimDevice {
    pub fn new(config: SimDeviceConfig) -> Self {
        info!(
            "Initializing simulated device (limit {} bytes, {} transfers per stream)",
            config.memory_limit, config.max_in_flight_transfers
        );
        Self {
            config,
            in_use: Arc::new(AtomicUsize::new(0)),
            next_stream: AtomicUsize::new(0),
        }
    }

    /// Bytes currently held by live allocations.
    pub fn bytes_in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    fn reserve(&self, len: usize) -> Result<()> {
        let mut current = self.in_use.load(Ordering::SeqCst);
        loop {
            let available = self.config.memory_limit.saturating_sub(current);
            if len > available {
                return Err(DeviceError::Allocation {
                    requested: len,
                    available,
                });
            }
            match self.in_use.compare_exchange(
                current,
                current + len,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn wrap(&self, bytes: Box<[u8]>) -> Result<DeviceBuffer> {
        self.reserve(bytes.len())?;
        Ok(DeviceBuffer::new(SimAllocation {
            bytes,
            in_use: Arc::clone(&self.in_use),
        }))
    }

    fn bytes_of<'a>(&self, src: &DeviceSlice<'a>) -> Result<&'a [u8]> {
        let allocation = src
            .buffer()
            .downcast::<SimAllocation>()
            .ok_or_else(|| DeviceError::ForeignAllocation { device: self.name() })?;
        Ok(&allocation.bytes[src.offset()..src.offset() + src.len()])
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new(SimDeviceConfig::default())
    }
}

impl Device for SimDevice {
    fn name(&self) -> String {
        "sim".to_string()
    }

    fn allocate(&self, len: usize) -> Result<DeviceBuffer> {
        self.wrap(vec![0u8; len].into_boxed_slice())
    }

    fn upload(&self, bytes: &[u8]) -> Result<DeviceBuffer> {
        self.wrap(bytes.into())
    }

    fn download(&self, src: DeviceSlice<'_>) -> Result<Vec<u8>> {
        Ok(self.bytes_of(&src)?.to_vec())
    }

    fn copy_within_device(&self, src: DeviceSlice<'_>) -> Result<DeviceBuffer> {
        let bytes: Box<[u8]> = self.bytes_of(&src)?.into();
        debug!("DtoD copy: {} bytes", bytes.len());
        self.wrap(bytes)
    }

    fn create_stream(&self) -> Result<Arc<dyn DeviceStream>> {
        let id = self.next_stream.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(SimStream {
            queue: TransferQueue::new(id, self.config.max_in_flight_transfers),
        }))
    }
}

/// Stream of a [`SimDevice`]: copies are deferred until `synchronize`.
#[derive(Debug)]
pub struct SimStream {
    queue: TransferQueue,
}

impl SimStream {
    fn execute(&self, request: &TransferRequest) -> Result<()> {
        let allocation = request
            .src
            .downcast::<SimAllocation>()
            .ok_or_else(|| DeviceError::Transfer {
                stream: self.queue.stream_id(),
                reason: "source is not a simulated allocation".to_string(),
            })?;
        let src = &allocation.bytes[request.src_offset..request.src_offset + request.len];
        request.dst.write_at(0, src)
    }
}

impl DeviceStream for SimStream {
    fn id(&self) -> usize {
        self.queue.stream_id()
    }

    fn copy_to_host_async(&self, src: DeviceSlice<'_>, dst: &HostBuffer) -> Result<()> {
        if src.buffer().downcast::<SimAllocation>().is_none() {
            return Err(DeviceError::Transfer {
                stream: self.id(),
                reason: "source is not a simulated allocation".to_string(),
            });
        }
        self.queue.enqueue(TransferRequest::new(src, dst)?)
    }

    fn synchronize(&self) -> Result<()> {
        let requests = self.queue.drain();
        debug!(
            "Synchronizing stream {}: {} transfers",
            self.queue.stream_id(),
            requests.len()
        );
        for request in &requests {
            self.execute(request)?;
        }
        Ok(())
    }

    fn pending_transfers(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_land_only_after_synchronize() {
        let device = SimDevice::default();
        let src = device.upload(&[1, 2, 3, 4]).unwrap();
        let stream = device.create_stream().unwrap();
        let dst = HostBuffer::zeroed(2);

        stream
            .copy_to_host_async(src.slice(1, 2).unwrap(), &dst)
            .unwrap();
        assert_eq!(stream.pending_transfers(), 1);
        dst.with_bytes_mut(|bytes| assert_eq!(bytes, &[0, 0]));

        stream.synchronize().unwrap();
        assert_eq!(stream.pending_transfers(), 0);
        assert_eq!(dst.into_buffer().unwrap().as_slice(), &[2, 3]);
    }

    #[test]
    fn in_flight_transfer_keeps_source_alive() {
        let device = SimDevice::default();
        let stream = device.create_stream().unwrap();
        let dst = HostBuffer::zeroed(3);
        {
            let temporary = device.upload(&[9, 9, 9]).unwrap();
            stream
                .copy_to_host_async(temporary.as_slice(), &dst)
                .unwrap();
        }
        assert_eq!(device.bytes_in_use(), 3);
        stream.synchronize().unwrap();
        assert_eq!(device.bytes_in_use(), 0);
        assert_eq!(dst.into_buffer().unwrap().as_slice(), &[9, 9, 9]);
    }

    #[test]
    fn memory_limit_is_enforced() {
        let device = SimDevice::new(SimDeviceConfig {
            memory_limit: 10,
            ..Default::default()
        });
        let _held = device.allocate(8).unwrap();
        let err = device.allocate(4).unwrap_err();
        assert!(matches!(err, DeviceError::Allocation { requested: 4, available: 2 }));
    }

    #[test]
    fn device_copy_is_independent() {
        let device = SimDevice::default();
        let src = device.upload(&[5, 6, 7]).unwrap();
        let copy = device.copy_within_device(src.slice(1, 2).unwrap()).unwrap();
        assert!(!copy.ptr_eq(&src));
        assert_eq!(device.download(copy.as_slice()).unwrap(), vec![6, 7]);
    }

    #[test]
    fn streams_get_distinct_ids() {
        let device = SimDevice::default();
        let a = device.create_stream().unwrap();
        let b = device.create_stream().unwrap();
        assert_ne!(a.id(), b.id());
    }
}
