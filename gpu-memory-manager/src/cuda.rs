//! CUDA backend built on `cudarc`.

use cudarc::driver::{result, CudaDevice, CudaSlice, CudaStream, DevicePtr, DriverError};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::device::{Device, DeviceAllocation, DeviceBuffer, DeviceSlice, DeviceStream};
use crate::error::{DeviceError, Result};
use crate::host::HostBuffer;
use crate::transfer_queue::{TransferQueue, TransferRequest};

fn driver(err: DriverError) -> DeviceError {
    DeviceError::Driver(err.to_string())
}

pub struct CudaAllocation {
    slice: CudaSlice<u8>,
}

impl fmt::Debug for CudaAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaAllocation")
            .field("len", &self.slice.len())
            .finish()
    }
}

impl DeviceAllocation for CudaAllocation {
    fn len(&self) -> usize {
        self.slice.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A CUDA device addressed by ordinal.
pub struct CudaBackend {
    device: Arc<CudaDevice>,
    max_in_flight_transfers: usize,
    next_stream: AtomicUsize,
}

impl fmt::Debug for CudaBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaBackend")
            .field("ordinal", &self.device.ordinal())
            .finish()
    }
}

impl CudaBackend {
    pub fn new(ordinal: usize, max_in_flight_transfers: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal).map_err(driver)?;
        info!("Opened CUDA device {}", ordinal);
        Ok(Self {
            device,
            max_in_flight_transfers,
            next_stream: AtomicUsize::new(0),
        })
    }

    fn allocation<'a>(&self, src: &DeviceSlice<'a>) -> Result<&'a CudaAllocation> {
        src.buffer()
            .downcast::<CudaAllocation>()
            .ok_or_else(|| DeviceError::ForeignAllocation { device: self.name() })
    }

    fn alloc_zeros(&self, len: usize) -> Result<CudaSlice<u8>> {
        self.device.alloc_zeros::<u8>(len).map_err(|_| DeviceError::Allocation {
            requested: len,
            available: 0,
        })
    }
}

impl Device for CudaBackend {
    fn name(&self) -> String {
        format!("cuda:{}", self.device.ordinal())
    }

    fn allocate(&self, len: usize) -> Result<DeviceBuffer> {
        Ok(DeviceBuffer::new(CudaAllocation {
            slice: self.alloc_zeros(len)?,
        }))
    }

    fn upload(&self, bytes: &[u8]) -> Result<DeviceBuffer> {
        let slice = self.device.htod_sync_copy(bytes).map_err(driver)?;
        Ok(DeviceBuffer::new(CudaAllocation { slice }))
    }

    fn download(&self, src: DeviceSlice<'_>) -> Result<Vec<u8>> {
        let allocation = self.allocation(&src)?;
        let view = allocation.slice.slice(src.offset()..src.offset() + src.len());
        let mut out = vec![0u8; src.len()];
        self.device
            .dtoh_sync_copy_into(&view, &mut out)
            .map_err(driver)?;
        Ok(out)
    }

    fn copy_within_device(&self, src: DeviceSlice<'_>) -> Result<DeviceBuffer> {
        let allocation = self.allocation(&src)?;
        let view = allocation.slice.slice(src.offset()..src.offset() + src.len());
        let mut dst = self.alloc_zeros(src.len())?;
        self.device.dtod_copy(&view, &mut dst).map_err(driver)?;
        debug!("DtoD copy: {} bytes", src.len());
        Ok(DeviceBuffer::new(CudaAllocation { slice: dst }))
    }

    fn create_stream(&self) -> Result<Arc<dyn DeviceStream>> {
        let stream = self
            .device
            .fork_default_stream()
            .map_err(driver)?;
        let id = self.next_stream.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(CudaExportStream {
            stream,
            queue: TransferQueue::new(id, self.max_in_flight_transfers),
        }))
    }
}

/// A forked CUDA stream. Issued copies stay in the queue, holding their
/// source allocation and destination buffer, until the stream is synchronized.
pub struct CudaExportStream {
    stream: CudaStream,
    queue: TransferQueue,
}

impl fmt::Debug for CudaExportStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaExportStream")
            .field("queue", &self.queue)
            .finish()
    }
}

impl DeviceStream for CudaExportStream {
    fn id(&self) -> usize {
        self.queue.stream_id()
    }

    fn copy_to_host_async(&self, src: DeviceSlice<'_>, dst: &HostBuffer) -> Result<()> {
        let allocation = src
            .buffer()
            .downcast::<CudaAllocation>()
            .ok_or_else(|| DeviceError::Transfer {
                stream: self.id(),
                reason: "source is not a CUDA allocation".to_string(),
            })?;
        let src_ptr = *allocation.slice.device_ptr() + src.offset() as u64;
        self.queue.enqueue(TransferRequest::new(src, dst)?)?;
        dst.with_bytes_mut(|bytes| {
            // SAFETY: the queued request keeps both the device allocation and
            // the host buffer alive until `synchronize` drains it.
            unsafe { result::memcpy_dtoh_async(&mut bytes[..src.len()], src_ptr, self.stream.stream) }
        })
        .map_err(|err| DeviceError::Transfer {
            stream: self.id(),
            reason: err.to_string(),
        })
    }

    fn synchronize(&self) -> Result<()> {
        unsafe { result::stream::synchronize(self.stream.stream) }.map_err(driver)?;
        let completed = self.queue.drain();
        debug!(
            "Synchronized stream {}: {} transfers",
            self.id(),
            completed.len()
        );
        Ok(())
    }

    fn pending_transfers(&self) -> usize {
        self.queue.len()
    }
}
