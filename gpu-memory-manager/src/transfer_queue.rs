use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

use crate::device::{DeviceBuffer, DeviceSlice};
use crate::error::{DeviceError, Result};
use crate::host::HostBuffer;

/// One device-to-host copy that has been issued but not yet joined.
///
/// Holds a handle to the source allocation and to the destination so that
/// neither can be freed while the copy is in flight.
#[derive(Debug)]
pub struct TransferRequest {
    pub src: DeviceBuffer,
    pub src_offset: usize,
    pub len: usize,
    pub dst: HostBuffer,
}

impl TransferRequest {
    pub fn new(src: DeviceSlice<'_>, dst: &HostBuffer) -> Result<Self> {
        if src.len() > dst.len() {
            return Err(DeviceError::out_of_bounds(0, src.len(), dst.len()));
        }
        Ok(Self {
            src: src.buffer().clone(),
            src_offset: src.offset(),
            len: src.len(),
            dst: dst.clone(),
        })
    }
}

/// Ordered queue of in-flight device-to-host transfers for one stream.
///
/// The depth is bounded; submitting past it fails instead of blocking.
#[derive(Debug)]
pub struct TransferQueue {
    stream_id: usize,
    queue: Mutex<VecDeque<TransferRequest>>,
    max_in_flight: usize,
}

impl TransferQueue {
    pub fn new(stream_id: usize, max_in_flight: usize) -> Self {
        Self {
            stream_id,
            queue: Mutex::new(VecDeque::new()),
            max_in_flight,
        }
    }

    pub fn stream_id(&self) -> usize {
        self.stream_id
    }

    /// Record an issued transfer.
    pub fn enqueue(&self, request: TransferRequest) -> Result<()> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.max_in_flight {
            return Err(DeviceError::Transfer {
                stream: self.stream_id,
                reason: format!("transfer queue full ({} in flight)", queue.len()),
            });
        }
        debug!(
            "DtoH transfer: {} bytes on stream {} ({} queued)",
            request.len,
            self.stream_id,
            queue.len() + 1
        );
        queue.push_back(request);
        Ok(())
    }

    /// Remove every queued transfer, oldest first.
    pub fn drain(&self) -> Vec<TransferRequest> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceAllocation;
    use std::any::Any;

    #[derive(Debug)]
    struct Bytes(usize);

    impl DeviceAllocation for Bytes {
        fn len(&self) -> usize {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn queue_preserves_issue_order() {
        let src = DeviceBuffer::new(Bytes(8));
        let queue = TransferQueue::new(3, 4);
        for offset in 0..3 {
            let dst = HostBuffer::zeroed(2);
            let request = TransferRequest::new(src.slice(offset, 2).unwrap(), &dst).unwrap();
            queue.enqueue(request).unwrap();
        }
        assert_eq!(queue.len(), 3);
        let offsets: Vec<_> = queue.drain().iter().map(|r| r.src_offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_rejects_submission() {
        let src = DeviceBuffer::new(Bytes(4));
        let queue = TransferQueue::new(0, 1);
        let dst = HostBuffer::zeroed(4);
        queue
            .enqueue(TransferRequest::new(src.as_slice(), &dst).unwrap())
            .unwrap();
        let err = queue
            .enqueue(TransferRequest::new(src.as_slice(), &dst).unwrap())
            .unwrap_err();
        assert!(matches!(err, DeviceError::Transfer { stream: 0, .. }));
    }

    #[test]
    fn destination_must_fit_source() {
        let src = DeviceBuffer::new(Bytes(4));
        let dst = HostBuffer::zeroed(3);
        assert!(TransferRequest::new(src.as_slice(), &dst).is_err());
    }
}
