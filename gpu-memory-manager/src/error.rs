//! Errors raised by device allocation and device-to-host transfers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeviceError>;

#[derive(Error, Debug)]
pub enum DeviceError {
    /// A device or host allocation could not be satisfied.
    #[error("failed to allocate {requested} bytes ({available} bytes available)")]
    Allocation { requested: usize, available: usize },

    /// A transfer could not be submitted to, or completed by, a stream.
    #[error("transfer failed on stream {stream}: {reason}")]
    Transfer { stream: usize, reason: String },

    #[error("range {offset}..{end} is out of bounds for a buffer of {len} bytes")]
    OutOfBounds { offset: usize, end: usize, len: usize },

    /// The allocation belongs to a different device backend than the one asked to use it.
    #[error("allocation does not belong to device '{device}'")]
    ForeignAllocation { device: String },

    /// A host buffer was frozen while a transfer still targets it.
    #[error("host buffer still has a transfer in flight")]
    TransferPending,

    #[error("driver error: {0}")]
    Driver(String),
}

impl DeviceError {
    pub fn out_of_bounds(offset: usize, len: usize, buffer_len: usize) -> Self {
        DeviceError::OutOfBounds {
            offset,
            end: offset.saturating_add(len),
            len: buffer_len,
        }
    }
}
