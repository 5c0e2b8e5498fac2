//! Device memory and device-to-host transfer plumbing.
//!
//! Device memory is reached through the [`Device`] trait; the default backend
//! is [`SimDevice`], which keeps everything in host memory. The `cuda` feature
//! adds a `cudarc` backend.

pub mod device;
pub mod error;
pub mod host;
pub mod sim;
pub mod transfer_queue;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use device::{Device, DeviceAllocation, DeviceBuffer, DeviceSlice, DeviceStream};
pub use error::{DeviceError, Result};
pub use host::{BoundedAllocator, HostAllocator, HostBuffer, SystemAllocator};
pub use sim::{SimDevice, SimDeviceConfig};
pub use transfer_queue::{TransferQueue, TransferRequest};

#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;
