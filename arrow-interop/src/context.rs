use gpu_memory_manager::{Device, DeviceStream, HostAllocator, SystemAllocator};
use std::sync::Arc;

use crate::config::ExportConfig;
use crate::error::Result;

static SYSTEM_ALLOCATOR: SystemAllocator = SystemAllocator;

/// Everything one conversion call needs: the device the columns live on, the
/// stream every transfer is issued on, and the host allocator for the results.
#[derive(Debug, Clone)]
pub struct ExportContext<'d> {
    device: &'d dyn Device,
    host: &'d dyn HostAllocator,
    stream: Arc<dyn DeviceStream>,
    config: ExportConfig,
}

impl<'d> ExportContext<'d> {
    /// Context on a fresh stream of `device`, allocating from the system allocator.
    pub fn new(device: &'d dyn Device) -> Result<Self> {
        Ok(Self::with_stream(device, device.create_stream()?))
    }

    /// Context that issues its transfers on a caller-supplied stream.
    pub fn with_stream(device: &'d dyn Device, stream: Arc<dyn DeviceStream>) -> Self {
        Self {
            device,
            host: &SYSTEM_ALLOCATOR,
            stream,
            config: ExportConfig::default(),
        }
    }

    pub fn host_allocator(mut self, host: &'d dyn HostAllocator) -> Self {
        self.host = host;
        self
    }

    pub fn config(mut self, config: ExportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn device(&self) -> &'d dyn Device {
        self.device
    }

    pub fn host(&self) -> &'d dyn HostAllocator {
        self.host
    }

    pub fn stream(&self) -> &Arc<dyn DeviceStream> {
        &self.stream
    }

    pub fn export_config(&self) -> &ExportConfig {
        &self.config
    }

    /// Wait for every transfer issued through this context.
    pub fn synchronize(&self) -> Result<()> {
        Ok(self.stream.synchronize()?)
    }
}
