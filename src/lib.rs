//! Export device-resident columnar tables as Arrow host tables.
//!
//! Re-exports the two workspace crates: [`gpu_memory_manager`] for devices,
//! streams and host buffers, and [`arrow_interop`] for column views and the
//! conversion itself.

pub use arrow_interop;
pub use gpu_memory_manager;

pub use arrow_interop::{
    convert, convert_table, export_column, export_table, export_table_with, ColumnView,
    ExportConfig, ExportContext, InteropError, OwnedColumn, PendingTable, TableView, TypeId,
};
pub use gpu_memory_manager::{
    BoundedAllocator, Device, DeviceBuffer, DeviceStream, HostAllocator, SimDevice,
    SimDeviceConfig,
};
