//! Error types for device-to-Arrow conversion.

use arrow_schema::ArrowError;
use gpu_memory_manager::DeviceError;
use thiserror::Error;

use crate::column_view::TypeId;

pub type Result<T> = std::result::Result<T, InteropError>;

/// Every variant aborts the whole conversion; no partial table is returned.
#[derive(Error, Debug)]
pub enum InteropError {
    #[error("{names} column names given for a table of {columns} columns")]
    SchemaMismatch { names: usize, columns: usize },

    #[error("unsupported column type {0:?}")]
    UnsupportedType(TypeId),

    #[error("allocation failure: {0}")]
    AllocationFailure(#[source] DeviceError),

    #[error("transfer failure: {0}")]
    TransferFailure(#[source] DeviceError),

    #[error("child {index} of a {parent:?} column has type {found:?}, expected {expected}")]
    ChildTypeMismatch {
        parent: TypeId,
        index: usize,
        found: TypeId,
        expected: &'static str,
    },

    #[error("invalid column view: {0}")]
    InvalidView(String),

    #[error("column nesting exceeds the maximum depth of {0}")]
    NestingTooDeep(usize),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("device error: {0}")]
    Device(#[source] DeviceError),

    #[error("join task failed: {0}")]
    Join(String),
}

impl From<DeviceError> for InteropError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Allocation { .. } => InteropError::AllocationFailure(err),
            DeviceError::Transfer { .. } => InteropError::TransferFailure(err),
            DeviceError::OutOfBounds { .. } => InteropError::InvalidView(err.to_string()),
            other => InteropError::Device(other),
        }
    }
}
