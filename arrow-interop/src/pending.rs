//! Arrays and tables whose buffers are still being filled by a stream.
//!
//! Converters only issue transfers and describe the Arrow layout the bytes
//! will form. The join step synchronizes the stream once, freezes every host
//! buffer, and only then builds Arrow arrays, so no array can be observed
//! before its bytes have landed.

use arrow_array::{make_array, new_empty_array, ArrayRef, RecordBatch, RecordBatchOptions};
use arrow_buffer::{BooleanBuffer, Buffer, NullBuffer};
use arrow_data::ArrayData;
use arrow_schema::{DataType, SchemaRef};
use gpu_memory_manager::{DeviceStream, HostBuffer};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bitmask;
use crate::error::{InteropError, Result};

/// The Arrow layout of one converted column, with its buffers in flight.
#[derive(Debug)]
pub struct PendingArray {
    data_type: DataType,
    len: usize,
    null_count: usize,
    validity: Option<HostBuffer>,
    buffers: Vec<HostBuffer>,
    children: Vec<PendingArray>,
}

impl PendingArray {
    pub fn new(
        data_type: DataType,
        len: usize,
        null_count: usize,
        validity: Option<HostBuffer>,
        buffers: Vec<HostBuffer>,
        children: Vec<PendingArray>,
    ) -> Self {
        Self {
            data_type,
            len,
            null_count,
            validity,
            buffers,
            children,
        }
    }

    /// A zero-length array of `data_type` that needs no transfers.
    pub fn empty(data_type: DataType) -> Self {
        Self::new(data_type, 0, 0, None, vec![], vec![])
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn null_count(&self) -> usize {
        self.null_count
    }

    pub fn has_validity(&self) -> bool {
        self.validity.is_some()
    }

    pub fn children(&self) -> &[PendingArray] {
        &self.children
    }

    /// Drop the array wrapper and keep only its data buffer.
    pub fn into_data_buffer(self) -> Result<HostBuffer> {
        let data_type = self.data_type;
        self.buffers.into_iter().next().ok_or_else(|| {
            InteropError::InvalidView(format!("{} array has no data buffer", data_type))
        })
    }

    /// Freeze into Arrow array data. The stream must have been synchronized.
    pub(crate) fn into_array_data(self) -> Result<ArrayData> {
        if self.len == 0 && self.buffers.is_empty() && self.children.is_empty() {
            return Ok(new_empty_array(&self.data_type).to_data());
        }

        let nulls = match self.validity {
            Some(mask) => Some(resolve_nulls(mask, self.len, self.null_count)?),
            None => None,
        };
        let mut buffers = self
            .buffers
            .into_iter()
            .map(HostBuffer::into_buffer)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if self.data_type == DataType::Boolean {
            buffers = buffers.iter().map(|b| pack_bool8(b, self.len)).collect();
        }
        let children = self
            .children
            .into_iter()
            .map(PendingArray::into_array_data)
            .collect::<Result<Vec<_>>>()?;

        Ok(ArrayData::builder(self.data_type)
            .len(self.len)
            .nulls(nulls)
            .buffers(buffers)
            .child_data(children)
            .build()?)
    }

    /// Freeze into an Arrow array. The stream must have been synchronized.
    pub(crate) fn into_array(self) -> Result<ArrayRef> {
        Ok(make_array(self.into_array_data()?))
    }
}

/// Freeze a transferred bitmap, clearing the bits past `len`.
fn resolve_nulls(mask: HostBuffer, len: usize, null_count: usize) -> Result<NullBuffer> {
    let mut bytes = mask
        .into_buffer()?
        .into_mutable()
        .map_err(|_| InteropError::InvalidView("validity buffer is shared".to_string()))?;
    bitmask::clear_trailing_bits(bytes.as_slice_mut(), len);
    let nulls = NullBuffer::new(BooleanBuffer::new(bytes.into(), 0, len));
    if nulls.null_count() != null_count {
        return Err(InteropError::InvalidView(format!(
            "declared null count {} but the bitmap marks {} nulls",
            null_count,
            nulls.null_count()
        )));
    }
    Ok(nulls)
}

/// Device booleans are one byte per value; Arrow packs them into bits.
fn pack_bool8(bytes: &Buffer, len: usize) -> Buffer {
    let values = bytes.as_slice();
    BooleanBuffer::collect_bool(len, |i| values[i] != 0).into_inner()
}

/// A converted table waiting for its stream.
#[derive(Debug)]
pub struct PendingTable {
    schema: SchemaRef,
    columns: Vec<PendingArray>,
    num_rows: usize,
    stream: Arc<dyn DeviceStream>,
    joined: bool,
}

impl PendingTable {
    pub(crate) fn new(
        schema: SchemaRef,
        columns: Vec<PendingArray>,
        num_rows: usize,
        stream: Arc<dyn DeviceStream>,
    ) -> Self {
        Self {
            schema,
            columns,
            num_rows,
            stream,
            joined: false,
        }
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn columns(&self) -> &[PendingArray] {
        &self.columns
    }

    /// Transfers still outstanding on the table's stream.
    pub fn pending_transfers(&self) -> usize {
        self.stream.pending_transfers()
    }

    /// Synchronize the stream once and assemble the host table.
    pub fn wait(mut self) -> Result<RecordBatch> {
        self.joined = true;
        self.stream.synchronize()?;
        debug!("Stream {} synchronized", self.stream.id());

        let columns = std::mem::take(&mut self.columns)
            .into_iter()
            .map(PendingArray::into_array)
            .collect::<Result<Vec<_>>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows));
        let batch =
            RecordBatch::try_new_with_options(Arc::clone(&self.schema), columns, &options)?;
        info!(
            "Exported table: {} columns, {} rows",
            batch.num_columns(),
            batch.num_rows()
        );
        Ok(batch)
    }

    /// [`PendingTable::wait`] on Tokio's blocking pool.
    pub async fn wait_async(self) -> Result<RecordBatch> {
        tokio::task::spawn_blocking(move || self.wait())
            .await
            .map_err(|e| InteropError::Join(e.to_string()))?
    }
}

impl Drop for PendingTable {
    fn drop(&mut self) {
        if self.joined {
            return;
        }
        // host buffers must outlive any copy still targeting them
        if let Err(err) = self.stream.synchronize() {
            warn!(
                "Failed to synchronize stream {} for a dropped pending table: {}",
                self.stream.id(),
                err
            );
        }
    }
}
