//! Table assembly: convert every column, pair it with its name, and bind the
//! results into a single `RecordBatch`.

use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{Field, Schema};
use gpu_memory_manager::Device;
use std::sync::Arc;
use tracing::{info, warn};

use crate::column_view::{ColumnView, TableView};
use crate::context::ExportContext;
use crate::dispatch::convert;
use crate::error::{InteropError, Result};
use crate::pending::PendingTable;

/// Issue the transfers for every column of `table`, in table order.
///
/// Fails with [`InteropError::SchemaMismatch`] before any transfer when the
/// name count differs from the column count. The returned table must be
/// joined with [`PendingTable::wait`] to observe its arrays.
pub fn convert_table<S: AsRef<str>>(
    ctx: &ExportContext<'_>,
    table: &TableView<'_>,
    names: &[S],
) -> Result<PendingTable> {
    if names.len() != table.num_columns() {
        return Err(InteropError::SchemaMismatch {
            names: names.len(),
            columns: table.num_columns(),
        });
    }
    info!(
        "Converting table: {} columns, {} rows on stream {}",
        table.num_columns(),
        table.num_rows(),
        ctx.stream().id()
    );

    let mut fields = Vec::with_capacity(table.num_columns());
    let mut columns = Vec::with_capacity(table.num_columns());
    for (name, column) in names.iter().zip(table.columns()) {
        let pending = match convert(ctx, column) {
            Ok(pending) => pending,
            Err(err) => {
                // drain what earlier columns issued before their buffers go away
                if let Err(sync_err) = ctx.synchronize() {
                    warn!("Failed to drain stream after a failed conversion: {}", sync_err);
                }
                return Err(err);
            }
        };
        fields.push(Field::new(name.as_ref(), pending.data_type().clone(), true));
        columns.push(pending);
    }

    let schema = Arc::new(Schema::new(fields));
    Ok(PendingTable::new(
        schema,
        columns,
        table.num_rows(),
        Arc::clone(ctx.stream()),
    ))
}

/// Convert `table` on a fresh stream of `device` and wait for the result.
pub fn export_table<S: AsRef<str>>(
    device: &dyn Device,
    table: &TableView<'_>,
    names: &[S],
) -> Result<RecordBatch> {
    let ctx = ExportContext::new(device)?;
    export_table_with(&ctx, table, names)
}

/// [`export_table`] with a caller-configured context.
pub fn export_table_with<S: AsRef<str>>(
    ctx: &ExportContext<'_>,
    table: &TableView<'_>,
    names: &[S],
) -> Result<RecordBatch> {
    convert_table(ctx, table, names)?.wait()
}

/// Convert a single column and synchronize the context's stream.
pub fn export_column(ctx: &ExportContext<'_>, view: &ColumnView<'_>) -> Result<ArrayRef> {
    let pending = convert(ctx, view)?;
    ctx.synchronize()?;
    pending.into_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_view::TypeId;
    use arrow_array::{Array, Int64Array};
    use arrow_schema::DataType;
    use gpu_memory_manager::SimDevice;

    #[test]
    fn names_must_match_columns() {
        let device = SimDevice::default();
        let ctx = ExportContext::new(&device).unwrap();
        let data = device.upload(&[0u8; 16]).unwrap();
        let column = ColumnView::builder(TypeId::Int64, 2)
            .data(data.as_slice())
            .build()
            .unwrap();
        let table = TableView::new(vec![column.clone(), column]).unwrap();

        let err = convert_table(&ctx, &table, &["only"]).unwrap_err();
        assert!(matches!(
            err,
            InteropError::SchemaMismatch {
                names: 1,
                columns: 2
            }
        ));
        assert_eq!(ctx.stream().pending_transfers(), 0);
    }

    #[test]
    fn fields_follow_column_order() {
        let device = SimDevice::default();
        let bytes: Vec<u8> = [4i64, 5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let data = device.upload(&bytes).unwrap();
        let ints = ColumnView::builder(TypeId::Int64, 2)
            .data(data.as_slice())
            .build()
            .unwrap();
        let days = ColumnView::builder(TypeId::TimestampDays, 2)
            .data(data.as_slice())
            .build()
            .unwrap();
        let table = TableView::new(vec![ints, days]).unwrap();

        let batch = export_table(&device, &table, &["a", "b"]).unwrap();
        assert_eq!(batch.schema().field(0).name(), "a");
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Date32);
        let a = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(a.value(1), 5);
        assert!(a.nulls().is_none());
    }

    #[test]
    fn single_column_export() {
        let device = SimDevice::default();
        let ctx = ExportContext::new(&device).unwrap();
        let data = device.upload(&[1, 0, 1]).unwrap();
        let view = ColumnView::builder(TypeId::Bool8, 3)
            .data(data.as_slice())
            .build()
            .unwrap();
        let array = export_column(&ctx, &view).unwrap();
        assert_eq!(array.data_type(), &DataType::Boolean);
        assert_eq!(array.len(), 3);
    }
}
