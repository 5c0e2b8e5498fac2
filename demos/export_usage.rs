use anyhow::{Context, Result};
use arrow_array::{Array, StringArray};
use gpu_arrow_export::{
    convert_table, export_table, ColumnView, Device, ExportContext, SimDevice, SimDeviceConfig,
    TableView, TypeId,
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    info!("Device table export examples");

    // Example 1: blocking export of a two-column table
    blocking_export_example()?;

    // Example 2: sliced columns and an async join
    sliced_async_example().await?;

    Ok(())
}

fn i32_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blocking_export_example() -> Result<()> {
    info!("=== Example 1: Blocking export ===");

    let device = SimDevice::default();
    let ids = device.upload(&i32_bytes(&[7, 8, 9]))?;
    // "a", null, "ccc"
    let offsets = device.upload(&i32_bytes(&[0, 1, 1, 4]))?;
    let chars = device.upload(b"accc")?;
    let mask = device.upload(&[0b101])?;

    let id_column = ColumnView::builder(TypeId::Int32, 3)
        .data(ids.as_slice())
        .build()?;
    let name_column = ColumnView::builder(TypeId::String, 3)
        .null_mask(mask.as_slice(), 1)
        .child(
            ColumnView::builder(TypeId::Int32, 4)
                .data(offsets.as_slice())
                .build()?,
        )
        .child(
            ColumnView::builder(TypeId::Int8, 4)
                .data(chars.as_slice())
                .build()?,
        )
        .build()?;
    let table = TableView::new(vec![id_column, name_column])?;

    let batch = export_table(&device, &table, &["id", "name"])
        .context("exporting the id/name table")?;
    info!("Schema: {:?}", batch.schema());
    if let Some(names) = batch.column(1).as_any().downcast_ref::<StringArray>() {
        for (i, name) in names.iter().enumerate() {
            info!("Row {}: {:?}", i, name);
        }
    }

    Ok(())
}

async fn sliced_async_example() -> Result<()> {
    info!("=== Example 2: Sliced columns, async join ===");

    let device = SimDevice::new(SimDeviceConfig {
        memory_limit: 64 * 1024 * 1024, // 64MB
        max_in_flight_transfers: 64,
    });
    let values = device.upload(&i32_bytes(&(0..1000).collect::<Vec<_>>()))?;
    let column = ColumnView::builder(TypeId::Int32, 1000)
        .data(values.as_slice())
        .build()?;
    let window = column.slice(&device, 250, 750)?;
    let table = TableView::new(vec![window])?;

    let ctx = ExportContext::new(&device)?;
    let pending = convert_table(&ctx, &table, &["window"])?;
    info!(
        "Issued {} transfers, {} device bytes in use",
        pending.pending_transfers(),
        device.bytes_in_use()
    );
    let batch = pending
        .wait_async()
        .await
        .context("joining the sliced export")?;
    info!(
        "Exported {} rows, {} device bytes in use",
        batch.num_rows(),
        device.bytes_in_use()
    );

    Ok(())
}
