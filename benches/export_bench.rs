//! Benchmarks for the device-to-Arrow export path on the simulated device.
//!
//! Run with:  `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gpu_arrow_export::{export_table, ColumnView, Device, SimDevice, TableView, TypeId};

const ROWS: usize = 64 * 1024;

fn i64_bytes(rows: usize) -> Vec<u8> {
    (0..rows as i64).flat_map(|v| v.to_le_bytes()).collect()
}

fn bench_fixed_width(c: &mut Criterion) {
    let device = SimDevice::default();
    let data = device.upload(&i64_bytes(ROWS)).unwrap();
    let mask = device.upload(&vec![0xEF; ROWS / 8]).unwrap();
    let column = ColumnView::builder(TypeId::Int64, ROWS)
        .data(data.as_slice())
        .null_mask(mask.as_slice(), ROWS / 8)
        .build()
        .unwrap();
    let table = TableView::new(vec![column]).unwrap();

    c.bench_function("export_int64_with_nulls", |b| {
        b.iter(|| {
            let batch = export_table(&device, black_box(&table), &["v"]).unwrap();
            black_box(batch);
        })
    });
}

fn bench_sliced_strings(c: &mut Criterion) {
    let device = SimDevice::default();
    let offsets: Vec<u8> = (0..=ROWS as i32)
        .flat_map(|i| (i * 4).to_le_bytes())
        .collect();
    let offsets = device.upload(&offsets).unwrap();
    let chars = device.upload(&vec![b'x'; ROWS * 4]).unwrap();
    let column = ColumnView::builder(TypeId::String, ROWS)
        .child(
            ColumnView::builder(TypeId::Int32, ROWS + 1)
                .data(offsets.as_slice())
                .build()
                .unwrap(),
        )
        .child(
            ColumnView::builder(TypeId::Int8, ROWS * 4)
                .data(chars.as_slice())
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let sliced = column.slice(&device, ROWS / 4, ROWS / 2).unwrap();
    let table = TableView::new(vec![sliced]).unwrap();

    c.bench_function("export_sliced_strings", |b| {
        b.iter(|| {
            let batch = export_table(&device, black_box(&table), &["s"]).unwrap();
            black_box(batch);
        })
    });
}

criterion_group!(benches, bench_fixed_width, bench_sliced_strings);
criterion_main!(benches);
