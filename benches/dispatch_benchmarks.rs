//! Drivehouse Benchmarks
//!
//! Measures format decoding, joins and cache-backed table loads.
//!
//! Run with: cargo bench
//! Run specific benchmark: cargo bench -- <name>

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use drivehouse::format::{decode_bytes, FileKind};
use drivehouse::join::{join, JoinKind};
use drivehouse::{MemoryDrive, SheetSelector, Warehouse, WarehouseConfig};

/// CSV text with N rows separated by `delimiter`.
fn generate_csv(num_rows: usize, delimiter: char) -> String {
    let mut out = format!("id{d}valor{d}categoria\n", d = delimiter);
    for i in 0..num_rows {
        out.push_str(&format!("{}{d}{:.2}{d}cat_{}\n", i, i as f64 * 1.5, i % 4, d = delimiter));
    }
    out
}

/// JSON array of N flat-ish records with one nested object.
fn generate_json(num_rows: usize) -> String {
    let records: Vec<serde_json::Value> = (0..num_rows)
        .map(|i| {
            serde_json::json!({
                "id": i,
                "valor": i as f64 * 1.5,
                "local": {"cidade": format!("cidade_{}", i % 10), "uf": "SP"},
            })
        })
        .collect();
    serde_json::Value::Array(records).to_string()
}

fn create_batch(num_rows: usize, key_modulo: i64, value_name: &str) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new(value_name, DataType::Float64, true),
        Field::new("rotulo", DataType::Utf8, true),
    ]));
    let ids: Vec<i64> = (0..num_rows as i64).map(|i| i % key_modulo).collect();
    let values: Vec<f64> = (0..num_rows).map(|i| i as f64).collect();
    let labels: Vec<String> = (0..num_rows).map(|i| format!("r{}", i)).collect();

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(Float64Array::from(values)),
            Arc::new(StringArray::from(labels)),
        ],
    )
    .expect("Failed to create batch")
}

// ============================================================================
// Decoding Benchmarks
// ============================================================================

fn bench_csv_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("csv_probe");
    let sheet = SheetSelector::default();

    for size in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        // Accepted on the first probe
        let semicolon = generate_csv(*size, ';');
        group.bench_with_input(BenchmarkId::new("semicolon", size), size, |b, _| {
            b.iter(|| black_box(decode_bytes(FileKind::Csv, semicolon.as_bytes(), &sheet).unwrap()))
        });

        // Accepted only after the semicolon probe is rejected
        let pipe = generate_csv(*size, '|');
        group.bench_with_input(BenchmarkId::new("pipe", size), size, |b, _| {
            b.iter(|| black_box(decode_bytes(FileKind::Csv, pipe.as_bytes(), &sheet).unwrap()))
        });
    }

    group.finish();
}

fn bench_json_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("json_flatten");
    let sheet = SheetSelector::default();

    for size in [1_000, 10_000].iter() {
        let json = generate_json(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("records", size), size, |b, _| {
            b.iter(|| black_box(decode_bytes(FileKind::Json, json.as_bytes(), &sheet).unwrap()))
        });
    }

    group.finish();
}

// ============================================================================
// Join Benchmarks
// ============================================================================

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join");
    let on = vec!["id".to_string()];

    for size in [1_000, 10_000].iter() {
        let left = create_batch(*size, *size as i64, "valor");
        let right = create_batch(*size / 2, *size as i64, "peso");
        group.throughput(Throughput::Elements(*size as u64));

        for kind in [JoinKind::Inner, JoinKind::Left, JoinKind::Outer] {
            group.bench_with_input(BenchmarkId::new(kind.to_string(), size), size, |b, _| {
                b.iter(|| black_box(join(&left, &right, &on, kind).unwrap()))
            });
        }
    }

    group.finish();
}

// ============================================================================
// Warehouse Benchmarks
// ============================================================================

fn bench_cached_get_table(c: &mut Criterion) {
    let drive = Arc::new(MemoryDrive::new("root"));
    drive.add_file("f", "vendas.csv", "root", generate_csv(10_000, ';'));
    let mut warehouse = Warehouse::with_gateway(
        WarehouseConfig::new().with_folder_id("root").without_env(),
        drive,
    )
    .expect("Failed to create warehouse");
    warehouse.get_table("vendas", None, false).expect("Failed to load table");

    c.bench_function("cached_get_table", |b| {
        b.iter(|| black_box(warehouse.get_table("vendas", None, false).unwrap()))
    });
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    name = benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(std::time::Duration::from_secs(5));
    targets =
        bench_csv_probe,
        bench_json_flatten,
        bench_join,
        bench_cached_get_table,
);

criterion_main!(benches);
