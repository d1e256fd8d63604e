//! Benchmarks for Strata engine components.
//!
//! Run with: cargo bench --package alopex-strata
//!
//! ## Benchmark Categories
//!
//! - **Segment Buffer**: Insert, search, serialize
//! - **Cursor Writes**: Sequential appends, reversed inserts
//! - **Cursor Reads**: Search and full scans over committed data

use alopex_strata::segment::{Segment, SegmentKey};
use alopex_strata::{Engine, EngineOptions, SeriesId, TimeseriesPoint};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use uuid::Uuid;

const SERIES: SeriesId = Uuid::from_u128(0xBE7C);
const BENCH_MAP_SIZE: usize = 1024 * 1024 * 1024;

/// Generate typical time series data (regular intervals, slowly varying values).
fn generate_typical_timeseries(count: usize) -> Vec<(i64, f64)> {
    let start_ts = 1_000_000_000_i64;
    let interval = 1_000_000_000_i64; // 1 second in nanos

    let mut value = 50.0;
    (0..count)
        .map(|i| {
            value += (i as f64 * 0.1).sin() * 0.1;
            (start_ts + (i as i64) * interval, value)
        })
        .collect()
}

fn create_engine(capacity: usize) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let options = EngineOptions::new(temp_dir.path().join("store"), true)
        .with_max_database_size(BENCH_MAP_SIZE)
        .with_segment_capacity(capacity);
    let engine = Engine::open(options).unwrap();
    (temp_dir, engine)
}

fn populated_engine(count: usize, capacity: usize) -> (TempDir, Engine) {
    let (dir, engine) = create_engine(capacity);
    let mut txn = engine.begin_write().unwrap();
    {
        let mut cursor = txn.open_timeseries(SERIES).unwrap();
        for (ts, value) in generate_typical_timeseries(count) {
            cursor.insert_value(ts, value).unwrap();
        }
        cursor.close().unwrap();
    }
    txn.commit().unwrap();
    drop(txn);
    (dir, engine)
}

// ============================================================================
// Segment Buffer Benchmarks
// ============================================================================

fn bench_segment_append(c: &mut Criterion) {
    let points: Vec<TimeseriesPoint> = generate_typical_timeseries(8100)
        .into_iter()
        .map(|(ts, v)| TimeseriesPoint::new(ts, 0, v))
        .collect();

    c.bench_function("segment_append_8100", |b| {
        b.iter(|| {
            let mut segment = Segment::new(8100);
            for point in &points {
                segment.insert(*point);
            }
            black_box(segment.len())
        })
    });
}

fn bench_segment_serialize(c: &mut Criterion) {
    let points: Vec<TimeseriesPoint> = generate_typical_timeseries(8100)
        .into_iter()
        .map(|(ts, v)| TimeseriesPoint::new(ts, 0, v))
        .collect();
    let segment = Segment::from_points(points, 8100).unwrap();
    let bytes = segment.serialize();

    c.bench_function("segment_serialize_8100", |b| {
        b.iter(|| black_box(segment.serialize()))
    });
    c.bench_function("segment_deserialize_8100", |b| {
        b.iter(|| Segment::<TimeseriesPoint>::deserialize(black_box(&bytes), 8100).unwrap())
    });
}

fn bench_segment_search(c: &mut Criterion) {
    let raw = generate_typical_timeseries(8100);
    let points: Vec<TimeseriesPoint> = raw
        .iter()
        .map(|&(ts, v)| TimeseriesPoint::new(ts, 0, v))
        .collect();
    let segment = Segment::from_points(points, 8100).unwrap();
    let target = raw[4000].0 + 1;

    c.bench_function("segment_search_8100", |b| {
        b.iter(|| black_box(segment.search(black_box(target))))
    });
}

fn bench_key_encode(c: &mut Criterion) {
    let key = SegmentKey::new(SERIES, 1_700_000_000_000_000_000);
    c.bench_function("segment_key_encode", |b| b.iter(|| black_box(key).encode()));
}

// ============================================================================
// Cursor Write Benchmarks
// ============================================================================

fn bench_cursor_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("cursor_append");

    for size in [1_000, 10_000, 100_000].iter() {
        let points = generate_typical_timeseries(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &points, |b, points| {
            b.iter_batched(
                || create_engine(8100),
                |(_dir, engine)| {
                    let mut txn = engine.begin_write().unwrap();
                    {
                        let mut cursor = txn.open_timeseries(SERIES).unwrap();
                        for &(ts, value) in points {
                            cursor.insert_value(ts, value).unwrap();
                        }
                        cursor.close().unwrap();
                    }
                    txn.commit().unwrap();
                },
                criterion::BatchSize::PerIteration,
            )
        });
    }

    group.finish();
}

fn bench_cursor_reversed_insert(c: &mut Criterion) {
    let mut points = generate_typical_timeseries(10_000);
    points.reverse();

    c.bench_function("cursor_reversed_insert_10k", |b| {
        b.iter_batched(
            || create_engine(8100),
            |(_dir, engine)| {
                let mut txn = engine.begin_write().unwrap();
                {
                    let mut cursor = txn.open_timeseries(SERIES).unwrap();
                    for &(ts, value) in &points {
                        cursor.insert_value(ts, value).unwrap();
                    }
                    cursor.close().unwrap();
                }
                txn.commit().unwrap();
            },
            criterion::BatchSize::PerIteration,
        )
    });
}

// ============================================================================
// Cursor Read Benchmarks
// ============================================================================

fn bench_cursor_search(c: &mut Criterion) {
    let count = 100_000;
    let (_dir, engine) = populated_engine(count, 8100);
    let points = generate_typical_timeseries(count);
    let targets: Vec<i64> = points.iter().step_by(997).map(|&(ts, _)| ts + 1).collect();

    c.bench_function("cursor_search_100k", |b| {
        let txn = engine.begin_read().unwrap();
        let mut cursor = txn.open_timeseries(SERIES).unwrap();
        b.iter(|| {
            for &target in &targets {
                black_box(cursor.search(target).unwrap());
            }
        })
    });
}

fn bench_cursor_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("cursor_scan");

    for size in [10_000, 100_000].iter() {
        let (_dir, engine) = populated_engine(*size, 8100);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            let txn = engine.begin_read().unwrap();
            let mut cursor = txn.open_timeseries(SERIES).unwrap();
            b.iter(|| {
                let mut sum = 0.0;
                cursor.for_each(|p| sum += p.value).unwrap();
                black_box(sum)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    // Segment buffer
    bench_segment_append,
    bench_segment_serialize,
    bench_segment_search,
    bench_key_encode,
    // Cursor writes
    bench_cursor_append,
    bench_cursor_reversed_insert,
    // Cursor reads
    bench_cursor_search,
    bench_cursor_scan,
);

criterion_main!(benches);
