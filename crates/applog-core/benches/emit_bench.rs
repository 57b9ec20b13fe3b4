//! Benchmarks for applog delivery
//!
//! Run with: cargo bench -p applog-core
//!
//! These benchmarks establish performance baselines for:
//! - Line formatting
//! - Filtering and callback delivery (no I/O)
//! - Directory delivery with rotation
//! - Metadata save/load

use applog_core::metadata::{self, MetadataDocument};
use applog_core::{format, DirectoryTransport, LogRecord, Logger, Severity, Transport};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

// ============================================================================
// Formatting Benchmarks
// ============================================================================

fn bench_format(c: &mut Criterion) {
    let record = LogRecord::new(Severity::Info, "request handled in 3ms")
        .with_process("bench")
        .with_module("server::http")
        .with_function("handle");

    let mut group = c.benchmark_group("format");
    group.bench_function("file_line", |b| b.iter(|| black_box(format::file_line(&record))));
    group.bench_function("stream_line_colour", |b| {
        b.iter(|| black_box(format::stream_line(&record, true)))
    });
    group.finish();
}

// ============================================================================
// Delivery Benchmarks
// ============================================================================

fn bench_filtered_and_callback(c: &mut Criterion) {
    let logger = Logger::new("bench");
    logger
        .add_transport(
            Transport::callback("sink", |r: &LogRecord| {
                black_box(r);
                Ok(())
            })
            .with_level(Severity::Warn),
        )
        .unwrap();

    let mut group = c.benchmark_group("emit_no_io");
    group.bench_function("filtered", |b| {
        b.iter(|| black_box(logger.log(Severity::Debug, "m", "f", "dropped")))
    });
    group.bench_function("callback", |b| {
        b.iter(|| black_box(logger.log(Severity::Error, "m", "f", "kept")))
    });
    group.finish();
}

fn bench_directory_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit_directory");

    for cycle_size in [4 * 1024u64, 1024 * 1024] {
        let temp = TempDir::new().unwrap();
        let logger = Logger::new("bench");
        logger
            .add_transport(Transport::new(
                "bench",
                Severity::Debug,
                DirectoryTransport::new(temp.path())
                    .with_cycle_size(cycle_size)
                    .with_file_limit(4)
                    .with_header(false),
            ))
            .unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(cycle_size),
            &cycle_size,
            |b, _| b.iter(|| black_box(logger.log(Severity::Info, "m", "f", "a benchmark line"))),
        );
    }
    group.finish();
}

// ============================================================================
// Metadata Benchmarks
// ============================================================================

fn bench_metadata_roundtrip(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(metadata::METADATA_FILE_NAME);
    let mut transports = Vec::new();
    for i in 0..8 {
        let t = Transport::directory(format!("t{}", i), temp.path().join("logs"));
        transports.push(serde_json::to_value(&t).unwrap());
    }
    let doc = MetadataDocument { transports };

    c.bench_function("metadata_save_load", |b| {
        b.iter(|| {
            metadata::save(&path, &doc).unwrap();
            black_box(metadata::load(&path).unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_format,
    bench_filtered_and_callback,
    bench_directory_emit,
    bench_metadata_roundtrip
);
criterion_main!(benches);
