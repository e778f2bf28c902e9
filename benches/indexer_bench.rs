//! Benchmarks for file-indexer
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use file_indexer::db::SqliteStore;
use file_indexer::record::Record;
use file_indexer::scan::BatchSink;
use std::sync::Arc;

fn benchmark_command_parsing(c: &mut Criterion) {
    use file_indexer::protocol::Command;

    c.bench_function("parse_find_name", |b| {
        b.iter(|| {
            let command = Command::parse(black_box("FIND name contains quarterly report"));
            black_box(command)
        })
    });

    c.bench_function("parse_find_size", |b| {
        b.iter(|| black_box(Command::parse(black_box("find SIZE > 1048576"))))
    });
}

fn benchmark_extension_extraction(c: &mut Criterion) {
    use file_indexer::record::extension_of;

    c.bench_function("extension_of", |b| {
        b.iter(|| black_box(extension_of(black_box("archive.backup.TAR.GZ"))))
    });
}

fn benchmark_sink_offer(c: &mut Criterion) {
    c.bench_function("sink_offer_1000_batch_100", |b| {
        b.iter(|| {
            let store = Arc::new(SqliteStore::open_in_memory().unwrap());
            let sink = BatchSink::new(store, 100);
            for i in 0..1000 {
                sink.offer(Record::new(format!("/bench/{}.dat", i), i, 0)).unwrap();
            }
            sink.flush().unwrap();
            black_box(sink.stats().records_written())
        })
    });
}

criterion_group!(
    benches,
    benchmark_command_parsing,
    benchmark_extension_extraction,
    benchmark_sink_offer
);
criterion_main!(benches);
