//! Record file benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tabula_bench::generate_records;
use tabula_core::{Record, RecordFile};
use tabula_storage::InMemoryBackend;
use tempfile::TempDir;

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_file_append");

    for name_len in [8, 64, 160].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("memory", name_len), name_len, |b, &len| {
            let file = RecordFile::with_backend(Box::new(InMemoryBackend::new()), 257).unwrap();
            let record = generate_records(1, len).remove(0);
            b.iter(|| black_box(file.append_record(black_box(&record)).unwrap()));
        });
    }

    group.sample_size(30);
    group.bench_function("file", |b| {
        let temp_dir = TempDir::new().unwrap();
        let file = RecordFile::open(&temp_dir.path().join("bench.dat"), 257).unwrap();
        let record = generate_records(1, 32).remove(0);
        b.iter(|| black_box(file.append_record(black_box(&record)).unwrap()));
    });

    group.finish();
}

fn bench_batch_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_file_append_records");

    for count in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let records = generate_records(count, 16);
            b.iter(|| {
                let file =
                    RecordFile::with_backend(Box::new(InMemoryBackend::new()), 257).unwrap();
                black_box(file.append_records(&records).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_reuse(c: &mut Criterion) {
    c.bench_function("record_file_delete_then_append", |b| {
        let file = RecordFile::with_backend(Box::new(InMemoryBackend::new()), 257).unwrap();
        file.append_records(&generate_records(1000, 16)).unwrap();
        let record = Record::new().with("id", 0i64);
        let mut slot = 0u64;
        b.iter(|| {
            file.delete_record(slot).unwrap();
            slot = file.append_record(black_box(&record)).unwrap();
            slot = (slot + 7) % 1000;
        });
    });
}

fn bench_scan(c: &mut Criterion) {
    let file = RecordFile::with_backend(Box::new(InMemoryBackend::new()), 257).unwrap();
    file.append_records(&generate_records(1000, 16)).unwrap();
    c.bench_function("record_file_live_records_1000", |b| {
        b.iter(|| black_box(file.live_records::<Record>().unwrap()));
    });
}

criterion_group!(benches, bench_append, bench_batch_append, bench_reuse, bench_scan);
criterion_main!(benches);
