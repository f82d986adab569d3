//! Database benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use litedoc_bench::{generate_documents, user_document};
use litedoc_bson::{Expr, Value};
use litedoc_core::{Config, Database, Query};
use tempfile::TempDir;

/// Benchmark single-document inserts, one auto-transaction each.
fn bench_single_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_insert");

    for size in [64, 256, 1024, 4096, 16384].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let db = Database::open_in_memory().unwrap();
            let mut next = 0i64;
            b.iter(|| {
                next += 1;
                db.insert("bench", black_box(user_document(next, size))).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark batched inserts through `insert_many`.
fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                b.iter_batched(
                    || {
                        (
                            Database::open_in_memory().unwrap(),
                            generate_documents(batch_size, 100),
                        )
                    },
                    |(db, documents)| {
                        db.insert_many("bench", documents).unwrap();
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark inserts against a file-backed database, including log sync.
fn bench_file_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_insert");
    group.sample_size(20);

    for batch_size in [1, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let dir = TempDir::new().unwrap();
                let config = Config::default().auto_checkpoint_pages(0);
                let db = Database::open_with_config(&dir.path().join("db"), config).unwrap();
                let mut next = 0i64;
                b.iter(|| {
                    let documents: Vec<_> = (0..batch_size)
                        .map(|_| {
                            next += 1;
                            user_document(next, 100)
                        })
                        .collect();
                    db.insert_many("bench", documents).unwrap();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark point lookups by `_id`.
fn bench_find_by_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_id");

    for count in [100, 1000, 10000].iter() {
        let db = Database::open_in_memory().unwrap();
        db.insert_many("bench", generate_documents(*count, 64)).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let mut i = 0i64;
            b.iter(|| {
                i = (i + 7) % count as i64;
                black_box(db.find_by_id("bench", &Value::Int64(i)).unwrap());
            });
        });
    }

    group.finish();
}

/// Compare an equality query with and without a secondary index.
fn bench_indexed_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_name");
    let count = 5000;

    let scan = Database::open_in_memory().unwrap();
    scan.insert_many("bench", generate_documents(count, 64)).unwrap();

    let indexed = Database::open_in_memory().unwrap();
    indexed.ensure_index("bench", "name", "$.name", true).unwrap();
    indexed.insert_many("bench", generate_documents(count, 64)).unwrap();

    let query = Query::eq(Expr::field("name"), "user2500");

    group.bench_function("scan", |b| {
        b.iter(|| black_box(scan.find("bench", black_box(&query)).unwrap()));
    });
    group.bench_function("index", |b| {
        b.iter(|| black_box(indexed.find("bench", black_box(&query)).unwrap()));
    });

    group.finish();
}

/// Benchmark multikey index lookups over `tags[*]`.
fn bench_multikey_find(c: &mut Criterion) {
    let db = Database::open_in_memory().unwrap();
    db.ensure_index("bench", "tags", "$.tags[*]", false).unwrap();
    db.insert_many("bench", generate_documents(2000, 32)).unwrap();

    let query = Query::eq(Expr::parse("$.tags[*]").unwrap(), "tag7");
    c.bench_function("multikey_find", |b| {
        b.iter(|| black_box(db.count("bench", black_box(&query)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_single_insert,
    bench_batch_insert,
    bench_file_insert,
    bench_find_by_id,
    bench_indexed_find,
    bench_multikey_find,
);
criterion_main!(benches);
