//! BSON codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use litedoc_bench::{nested_document, user_document};
use litedoc_bson::{decode_document, encode_document, Expr};

/// Benchmark encoding flat documents of growing payload.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [0, 256, 4096, 65536].iter() {
        let document = user_document(1, *size);
        let encoded_len = encode_document(&document).unwrap().len();
        group.throughput(Throughput::Bytes(encoded_len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &document, |b, document| {
            b.iter(|| {
                let bytes = encode_document(black_box(document)).unwrap();
                black_box(bytes);
            });
        });
    }

    group.finish();
}

/// Benchmark decoding the same documents.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [0, 256, 4096, 65536].iter() {
        let bytes = encode_document(&user_document(1, *size)).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| {
                let document = decode_document(black_box(bytes)).unwrap();
                black_box(document);
            });
        });
    }

    group.finish();
}

/// Benchmark nested documents, which stress recursion rather than copying.
fn bench_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested");

    for depth in [1, 3, 5].iter() {
        let document = nested_document(*depth, 4);
        let bytes = encode_document(&document).unwrap();
        group.bench_with_input(BenchmarkId::new("encode", depth), &document, |b, document| {
            b.iter(|| black_box(encode_document(black_box(document)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", depth), &bytes, |b, bytes| {
            b.iter(|| black_box(decode_document(black_box(bytes)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark key extraction through path expressions.
fn bench_expressions(c: &mut Criterion) {
    let mut group = c.benchmark_group("expression");
    let document = user_document(1, 64);

    for source in ["$.name", "$.tags[*]", "LOWER($.name)"].iter() {
        let expr = Expr::parse(source).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(source), &expr, |b, expr| {
            b.iter(|| black_box(expr.evaluate(black_box(&document))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_nested, bench_expressions);
criterion_main!(benches);
