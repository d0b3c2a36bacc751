//! Performance benchmarks for foldsnap
//!
//! Tracks encode and restore time across tree sizes, the cost of each codec in
//! the compression race, and decode throughput for both framings.

#![cfg_attr(feature = "quick-bench", allow(dead_code))]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use foldsnap::compression::{codec_for, CompressionDispatcher};
use foldsnap::{CodecTag, FramingKind, Snapshotter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::hint::black_box;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Fill `root` with `file_count` files, mostly source-like text plus some binaries
fn populate(root: &Path, file_count: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for i in 0..file_count {
        let dir = root.join(format!("pkg_{}", i % 8));
        fs::create_dir_all(&dir).unwrap();
        if i % 10 == 0 {
            let size = rng.random_range(256..4096);
            let mut data = vec![0u8; size];
            rng.fill(&mut data[..]);
            fs::write(dir.join(format!("blob_{}.bin", i)), data).unwrap();
        } else {
            let lines = rng.random_range(10..120);
            let text: String = (0..lines)
                .map(|n| format!("    let value_{} = compute({}, {});\n", n, i, rng.random::<u16>()))
                .collect();
            fs::write(dir.join(format!("module_{}.rs", i)), text).unwrap();
        }
    }
}

/// Sample stream for the codec benchmarks
fn sample_stream(size: usize) -> Vec<u8> {
    let source = TempDir::new().unwrap();
    populate(source.path(), 200, 7);
    let snapshotter = Snapshotter::builder().build().unwrap();
    let (artifact, _) = snapshotter.encode_tree(source.path()).unwrap();
    artifact.into_iter().cycle().take(size).collect()
}

/// Benchmark packing trees of increasing size
fn bench_encode_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_tree");
    group.measurement_time(Duration::from_secs(3));
    group.sample_size(20);

    for file_count in [10, 100, 500].iter() {
        let source = TempDir::new().unwrap();
        populate(source.path(), *file_count, 42);

        for (label, compress) in [("plain", false), ("compressed", true)] {
            let snapshotter = Snapshotter::builder().compress(compress).build().unwrap();
            group.bench_with_input(
                BenchmarkId::new(label, file_count),
                file_count,
                |b, _| {
                    b.iter(|| black_box(snapshotter.encode_tree(source.path()).unwrap()));
                },
            );
        }
    }

    group.finish();
}

/// Benchmark restoring into a fresh directory
fn bench_restore(c: &mut Criterion) {
    let mut group = c.benchmark_group("restore");
    group.measurement_time(Duration::from_secs(3));
    group.sample_size(10);

    for file_count in [10, 100, 500].iter() {
        let source = TempDir::new().unwrap();
        populate(source.path(), *file_count, 43);
        let snapshotter = Snapshotter::builder()
            .backup_existing(false)
            .build()
            .unwrap();
        let (artifact, _) = snapshotter.encode_tree(source.path()).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(file_count),
            file_count,
            |b, _| {
                b.iter_batched(
                    || TempDir::new().unwrap(),
                    |dest| {
                        black_box(snapshotter.restore_artifact(&artifact, dest.path()).unwrap());
                        dest
                    },
                    criterion::BatchSize::PerIteration,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark each codec and the full race on the same stream
fn bench_codecs(c: &mut Criterion) {
    let mut group = c.benchmark_group("codecs");
    group.measurement_time(Duration::from_secs(3));
    group.sample_size(10);

    for size in [16 * 1024, 256 * 1024].iter() {
        let data = sample_stream(*size);
        group.throughput(Throughput::Bytes(*size as u64));

        for tag in [CodecTag::Lz4, CodecTag::Zlib, CodecTag::Bz2, CodecTag::Xz] {
            let codec = codec_for(tag);
            group.bench_with_input(BenchmarkId::new(tag.as_str(), size), &data, |b, data| {
                b.iter(|| black_box(codec.compress(data).unwrap()));
            });
        }

        let dispatcher = CompressionDispatcher::default();
        group.bench_with_input(BenchmarkId::new("race", size), &data, |b, data| {
            b.iter(|| black_box(dispatcher.compress(data).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark decoding both framings
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.measurement_time(Duration::from_secs(2));

    let source = TempDir::new().unwrap();
    populate(source.path(), 300, 44);

    for framing in [FramingKind::Verbose, FramingKind::Compact] {
        let snapshotter = Snapshotter::builder().framing(framing).build().unwrap();
        let (artifact, _) = snapshotter.encode_tree(source.path()).unwrap();
        group.throughput(Throughput::Bytes(artifact.len() as u64));
        group.bench_function(format!("{:?}", framing).to_lowercase(), |b| {
            b.iter(|| black_box(snapshotter.decode_artifact(&artifact).unwrap()));
        });
    }

    group.finish();
}

// Quick benchmarks for development
#[cfg(feature = "quick-bench")]
criterion_group!(benches, bench_encode_tree, bench_decode);

#[cfg(not(feature = "quick-bench"))]
criterion_group!(benches, bench_encode_tree, bench_restore, bench_codecs, bench_decode);

criterion_main!(benches);
