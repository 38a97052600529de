//! Compression and decompression throughput.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use oxiflate_deflate::{InflateOptions, MtInflater, deflate, inflate};
use std::hint::black_box;
use std::io::Cursor;

/// Log-like lines with repeated fields and a pseudo-random tail.
fn sample_data(size: usize) -> Vec<u8> {
    let mut seed: u64 = 0x1234_5678_9ABC_DEF0;
    let mut out = Vec::with_capacity(size + 64);
    let mut line = 0u32;
    while out.len() < size {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.extend_from_slice(
            format!("{line:08} INFO request handled in {}us\n", (seed >> 40) % 5000).as_bytes(),
        );
        line += 1;
    }
    out.truncate(size);
    out
}

fn bench_deflate(c: &mut Criterion) {
    let mut group = c.benchmark_group("deflate");
    group.sample_size(10);
    let data = sample_data(1 << 20);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for level in [1u8, 5, 9] {
        group.bench_with_input(BenchmarkId::new("level", level), &data, |b, data| {
            b.iter(|| black_box(deflate(data, level).map(|v| v.len())));
        });
    }
    group.finish();
}

fn bench_inflate(c: &mut Criterion) {
    let mut group = c.benchmark_group("inflate");
    let data = sample_data(4 << 20);
    let Ok(compressed) = deflate(&data, 6) else {
        return;
    };
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_with_input("single_thread", &compressed, |b, compressed| {
        b.iter(|| black_box(inflate(compressed).map(|v| v.len())));
    });
    group.bench_with_input("two_threads", &compressed, |b, compressed| {
        b.iter(|| {
            let mut out = Vec::with_capacity(data.len());
            let stats = MtInflater::new(InflateOptions::default())
                .stream(&mut Cursor::new(compressed), &mut out);
            black_box(stats.map(|s| s.bytes_out))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_deflate, bench_inflate);
criterion_main!(benches);
