// In benches/pool_bench.rs

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::{RngCore, SeedableRng};

use batchzip::{kernels, BatchConfig, CodecKind, CompressionPool};

// --- Mock Data Generation ---

/// Printable text made from random bytes, like base64 payloads: compressible, but not trivially.
fn generate_payload(size: usize, seed: u64) -> Vec<u8> {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut raw = vec![0u8; size];
    rng.fill_bytes(&mut raw);
    raw.iter().map(|b| ALPHABET[(*b & 63) as usize]).collect()
}

// --- Benchmark Suite ---

const PAYLOAD_SIZE: usize = 1068; // 800 random bytes, base64-encoded
const JOBS: usize = 10_000;

fn bench_pool_vs_direct(c: &mut Criterion) {
    let payload = generate_payload(PAYLOAD_SIZE, 42);
    let codec = CodecKind::default();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("Batched Pool vs Direct");
    group.throughput(Throughput::Bytes((PAYLOAD_SIZE * JOBS) as u64));
    group.sample_size(10);

    group.bench_function("Direct gzip (single thread)", |b| {
        b.iter(|| {
            for _ in 0..JOBS {
                black_box(kernels::compress(&codec, black_box(&payload)).unwrap());
            }
        })
    });

    for pool_size in [1usize, 3] {
        let pool = runtime.block_on(async {
            CompressionPool::create(pool_size, BatchConfig::default()).unwrap()
        });

        group.bench_function(format!("Pool of {} (one burst)", pool_size), |b| {
            b.iter(|| {
                runtime.block_on(async {
                    let futures: Vec<_> = (0..JOBS).map(|_| pool.submit(&payload)).collect();
                    for fut in futures {
                        black_box(fut.await.unwrap());
                    }
                })
            })
        });

        runtime.block_on(async { pool.destroy() });
    }

    group.finish();
}

criterion_group!(benches, bench_pool_vs_direct);
criterion_main!(benches);
