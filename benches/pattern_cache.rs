use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sharekit::pattern::{PatternCache, PatternFlags};

const SUBJECT: &[u8] = b"GET /api/v2/users/12345/orders?limit=50 HTTP/1.1";

fn bench_pattern_hit(c: &mut Criterion) {
    let cache = PatternCache::default();
    cache
        .compile_or_get(r"/users/(\d+)/(\w+)", PatternFlags::empty())
        .unwrap();
    c.bench_function("pattern_compile_or_get_hit", |b| {
        b.iter(|| {
            black_box(
                cache
                    .compile_or_get(black_box(r"/users/(\d+)/(\w+)"), PatternFlags::empty())
                    .unwrap(),
            )
        })
    });
}

fn bench_pattern_find(c: &mut Criterion) {
    let cache = PatternCache::default();
    c.bench_function("pattern_find_cached", |b| {
        b.iter(|| {
            black_box(
                cache
                    .find(r"limit=(\d+)", PatternFlags::CASELESS, black_box(SUBJECT))
                    .unwrap(),
            )
        })
    });
}

fn bench_pattern_eviction_churn(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(7);
    let patterns: Vec<String> = (0..256)
        .map(|_| format!(r"/v{}/(\w+)", rng.random_range(0..128u32)))
        .collect();
    c.bench_function("pattern_eviction_churn", |b| {
        b.iter_batched(
            || PatternCache::new(16).unwrap(),
            |cache| {
                for pattern in &patterns {
                    let _ = black_box(cache.compile_or_get(pattern, PatternFlags::empty()));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_pattern_hit,
    bench_pattern_find,
    bench_pattern_eviction_churn
);
criterion_main!(benches);
