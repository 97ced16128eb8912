//! Benchmarks for the compositor: cold decode vs warm cache, and encode
//! cost across raster sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use layerforge_core::compile::{compile, CompiledRequest};
use layerforge_core::composite::{self, cache::DecodeCache};
use layerforge_testutil::{request, swatch_layer};

fn stacked_request(size: u32, layers: usize) -> CompiledRequest {
    let layers = (0..layers)
        .map(|i| swatch_layer(&format!("L{i}"), i as u32, 2, (size, size)))
        .collect();
    compile(request("bench-composite", (size, size), 1, layers)).expect("bench request compiles")
}

fn bench_render_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite/render");

    for size in [64u32, 256, 512] {
        let compiled = stacked_request(size, 5);
        let assignment = vec![0; 5];
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("size", size), &compiled, |b, compiled| {
            let cache = DecodeCache::new(u64::from(size) * u64::from(size) * 64);
            // Warm the cache once; steady-state rendering is the hot path.
            composite::render(compiled, &assignment, &cache).expect("renders");
            b.iter(|| composite::render(compiled, &assignment, &cache).expect("renders"));
        });
    }
    group.finish();
}

fn bench_cold_decode(c: &mut Criterion) {
    let compiled = stacked_request(256, 5);
    let assignment = vec![0; 5];

    c.bench_function("composite/cold_decode", |b| {
        b.iter(|| {
            let cache = DecodeCache::new(256 * 256 * 64);
            composite::render(&compiled, &assignment, &cache).expect("renders")
        });
    });
}

criterion_group!(benches, bench_render_sizes, bench_cold_decode);
criterion_main!(benches);
