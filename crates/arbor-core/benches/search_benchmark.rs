//! Benchmark suite for Arbor build and search.
//!
//! Run with: `cargo bench -p arbor-core`

use arbor_core::{create_index, distance, AnnIndex, MetricKind};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const DIM: usize = 64;
const COUNT: i32 = 5_000;

fn generate_vector(i: i32, dim: usize) -> Vec<f32> {
    (0..dim).map(|d| ((i as f32) * 0.37 + d as f32 * 0.1).sin()).collect()
}

fn populated(metric: MetricKind) -> Box<dyn AnnIndex> {
    let mut index = create_index(metric, DIM).expect("create");
    for i in 0..COUNT {
        index.add_item(i, &generate_vector(i, DIM)).expect("add");
    }
    index
}

fn bench_distance_kernels(c: &mut Criterion) {
    let a = generate_vector(1, 768);
    let b = generate_vector(2, 768);
    let pa: Vec<u64> = (0..12).map(|i| 0x9E37_79B9_7F4A_7C15u64.rotate_left(i)).collect();
    let pb: Vec<u64> = (0..12).map(|i| 0xC2B2_AE3D_27D4_EB4Fu64.rotate_left(i)).collect();

    c.bench_function("angular_squared_768d", |bench| {
        bench.iter(|| black_box(distance::angular_squared(&a, &b)));
    });
    c.bench_function("euclidean_squared_768d", |bench| {
        bench.iter(|| black_box(distance::euclidean_squared(&a, &b)));
    });
    c.bench_function("hamming_packed_768bits", |bench| {
        bench.iter(|| black_box(distance::hamming_packed(&pa, &pb)));
    });
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_10_trees");
    group.sample_size(10);
    for threads in [1, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |bench, &t| {
            bench.iter_batched(
                || populated(MetricKind::Euclidean),
                |mut index| {
                    index.build(10, t).expect("build");
                    index
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_top10");
    for metric in MetricKind::ALL {
        let mut index = populated(metric);
        index.build(10, -1).expect("build");
        let query = generate_vector(COUNT + 1, DIM);

        for search_k in [-1, 1_000] {
            group.bench_with_input(
                BenchmarkId::new(metric.as_str(), search_k),
                &search_k,
                |bench, &k| bench.iter(|| black_box(index.get_nns_by_vector(&query, 10, k))),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_distance_kernels, bench_build, bench_search);
criterion_main!(benches);
