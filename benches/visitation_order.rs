// Run with:  cargo bench --bench visitation_order

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hub75_bitplane::schedule::compute_visitation_order;
use std::hint::black_box;

fn visitation_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("visitation_order");

    for bits in [3u8, 5, 7, 8] {
        group.throughput(Throughput::Elements(
            hub75_bitplane::compute_frame_count(bits) as u64,
        ));
        group.bench_with_input(BenchmarkId::from_parameter(bits), &bits, |b, &bits| {
            b.iter(|| {
                for plane in compute_visitation_order(black_box(bits)) {
                    black_box(plane);
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, visitation_order);
criterion_main!(benches);
