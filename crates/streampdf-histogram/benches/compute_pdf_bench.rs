use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use streampdf_histogram::compute_pdf;

fn bench_compute_pdf(c: &mut Criterion) {
    let shape = [64usize, 64, 64];
    let slice = shape[1] * shape[2];
    let mut rng = StdRng::seed_from_u64(42);
    let data: Vec<f64> = (0..shape[0] * slice).map(|_| rng.gen_range(0.0..1.0)).collect();

    let mut group = c.benchmark_group("compute_pdf");
    for nbins in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(nbins), &nbins, |b, &nbins| {
            b.iter(|| {
                compute_pdf(
                    black_box(&data),
                    black_box(&shape),
                    0,
                    shape[0],
                    nbins,
                    0.0,
                    1.0,
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compute_pdf);
criterion_main!(benches);
