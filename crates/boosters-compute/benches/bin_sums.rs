//! Component benchmarks: histogram and update throughput per backend.
//!
//! Run with: `cargo bench --bench bin_sums`

use std::time::Duration;

use boosters_compute::{
    pack, ApplyUpdateRequest, Backend, BinSums, BoostingBinSumsRequest, FloatSlice, FloatWidth, NumericConfig,
    ObjectiveBinding, Packing, Targets, UIntWidth,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_SAMPLES: usize = 100_000;
const BACKENDS: [Backend; 3] = [Backend::Scalar, Backend::Simd128, Backend::Simd256];

fn criterion_config() -> Criterion {
    Criterion::default()
        .configure_from_args()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(5))
        .sample_size(20)
}

fn f32_config() -> NumericConfig {
    NumericConfig::builder()
        .float_width(FloatWidth::F32)
        .uint_width(UIntWidth::U32)
        .build()
        .unwrap()
}

fn random_f32(n: usize, seed: u64, lo: f32, hi: f32) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(lo..hi)).collect()
}

fn bench_boosting(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let grad_hess = random_f32(2 * N_SAMPLES, 1, -1.0, 1.0);
    let weights = random_f32(N_SAMPLES, 2, 0.5, 1.5);

    let mut group = c.benchmark_group("component/bin_sums_boosting");
    group.throughput(Throughput::Elements(N_SAMPLES as u64));

    for n_bins in [4usize, 64, 1024] {
        let bins: Vec<usize> = (0..N_SAMPLES).map(|_| rng.gen_range(0..n_bins)).collect();
        let packing = Packing::for_bins(n_bins, 32);
        let packed = pack::<u32>(&bins, packing).unwrap();

        for backend in BACKENDS {
            let binding = ObjectiveBinding::create(&f32_config(), "log_loss", backend).unwrap();
            let mut sums = BinSums::<f32>::new(n_bins, 1, true);
            group.bench_with_input(BenchmarkId::new(backend.to_string(), n_bins), &packed, |b, packed| {
                b.iter(|| {
                    sums.clear();
                    let mut request = BoostingBinSumsRequest::builder()
                        .hessian(true)
                        .packing(packing)
                        .n_samples(N_SAMPLES)
                        .packed(&packed[..])
                        .grad_hess(&grad_hess[..])
                        .weights(&weights[..])
                        .bins(sums.as_mut())
                        .build();
                    binding.bin_sums_boosting(black_box(&mut request)).unwrap();
                });
            });
        }
    }

    group.finish();
}

fn bench_apply_update(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let targets = random_f32(N_SAMPLES, 3, 0.0, 10.0);
    let update = random_f32(64, 4, -0.01, 0.01);
    let slots: Vec<usize> = (0..N_SAMPLES).map(|_| rng.gen_range(0..64)).collect();
    let packed = pack::<u32>(&slots, Packing::Bits(6)).unwrap();

    let mut group = c.benchmark_group("component/apply_update");
    group.throughput(Throughput::Elements(N_SAMPLES as u64));

    for objective in ["rmse", "poisson_deviance"] {
        for backend in BACKENDS {
            let binding = ObjectiveBinding::create(&f32_config(), objective, backend).unwrap();
            let hessian = binding.info().has_hessian;
            let mut scores = vec![0.0f32; N_SAMPLES];
            let mut grad_hess = vec![0.0f32; 2 * N_SAMPLES];
            group.bench_function(BenchmarkId::new(objective, backend.to_string()), |b| {
                b.iter(|| {
                    let mut request = ApplyUpdateRequest::builder()
                        .hessian(hessian)
                        .calc_metric(true)
                        .n_samples(N_SAMPLES)
                        .packing(Packing::Bits(6))
                        .packed(&packed[..])
                        .update(&update[..])
                        .targets(Targets::Continuous(FloatSlice::F32(&targets)))
                        .scores(&mut scores[..])
                        .grad_hess(&mut grad_hess[..])
                        .build();
                    binding.apply_update(black_box(&mut request)).unwrap();
                    black_box(request.metric.value)
                });
            });
        }
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_boosting, bench_apply_update
}
criterion_main!(benches);
