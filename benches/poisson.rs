use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use linfa_uoi::{Fit, Poisson, Solver, UoiPoisson};
use ndarray::{Array1, Array2};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::{Distribution, Normal, Poisson as PoissonDist};
use ndarray_rand::RandomExt;
use rand_isaac::Isaac64Rng;

fn poisson_data(n_samples: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = Isaac64Rng::seed_from_u64(40);
    let x = Array2::random_using((n_samples, n_features), Normal::new(0., 0.3).unwrap(), &mut rng);
    let beta = Array1::from_shape_fn(n_features, |j| if j % 3 == 0 { 0.5 } else { 0. });
    let y = x
        .dot(&beta)
        .mapv(|eta: f64| PoissonDist::new(eta.exp()).unwrap().sample(&mut rng));
    (x, y)
}

fn solver_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("poisson");
    group.sample_size(10);

    for n_samples in [100, 1000, 10000] {
        let data = poisson_data(n_samples, 20);
        for (name, solver) in [("irls", Solver::CoordinateDescent), ("lbfgs", Solver::Lbfgs)] {
            let params = Poisson::params().alpha(1.0).l1_ratio(0.5).solver(solver);
            group.bench_with_input(
                BenchmarkId::new(name, n_samples),
                &data,
                |b, (x, y)| b.iter(|| black_box(params.fit(x, y))),
            );
        }
    }

    group.finish();
}

fn uoi_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("uoi_poisson");
    group.sample_size(10);

    let data = poisson_data(500, 10);
    for n_boots in [4, 16] {
        let params = UoiPoisson::params()
            .n_boots_sel(n_boots)
            .n_boots_est(n_boots)
            .n_lambdas(16)
            .seed(42);
        group.bench_with_input(
            BenchmarkId::from_parameter(n_boots),
            &data,
            |b, (x, y)| b.iter(|| black_box(params.fit(x, y))),
        );
    }

    group.finish();
}

criterion_group!(benches, solver_bench, uoi_bench);
criterion_main!(benches);
