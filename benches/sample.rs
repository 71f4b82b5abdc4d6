use std::convert::Infallible;

use adaptive_metropolis::{
    CholeskyFactor, CovarianceMatrix, Estimate, EstimateRegistry, MetropolisSampler,
    MetropolisSettings, NullReporter, ObjectiveEvaluator, ObjectiveScore, Proposal, RngStream,
};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

struct StandardNormal(Vec<f64>);

impl ObjectiveEvaluator for StandardNormal {
    type Err = Infallible;

    fn set_parameter_values(&mut self, values: &[f64]) -> Result<(), Self::Err> {
        self.0.clear();
        self.0.extend_from_slice(values);
        Ok(())
    }

    fn run_full_iteration(&mut self) -> Result<(), Self::Err> {
        Ok(())
    }

    fn objective_score(&mut self) -> Result<ObjectiveScore, Self::Err> {
        let nll = self.0.iter().map(|x| 0.5 * x * x).sum();
        Ok(ObjectiveScore::from_likelihood(nll))
    }
}

fn correlated(dim: usize) -> CovarianceMatrix {
    CovarianceMatrix::from_fn(dim, |i, j| if i == j { 1. } else { 0.3 })
}

fn labels(dim: usize) -> Vec<String> {
    (0..dim).map(|i| format!("x{i}")).collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    for dim in [10, 100] {
        let cov = correlated(dim);
        let labels = labels(dim);
        c.bench_function(&format!("factorize {dim}"), |b| {
            b.iter(|| CholeskyFactor::factorize(black_box(&cov), &labels).unwrap())
        });

        let factor = CholeskyFactor::factorize(&cov, &labels).unwrap();
        let active = vec![true; dim];
        let mut candidate = vec![0.; dim];
        let mut rng = RngStream::new(ChaCha8Rng::seed_from_u64(42));
        for (name, proposal) in [
            ("normal", Proposal::Normal),
            ("t", Proposal::StudentT { df: 4. }),
        ] {
            c.bench_function(&format!("proposal {name} {dim}"), |b| {
                b.iter(|| {
                    proposal.fill_candidate(&mut rng, &factor, 0.5, &active, &mut candidate);
                    black_box(&candidate);
                })
            });
        }
    }

    c.bench_function("chain 1000 jumps 10", |b| {
        b.iter_batched(
            || {
                let registry: EstimateRegistry = (0..10)
                    .map(|i| Estimate::new(format!("x{i}"), 0., -100., 100.))
                    .collect();
                let settings = MetropolisSettings {
                    length: 1000,
                    ..Default::default()
                };
                let rng = RngStream::new(ChaCha8Rng::seed_from_u64(42));
                let sampler = MetropolisSampler::new(settings, correlated(10), rng).unwrap();
                (registry, sampler)
            },
            |(mut registry, mut sampler)| {
                sampler
                    .run(&mut registry, &mut StandardNormal(vec![]), &mut NullReporter)
                    .unwrap();
                sampler.into_chain()
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
