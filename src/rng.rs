//! Random variates consumed by the sampler.
//!
//! The sampler draws from a single ordered stream so that a given seed
//! reproduces the chain exactly. Per iteration the order is: one normal per
//! estimate, one chi-squared per estimate for t proposals, and finally a
//! uniform if the Metropolis test needs one.

use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};

/// Source of the random numbers used by proposals and the accept/reject test.
pub trait RandomStream {
    /// A standard normal variate.
    fn normal(&mut self) -> f64;

    /// A chi-squared variate with `df` degrees of freedom.
    fn chi_squared(&mut self, df: f64) -> f64;

    /// A uniform variate in `[0, 1)`.
    fn uniform(&mut self) -> f64;
}

/// [`RandomStream`] backed by any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngStream<R: Rng> {
    rng: R,
}

impl<R: Rng> RngStream<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn inner(&self) -> &R {
        &self.rng
    }

    pub fn into_inner(self) -> R {
        self.rng
    }
}

impl<R: Rng> RandomStream for RngStream<R> {
    fn normal(&mut self) -> f64 {
        StandardNormal.sample(&mut self.rng)
    }

    fn chi_squared(&mut self, df: f64) -> f64 {
        match ChiSquared::new(df) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => f64::NAN,
        }
    }

    fn uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

impl<S: RandomStream + ?Sized> RandomStream for &mut S {
    fn normal(&mut self) -> f64 {
        (**self).normal()
    }

    fn chi_squared(&mut self, df: f64) -> f64 {
        (**self).chi_squared(df)
    }

    fn uniform(&mut self) -> f64 {
        (**self).uniform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn deterministic() {
        let mut a = RngStream::new(ChaCha8Rng::seed_from_u64(42));
        let mut b = RngStream::new(ChaCha8Rng::seed_from_u64(42));
        let draws_a: Vec<f64> = (0..10)
            .map(|_| a.normal() + a.chi_squared(4.) + a.uniform())
            .collect();
        let draws_b: Vec<f64> = (0..10)
            .map(|_| b.normal() + b.chi_squared(4.) + b.uniform())
            .collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn ranges() {
        let mut stream = RngStream::new(ChaCha8Rng::seed_from_u64(1));
        for _ in 0..1000 {
            let u = stream.uniform();
            assert!((0. ..1.).contains(&u));
            assert!(stream.chi_squared(3.) >= 0.);
        }
        assert!(stream.chi_squared(-1.).is_nan());
    }

    #[test]
    fn moments() {
        let mut stream = RngStream::new(ChaCha8Rng::seed_from_u64(7));
        let n = 20_000;
        let mean_normal = (0..n).map(|_| stream.normal()).sum::<f64>() / n as f64;
        let mean_chi = (0..n).map(|_| stream.chi_squared(4.)).sum::<f64>() / n as f64;
        assert!(mean_normal.abs() < 0.05);
        assert!((mean_chi - 4.).abs() < 0.15);
    }
}
