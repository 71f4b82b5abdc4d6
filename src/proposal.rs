use serde::{Deserialize, Serialize};

use crate::{cholesky::CholeskyFactor, rng::RandomStream};

/// Shape of the proposal distribution as given in the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    Normal,
    #[default]
    T,
}

/// The proposal distribution, resolved once from the settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Proposal {
    Normal,
    StudentT { df: f64 },
}

impl Proposal {
    pub fn new(kind: ProposalKind, df: f64) -> Self {
        match kind {
            ProposalKind::Normal => Proposal::Normal,
            ProposalKind::T => Proposal::StudentT { df },
        }
    }

    /// Perturb the active entries of `candidate` by a correlated draw.
    ///
    /// Entries where `active` is false are left unchanged, even though the
    /// draw still consumes random numbers for them.
    pub fn fill_candidate<S: RandomStream + ?Sized>(
        &self,
        rng: &mut S,
        factor: &CholeskyFactor,
        step_size: f64,
        active: &[bool],
        candidate: &mut [f64],
    ) {
        match *self {
            Proposal::Normal => fill_multivariate_normal(rng, factor, step_size, active, candidate),
            Proposal::StudentT { df } => {
                fill_multivariate_t(rng, factor, df, step_size, active, candidate)
            }
        }
    }
}

/// Add `step_size * L z` to the active entries of `candidate`, with `z` standard normal.
pub fn fill_multivariate_normal<S: RandomStream + ?Sized>(
    rng: &mut S,
    factor: &CholeskyFactor,
    step_size: f64,
    active: &[bool],
    candidate: &mut [f64],
) {
    let dim = factor.dim();
    assert!(active.len() == dim);
    assert!(candidate.len() == dim);

    let normals: Vec<f64> = (0..dim).map(|_| rng.normal()).collect();
    let mut increment = vec![0f64; dim];
    factor.lower().mul_vec(&normals, &mut increment);

    for ((value, &is_active), delta) in candidate.iter_mut().zip(active).zip(increment) {
        if is_active {
            *value += delta * step_size;
        }
    }
}

/// Like [`fill_multivariate_normal`] with every normal scaled by `df / chi²_df`.
pub fn fill_multivariate_t<S: RandomStream + ?Sized>(
    rng: &mut S,
    factor: &CholeskyFactor,
    df: f64,
    step_size: f64,
    active: &[bool],
    candidate: &mut [f64],
) {
    let dim = factor.dim();
    assert!(active.len() == dim);
    assert!(candidate.len() == dim);

    let normals: Vec<f64> = (0..dim).map(|_| rng.normal()).collect();
    let scales: Vec<f64> = (0..dim).map(|_| 1. / (rng.chi_squared(df) / df)).collect();
    let scaled: Vec<f64> = normals.iter().zip(&scales).map(|(z, t)| z * t).collect();

    let mut increment = vec![0f64; dim];
    factor.lower().mul_vec(&scaled, &mut increment);

    for ((value, &is_active), delta) in candidate.iter_mut().zip(active).zip(increment) {
        if is_active {
            *value += delta * step_size;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_streams {
    use crate::rng::RandomStream;

    /// Replays fixed values and counts how many of each kind were drawn.
    #[derive(Debug, Default)]
    pub struct FixedStream {
        pub normal: f64,
        pub chi_squared: f64,
        pub uniform: f64,
        pub normals_drawn: usize,
        pub chi_squared_drawn: usize,
        pub uniforms_drawn: usize,
    }

    impl RandomStream for FixedStream {
        fn normal(&mut self) -> f64 {
            self.normals_drawn += 1;
            self.normal
        }

        fn chi_squared(&mut self, _df: f64) -> f64 {
            self.chi_squared_drawn += 1;
            self.chi_squared
        }

        fn uniform(&mut self) -> f64 {
            self.uniforms_drawn += 1;
            self.uniform
        }
    }
}
