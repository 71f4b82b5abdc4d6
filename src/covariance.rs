//! Conditioning of the proposal covariance matrix.
//!
//! A covariance matrix taken from an optimiser or estimated from a chain can
//! contain near-perfect correlations and tiny variances, which make the
//! proposal degenerate. Conditioning clamps both to configurable bounds.

use serde::{Deserialize, Serialize};

use crate::{chain::Chain, math::CovarianceMatrix};

/// How small non-zero variances are raised to the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceAdjustment {
    /// Scale the whole row and column so the variance reaches the minimum.
    Covariance,
    /// Only replace the variance, keeping the covariances.
    #[default]
    Correlation,
    /// Leave the matrix untouched, including correlations.
    None,
}

/// Settings for [`condition_covariance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionerOptions {
    pub max_correlation: f64,
    pub method: CovarianceAdjustment,
    /// Minimum non-zero variance as a fraction of the range between the bounds.
    pub min_variance_fraction: f64,
}

impl Default for ConditionerOptions {
    fn default() -> Self {
        Self {
            max_correlation: 0.8,
            method: CovarianceAdjustment::default(),
            min_variance_fraction: 1e-4,
        }
    }
}

/// Clamp correlations and small variances of `covariance` in place.
///
/// `ranges` holds `upper - lower` for every estimate in matrix order.
/// Correlations are computed from the matrix as it was passed in, so the
/// order in which pairs are visited does not matter.
pub fn condition_covariance(
    covariance: &mut CovarianceMatrix,
    ranges: &[f64],
    options: &ConditionerOptions,
) {
    if options.method == CovarianceAdjustment::None {
        return;
    }
    let dim = covariance.dim();
    assert!(ranges.len() == dim);

    let original = covariance.clone();
    let max_corr = options.max_correlation;
    for i in 0..dim {
        for j in (i + 1)..dim {
            let scale = (original[(i, i)] * original[(j, j)]).sqrt();
            let corr = original[(i, j)] / scale;
            if corr > max_corr {
                covariance[(i, j)] = max_corr * scale;
                covariance[(j, i)] = max_corr * scale;
                log::debug!("Clamped correlation {corr} between rows {i} and {j}");
            } else if corr < -max_corr {
                covariance[(i, j)] = -max_corr * scale;
                covariance[(j, i)] = -max_corr * scale;
                log::debug!("Clamped correlation {corr} between rows {i} and {j}");
            } else {
                // keep the matrix symmetric even if the input was not
                covariance[(j, i)] = covariance[(i, j)];
            }
        }
    }

    for (i, &range) in ranges.iter().enumerate() {
        let var = covariance[(i, i)];
        let min_var = options.min_variance_fraction * range;
        // non-positive variances are left for the factorization to reject
        if !(var > 0. && var < min_var) {
            continue;
        }
        match options.method {
            CovarianceAdjustment::Covariance => {
                let multiplier = (min_var / var).sqrt();
                log::debug!("Scaling row and column {i} by {multiplier}");
                for j in 0..dim {
                    covariance[(i, j)] *= multiplier;
                }
                for j in 0..dim {
                    covariance[(j, i)] *= multiplier;
                }
                // the diagonal was scaled twice, which is exactly min_var / var
                covariance[(i, i)] = min_var;
            }
            CovarianceAdjustment::Correlation => {
                log::debug!("Raising variance of row {i} from {var} to {min_var}");
                covariance[(i, i)] = min_var;
            }
            CovarianceAdjustment::None => unreachable!(),
        }
    }
}

/// Sample covariance of the parameter values recorded in `chain`.
///
/// The most recent link is left out. Returns `None` if fewer than two links
/// remain.
pub fn empirical_covariance(chain: &Chain) -> Option<CovarianceMatrix> {
    let links = chain.links();
    let n_iter = links.len().checked_sub(1)?;
    if n_iter < 2 {
        return None;
    }
    let links = &links[..n_iter];
    let n_params = links[0].values.len();

    let mut mean = vec![0f64; n_params];
    for link in links {
        for (mean, val) in mean.iter_mut().zip(link.values.iter()) {
            *mean += val;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n_iter as f64);

    let mut out = CovarianceMatrix::zeros(n_params);
    let denom = (n_iter - 1) as f64;
    for i in 0..n_params {
        for j in 0..=i {
            let sxy: f64 = links
                .iter()
                .map(|link| (link.values[i] - mean[i]) * (link.values[j] - mean[j]))
                .sum();
            out[(i, j)] = sxy / denom;
            out[(j, i)] = sxy / denom;
        }
    }
    Some(out)
}
