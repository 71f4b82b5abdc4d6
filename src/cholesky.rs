use thiserror::Error;

use crate::math::CovarianceMatrix;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CholeskyError {
    /// The pivot of a row was not positive, so the matrix is not positive definite.
    #[error(
        "Cholesky decomposition failed, singular matrix found for row and column {} \
         (parameter {label}): accumulated sum {sum} >= diagonal value {value}",
        .row + 1
    )]
    NotPositiveDefinite {
        row: usize,
        label: String,
        sum: f64,
        value: f64,
    },
    #[error("Covariance matrix has {dim} rows but {labels} parameter labels were given")]
    LabelMismatch { dim: usize, labels: usize },
}

/// Lower triangular `L` with `L Lᵗ` equal to the factorized covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyFactor {
    lower: CovarianceMatrix,
}

impl CholeskyFactor {
    /// Factorize `covariance`.
    ///
    /// `labels` names the parameter of every row and is only used for the
    /// error message.
    pub fn factorize<S: AsRef<str>>(
        covariance: &CovarianceMatrix,
        labels: &[S],
    ) -> Result<Self, CholeskyError> {
        let dim = covariance.dim();
        if labels.len() != dim {
            return Err(CholeskyError::LabelMismatch {
                dim,
                labels: labels.len(),
            });
        }
        let mut lower = CovarianceMatrix::zeros(dim);

        for i in 0..dim {
            let sum: f64 = lower.row(i)[..i].iter().map(|v| v * v).sum();
            let value = covariance[(i, i)];
            // Written so that a NaN pivot also fails
            if !(value - sum > 0.) {
                return Err(CholeskyError::NotPositiveDefinite {
                    row: i,
                    label: labels[i].as_ref().to_string(),
                    sum,
                    value,
                });
            }
            let pivot = (value - sum).sqrt();
            lower[(i, i)] = pivot;

            for j in (i + 1)..dim {
                let sum: f64 = lower.row(j)[..i]
                    .iter()
                    .zip(lower.row(i)[..i].iter())
                    .map(|(a, b)| a * b)
                    .sum();
                lower[(j, i)] = (covariance[(j, i)] - sum) / pivot;
            }
        }

        log::debug!("Factorized covariance matrix of dimension {dim}");
        Ok(Self { lower })
    }

    pub fn dim(&self) -> usize {
        self.lower.dim()
    }

    pub fn lower(&self) -> &CovarianceMatrix {
        &self.lower
    }

    /// Reconstruct the covariance matrix `L Lᵗ`.
    pub fn reconstruct(&self) -> CovarianceMatrix {
        self.lower.mul_transpose_self()
    }
}
