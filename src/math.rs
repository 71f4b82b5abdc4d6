use std::ops::{Index, IndexMut};

use itertools::izip;
use serde::{Deserialize, Serialize};

/// Dense square matrix stored row-major.
///
/// Used for the proposal covariance and for its Cholesky factor. Fixed
/// estimates keep their rows and columns, so the dimension is always the
/// total number of estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    dim: usize,
    data: Vec<f64>,
}

impl CovarianceMatrix {
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            data: vec![0f64; dim * dim],
        }
    }

    pub fn identity(dim: usize) -> Self {
        let mut out = Self::zeros(dim);
        for i in 0..dim {
            out[(i, i)] = 1.;
        }
        out
    }

    pub fn from_diagonal(diag: &[f64]) -> Self {
        let mut out = Self::zeros(diag.len());
        for (i, &val) in diag.iter().enumerate() {
            out[(i, i)] = val;
        }
        out
    }

    /// Build a matrix from its rows.
    ///
    /// Returns `None` if any row does not have as many entries as there are rows.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Option<Self> {
        let dim = rows.len();
        let mut data = Vec::with_capacity(dim * dim);
        for row in rows {
            let row = row.as_ref();
            if row.len() != dim {
                return None;
            }
            data.extend_from_slice(row);
        }
        Some(Self { dim, data })
    }

    pub fn from_fn(dim: usize, mut func: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(dim * dim);
        for i in 0..dim {
            for j in 0..dim {
                data.push(func(i, j));
            }
        }
        Self { dim, data }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.dim.max(1))
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.dim).map(|i| self[(i, i)]).collect()
    }

    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|val| *val *= factor);
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.dim).all(|i| (0..i).all(|j| self[(i, j)] == self[(j, i)]))
    }

    pub fn is_all_finite(&self) -> bool {
        self.data.iter().all(|val| val.is_finite())
    }

    /// Correlation between rows `i` and `j`.
    pub fn correlation(&self, i: usize, j: usize) -> f64 {
        self[(i, j)] / (self[(i, i)] * self[(j, j)]).sqrt()
    }

    /// Write `self * x` to `out`.
    pub fn mul_vec(&self, x: &[f64], out: &mut [f64]) {
        assert!(x.len() == self.dim);
        assert!(out.len() == self.dim);
        for (row, out) in self.rows().zip(out.iter_mut()) {
            *out = vector_dot(row, x);
        }
    }

    /// Compute `self * selfᵗ`.
    pub fn mul_transpose_self(&self) -> CovarianceMatrix {
        Self::from_fn(self.dim, |i, j| vector_dot(self.row(i), self.row(j)))
    }
}

impl Index<(usize, usize)> for CovarianceMatrix {
    type Output = f64;

    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        &self.data[i * self.dim + j]
    }
}

impl IndexMut<(usize, usize)> for CovarianceMatrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        &mut self.data[i * self.dim + j]
    }
}

#[inline]
pub(crate) fn vector_dot(a: &[f64], b: &[f64]) -> f64 {
    assert!(a.len() == b.len());
    izip!(a, b).map(|(a, b)| a * b).sum()
}

/// Smoothly bound `x` away from zero.
///
/// Values at or above `delta` pass through unchanged, smaller values are
/// mapped into `(0, delta)`.
pub fn zero_fun(x: f64, delta: f64) -> f64 {
    if x >= delta {
        x
    } else {
        delta / (2. - x / delta)
    }
}
