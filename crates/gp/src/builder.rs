//! Compressed (semiseparable) representation of the covariance matrix.
//!
//! For sorted samples `x`, the covariance matrix `K` of an exponential-sum kernel is
//! represented by a diagonal `a` (n,), generators `U`, `V` (n, J) and propagators `P` (n-1, J)
//! such that for `n > m`:
//!
//! `K[n, m] = U[n, :] . (P[m, :] * ... * P[n-1, :]) . V[m, :]`
//!
//! Row ordering of the columns: real terms, then complex cosine parts, then complex sine parts.

use crate::dense;
use crate::errors::{GpError, Result};
use crate::factor::{Factorization, factor};
use crate::kernels::Coefficients;
use crate::matmul::matmul;

use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2, Zip, s};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Semiseparable representation `(a, U, V, P)` of a covariance matrix
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct SemiseparableMatrix<F: Float> {
    /// Diagonal (n,)
    pub a: Array1<F>,
    /// Left generators (n, J)
    pub u: Array2<F>,
    /// Right generators (n, J)
    pub v: Array2<F>,
    /// Propagators between consecutive samples (n-1, J)
    pub p: Array2<F>,
}

impl<F: Float> SemiseparableMatrix<F> {
    /// Build the representation of `K = k(x, x) + diag(diag)` from kernel `coefficients`,
    /// see [build]
    pub fn new(
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
        diag: &ArrayBase<impl Data<Elem = F>, Ix1>,
        coefficients: &Coefficients<F>,
    ) -> Result<Self> {
        build(x, diag, coefficients)
    }

    /// Matrix size n
    pub fn size(&self) -> usize {
        self.a.len()
    }

    /// Semiseparable rank J
    pub fn rank(&self) -> usize {
        self.u.ncols()
    }

    /// Structured Cholesky factorization, see [factor]
    pub fn factor(&self) -> Result<Factorization<F>> {
        factor(&self.a, &self.u, &self.v, &self.p)
    }

    /// Product `K.z`, see [matmul]
    pub fn matmul(&self, z: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        matmul(&self.a, &self.u, &self.v, &self.p, z)
    }

    /// Dense (n, n) matrix, see [dense::to_dense]
    pub fn to_dense(&self) -> Result<Array2<F>> {
        dense::to_dense(&self.a, &self.u, &self.v, &self.p)
    }
}

/// Check that samples are strictly increasing
pub(crate) fn check_sorted<F: Float>(x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
    match x
        .windows(2)
        .into_iter()
        .position(|w| w[1].partial_cmp(&w[0]) != Some(Ordering::Greater))
    {
        Some(index) => Err(GpError::NonIncreasingSamplesError {
            index,
            next: index + 1,
        }),
        None => Ok(()),
    }
}

/// Build the semiseparable representation `(a, U, V, P)` of the covariance matrix
/// at sorted samples `x` with per-point noise variances `diag`.
///
/// # Errors
///
/// * [GpError::InputShapeError]: if `x` is empty, `x` and `diag` lengths differ
///   or coefficients blocks are inconsistent
/// * [GpError::NonIncreasingSamplesError]: if `x` is not strictly increasing
pub fn build<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix1>,
    diag: &ArrayBase<impl Data<Elem = F>, Ix1>,
    coefficients: &Coefficients<F>,
) -> Result<SemiseparableMatrix<F>> {
    let n = x.len();
    if n == 0 {
        return Err(GpError::InputShapeError(
            "at least one sample is required".to_string(),
        ));
    }
    if diag.len() != n {
        return Err(GpError::InputShapeError(format!(
            "diag length ({}) should match the number of samples ({})",
            diag.len(),
            n
        )));
    }
    coefficients.check()?;
    check_sorted(x)?;

    let Coefficients {
        a_real,
        c_real,
        a_comp,
        b_comp,
        c_comp,
        d_comp,
    } = coefficients;
    let j_real = a_real.len();
    let j_comp = a_comp.len();
    let rank = j_real + 2 * j_comp;

    let variance = coefficients.variance();
    let a = diag.mapv(|d| d + variance);

    let mut u = Array2::zeros((n, rank));
    let mut v = Array2::zeros((n, rank));
    Zip::from(u.rows_mut())
        .and(v.rows_mut())
        .and(x)
        .for_each(|mut u_row, mut v_row, &xi| {
            u_row.slice_mut(s![..j_real]).assign(a_real);
            v_row.slice_mut(s![..j_real]).fill(F::one());
            for j in 0..j_comp {
                let (sd, cd) = (d_comp[j] * xi).sin_cos();
                u_row[j_real + j] = a_comp[j] * cd + b_comp[j] * sd;
                u_row[j_real + j_comp + j] = a_comp[j] * sd - b_comp[j] * cd;
                v_row[j_real + j] = cd;
                v_row[j_real + j_comp + j] = sd;
            }
        });

    let mut p = Array2::zeros((n - 1, rank));
    Zip::from(p.rows_mut())
        .and(x.slice(s![..n - 1]))
        .and(x.slice(s![1..]))
        .for_each(|mut p_row, &x0, &x1| {
            let dx = x1 - x0;
            for j in 0..j_real {
                p_row[j] = F::exp(-c_real[j] * dx);
            }
            for j in 0..j_comp {
                let decay = F::exp(-c_comp[j] * dx);
                p_row[j_real + j] = decay;
                p_row[j_real + j_comp + j] = decay;
            }
        });

    Ok(SemiseparableMatrix { a, u, v, p })
}
