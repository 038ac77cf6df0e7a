//! Dense expansions used to validate semiseparable computations.
//!
//! Everything here is O(n^2) (or worse) and should only be used on small problems.

use crate::errors::Result;
use crate::factor::Factorization;
use crate::utils::{check_generators, check_same_shape};

use linfa::Float;
use linfa_linalg::cholesky::*;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2, Zip};

/// Expand the semiseparable matrix `(a, U, V, P)` into a dense (n, n) matrix.
///
/// `K[n, n] = a[n]` and for `n > m`: `K[n, m] = K[m, n] = U[n] . (P[m] * ... * P[n-1]) . V[m]`
pub fn to_dense<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix1>,
    u: &ArrayBase<impl Data<Elem = F>, Ix2>,
    v: &ArrayBase<impl Data<Elem = F>, Ix2>,
    p: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    let n = a.len();
    check_generators(n, u, p)?;
    check_same_shape("V", u, v)?;

    let mut k = Array2::zeros((n, n));
    for m in 0..n {
        k[[m, m]] = a[m];
        let mut prod = Array1::<F>::ones(u.ncols());
        for i in (m + 1)..n {
            prod *= &p.row(i - 1);
            let kim = weighted_dot(&u.row(i), &prod, &v.row(m));
            k[[i, m]] = kim;
            k[[m, i]] = kim;
        }
    }
    Ok(k)
}

/// Rebuild `(I + L) . diag(d) . (I + L)^T` from the factorization of a semiseparable matrix
/// with generators `U` and propagators `P`.
pub fn factor_to_dense<F: Float>(
    u: &ArrayBase<impl Data<Elem = F>, Ix2>,
    p: &ArrayBase<impl Data<Elem = F>, Ix2>,
    factorization: &Factorization<F>,
) -> Result<Array2<F>> {
    let n = factorization.size();
    check_generators(n, u, p)?;
    check_same_shape("W", u, &factorization.w)?;

    let mut il = Array2::<F>::eye(n);
    for m in 0..n {
        let mut prod = Array1::<F>::ones(u.ncols());
        for i in (m + 1)..n {
            prod *= &p.row(i - 1);
            il[[i, m]] = weighted_dot(&u.row(i), &prod, &factorization.w.row(m));
        }
    }
    let ild = &il * &factorization.d;
    Ok(ild.dot(&il.t()))
}

/// Log determinant of a dense symmetric positive definite matrix
/// computed with a Cholesky decomposition.
///
/// # Errors
///
/// * [crate::GpError::LinalgError]: when the matrix is not square or not positive definite
pub fn dense_log_determinant<F: Float>(k: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<F> {
    let l = k.cholesky()?;
    Ok(F::cast(2.) * l.diag().mapv(|v| v.ln()).sum())
}

fn weighted_dot<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix1>,
    weights: &Array1<F>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> F {
    let mut acc = F::zero();
    Zip::from(x)
        .and(weights)
        .and(y)
        .for_each(|&xi, &wi, &yi| acc += xi * wi * yi);
    acc
}
