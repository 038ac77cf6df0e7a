//! Structured Cholesky (LDLt) factorization of a semiseparable matrix.
//!
//! `K = (I + L) . diag(d) . (I + L)^T` where the strictly lower triangular `L` is itself
//! semiseparable: `L[n, m] = U[n, :] . (P[m, :] * ... * P[n-1, :]) . W[m, :]` for `n > m`.
//! Only `d` (n,) and `W` (n, J) are computed, in O(n.J^2) time.

use crate::errors::{GpError, Result};
use crate::utils::{check_generators, check_same_shape};

use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Result of the structured Cholesky factorization
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct Factorization<F: Float> {
    /// Diagonal of the factorization (n,), strictly positive
    pub d: Array1<F>,
    /// Normalized generators (n, J)
    pub w: Array2<F>,
}

impl<F: Float> Factorization<F> {
    /// Log determinant of the factorized matrix: `sum(log(d))`
    pub fn log_determinant(&self) -> F {
        self.d.mapv(|v| v.ln()).sum()
    }

    /// Matrix size n
    pub fn size(&self) -> usize {
        self.d.len()
    }
}

/// Factorize the semiseparable matrix `(a, U, V, P)`.
///
/// The recursion maintains a symmetric (J, J) matrix `S`:
///
/// ```text
/// d[0] = a[0], W[0] = V[0] / d[0]
/// S = P[n-1] P[n-1]^T * (S + d[n-1] W[n-1] W[n-1]^T)
/// d[n] = a[n] - U[n] S U[n]^T
/// W[n] = (V[n] - U[n] S) / d[n]
/// ```
///
/// # Errors
///
/// * [GpError::InputShapeError]: when shapes are inconsistent
/// * [GpError::NonPositiveDefiniteError]: at the first non positive (or NaN) `d[n]`
pub fn factor<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix1>,
    u: &ArrayBase<impl Data<Elem = F>, Ix2>,
    v: &ArrayBase<impl Data<Elem = F>, Ix2>,
    p: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Factorization<F>> {
    let n = a.len();
    check_generators(n, u, p)?;
    check_same_shape("V", u, v)?;
    let rank = u.ncols();

    let mut d = Array1::zeros(n);
    let mut w = Array2::zeros((n, rank));
    let mut s = Array2::<F>::zeros((rank, rank));

    d[0] = check_pivot(0, a[0])?;
    w.row_mut(0).assign(&v.row(0).mapv(|vi| vi / d[0]));
    for i in 1..n {
        let prev_d = d[i - 1];
        let prev_w = w.row(i - 1);
        let pi = p.row(i - 1);
        Zip::indexed(&mut s).for_each(|(k, l), skl| {
            *skl = pi[k] * pi[l] * (*skl + prev_d * prev_w[k] * prev_w[l]);
        });

        let ui = u.row(i);
        let us = ui.dot(&s);
        let di = check_pivot(i, a[i] - us.dot(&ui))?;
        d[i] = di;
        Zip::from(w.row_mut(i))
            .and(v.row(i))
            .and(&us)
            .for_each(|wi, &vi, &usi| *wi = (vi - usi) / di);
    }

    Ok(Factorization { d, w })
}

fn check_pivot<F: Float>(row: usize, value: F) -> Result<F> {
    if value.is_nan() || value <= F::zero() {
        Err(GpError::NonPositiveDefiniteError {
            row,
            value: value.to_f64().unwrap_or(f64::NAN),
        })
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::kernels::Coefficients;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, array};

    #[test]
    fn test_factor_real_scenario() {
        let coefs = Coefficients::real(array![1.0], array![0.5]).unwrap();
        let x = array![0., 1., 2., 3.];
        let mat = build(&x, &Array::from_elem(4, 1e-6), &coefs).unwrap();
        let fact = factor(&mat.a, &mat.u, &mat.v, &mat.p).unwrap();

        // hand computed scalar recursion (J = 1, U = V = 1)
        let a0 = 1.000001;
        let e = f64::exp(-0.5);
        let mut d = vec![a0];
        let mut w = vec![1. / a0];
        let mut s = 0.;
        for i in 1..4 {
            s = e * e * (s + d[i - 1] * w[i - 1] * w[i - 1]);
            d.push(a0 - s);
            w.push((1. - s) / d[i]);
        }

        assert_abs_diff_eq!(fact.d[0], 1.000001, epsilon = 1e-15);
        assert_abs_diff_eq!(fact.d, Array::from_vec(d), epsilon = 1e-12);
        assert_abs_diff_eq!(
            fact.w.column(0).to_owned(),
            Array::from_vec(w),
            epsilon = 1e-12
        );
        // d[1] = a - e^2 / a
        assert_abs_diff_eq!(fact.d[1], a0 - e * e / a0, epsilon = 1e-12);
    }

    #[test]
    fn test_factor_single_sample() {
        let coefs = Coefficients::new(
            array![1.5],
            array![0.5],
            array![0.7],
            array![0.2],
            array![1.0],
            array![3.0],
        )
        .unwrap();
        let mat = build(&array![0.3], &array![0.1], &coefs).unwrap();
        let fact = factor(&mat.a, &mat.u, &mat.v, &mat.p).unwrap();
        assert_abs_diff_eq!(fact.d, array![2.3], epsilon = 1e-14);
        assert_abs_diff_eq!(fact.w.row(0), mat.v.row(0).mapv(|v| v / 2.3), epsilon = 1e-14);
        assert_abs_diff_eq!(fact.log_determinant(), f64::ln(2.3), epsilon = 1e-14);
    }

    #[test]
    fn test_factor_not_positive_definite() {
        let coefs = Coefficients::real(array![-2.0], array![0.1]).unwrap();
        let x = array![0., 0.5, 1.0, 1.5];
        let mat = build(&x, &Array::zeros(4), &coefs).unwrap();
        let res = factor(&mat.a, &mat.u, &mat.v, &mat.p);
        assert!(matches!(
            res,
            Err(GpError::NonPositiveDefiniteError { row: 0, .. })
        ));
    }

    #[test]
    fn test_factor_breaks_down_after_first_row() {
        // positive diagonal but off diagonal terms larger than the diagonal
        let a = array![1.0, 1.0, 1.0];
        let u = array![[2.0], [2.0], [2.0]];
        let v = array![[1.0], [1.0], [1.0]];
        let p = array![[1.0], [1.0]];
        match factor(&a, &u, &v, &p) {
            Err(GpError::NonPositiveDefiniteError { row, value }) => {
                assert_eq!(row, 1);
                assert_abs_diff_eq!(value, -3.0, epsilon = 1e-14);
            }
            _ => panic!("factorization should fail"),
        }
    }

    #[test]
    fn test_factor_nan_pivot() {
        let u = array![[0.5], [0.5], [0.5]];
        let p = array![[0.9], [0.9]];
        let res = factor(&array![f64::NAN, 1.0, 1.0], &u, &u, &p);
        assert!(matches!(
            res,
            Err(GpError::NonPositiveDefiniteError { row: 0, value }) if value.is_nan()
        ));
        let res = factor(&array![1.0, 1.0, f64::NAN], &u, &u, &p);
        assert!(matches!(
            res,
            Err(GpError::NonPositiveDefiniteError { row: 2, value }) if value.is_nan()
        ));
    }

    #[test]
    fn test_factor_shape_errors() {
        let a = array![1.0, 1.0];
        let u = array![[1.0], [1.0]];
        assert!(matches!(
            factor(&a, &u, &array![[1.0, 0.0], [1.0, 0.0]], &array![[0.5]]),
            Err(GpError::InputShapeError(_))
        ));
        assert!(matches!(
            factor(&a, &u, &u, &array![[0.5], [0.5]]),
            Err(GpError::InputShapeError(_))
        ));
    }
}
