//! Linear systems solving with a structured Cholesky factorization.

use crate::builder::{SemiseparableMatrix, build};
use crate::errors::{GpError, Result};
use crate::factor::Factorization;
use crate::kernels::CoefficientSource;
use crate::utils::{check_generators, check_rhs, check_same_shape};

use linfa::Float;
use log::debug;
use ndarray::{
    Array1, Array2, ArrayBase, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Data, Ix1, Ix2, Zip,
};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Solve `K.x = y` given the factorization `(d, W)` of the semiseparable matrix
/// `K` described by generators `U` and propagators `P`.
///
/// Columns of `y` (n, k) are independent right hand sides and are solved in parallel,
/// each one in O(n.J) time.
///
/// # Errors
///
/// * [GpError::InputShapeError]: when shapes are inconsistent
pub fn solve<F: Float>(
    u: &ArrayBase<impl Data<Elem = F>, Ix2>,
    p: &ArrayBase<impl Data<Elem = F>, Ix2>,
    d: &ArrayBase<impl Data<Elem = F>, Ix1>,
    w: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    let n = d.len();
    check_generators(n, u, p)?;
    check_same_shape("W", u, w)?;
    check_rhs(n, y)?;

    let (u, p, d, w) = (u.view(), p.view(), d.view(), w.view());
    let mut x = y.to_owned();
    Zip::from(x.columns_mut()).par_for_each(|z| solve_column(&u, &p, &d, &w, z));
    Ok(x)
}

/// Forward then backward sweeps in place on one right hand side
fn solve_column<F: Float>(
    u: &ArrayView2<F>,
    p: &ArrayView2<F>,
    d: &ArrayView1<F>,
    w: &ArrayView2<F>,
    mut z: ArrayViewMut1<F>,
) {
    let n = z.len();
    let mut f = Array1::<F>::zeros(u.ncols());
    for i in 1..n {
        let zp = z[i - 1];
        Zip::from(&mut f)
            .and(p.row(i - 1))
            .and(w.row(i - 1))
            .for_each(|fk, &pk, &wk| *fk = pk * (*fk + wk * zp));
        z[i] -= u.row(i).dot(&f);
    }
    Zip::from(&mut z).and(d).for_each(|zi, &di| *zi /= di);

    let mut g = f;
    g.fill(F::zero());
    for i in (0..n - 1).rev() {
        let zn = z[i + 1];
        Zip::from(&mut g)
            .and(p.row(i))
            .and(u.row(i + 1))
            .for_each(|gk, &pk, &uk| *gk = pk * (*gk + uk * zn));
        z[i] -= w.row(i).dot(&g);
    }
}

/// Semiseparable covariance matrix of a kernel at given samples
/// together with its structured Cholesky factorization.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct Solver<F: Float> {
    /// Semiseparable representation
    matrix: SemiseparableMatrix<F>,
    /// Structured Cholesky factorization
    factorization: Factorization<F>,
}

impl<F: Float> Solver<F> {
    /// Build and factorize the covariance matrix of `kernel` at sorted samples `x`
    /// with per-point noise variances `diag`.
    ///
    /// # Errors
    ///
    /// * [GpError::InputShapeError], [GpError::NonIncreasingSamplesError]: see [build]
    /// * [GpError::NonPositiveDefiniteError]: see [crate::factor()]
    pub fn new(
        kernel: &impl CoefficientSource<F>,
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
        diag: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        let matrix = build(x, diag, &kernel.coefficients())?;
        Self::from_matrix(matrix)
    }

    /// Factorize the given semiseparable matrix
    pub fn from_matrix(matrix: SemiseparableMatrix<F>) -> Result<Self> {
        let now = Instant::now();
        let factorization = matrix.factor()?;
        debug!(
            "Factorization (n={}, J={}) elapsed = {:?}",
            matrix.size(),
            matrix.rank(),
            now.elapsed()
        );
        Ok(Solver {
            matrix,
            factorization,
        })
    }

    /// Semiseparable representation of the covariance matrix
    pub fn matrix(&self) -> &SemiseparableMatrix<F> {
        &self.matrix
    }

    /// Structured Cholesky factorization of the covariance matrix
    pub fn factorization(&self) -> &Factorization<F> {
        &self.factorization
    }

    /// Log determinant of the covariance matrix
    pub fn log_determinant(&self) -> F {
        self.factorization.log_determinant()
    }

    /// Compute `K^-1.y` for the (n, k) right hand sides `y`
    pub fn apply_inverse(&self, y: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        solve(
            &self.matrix.u,
            &self.matrix.p,
            &self.factorization.d,
            &self.factorization.w,
            y,
        )
    }

    /// Compute `K.z` for the (n, k) matrix `z`
    pub fn matmul(&self, z: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        self.matrix.matmul(z)
    }

    /// Dense (n, n) covariance matrix
    pub fn to_dense(&self) -> Result<Array2<F>> {
        self.matrix.to_dense()
    }

    /// Compute `y^T.K^-1.y` for one right hand side `y`
    pub fn dot_solve(&self, y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<F> {
        if y.len() != self.matrix.size() {
            return Err(GpError::InputShapeError(format!(
                "vector should have {} components, got {}",
                self.matrix.size(),
                y.len()
            )));
        }
        let alpha = self.apply_inverse(&y.view().insert_axis(Axis(1)))?;
        Ok(y.dot(&alpha.column(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{ComplexTerm, RealTerm, ShoTerm};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, array};
    use ndarray_rand::RandomExt;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::{Normal, Uniform};
    use rand_xoshiro::Xoshiro256Plus;

    fn sorted_samples(n: usize, rng: &mut Xoshiro256Plus) -> Array1<f64> {
        let mut acc = 0.;
        Array::random_using(n, Uniform::new(0.05, 1.0), rng).mapv(|dx: f64| {
            acc += dx;
            acc
        })
    }

    #[test]
    fn test_solve_inverts_matmul() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let kernel = RealTerm::new(0.5, -1.0)
            + ComplexTerm::new(0.3, -1.5, -0.2, 0.0)
            + ShoTerm::new(-1.0, 1.5, 0.2);
        let x = sorted_samples(200, &mut rng);
        let diag = Array::random_using(200, Uniform::new(0.01, 0.1), &mut rng);
        let solver = Solver::new(&kernel, &x, &diag).unwrap();

        let y = Array::random_using((200, 3), Normal::new(0., 1.).unwrap(), &mut rng);
        let alpha = solver.apply_inverse(&y).unwrap();
        assert_abs_diff_eq!(solver.matmul(&alpha).unwrap(), y, epsilon = 1e-8);

        let z = Array::random_using((200, 2), Normal::new(0., 1.).unwrap(), &mut rng);
        let kz = solver.matmul(&z).unwrap();
        assert_abs_diff_eq!(solver.apply_inverse(&kz).unwrap(), z, epsilon = 1e-8);
    }

    #[test]
    fn test_solve_single_sample() {
        let kernel = RealTerm::new(0., 0.);
        let solver = Solver::new(&kernel, &array![1.0], &array![1.0]).unwrap();
        let x = solver.apply_inverse(&array![[4.0, -2.0]]).unwrap();
        assert_abs_diff_eq!(x, array![[2.0, -1.0]], epsilon = 1e-14);
        assert_abs_diff_eq!(solver.log_determinant(), f64::ln(2.0), epsilon = 1e-14);
    }

    #[test]
    fn test_dot_solve() {
        let kernel = RealTerm::new(0., -1.) + ShoTerm::new(0., 0., 0.);
        let x = Array::linspace(0., 10., 30);
        let solver = Solver::new(&kernel, &x, &Array::from_elem(30, 0.1)).unwrap();
        let y = x.mapv(f64::sin);
        let alpha = solver
            .apply_inverse(&y.view().insert_axis(Axis(1)))
            .unwrap();
        assert_abs_diff_eq!(
            solver.dot_solve(&y).unwrap(),
            y.dot(&alpha.column(0)),
            epsilon = 1e-12
        );
        assert!(solver.dot_solve(&Array1::zeros(3)).is_err());
    }

    #[test]
    fn test_solve_shape_errors() {
        let u = Array2::<f64>::ones((3, 1));
        let p = Array2::from_elem((2, 1), 0.5);
        let d = Array1::ones(3);
        assert!(matches!(
            solve(&u, &p, &d, &u, &Array2::<f64>::zeros((2, 1))),
            Err(GpError::InputShapeError(_))
        ));
        assert!(matches!(
            solve(&u, &p, &d, &Array2::<f64>::ones((3, 2)), &Array2::zeros((3, 1))),
            Err(GpError::InputShapeError(_))
        ));
    }
}
