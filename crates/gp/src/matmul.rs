//! Product of a semiseparable matrix with dense vectors, without forming the matrix.

use crate::errors::{GpError, Result};
use crate::utils::{check_generators, check_rhs, check_same_shape};

use linfa::Float;
use ndarray::{
    Array1, Array2, ArrayBase, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Data, Ix1, Ix2, Zip,
};

/// Compute `K.z` where `K` is the semiseparable matrix `(a, U, V, P)`
/// and `z` a (n, k) matrix, in O(n.J) time per column.
///
/// Rows before `n` contribute through a forward state weighted by `V`,
/// rows after `n` through a backward state weighted by `U`, both decayed by `P`.
///
/// # Errors
///
/// * [GpError::InputShapeError]: when shapes are inconsistent
pub fn matmul<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix1>,
    u: &ArrayBase<impl Data<Elem = F>, Ix2>,
    v: &ArrayBase<impl Data<Elem = F>, Ix2>,
    p: &ArrayBase<impl Data<Elem = F>, Ix2>,
    z: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    let n = a.len();
    check_generators(n, u, p)?;
    check_same_shape("V", u, v)?;
    check_rhs(n, z)?;

    let (a, u, v, p) = (a.view(), u.view(), v.view(), p.view());
    let mut y = Array2::zeros(z.raw_dim());
    Zip::from(y.columns_mut())
        .and(z.columns())
        .par_for_each(|y_col, z_col| matmul_column(&a, &u, &v, &p, &z_col, y_col));
    Ok(y)
}

fn matmul_column<F: Float>(
    a: &ArrayView1<F>,
    u: &ArrayView2<F>,
    v: &ArrayView2<F>,
    p: &ArrayView2<F>,
    z: &ArrayView1<F>,
    mut y: ArrayViewMut1<F>,
) {
    let n = a.len();
    Zip::from(&mut y)
        .and(a)
        .and(z)
        .for_each(|yi, &ai, &zi| *yi = ai * zi);

    let mut f = Array1::<F>::zeros(u.ncols());
    for i in 1..n {
        let zp = z[i - 1];
        Zip::from(&mut f)
            .and(p.row(i - 1))
            .and(v.row(i - 1))
            .for_each(|fk, &pk, &vk| *fk = pk * (*fk + vk * zp));
        y[i] += u.row(i).dot(&f);
    }

    let mut g = f;
    g.fill(F::zero());
    for i in (0..n - 1).rev() {
        let zn = z[i + 1];
        Zip::from(&mut g)
            .and(p.row(i))
            .and(u.row(i + 1))
            .for_each(|gk, &pk, &uk| *gk = pk * (*gk + uk * zn));
        y[i] += v.row(i).dot(&g);
    }
}

/// Compute `K.z` for one vector `z` (n,)
pub fn matmul_vec<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix1>,
    u: &ArrayBase<impl Data<Elem = F>, Ix2>,
    v: &ArrayBase<impl Data<Elem = F>, Ix2>,
    p: &ArrayBase<impl Data<Elem = F>, Ix2>,
    z: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<Array1<F>> {
    if z.len() != a.len() {
        return Err(GpError::InputShapeError(format!(
            "vector should have {} components, got {}",
            a.len(),
            z.len()
        )));
    }
    let y = matmul(a, u, v, p, &z.view().insert_axis(Axis(1)))?;
    Ok(y.remove_axis(Axis(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::kernels::{CoefficientSource, ComplexTerm, Matern32Term, RealTerm};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, array};
    use ndarray_rand::RandomExt;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Normal;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn test_matmul_against_dense() {
        let kernel = RealTerm::new(0.2, -0.3)
            + ComplexTerm::new(0.0, -2.0, -0.5, 0.7)
            + Matern32Term::new(-0.5, 0.5);
        let x = array![0.0, 0.4, 1.1, 1.3, 2.8, 3.0, 4.5];
        let diag = Array::from_elem(7, 0.05);
        let mat = build(&x, &diag, &kernel.coefficients()).unwrap();

        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let z = Array::random_using((7, 4), Normal::new(0., 1.).unwrap(), &mut rng);
        let y = matmul(&mat.a, &mat.u, &mat.v, &mat.p, &z).unwrap();
        let k = mat.to_dense().unwrap();
        assert_abs_diff_eq!(y, k.dot(&z), epsilon = 1e-12);

        let y0 = matmul_vec(&mat.a, &mat.u, &mat.v, &mat.p, &z.column(0)).unwrap();
        assert_abs_diff_eq!(y0, y.column(0), epsilon = 1e-14);
    }

    #[test]
    fn test_matmul_real_scenario() {
        let coefs = crate::kernels::Coefficients::real(array![1.0], array![0.5]).unwrap();
        let x = array![0., 1., 2., 3.];
        let mat = build(&x, &Array::zeros(4), &coefs).unwrap();
        let y = matmul_vec(&mat.a, &mat.u, &mat.v, &mat.p, &array![1., 0., 0., 0.]).unwrap();
        let expected = x.mapv(|t| f64::exp(-0.5 * t));
        assert_abs_diff_eq!(y, expected, epsilon = 1e-14);
    }

    #[test]
    fn test_matmul_shape_errors() {
        let a = Array1::<f64>::ones(3);
        let u = Array2::ones((3, 2));
        let p = Array2::ones((2, 2));
        assert!(matches!(
            matmul(&a, &u, &u, &p, &Array2::zeros((4, 1))),
            Err(GpError::InputShapeError(_))
        ));
        assert!(matches!(
            matmul_vec(&a, &u, &u, &p, &Array1::zeros(2)),
            Err(GpError::InputShapeError(_))
        ));
    }
}
