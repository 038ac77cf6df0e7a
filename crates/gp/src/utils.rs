use crate::errors::{GpError, Result};
use linfa::Float;
use ndarray::{ArrayBase, Data, Ix2};

/// Check that `u` (n, J) and `p` (n-1, J) describe the off-diagonal structure
/// of a non empty (n, n) semiseparable matrix
pub(crate) fn check_generators<F: Float>(
    n: usize,
    u: &ArrayBase<impl Data<Elem = F>, Ix2>,
    p: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<()> {
    if n == 0 {
        return Err(GpError::InputShapeError(
            "semiseparable matrix should not be empty".to_string(),
        ));
    }
    if u.nrows() != n {
        return Err(GpError::InputShapeError(format!(
            "generator should have {} rows, got {}",
            n,
            u.nrows()
        )));
    }
    if p.dim() != (n - 1, u.ncols()) {
        return Err(GpError::InputShapeError(format!(
            "propagator should be a ({}, {}) matrix, got {:?}",
            n - 1,
            u.ncols(),
            p.dim()
        )));
    }
    Ok(())
}

/// Check that `other` has the same (n, J) shape as `u`
pub(crate) fn check_same_shape<F: Float>(
    name: &str,
    u: &ArrayBase<impl Data<Elem = F>, Ix2>,
    other: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<()> {
    if u.dim() != other.dim() {
        return Err(GpError::InputShapeError(format!(
            "{} should be a {:?} matrix, got {:?}",
            name,
            u.dim(),
            other.dim()
        )));
    }
    Ok(())
}

/// Check that right hand sides `y` have n rows
pub(crate) fn check_rhs<F: Float>(n: usize, y: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<()> {
    if y.nrows() != n {
        return Err(GpError::InputShapeError(format!(
            "right hand side should have {} rows, got {}",
            n,
            y.nrows()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_check_generators() {
        let u = Array2::<f64>::zeros((4, 3));
        assert!(check_generators(4, &u, &Array2::zeros((3, 3))).is_ok());
        assert!(check_generators(4, &u, &Array2::zeros((4, 3))).is_err());
        assert!(check_generators(4, &u, &Array2::zeros((3, 2))).is_err());
        assert!(check_generators(5, &u, &Array2::zeros((4, 3))).is_err());
        assert!(check_generators(0, &Array2::<f64>::zeros((0, 3)), &Array2::zeros((0, 3))).is_err());
    }

    #[test]
    fn test_check_same_shape() {
        let u = Array2::<f64>::zeros((4, 3));
        assert!(check_same_shape("V", &u, &Array2::zeros((4, 3))).is_ok());
        let err = check_same_shape("V", &u, &Array2::zeros((4, 2))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Input shape error: V should be a (4, 3) matrix, got (4, 2)"
        );
    }
}
