use thiserror::Error;

/// A result type for semiseparable GP computations
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when building, factorizing or using a [`GaussianProcess`](crate::GaussianProcess)
#[derive(Error, Debug)]
pub enum GpError {
    /// When array dimensions do not match
    #[error("Input shape error: {0}")]
    InputShapeError(String),
    /// When sample locations are not strictly increasing
    #[error("Sample locations should be strictly increasing: x[{index}] >= x[{next}]")]
    NonIncreasingSamplesError {
        /// Index of the first offending sample
        index: usize,
        /// Index of the following sample
        next: usize,
    },
    /// When the structured Cholesky factorization meets a non positive pivot
    #[error("Non positive definite matrix: d[{row}] = {value}")]
    NonPositiveDefiniteError {
        /// Row where the factorization stopped
        row: usize,
        /// Offending pivot value
        value: f64,
    },
    /// When LikelihoodComputation computation fails
    #[error("LikelihoodComputation computation error: {0}")]
    LikelihoodComputationError(String),
    #[error(transparent)]
    /// When dense linear algebra computation fails
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When error during saving
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    SaveError(#[from] serde_json::Error),
    /// When error during loading
    #[error("Load IO error")]
    LoadIoError(#[from] std::io::Error),
    /// When error dur to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
