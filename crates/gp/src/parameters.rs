use crate::algorithm::check_kernel;
use crate::errors::{GpError, Result};
use crate::kernels::CoefficientSource;
use crate::{GP_COBYLA_MAX_EVAL, GP_COBYLA_MIN_EVAL, GP_OPTIM_N_START};
use linfa::{Float, ParamGuard};

use ndarray::{Array1, array};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// An enum to represent kernel hyperparameters tuning
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum ParamTuning<F: Float> {
    /// Kernel hyperparameters are used as given
    Fixed,
    /// Hyperparameters (log scale) are optimized between given bounds (lower, upper)
    /// starting from the kernel current values.
    /// A single bound applies to all hyperparameters.
    Optimized {
        /// Bounds for the parameter array(lower, upper)
        bounds: Array1<(F, F)>,
    },
}

impl<F: Float> Default for ParamTuning<F> {
    fn default() -> Self {
        ParamTuning::Optimized {
            bounds: array![(
                F::cast(ParamTuning::<F>::DEFAULT_BOUNDS.0),
                F::cast(ParamTuning::<F>::DEFAULT_BOUNDS.1),
            )],
        }
    }
}

impl<F: Float> ParamTuning<F> {
    /// Default bounds for log hyperparameters
    pub const DEFAULT_BOUNDS: (f64, f64) = (-10., 10.);

    /// Get bounds for hyperparameters
    pub fn bounds(&self) -> Option<&Array1<(F, F)>> {
        match self {
            ParamTuning::Optimized { bounds } => Some(bounds),
            ParamTuning::Fixed => None,
        }
    }
}

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, K: Serialize",
        deserialize = "F: Deserialize<'de>, K: Deserialize<'de>"
    ))
)]
pub struct GpValidParams<F: Float, K: CoefficientSource<F>> {
    /// Covariance kernel, its hyperparameters are the initial guess when optimized
    pub(crate) kernel: K,
    /// Hyperparameters tuning
    pub(crate) tuning: ParamTuning<F>,
    /// Number of internal likelihood optimization restart
    pub(crate) n_start: usize,
    /// Max number of internal likelihood evaluation during optimization
    pub(crate) max_eval: usize,
    /// Noise variances, one value for all samples or one per sample
    pub(crate) diag: Array1<F>,
}

impl<F: Float, K: CoefficientSource<F>> GpValidParams<F, K> {
    /// Get covariance kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Get hyperparameters tuning
    pub fn tuning(&self) -> &ParamTuning<F> {
        &self.tuning
    }

    /// Get the number of internal optimization restart
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get the max number of internal likelihood evaluations during one optimization
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Get noise variances
    pub fn diag(&self) -> &Array1<F> {
        &self.diag
    }

    /// Noise variances for `n` samples
    pub(crate) fn diag_for(&self, n: usize) -> Result<Array1<F>> {
        match self.diag.len() {
            1 => Ok(Array1::from_elem(n, self.diag[0])),
            len if len == n => Ok(self.diag.to_owned()),
            len => Err(GpError::InputShapeError(format!(
                "diag should have 1 or {n} values, got {len}"
            ))),
        }
    }

    /// Hyperparameters bounds, one per kernel hyperparameter
    pub(crate) fn bounds_for(&self, bounds: &Array1<(F, F)>) -> Result<Vec<(F, F)>> {
        let n_params = self.kernel.n_parameters();
        match bounds.len() {
            1 => Ok(vec![bounds[0]; n_params]),
            len if len == n_params => Ok(bounds.to_vec()),
            len => Err(GpError::InvalidValueError(format!(
                "Bounds should be either 1-dim or of the number of kernel parameters ({n_params}), got {len}"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP algorithm](crate::GaussianProcess).
pub struct GpParams<F: Float, K: CoefficientSource<F>>(GpValidParams<F, K>);

impl<F: Float, K: CoefficientSource<F>> GpParams<F, K> {
    /// A constructor for GP parameters given a kernel
    pub fn new(kernel: K) -> GpParams<F, K> {
        Self(GpValidParams {
            kernel,
            tuning: ParamTuning::default(),
            n_start: GP_OPTIM_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            diag: array![F::cast(100.0) * F::epsilon()],
        })
    }

    /// A constructor for GP parameters from validated parameters
    pub fn new_from_valid(params: &GpValidParams<F, K>) -> Self {
        Self(params.clone())
    }

    /// Set kernel, its hyperparameters are the initial guess when optimized.
    pub fn kernel(mut self, kernel: K) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set hyperparameters tuning
    pub fn tuning(mut self, tuning: ParamTuning<F>) -> Self {
        self.0.tuning = tuning;
        self
    }

    /// Set hyperparameters (log scale) search space.
    ///
    /// Hyperparameters are then optimized.
    pub fn bounds(mut self, bounds: Array1<(F, F)>) -> Self {
        self.0.tuning = ParamTuning::Optimized { bounds };
        self
    }

    /// Use the kernel hyperparameters as given
    pub fn fixed(mut self) -> Self {
        self.0.tuning = ParamTuning::Fixed;
        self
    }

    /// Set the number of internal hyperparameters optimization restarts
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set the max number of internal likelihood evaluations during one optimization
    /// Given max_eval has to be greater than [crate::GP_COBYLA_MIN_EVAL] otherwise
    /// max_eval is set to [crate::GP_COBYLA_MIN_EVAL].
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = GP_COBYLA_MIN_EVAL.max(max_eval);
        self
    }

    /// Set noise variances: either one value shared by all samples
    /// or one value per training sample
    pub fn diag(mut self, diag: Array1<F>) -> Self {
        self.0.diag = diag;
        self
    }

    /// Set the same noise variance for all samples
    pub fn noise(mut self, variance: F) -> Self {
        self.0.diag = array![variance];
        self
    }
}

impl<F: Float, K: CoefficientSource<F>> From<GpValidParams<F, K>> for GpParams<F, K> {
    fn from(valid: GpValidParams<F, K>) -> Self {
        GpParams(valid)
    }
}

impl<F: Float, K: CoefficientSource<F>> ParamGuard for GpParams<F, K> {
    type Checked = GpValidParams<F, K>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let params = &self.0;
        check_kernel(&params.kernel)?;
        if params.diag.is_empty() {
            return Err(GpError::InvalidValueError(
                "`diag` should not be empty".to_string(),
            ));
        }
        if params.diag.iter().any(|v| v.is_nan() || *v < F::zero()) {
            return Err(GpError::InvalidValueError(
                "`diag` noise variances should be non negative".to_string(),
            ));
        }
        if let ParamTuning::Optimized { bounds } = &params.tuning {
            params.bounds_for(bounds)?;
            if let Some((lo, up)) = bounds.iter().find(|(lo, up)| !(lo < up)) {
                return Err(GpError::InvalidValueError(format!(
                    "Invalid bounds ({lo}, {up}): lower bound should be less than upper bound"
                )));
            }
        }
        Ok(params)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{Kernel, RealTerm, ShoTerm};

    #[test]
    fn test_params_defaults() {
        let params = GpParams::new(RealTerm::new(0., 0.)).check().unwrap();
        assert_eq!(params.n_start(), GP_OPTIM_N_START);
        assert_eq!(params.max_eval(), GP_COBYLA_MAX_EVAL);
        assert_eq!(params.tuning(), &ParamTuning::default());
        assert_eq!(params.diag_for(3).unwrap().len(), 3);
    }

    #[test]
    fn test_params_max_eval() {
        let params = GpParams::new(RealTerm::new(0., 0.)).max_eval(3).check().unwrap();
        assert_eq!(params.max_eval(), GP_COBYLA_MIN_EVAL);
    }

    #[test]
    fn test_params_diag() {
        let params = GpParams::new(RealTerm::new(0., 0.))
            .diag(array![0.1, 0.2, 0.3])
            .check()
            .unwrap();
        assert_eq!(params.diag_for(3).unwrap(), array![0.1, 0.2, 0.3]);
        assert!(matches!(
            params.diag_for(4),
            Err(GpError::InputShapeError(_))
        ));

        let res = GpParams::new(RealTerm::new(0., 0.)).noise(-1.0).check();
        assert!(matches!(res, Err(GpError::InvalidValueError(_))));
    }

    #[test]
    fn test_params_empty_kernel() {
        let res = GpParams::new(Kernel::<f64>::default()).check();
        assert!(matches!(res, Err(GpError::InvalidValueError(_))));
    }

    #[test]
    fn test_params_bounds() {
        let kernel = RealTerm::new(0., 0.) + ShoTerm::new(0., 0., 0.);
        let params = GpParams::new(kernel.clone()).check().unwrap();
        let bounds = params.tuning().bounds().unwrap();
        assert_eq!(params.bounds_for(bounds).unwrap().len(), 5);

        let res = GpParams::new(kernel.clone())
            .bounds(array![(-1., 1.), (-1., 1.)])
            .check();
        assert!(matches!(res, Err(GpError::InvalidValueError(_))));

        let res = GpParams::new(kernel.clone()).bounds(array![(1., -1.)]).check();
        assert!(matches!(res, Err(GpError::InvalidValueError(_))));

        let params = GpParams::new(kernel).fixed().check().unwrap();
        assert!(params.tuning().bounds().is_none());
    }
}
