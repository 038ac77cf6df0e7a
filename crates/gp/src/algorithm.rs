use crate::errors::{GpError, Result};
use crate::kernels::CoefficientSource;
use crate::optimization::{CobylaParams, optimize_params, prepare_multistart};
use crate::parameters::{GpParams, GpValidParams, ParamTuning};
use crate::solver::Solver;

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use ndarray::{Array, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};

use log::debug;
use rayon::prelude::*;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

#[cfg(feature = "persistent")]
use serde::de::DeserializeOwned;
#[cfg(feature = "persistent")]
use std::fs;
#[cfg(feature = "persistent")]
use std::io::Write;

/// Default number of multistart for hyperparameters optimization
pub const GP_OPTIM_N_START: usize = 10;
/// Minimum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MIN_EVAL: usize = 25;
/// Maximum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MAX_EVAL: usize = 1000;
/// Number of prediction locations handled at once
pub const GP_PREDICT_CHUNK_SIZE: usize = 1024;

/// A one dimensional Gaussian Process conditioned on observations `y` at sorted
/// locations `x`, with a celerite kernel (sum of exponential and quasi periodic terms).
///
/// The covariance matrix is never formed: it is kept as a semiseparable matrix and
/// factorized in O(N.J^2), where J is the kernel rank, so that likelihood evaluation
/// scales linearly with the number of observations.
///
/// # Example
///
/// ```no_run
/// use celerite_gp::{GaussianProcess, kernels::{RealTerm, ShoTerm}};
/// use ndarray::Array;
///
/// let x = Array::linspace(0., 10., 500);
/// let y = x.mapv(|t: f64| t.sin());
/// let diag = Array::from_elem(500, 0.01);
/// let kernel = RealTerm::new(0., -1.) + ShoTerm::new(0., 1., 0.);
///
/// let gp = GaussianProcess::new(kernel, &x, &y, &diag).expect("GP built");
/// println!("log likelihood = {}", gp.log_likelihood());
/// let mean = gp.predict(&Array::linspace(0., 10., 1000)).expect("GP prediction");
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, K: Serialize",
        deserialize = "F: Deserialize<'de>, K: Deserialize<'de>"
    ))
)]
pub struct GaussianProcess<F: Float, K: CoefficientSource<F>> {
    /// Covariance kernel
    kernel: K,
    /// Training sample locations (n,)
    x: Array1<F>,
    /// Training observations (n,)
    y: Array1<F>,
    /// Noise variances (n,)
    diag: Array1<F>,
    /// Factorized covariance matrix
    solver: Solver<F>,
    /// Weights K^-1.y
    alpha: Array1<F>,
    /// Log marginal likelihood
    log_likelihood: F,
}

impl<F: Float, K: CoefficientSource<F>> fmt::Display for GaussianProcess<F, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(kernel={}, n={}, log_likelihood={})",
            self.kernel,
            self.x.len(),
            self.log_likelihood,
        )
    }
}

impl<F: Float, K: CoefficientSource<F>> GaussianProcess<F, K> {
    /// Gp parameters contructor
    pub fn params(kernel: K) -> GpParams<F, K> {
        GpParams::new(kernel)
    }

    /// Condition the process defined by `kernel` on observations `y` at sorted locations `x`
    /// with per-sample noise variances `diag`.
    ///
    /// # Errors
    ///
    /// * [GpError::InputShapeError]: when `x`, `y`, `diag` lengths differ
    /// * [GpError::NonIncreasingSamplesError]: when `x` is not strictly increasing
    /// * [GpError::InvalidValueError]: when the kernel has no term
    /// * [GpError::NonPositiveDefiniteError]: when the covariance matrix is not positive definite
    /// * [GpError::LikelihoodComputationError]: when the log likelihood is NaN (e.g. NaN in `y`)
    pub fn new(
        kernel: K,
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        diag: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        if y.len() != x.len() {
            return Err(GpError::InputShapeError(format!(
                "y should have {} values, got {}",
                x.len(),
                y.len()
            )));
        }
        check_kernel(&kernel)?;
        let solver = Solver::new(&kernel, x, diag)?;
        let (log_likelihood, alpha) = log_likelihood(&solver, y)?;
        Ok(GaussianProcess {
            kernel,
            x: x.to_owned(),
            y: y.to_owned(),
            diag: diag.to_owned(),
            solver,
            alpha,
            log_likelihood,
        })
    }

    /// Condition the same process on new observations `y` at the training locations.
    ///
    /// The covariance factorization is reused.
    pub fn with_observations(&self, y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Self> {
        if y.len() != self.x.len() {
            return Err(GpError::InputShapeError(format!(
                "y should have {} values, got {}",
                self.x.len(),
                y.len()
            )));
        }
        let (log_likelihood, alpha) = log_likelihood(&self.solver, y)?;
        Ok(GaussianProcess {
            y: y.to_owned(),
            alpha,
            log_likelihood,
            ..self.clone()
        })
    }

    /// Predict conditional mean at `n` locations `t` (n,), in any order.
    ///
    /// Locations are processed by chunks of [GP_PREDICT_CHUNK_SIZE]: time is O(n_train.n.J)
    /// and extra memory O(n_train.GP_PREDICT_CHUNK_SIZE).
    pub fn predict(&self, t: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let mut mean = Array1::zeros(t.len());
        for (t, mut m) in t
            .axis_chunks_iter(Axis(0), GP_PREDICT_CHUNK_SIZE)
            .zip(mean.axis_chunks_iter_mut(Axis(0), GP_PREDICT_CHUNK_SIZE))
        {
            let kxt = self.cross_covariance(&t);
            m.assign(&kxt.t().dot(&self.alpha));
        }
        Ok(mean)
    }

    /// Predict conditional variance of the noise free process at `n` locations `t` (n,).
    ///
    /// Each chunk of [GP_PREDICT_CHUNK_SIZE] locations needs a solve with the training
    /// covariance matrix: time is O(n_train.n.J^2), extra memory O(n_train.GP_PREDICT_CHUNK_SIZE).
    pub fn predict_var(&self, t: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let mut var = Array1::zeros(t.len());
        for (t, mut v) in t
            .axis_chunks_iter(Axis(0), GP_PREDICT_CHUNK_SIZE)
            .zip(var.axis_chunks_iter_mut(Axis(0), GP_PREDICT_CHUNK_SIZE))
        {
            let kxt = self.cross_covariance(&t);
            v.assign(&self.conditional_variance(&kxt)?);
        }
        Ok(var)
    }

    /// Predict both conditional mean and variance at `n` locations `t` (n,),
    /// sharing the cross covariances, see [GaussianProcess::predict_var] for costs.
    pub fn predict_valvar(
        &self,
        t: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        let mut mean = Array1::zeros(t.len());
        let mut var = Array1::zeros(t.len());
        for ((t, mut m), mut v) in t
            .axis_chunks_iter(Axis(0), GP_PREDICT_CHUNK_SIZE)
            .zip(mean.axis_chunks_iter_mut(Axis(0), GP_PREDICT_CHUNK_SIZE))
            .zip(var.axis_chunks_iter_mut(Axis(0), GP_PREDICT_CHUNK_SIZE))
        {
            let kxt = self.cross_covariance(&t);
            m.assign(&kxt.t().dot(&self.alpha));
            v.assign(&self.conditional_variance(&kxt)?);
        }
        Ok((mean, var))
    }

    /// Covariances (n_train, n) between training locations and `t`
    fn cross_covariance(&self, t: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Array2<F> {
        let coefs = self.kernel.coefficients();
        let (x, t) = (self.x.view(), t.view());
        let mut kxt = Array2::zeros((x.len(), t.len()));
        Zip::indexed(&mut kxt).par_for_each(|(i, j), k| *k = coefs.value(x[i] - t[j]));
        kxt
    }

    fn conditional_variance(&self, kxt: &Array2<F>) -> Result<Array1<F>> {
        let k0 = self.kernel.coefficients().variance();
        let kinv_kxt = self.solver.apply_inverse(kxt)?;
        let reduction = (kxt * &kinv_kxt).sum_axis(Axis(0));
        Ok(reduction.mapv(|r| {
            let var = k0 - r;
            if var < F::zero() { F::zero() } else { var }
        }))
    }

    /// Covariance kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Factorized covariance matrix of the training samples
    pub fn solver(&self) -> &Solver<F> {
        &self.solver
    }

    /// Retrieve log marginal likelihood of the training observations
    pub fn log_likelihood(&self) -> F {
        self.log_likelihood
    }

    /// Weights `K^-1.y`
    pub fn alpha(&self) -> &Array1<F> {
        &self.alpha
    }

    /// Training sample locations
    pub fn x(&self) -> &Array1<F> {
        &self.x
    }

    /// Training observations
    pub fn y(&self) -> &Array1<F> {
        &self.y
    }

    /// Noise variances of the training observations
    pub fn diag(&self) -> &Array1<F> {
        &self.diag
    }

    /// Number of training samples and kernel rank J
    pub fn dims(&self) -> (usize, usize) {
        (self.solver.matrix().size(), self.solver.matrix().rank())
    }
}

#[cfg(feature = "persistent")]
impl<F, K> GaussianProcess<F, K>
where
    F: Float + Serialize + DeserializeOwned,
    K: CoefficientSource<F> + Serialize + DeserializeOwned,
{
    /// Save the fitted model in a JSON file
    pub fn save(&self, path: &str) -> Result<()> {
        let mut file = fs::File::create(path)?;
        let bytes = serde_json::to_vec(self)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Load a model saved with [GaussianProcess::save]
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read(path)?;
        let gp = serde_json::from_slice(&data)?;
        Ok(gp)
    }
}

impl<F, D, K> PredictInplace<ArrayBase<D, Ix2>, Array1<F>> for GaussianProcess<F, K>
where
    F: Float,
    D: Data<Elem = F>,
    K: CoefficientSource<F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.predict(&x.column(0)).expect("GP Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros((x.nrows(),))
    }
}

impl<F: Float, K: CoefficientSource<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams<F, K>
{
    type Object = GaussianProcess<F, K>;

    /// Fit kernel hyperparameters using maximum likelihood
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let records = dataset.records();
        if records.ncols() != 1 {
            return Err(GpError::InputShapeError(format!(
                "Training inputs should be one dimensional (n, 1), got {:?}",
                records.dim()
            )));
        }
        let x = records.column(0).to_owned();
        let y = dataset.targets().to_owned();
        if y.len() != x.len() {
            return Err(GpError::InputShapeError(format!(
                "y should have {} values, got {}",
                x.len(),
                y.len()
            )));
        }
        let diag = self.diag_for(x.len())?;
        crate::builder::check_sorted(&x)?;

        let kernel = match self.tuning() {
            ParamTuning::Fixed => self.kernel().clone(),
            ParamTuning::Optimized { .. } if self.kernel().n_parameters() == 0 => {
                self.kernel().clone()
            }
            ParamTuning::Optimized { bounds } => {
                let bounds = self.bounds_for(bounds)?;
                let objfn = |p: &[f64], _gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
                    // optimizer may return nan values
                    if p.iter().any(|v| v.is_nan()) {
                        return f64::INFINITY;
                    }
                    let params = p.iter().map(|v| F::cast(*v)).collect::<Vec<_>>();
                    let lkh = self
                        .kernel()
                        .with_parameters(&params)
                        .and_then(|kernel| Solver::new(&kernel, &x, &diag))
                        .and_then(|solver| log_likelihood(&solver, &y));
                    match lkh {
                        Ok((lkh, _)) => match lkh.to_f64() {
                            Some(v) if v.is_finite() => -v,
                            _ => f64::INFINITY,
                        },
                        Err(_) => f64::INFINITY,
                    }
                };

                let param_inits =
                    prepare_multistart(self.n_start(), &self.kernel().parameters(), &bounds);
                debug!("Optimize with multistart params = {param_inits:?} and bounds = {bounds:?}");
                let now = Instant::now();
                let (fmin, opt_params) = (0..param_inits.nrows())
                    .into_par_iter()
                    .map(|i| {
                        optimize_params(
                            objfn,
                            &param_inits.row(i).to_owned(),
                            &bounds,
                            CobylaParams {
                                maxeval: (10 * param_inits.ncols())
                                    .clamp(GP_COBYLA_MIN_EVAL, self.max_eval()),
                                ..CobylaParams::default()
                            },
                        )
                    })
                    .reduce(
                        || (f64::INFINITY, Array::ones((param_inits.ncols(),))),
                        |a, b| if b.0 < a.0 { b } else { a },
                    );
                debug!("elapsed optim = {:?}", now.elapsed().as_millis());
                if !fmin.is_finite() {
                    return Err(GpError::LikelihoodComputationError(
                        "No hyperparameters with a finite likelihood found".to_string(),
                    ));
                }
                let params = opt_params.iter().map(|v| F::cast(*v)).collect::<Vec<_>>();
                self.kernel().with_parameters(&params)?
            }
        };

        GaussianProcess::new(kernel, &x, &y, &diag)
    }
}

/// Check that the kernel contributes to the covariance
pub(crate) fn check_kernel<F: Float>(kernel: &impl CoefficientSource<F>) -> Result<()> {
    if kernel.coefficients().rank() == 0 {
        return Err(GpError::InvalidValueError(
            "Kernel should have at least one term".to_string(),
        ));
    }
    Ok(())
}

/// Compute log marginal likelihood `-1/2 (y^T.K^-1.y + log|K| + n.log(2pi))`
/// and weights `K^-1.y`
fn log_likelihood<F: Float>(
    solver: &Solver<F>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<(F, Array1<F>)> {
    let alpha = solver
        .apply_inverse(&y.view().insert_axis(Axis(1)))?
        .remove_axis(Axis(1));
    let n = F::cast(y.len());
    let two_pi = F::cast(2. * std::f64::consts::PI);
    let lkh = F::cast(-0.5) * (y.dot(&alpha) + solver.log_determinant() + n * two_pi.ln());
    if lkh.is_nan() {
        return Err(GpError::LikelihoodComputationError(
            "Log likelihood is NaN".to_string(),
        ));
    }
    Ok((lkh, alpha))
}
