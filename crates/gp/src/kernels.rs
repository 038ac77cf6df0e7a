//! A module for covariance kernels expressed as sums of (damped) exponentials.
//!
//! Any such kernel is described by six coefficient vectors (see [Coefficients]):
//!
//! `k(tau) = sum_j a_real_j * exp(-c_real_j * tau)
//!         + sum_j exp(-c_comp_j * tau) * (a_comp_j * cos(d_comp_j * tau) + b_comp_j * sin(d_comp_j * tau))`
//!
//! The following terms are implemented:
//! * real exponential,
//! * complex (quasiperiodic) exponential,
//! * stochastically driven damped simple harmonic oscillator,
//! * approximate matern 3/2.
//!
//! Terms are summed with `+` into a [Kernel].
//! Hyperparameters are stored as natural logarithms.

use crate::errors::{GpError, Result};
use linfa::Float;
use ndarray::{Array1, Axis, Zip, array, concatenate};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Coefficient vectors of a sum of exponential covariance terms.
///
/// `a_real`, `c_real` have the length `J_real` of the real block,
/// `a_comp`, `b_comp`, `c_comp`, `d_comp` the length `J_comp` of the complex block.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct Coefficients<F: Float> {
    /// Amplitudes of the real terms
    pub a_real: Array1<F>,
    /// Decay rates of the real terms
    pub c_real: Array1<F>,
    /// Cosine amplitudes of the complex terms
    pub a_comp: Array1<F>,
    /// Sine amplitudes of the complex terms
    pub b_comp: Array1<F>,
    /// Decay rates of the complex terms
    pub c_comp: Array1<F>,
    /// Frequencies of the complex terms
    pub d_comp: Array1<F>,
}

impl<F: Float> Coefficients<F> {
    /// Constructor checking blocks lengths consistency
    pub fn new(
        a_real: Array1<F>,
        c_real: Array1<F>,
        a_comp: Array1<F>,
        b_comp: Array1<F>,
        c_comp: Array1<F>,
        d_comp: Array1<F>,
    ) -> Result<Self> {
        let coefs = Coefficients {
            a_real,
            c_real,
            a_comp,
            b_comp,
            c_comp,
            d_comp,
        };
        coefs.check()?;
        Ok(coefs)
    }

    /// Coefficients with a real block only
    pub fn real(a_real: Array1<F>, c_real: Array1<F>) -> Result<Self> {
        Self::new(
            a_real,
            c_real,
            Array1::zeros(0),
            Array1::zeros(0),
            Array1::zeros(0),
            Array1::zeros(0),
        )
    }

    /// Coefficients without any term
    pub fn empty() -> Self {
        Coefficients {
            a_real: Array1::zeros(0),
            c_real: Array1::zeros(0),
            a_comp: Array1::zeros(0),
            b_comp: Array1::zeros(0),
            c_comp: Array1::zeros(0),
            d_comp: Array1::zeros(0),
        }
    }

    /// Check that real and complex blocks are consistently sized
    pub fn check(&self) -> Result<()> {
        if self.a_real.len() != self.c_real.len() {
            return Err(GpError::InputShapeError(format!(
                "real coefficients should have the same length, got a_real: {}, c_real: {}",
                self.a_real.len(),
                self.c_real.len()
            )));
        }
        let j_comp = self.a_comp.len();
        if self.b_comp.len() != j_comp || self.c_comp.len() != j_comp || self.d_comp.len() != j_comp
        {
            return Err(GpError::InputShapeError(format!(
                "complex coefficients should have the same length, got a_comp: {}, b_comp: {}, c_comp: {}, d_comp: {}",
                j_comp,
                self.b_comp.len(),
                self.c_comp.len(),
                self.d_comp.len()
            )));
        }
        Ok(())
    }

    /// Number of real terms
    pub fn j_real(&self) -> usize {
        self.a_real.len()
    }

    /// Number of complex terms
    pub fn j_comp(&self) -> usize {
        self.a_comp.len()
    }

    /// Rank of the semiseparable representation: `J_real + 2 * J_comp`
    pub fn rank(&self) -> usize {
        self.j_real() + 2 * self.j_comp()
    }

    /// Zero-lag value of the kernel, ie `k(0)`
    pub fn variance(&self) -> F {
        self.a_real.sum() + self.a_comp.sum()
    }

    /// Evaluate the kernel at lag `tau`
    pub fn value(&self, tau: F) -> F {
        let t = tau.abs();
        let mut k = F::zero();
        Zip::from(&self.a_real)
            .and(&self.c_real)
            .for_each(|&a, &c| k += a * F::exp(-c * t));
        Zip::from(&self.a_comp)
            .and(&self.b_comp)
            .and(&self.c_comp)
            .and(&self.d_comp)
            .for_each(|&a, &b, &c, &d| {
                k += F::exp(-c * t) * (a * F::cos(d * t) + b * F::sin(d * t))
            });
        k
    }

    /// Concatenate coefficient blocks, ie the coefficients of the sum of both kernels
    pub fn concat(&self, other: &Coefficients<F>) -> Coefficients<F> {
        let cat = |x: &Array1<F>, y: &Array1<F>| concatenate![Axis(0), x.view(), y.view()];
        Coefficients {
            a_real: cat(&self.a_real, &other.a_real),
            c_real: cat(&self.c_real, &other.c_real),
            a_comp: cat(&self.a_comp, &other.a_comp),
            b_comp: cat(&self.b_comp, &other.b_comp),
            c_comp: cat(&self.c_comp, &other.c_comp),
            d_comp: cat(&self.d_comp, &other.d_comp),
        }
    }
}

impl<F: Float> fmt::Display for Coefficients<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Coefficients(a_real={}, c_real={}, a_comp={}, b_comp={}, c_comp={}, d_comp={})",
            self.a_real, self.c_real, self.a_comp, self.b_comp, self.c_comp, self.d_comp
        )
    }
}

/// A trait for kernels providing coefficients of the semiseparable covariance matrix.
///
/// Implementations should be pure: `coefficients()` is re-invoked whenever
/// hyperparameters change and should be cheap.
pub trait CoefficientSource<F: Float>: Clone + fmt::Display + Sync {
    /// Coefficient vectors describing the covariance function
    fn coefficients(&self) -> Coefficients<F>;

    /// Hyperparameters vector (log scale)
    fn parameters(&self) -> Array1<F>;

    /// A copy of the kernel with the given hyperparameters (log scale)
    fn with_parameters(&self, params: &[F]) -> Result<Self>;

    /// Number of hyperparameters
    fn n_parameters(&self) -> usize {
        self.parameters().len()
    }
}

/// Coefficients used as a kernel without hyperparameters
impl<F: Float> CoefficientSource<F> for Coefficients<F> {
    fn coefficients(&self) -> Coefficients<F> {
        self.clone()
    }

    fn parameters(&self) -> Array1<F> {
        Array1::zeros(0)
    }

    fn with_parameters(&self, params: &[F]) -> Result<Self> {
        check_parameters_len(params, 0)?;
        Ok(self.clone())
    }
}

fn check_parameters_len<F: Float>(params: &[F], expected: usize) -> Result<()> {
    if params.len() != expected {
        return Err(GpError::InvalidValueError(format!(
            "Expected {} kernel parameters, got {}",
            expected,
            params.len()
        )));
    }
    Ok(())
}

/// Real exponential term: `k(tau) = a * exp(-c * tau)`
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct RealTerm<F: Float> {
    /// log of the amplitude
    pub log_a: F,
    /// log of the decay rate
    pub log_c: F,
}

impl<F: Float> RealTerm<F> {
    /// Constructor from log parameters
    pub fn new(log_a: F, log_c: F) -> Self {
        RealTerm { log_a, log_c }
    }
}

impl<F: Float> CoefficientSource<F> for RealTerm<F> {
    fn coefficients(&self) -> Coefficients<F> {
        Coefficients {
            a_real: array![self.log_a.exp()],
            c_real: array![self.log_c.exp()],
            ..Coefficients::empty()
        }
    }

    fn parameters(&self) -> Array1<F> {
        array![self.log_a, self.log_c]
    }

    fn with_parameters(&self, params: &[F]) -> Result<Self> {
        check_parameters_len(params, 2)?;
        Ok(RealTerm::new(params[0], params[1]))
    }
}

impl<F: Float> fmt::Display for RealTerm<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Real(log_a={}, log_c={})", self.log_a, self.log_c)
    }
}

/// Complex exponential term:
/// `k(tau) = exp(-c * tau) * (a * cos(d * tau) + b * sin(d * tau))`
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ComplexTerm<F: Float> {
    /// log of the cosine amplitude
    pub log_a: F,
    /// log of the sine amplitude
    pub log_b: F,
    /// log of the decay rate
    pub log_c: F,
    /// log of the frequency
    pub log_d: F,
}

impl<F: Float> ComplexTerm<F> {
    /// Constructor from log parameters
    pub fn new(log_a: F, log_b: F, log_c: F, log_d: F) -> Self {
        ComplexTerm {
            log_a,
            log_b,
            log_c,
            log_d,
        }
    }
}

impl<F: Float> CoefficientSource<F> for ComplexTerm<F> {
    fn coefficients(&self) -> Coefficients<F> {
        Coefficients {
            a_comp: array![self.log_a.exp()],
            b_comp: array![self.log_b.exp()],
            c_comp: array![self.log_c.exp()],
            d_comp: array![self.log_d.exp()],
            ..Coefficients::empty()
        }
    }

    fn parameters(&self) -> Array1<F> {
        array![self.log_a, self.log_b, self.log_c, self.log_d]
    }

    fn with_parameters(&self, params: &[F]) -> Result<Self> {
        check_parameters_len(params, 4)?;
        Ok(ComplexTerm::new(params[0], params[1], params[2], params[3]))
    }
}

impl<F: Float> fmt::Display for ComplexTerm<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Complex(log_a={}, log_b={}, log_c={}, log_d={})",
            self.log_a, self.log_b, self.log_c, self.log_d
        )
    }
}

/// Stochastically driven damped simple harmonic oscillator term.
///
/// Power spectrum: `S(w) = sqrt(2/pi) * S0 * w0^4 / ((w^2 - w0^2)^2 + w0^2 * w^2 / Q^2)`
///
/// Overdamped oscillators (`Q < 1/2`) are expanded into two real terms,
/// the other ones into one complex term.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ShoTerm<F: Float> {
    /// log of the power at `w = 0`
    pub log_s0: F,
    /// log of the quality factor
    pub log_q: F,
    /// log of the undamped angular frequency
    pub log_omega0: F,
}

impl<F: Float> ShoTerm<F> {
    /// Lower bound of `4Q^2 - 1` near critical damping
    const CRITICAL_EPS: f64 = 1e-5;

    /// Constructor from log parameters
    pub fn new(log_s0: F, log_q: F, log_omega0: F) -> Self {
        ShoTerm {
            log_s0,
            log_q,
            log_omega0,
        }
    }
}

impl<F: Float> CoefficientSource<F> for ShoTerm<F> {
    fn coefficients(&self) -> Coefficients<F> {
        let s0 = self.log_s0.exp();
        let q = self.log_q.exp();
        let w0 = self.log_omega0.exp();
        let half = F::cast(0.5);
        let four_q2 = F::cast(4.) * q * q;
        if q < half {
            let f = (F::one() - four_q2).sqrt();
            let a = half * s0 * w0 * q;
            let c = half * w0 / q;
            Coefficients {
                a_real: array![a * (F::one() + F::one() / f), a * (F::one() - F::one() / f)],
                c_real: array![c * (F::one() - f), c * (F::one() + f)],
                ..Coefficients::empty()
            }
        } else {
            let f = F::max(four_q2 - F::one(), F::cast(Self::CRITICAL_EPS)).sqrt();
            let a = s0 * w0 * q;
            let c = half * w0 / q;
            Coefficients {
                a_comp: array![a],
                b_comp: array![a / f],
                c_comp: array![c],
                d_comp: array![c * f],
                ..Coefficients::empty()
            }
        }
    }

    fn parameters(&self) -> Array1<F> {
        array![self.log_s0, self.log_q, self.log_omega0]
    }

    fn with_parameters(&self, params: &[F]) -> Result<Self> {
        check_parameters_len(params, 3)?;
        Ok(ShoTerm::new(params[0], params[1], params[2]))
    }
}

impl<F: Float> fmt::Display for ShoTerm<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Sho(log_s0={}, log_q={}, log_omega0={})",
            self.log_s0, self.log_q, self.log_omega0
        )
    }
}

/// Approximate matern 3/2 term
/// `k(tau) = sigma^2 * (1 + sqrt(3) * tau / rho) * exp(-sqrt(3) * tau / rho)`
/// obtained as the `eps -> 0` limit of a complex term of frequency `eps`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Matern32Term<F: Float> {
    /// log of the amplitude
    pub log_sigma: F,
    /// log of the length scale
    pub log_rho: F,
    /// approximation frequency (not a hyperparameter)
    pub eps: F,
}

impl<F: Float> Matern32Term<F> {
    /// Default approximation frequency
    pub const DEFAULT_EPS: f64 = 0.01;

    /// Constructor from log parameters with the default approximation frequency
    pub fn new(log_sigma: F, log_rho: F) -> Self {
        Matern32Term {
            log_sigma,
            log_rho,
            eps: F::cast(Self::DEFAULT_EPS),
        }
    }

    /// Set the approximation frequency
    pub fn eps(mut self, eps: F) -> Self {
        self.eps = eps;
        self
    }
}

impl<F: Float> CoefficientSource<F> for Matern32Term<F> {
    fn coefficients(&self) -> Coefficients<F> {
        let w0 = F::cast(3.).sqrt() / self.log_rho.exp();
        let s2 = F::exp(F::cast(2.) * self.log_sigma);
        Coefficients {
            a_comp: array![s2],
            b_comp: array![s2 * w0 / self.eps],
            c_comp: array![w0],
            d_comp: array![self.eps],
            ..Coefficients::empty()
        }
    }

    fn parameters(&self) -> Array1<F> {
        array![self.log_sigma, self.log_rho]
    }

    fn with_parameters(&self, params: &[F]) -> Result<Self> {
        check_parameters_len(params, 2)?;
        Ok(Matern32Term::new(params[0], params[1]).eps(self.eps))
    }
}

impl<F: Float> fmt::Display for Matern32Term<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Matern32(log_sigma={}, log_rho={})",
            self.log_sigma, self.log_rho
        )
    }
}

/// One of the available kernel terms
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Term<F: Float> {
    /// Real exponential
    Real(RealTerm<F>),
    /// Complex exponential
    Complex(ComplexTerm<F>),
    /// Damped harmonic oscillator
    Sho(ShoTerm<F>),
    /// Approximate matern 3/2
    Matern32(Matern32Term<F>),
}

impl<F: Float> CoefficientSource<F> for Term<F> {
    fn coefficients(&self) -> Coefficients<F> {
        match self {
            Term::Real(t) => t.coefficients(),
            Term::Complex(t) => t.coefficients(),
            Term::Sho(t) => t.coefficients(),
            Term::Matern32(t) => t.coefficients(),
        }
    }

    fn parameters(&self) -> Array1<F> {
        match self {
            Term::Real(t) => t.parameters(),
            Term::Complex(t) => t.parameters(),
            Term::Sho(t) => t.parameters(),
            Term::Matern32(t) => t.parameters(),
        }
    }

    fn with_parameters(&self, params: &[F]) -> Result<Self> {
        Ok(match self {
            Term::Real(t) => Term::Real(t.with_parameters(params)?),
            Term::Complex(t) => Term::Complex(t.with_parameters(params)?),
            Term::Sho(t) => Term::Sho(t.with_parameters(params)?),
            Term::Matern32(t) => Term::Matern32(t.with_parameters(params)?),
        })
    }
}

impl<F: Float> fmt::Display for Term<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Term::Real(t) => write!(f, "{t}"),
            Term::Complex(t) => write!(f, "{t}"),
            Term::Sho(t) => write!(f, "{t}"),
            Term::Matern32(t) => write!(f, "{t}"),
        }
    }
}

/// A sum of kernel terms
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct Kernel<F: Float> {
    terms: Vec<Term<F>>,
}

impl<F: Float> Kernel<F> {
    /// Kernel made of the given terms
    pub fn new(terms: Vec<Term<F>>) -> Self {
        Kernel { terms }
    }

    /// Terms of the sum
    pub fn terms(&self) -> &[Term<F>] {
        &self.terms
    }
}

impl<F: Float> CoefficientSource<F> for Kernel<F> {
    fn coefficients(&self) -> Coefficients<F> {
        self.terms
            .iter()
            .fold(Coefficients::empty(), |acc, t| acc.concat(&t.coefficients()))
    }

    fn parameters(&self) -> Array1<F> {
        let params: Vec<F> = self
            .terms
            .iter()
            .flat_map(|t| t.parameters().to_vec())
            .collect();
        Array1::from_vec(params)
    }

    fn with_parameters(&self, params: &[F]) -> Result<Self> {
        check_parameters_len(params, self.n_parameters())?;
        let mut offset = 0;
        let mut terms = Vec::with_capacity(self.terms.len());
        for t in self.terms.iter() {
            let n = t.n_parameters();
            terms.push(t.with_parameters(&params[offset..offset + n])?);
            offset += n;
        }
        Ok(Kernel { terms })
    }
}

impl<F: Float> fmt::Display for Kernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let terms: Vec<String> = self.terms.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", terms.join(" + "))
    }
}

impl<F: Float, T: Into<Kernel<F>>> Add<T> for Kernel<F> {
    type Output = Kernel<F>;

    fn add(mut self, rhs: T) -> Kernel<F> {
        self.terms.extend(rhs.into().terms);
        self
    }
}

macro_rules! impl_term {
    ($term:ident, $variant:ident) => {
        impl<F: Float> From<$term<F>> for Term<F> {
            fn from(t: $term<F>) -> Term<F> {
                Term::$variant(t)
            }
        }

        impl<F: Float> From<$term<F>> for Kernel<F> {
            fn from(t: $term<F>) -> Kernel<F> {
                Kernel::new(vec![Term::$variant(t)])
            }
        }

        impl<F: Float, T: Into<Kernel<F>>> Add<T> for $term<F> {
            type Output = Kernel<F>;

            fn add(self, rhs: T) -> Kernel<F> {
                Kernel::from(self) + rhs
            }
        }
    };
}

impl_term!(RealTerm, Real);
impl_term!(ComplexTerm, Complex);
impl_term!(ShoTerm, Sho);
impl_term!(Matern32Term, Matern32);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_coefficients_shape_check() {
        let coefs = Coefficients::new(
            array![1.0],
            array![0.5, 0.2],
            Array1::zeros(0),
            Array1::zeros(0),
            Array1::zeros(0),
            Array1::zeros(0),
        );
        assert!(matches!(coefs, Err(GpError::InputShapeError(_))));

        let coefs = Coefficients::new(
            array![1.0],
            array![0.5],
            array![1.0, 2.0],
            array![0.1, 0.2],
            array![0.3],
            array![1.0, 2.0],
        );
        assert!(matches!(coefs, Err(GpError::InputShapeError(_))));
    }

    #[test]
    fn test_coefficients_rank_and_value() {
        let coefs = Coefficients::new(
            array![1.0, 0.5],
            array![0.5, 2.0],
            array![0.8],
            array![0.1],
            array![0.3],
            array![1.5],
        )
        .unwrap();
        assert_eq!(coefs.j_real(), 2);
        assert_eq!(coefs.j_comp(), 1);
        assert_eq!(coefs.rank(), 4);
        assert_abs_diff_eq!(coefs.variance(), 2.3);
        assert_abs_diff_eq!(coefs.value(0.), 2.3);

        let tau: f64 = 0.7;
        let expected = (-0.5 * tau).exp()
            + 0.5 * (-2. * tau).exp()
            + (-0.3 * tau).exp() * (0.8 * (1.5 * tau).cos() + 0.1 * (1.5 * tau).sin());
        assert_abs_diff_eq!(coefs.value(tau), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(coefs.value(-tau), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_sho_branches_variance() {
        let (s0, w0) = (1.3_f64, 2.1_f64);
        for q in [0.2, 0.5, 3.0] {
            let sho = ShoTerm::new(s0.ln(), f64::ln(q), w0.ln());
            let coefs = sho.coefficients();
            assert_relative_eq!(coefs.value(0.), s0 * w0 * q, max_relative = 1e-10);
        }
        assert_eq!(ShoTerm::new(0., f64::ln(0.2), 0.).coefficients().j_real(), 2);
        assert_eq!(ShoTerm::new(0., f64::ln(2.), 0.).coefficients().j_comp(), 1);
    }

    #[test]
    fn test_matern32_approximation() {
        let (sigma, rho) = (1.5_f64, 2.0_f64);
        let term = Matern32Term::new(sigma.ln(), rho.ln()).eps(1e-4);
        let coefs = term.coefficients();
        for tau in [0., 0.3, 1.0, 4.0] {
            let r = 3f64.sqrt() * tau / rho;
            let expected = sigma * sigma * (1. + r) * (-r).exp();
            assert_abs_diff_eq!(coefs.value(tau), expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_kernel_sum() {
        let kernel = RealTerm::new(0.1, -0.5)
            + ComplexTerm::new(0., -1., -0.3, 0.2)
            + ShoTerm::new(0., f64::ln(0.3), 0.5);
        assert_eq!(kernel.terms().len(), 3);
        assert_eq!(kernel.n_parameters(), 9);

        let coefs = kernel.coefficients();
        assert_eq!(coefs.j_real(), 3);
        assert_eq!(coefs.j_comp(), 1);
        assert_abs_diff_eq!(coefs.a_real[0], 0.1_f64.exp());
        assert_abs_diff_eq!(coefs.d_comp[0], 0.2_f64.exp());

        let params = kernel.parameters();
        let same = kernel.with_parameters(params.as_slice().unwrap()).unwrap();
        assert_eq!(kernel, same);
        assert!(matches!(
            kernel.with_parameters(&[0.; 3]),
            Err(GpError::InvalidValueError(_))
        ));
    }

    #[test]
    fn test_kernel_display() {
        let kernel = RealTerm::new(0.0, 1.0) + Matern32Term::new(0.0, 0.0);
        assert_eq!(
            kernel.to_string(),
            "Real(log_a=0, log_c=1) + Matern32(log_sigma=0, log_rho=0)"
        );
    }
}
