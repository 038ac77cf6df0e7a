//! This library implements scalable one dimensional [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! regression with celerite kernels, i.e. covariance functions written as sums of (complex) exponentials
//! `k(tau) = sum_j a_j exp(-c_j tau) + sum_j exp(-c_j tau) (a_j cos(d_j tau) + b_j sin(d_j tau))`.
//!
//! For such kernels and sorted sample locations, the covariance matrix is semiseparable: it is fully
//! described by a diagonal and a few (n, J) generator matrices, J being the kernel rank. Factorization,
//! linear solves, log determinant and matrix products are then computed in O(n.J^2) time and O(n.J) memory
//! instead of the O(n^3) time and O(n^2) memory of dense methods.
//!
//! The computation chain is:
//! * [build]: kernel [coefficients](kernels::Coefficients) + sample locations -> [SemiseparableMatrix],
//! * [factor()]: semiseparable matrix -> [Factorization] `K = (I + L) diag(d) (I + L)^T`,
//! * [solve]: `K^-1 y` and [matmul()]: `K z`, both column parallel,
//! * [Solver] bundles the above for one kernel and sample locations,
//! * [GaussianProcess] computes log likelihood, predictions, and hyperparameters fitting
//!   parameterized by [GpParams].
//!
//! Dense expansions in [dense] are provided to validate results on small problems.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod builder;
pub mod dense;
mod errors;
mod factor;
pub mod kernels;
mod matmul;
mod solver;

mod parameters;
mod utils;

mod optimization;

pub use algorithm::*;
pub use builder::*;
pub use errors::*;
pub use factor::*;
pub use matmul::*;
pub use parameters::*;
pub use solver::*;
