use celerite_gp::GaussianProcess;
use celerite_gp::kernels::{RealTerm, ShoTerm};
use linfa::prelude::*;
use log::info;
use ndarray::{Array, Axis, array};
use ndarray_npy::write_npy;
use ndarray_rand::RandomExt;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;

fn main() {
    let env = env_logger::Env::new().filter_or("CELERITE_LOG", "info");
    env_logger::Builder::from_env(env).init();

    // Irregularly sampled quasi periodic signal with a slow trend
    let n = 2000;
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let mut acc = 0.;
    let xt = Array::random_using(n, Uniform::new(0.005, 0.045), &mut rng).mapv(|dx: f64| {
        acc += dx;
        acc
    });
    let noise = Array::random_using(n, Normal::new(0., 0.2).unwrap(), &mut rng);
    let yt = xt.mapv(|t| (2. * t).sin() * (-0.01 * t).exp() + 0.1 * t.sqrt()) + noise;

    let kernel = RealTerm::new(0., -2.) + ShoTerm::new(0., 1., 0.5);
    let gp = GaussianProcess::params(kernel)
        .bounds(array![(-8., 8.)])
        .n_start(4)
        .noise(0.04)
        .fit(&Dataset::new(xt.clone().insert_axis(Axis(1)), yt.clone()))
        .expect("GP fitting");
    info!("Fitted {gp}");

    let x = Array::linspace(xt[0] - 5., xt[n - 1] + 5., 5000);
    let (mean, var) = gp.predict_valvar(&x).expect("GP prediction");
    let std = var.mapv(f64::sqrt);
    info!(
        "Predicted std in [{}, {}]",
        std.min().expect("non empty"),
        std.max().expect("non empty")
    );

    write_npy("light_curve_xt.npy", &xt).expect("xt saved");
    write_npy("light_curve_yt.npy", &yt).expect("yt saved");
    write_npy("light_curve_x.npy", &x).expect("x saved");
    write_npy("light_curve_mean.npy", &mean).expect("mean saved");
    write_npy("light_curve_std.npy", &std).expect("std saved");
}
