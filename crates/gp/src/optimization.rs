use ndarray::{Array1, Array2, Zip, arr1, s};
use ndarray_rand::RandomExt;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use rand_xoshiro::Xoshiro256Plus;

use linfa::prelude::Float;

pub(crate) struct CobylaParams {
    pub rhobeg: f64,
    pub ftol_rel: f64,
    pub maxeval: usize,
}

impl Default for CobylaParams {
    fn default() -> Self {
        CobylaParams {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: 200,
        }
    }
}

/// Starting points for hyperparameters optimization: `param0` clipped to bounds
/// followed by `n_start` points drawn uniformly within bounds.
pub(crate) fn prepare_multistart<F: Float>(
    n_start: usize,
    param0: &Array1<F>,
    bounds: &[(F, F)],
) -> Array2<F> {
    let mut params0 = Array2::zeros((n_start + 1, param0.len()));
    Zip::from(params0.row_mut(0))
        .and(param0)
        .and(bounds)
        .for_each(|p, &v, &(lo, up)| *p = v.max(lo).min(up));

    if n_start > 0 {
        // Seeded for reproducibility, only used to spread starting points over the bounds
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let unit = Array2::random_using((n_start, param0.len()), Uniform::new(0., 1.), &mut rng);
        Zip::from(params0.slice_mut(s![1.., ..]).rows_mut())
            .and(unit.rows())
            .for_each(|mut row, u| {
                Zip::from(&mut row)
                    .and(&u)
                    .and(bounds)
                    .for_each(|p, &ui, &(lo, up)| *p = lo + F::cast(ui) * (up - lo));
            });
    }
    params0
}

/// Optimize gp hyper parameters given an initial guess and bounds with cobyla
pub(crate) fn optimize_params<ObjF, F>(
    objfn: ObjF,
    param0: &Array1<F>,
    bounds: &[(F, F)],
    cobyla: CobylaParams,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64], Option<&mut [f64]>, &mut ()) -> f64,
    F: Float,
{
    use cobyla::{Func, StopTols, minimize};

    let cons: Vec<&dyn Func<()>> = vec![];
    let param0: Vec<f64> = param0.iter().map(into_f64).collect();
    let bounds: Vec<_> = bounds
        .iter()
        .map(|(lo, up)| (into_f64(lo), into_f64(up)))
        .collect();

    match minimize(
        |x, u| objfn(x, None, u),
        &param0,
        &bounds,
        &cons,
        (),
        cobyla.maxeval,
        cobyla::RhoBeg::All(cobyla.rhobeg),
        Some(StopTols {
            ftol_rel: cobyla.ftol_rel,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let params_opt = arr1(&x_opt);
            let fval = if f64::is_nan(fval) {
                f64::INFINITY
            } else {
                fval
            };
            (fval, params_opt)
        }
        Err((status, x_opt, _)) => {
            log::warn!("ERROR Cobyla optimizer in GP status={status:?}");
            (f64::INFINITY, arr1(&x_opt))
        }
    }
}

#[inline(always)]
fn into_f64<F: Float>(v: &F) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}
