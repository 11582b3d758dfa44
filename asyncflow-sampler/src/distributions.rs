//! Scalar samplers over an [`RVConfig`] (non-negative reals only).

use asyncflow_core::model::RVConfig;
use asyncflow_core::schema::Distribution;
use rand::Rng;
use rand_distr::Distribution as _;

/// Draw a single non-negative sample from `cfg`.
///
/// - `uniform` ignores `mean`/`variance` entirely and draws `U[0,1)`.
/// - `exponential(mean)` uses `mean` as the scale (rate `1/mean`).
/// - `poisson(mean)` returns a non-negative integer count, as a real.
/// - `normal(mean, var)` is truncated to `>= 0` (negative draws clamp to 0).
/// - `log_normal(mean, var)` treats `(mean, sqrt(var))` as the parameters of
///   the underlying normal distribution.
pub fn sample(cfg: &RVConfig, rng: &mut impl Rng) -> f64 {
    match cfg.distribution {
        Distribution::Uniform => rng.gen::<f64>(),
        Distribution::Exponential => {
            let scale = cfg.mean.max(f64::EPSILON);
            rand_distr::Exp::new(1.0 / scale)
                .expect("scale > 0 guaranteed by validation")
                .sample(rng)
        }
        Distribution::Poisson => {
            let lambda = cfg.mean.max(0.0);
            rand_distr::Poisson::new(lambda.max(f64::EPSILON))
                .expect("lambda > 0 guaranteed by the max() floor above")
                .sample(rng)
        }
        Distribution::Normal => {
            let std_dev = cfg.variance.max(0.0).sqrt();
            let draw = rand_distr::Normal::new(cfg.mean, std_dev)
                .expect("std_dev >= 0 guaranteed above")
                .sample(rng);
            draw.max(0.0)
        }
        Distribution::LogNormal => {
            let std_dev = cfg.variance.max(0.0).sqrt();
            rand_distr::LogNormal::new(cfg.mean, std_dev)
                .expect("std_dev >= 0 guaranteed above")
                .sample(rng)
        }
    }
}
