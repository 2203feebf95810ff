//! Log-density helpers for the prior and hyperprior families.

use statrs::function::gamma::ln_gamma;

/// Log-density for an inverse-gamma distribution with the given `rate`.
#[must_use]
pub fn log_inverse_gamma_density(value: f64, shape: f64, rate: f64) -> f64 {
    if !(value > 0.0 && shape > 0.0 && rate > 0.0) {
        return f64::NEG_INFINITY;
    }

    shape.mul_add(rate.ln(), -ln_gamma(shape)) - (shape + 1.0).mul_add(value.ln(), rate / value)
}

/// Log-density for `Gamma(shape, rate)` up to the normalizing constant.
#[must_use]
pub fn log_gamma_kernel(value: f64, shape: f64, rate: f64) -> f64 {
    if !(value > 0.0) {
        return f64::NEG_INFINITY;
    }
    (shape - 1.0).mul_add(value.ln(), -rate * value)
}

/// Log-density of a Cauchy-type prior on the censoring slope, up to a
/// constant. Zero (flat) when no scale is configured.
#[must_use]
pub fn log_slope_prior(slope: f64, scale: Option<f64>, center: Option<f64>) -> f64 {
    scale.map_or(0.0, |scale| {
        let standardized = (slope - center.unwrap_or(0.0)) / scale;
        -standardized.mul_add(standardized, 1.0).ln()
    })
}
