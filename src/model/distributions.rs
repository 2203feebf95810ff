//! Random variate generation on top of `StdRng`.

use rand::RngExt;
use rand::rngs::StdRng;

/// Metropolis-Hastings acceptance test on the log scale.
pub fn should_accept(log_acceptance: f64, rng: &mut StdRng) -> bool {
    log_acceptance >= 0.0 || rng.random::<f64>().ln() < log_acceptance
}

pub fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

pub fn sample_normal(rng: &mut StdRng, mean: f64, variance: f64) -> f64 {
    variance.sqrt().mul_add(sample_standard_normal(rng), mean)
}

/// Marsaglia-Tsang gamma draw with the given `shape` and `scale`.
pub fn sample_gamma(rng: &mut StdRng, shape: f64, scale: f64) -> f64 {
    if !(shape > 0.0 && scale > 0.0) {
        return f64::NAN;
    }

    if shape < 1.0 {
        let u = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
        return sample_gamma(rng, shape + 1.0, scale) * u.powf(1.0 / shape);
    }

    let shape_minus_third = shape - (1.0 / 3.0);
    let coeff = (1.0 / (9.0 * shape_minus_third)).sqrt();
    loop {
        let standard_normal = sample_standard_normal(rng);
        let one_plus_coeff_noise = coeff.mul_add(standard_normal, 1.0);
        if one_plus_coeff_noise <= 0.0 {
            continue;
        }
        let cubic_term = one_plus_coeff_noise * one_plus_coeff_noise * one_plus_coeff_noise;
        let uniform = rng.random::<f64>();
        if uniform
            < (0.0331 * standard_normal * standard_normal * standard_normal)
                .mul_add(-standard_normal, 1.0)
        {
            return scale * shape_minus_third * cubic_term;
        }
        if uniform.ln()
            < (0.5 * standard_normal).mul_add(
                standard_normal,
                shape_minus_third * (1.0 - cubic_term + cubic_term.ln()),
            )
        {
            return scale * shape_minus_third * cubic_term;
        }
    }
}

/// Inverse-gamma draw parameterized by `shape` and `rate`.
pub fn sample_inverse_gamma(rng: &mut StdRng, shape: f64, rate: f64) -> f64 {
    1.0 / sample_gamma(rng, shape, 1.0 / rate)
}

pub fn sample_beta(rng: &mut StdRng, a: f64, b: f64) -> f64 {
    let x = sample_gamma(rng, a, 1.0);
    let y = sample_gamma(rng, b, 1.0);
    let total = x + y;
    if total > 0.0 {
        x / total
    } else if a >= b {
        // Both draws underflowed; fall back to the larger concentration.
        1.0
    } else {
        0.0
    }
}

pub fn sample_chi_square(rng: &mut StdRng, dof: f64) -> f64 {
    sample_gamma(rng, 0.5 * dof, 2.0)
}

/// Scale mixture factor `sqrt(df / chi2_df)` shared by Student-t draws.
pub fn sample_t_mixing(rng: &mut StdRng, dof: f64) -> f64 {
    (dof / sample_chi_square(rng, dof).max(f64::MIN_POSITIVE)).sqrt()
}

pub fn sample_student_t(rng: &mut StdRng, dof: f64, location: f64, scale: f64) -> f64 {
    let mixing = sample_t_mixing(rng, dof);
    (scale * mixing).mul_add(sample_standard_normal(rng), location)
}

/// Log-density of a location-scale Student-t, up to a constant.
#[must_use]
pub fn log_student_t_kernel(value: f64, dof: f64, location: f64, scale: f64) -> f64 {
    let standardized = (value - location) / scale;
    -0.5 * (dof + 1.0) * (standardized * standardized / dof).ln_1p()
}

pub fn sample_bernoulli(rng: &mut StdRng, probability: f64) -> bool {
    rng.random::<f64>() < probability
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn sample_mean(values: &[f64]) -> f64 {
        values.iter().sum::<f64>() / f64::from(u32::try_from(values.len()).unwrap_or(u32::MAX))
    }

    #[test]
    fn gamma_mean_matches_shape_times_scale() {
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<f64> = (0..20_000).map(|_| sample_gamma(&mut rng, 2.5, 2.0)).collect();
        assert!((sample_mean(&draws) - 5.0).abs() < 0.15);
    }

    #[test]
    fn small_shape_gamma_is_positive() {
        let mut rng = StdRng::seed_from_u64(8);
        assert!((0..1_000).all(|_| sample_gamma(&mut rng, 0.2, 1.0) > 0.0));
    }

    #[test]
    fn invalid_gamma_parameters_give_nan() {
        let mut rng = StdRng::seed_from_u64(9);
        assert!(sample_gamma(&mut rng, -1.0, 1.0).is_nan());
    }

    #[test]
    fn beta_mean_matches_ratio() {
        let mut rng = StdRng::seed_from_u64(10);
        let draws: Vec<f64> = (0..20_000).map(|_| sample_beta(&mut rng, 2.0, 6.0)).collect();
        assert!((sample_mean(&draws) - 0.25).abs() < 0.01);
        assert!(draws.iter().all(|value| (0.0..=1.0).contains(value)));
    }

    #[test]
    fn inverse_gamma_mean_matches_rate_over_shape_minus_one() {
        let mut rng = StdRng::seed_from_u64(11);
        let draws: Vec<f64> = (0..40_000)
            .map(|_| sample_inverse_gamma(&mut rng, 6.0, 10.0))
            .collect();
        assert!((sample_mean(&draws) - 2.0).abs() < 0.05);
    }

    #[test]
    fn student_t_is_centered_on_location() {
        let mut rng = StdRng::seed_from_u64(12);
        let draws: Vec<f64> = (0..20_000)
            .map(|_| sample_student_t(&mut rng, 8.0, 3.0, 0.5))
            .collect();
        assert!((sample_mean(&draws) - 3.0).abs() < 0.03);
    }

    #[test]
    fn t_kernel_peaks_at_location() {
        let at = log_student_t_kernel(1.0, 5.0, 1.0, 2.0);
        let off = log_student_t_kernel(4.0, 5.0, 1.0, 2.0);
        assert!(at.abs() < 1.0e-12);
        assert!(off < at);
    }
}
