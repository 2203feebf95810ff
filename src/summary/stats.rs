//! Scalar posterior summaries and effective sample size.

use num_traits::ToPrimitive;
use serde::Serialize;

use crate::utils::usize_to_f64;

/// Posterior summary of one scalar trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ParameterSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub q025: f64,
    pub q50: f64,
    pub q975: f64,
    pub ess: f64,
}

#[must_use]
pub fn summarize_scalar(values: &[f64]) -> ParameterSummary {
    if values.is_empty() {
        return ParameterSummary::default();
    }

    let n = usize_to_f64(values.len());
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|value| (value - mean) * (value - mean))
        .sum::<f64>()
        / n;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    ParameterSummary {
        mean,
        std_dev: variance.sqrt(),
        q025: percentile(&sorted, 0.025),
        q50: percentile(&sorted, 0.5),
        q975: percentile(&sorted, 0.975),
        ess: effective_sample_size(values),
    }
}

/// Linearly interpolated quantile of sorted values.
#[must_use]
pub fn percentile(sorted_values: &[f64], probability: f64) -> f64 {
    let Some(last) = sorted_values.len().checked_sub(1) else {
        return f64::NAN;
    };
    let position = probability.clamp(0.0, 1.0) * usize_to_f64(last);
    let lower = position.floor().to_usize().unwrap_or(0).min(last);
    let upper = position.ceil().to_usize().unwrap_or(last).min(last);
    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = position - usize_to_f64(lower);
        (1.0 - weight).mul_add(sorted_values[lower], weight * sorted_values[upper])
    }
}

/// Effective sample size from the autocorrelations of a single chain,
/// summed over consecutive lag pairs until a pair turns non-positive.
/// A constant chain counts every draw.
#[must_use]
pub fn effective_sample_size(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 4 {
        return usize_to_f64(n);
    }
    let mean = series.iter().sum::<f64>() / usize_to_f64(n);
    let centered: Vec<f64> = series.iter().map(|value| value - mean).collect();
    let variance = centered.iter().map(|value| value * value).sum::<f64>();
    if !(variance > 0.0) {
        return usize_to_f64(n);
    }
    let rho = |lag: usize| {
        centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / variance
    };

    let mut rho_sum = 0.0;
    let mut lag = 1;
    while lag + 1 < n {
        let pair = rho(lag) + rho(lag + 1);
        if pair <= 0.0 {
            break;
        }
        rho_sum += pair;
        lag += 2;
    }
    let n = usize_to_f64(n);
    (n / 2.0f64.mul_add(rho_sum, 1.0)).clamp(1.0, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&sorted, 0.5), 3.0);
        assert_relative_eq!(percentile(&sorted, 0.125), 1.5);
        assert!(percentile(&[], 0.5).is_nan());
    }

    #[test]
    fn summary_of_known_values() {
        let summary = summarize_scalar(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(summary.mean, 5.0);
        assert_relative_eq!(summary.std_dev, 2.0);
        assert_relative_eq!(summary.q50, 4.5);
    }

    #[test]
    fn ess_is_small_for_sticky_chain() {
        let sticky: Vec<f64> = (0..400).map(|i| f64::from(i / 50)).collect();
        assert!(effective_sample_size(&sticky) < 40.0);
    }

    #[test]
    fn ess_of_alternating_chain_is_capped() {
        let alternating: Vec<f64> = (0..100).map(|i| f64::from(i % 2)).collect();
        assert_relative_eq!(effective_sample_size(&alternating), 100.0);
        assert_relative_eq!(effective_sample_size(&[3.0; 10]), 10.0);
    }
}
