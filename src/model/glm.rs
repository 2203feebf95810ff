//! Newton fit of the two-coefficient censoring GLM.
//!
//! The fit is driven by a closure returning the log-likelihood, gradient and
//! Hessian at a coefficient vector. In a cluster the closure performs the
//! reduction of local terms, so every rank runs the same iterations on the
//! same numbers and reaches the same result.

use faer::Mat;

use crate::utils::{cholesky_lower, matrix_inverse, solve_linear_system};

use super::state::GlmTerms;

const MAX_ITER: usize = 50;
const TOLERANCE: f64 = 1.0e-8;
const MAX_HALVINGS: usize = 30;

/// Maximum-likelihood fit of the censoring coefficients.
#[derive(Debug, Clone)]
pub struct CensoringFit {
    pub mode: [f64; 2],
    /// Observed information (negative Hessian) at the mode.
    pub information: Mat<f64>,
    /// Lower Cholesky factor of the inverse information.
    pub chol_cov: Mat<f64>,
    /// Log-likelihood at the starting point.
    pub log_likelihood_start: f64,
}

fn information_matrix(terms: &GlmTerms) -> Mat<f64> {
    let [h00, h01, h11] = terms.hessian;
    Mat::from_fn(2, 2, |row, col| match (row, col) {
        (0, 0) => -h00,
        (1, 1) => -h11,
        _ => -h01,
    })
}

fn max_abs_diff(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).abs().max((a[1] - b[1]).abs())
}

/// Newton iterations with step halving from `start`.
///
/// Returns `Ok(None)` when the fit breaks down numerically: non-finite
/// terms, a singular or indefinite information matrix, or no convergence.
///
/// # Errors
///
/// Propagates any error returned by `evaluate`.
pub fn fit_censoring_glm<E, F>(start: [f64; 2], mut evaluate: F) -> Result<Option<CensoringFit>, E>
where
    F: FnMut([f64; 2]) -> Result<GlmTerms, E>,
{
    let mut beta = start;
    let mut terms = evaluate(beta)?;
    let log_likelihood_start = terms.log_likelihood;

    for _ in 0..MAX_ITER {
        if !terms.log_likelihood.is_finite() {
            return Ok(None);
        }
        let information = information_matrix(&terms);
        if cholesky_lower(&information).is_none() {
            return Ok(None);
        }
        let gradient = Mat::from_fn(2, 1, |row, _| terms.gradient[row]);
        let Ok(step) = solve_linear_system(&information, &gradient) else {
            return Ok(None);
        };
        let step = [step[(0, 0)], step[(1, 0)]];

        let mut scale: f64 = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_HALVINGS {
            let candidate = [
                scale.mul_add(step[0], beta[0]),
                scale.mul_add(step[1], beta[1]),
            ];
            let candidate_terms = evaluate(candidate)?;
            if candidate_terms.log_likelihood.is_finite()
                && candidate_terms.log_likelihood >= terms.log_likelihood - TOLERANCE
            {
                accepted = Some((candidate, candidate_terms));
                break;
            }
            scale *= 0.5;
        }
        let Some((beta_next, terms_next)) = accepted else {
            return Ok(None);
        };

        let converged = max_abs_diff(beta_next, beta) < TOLERANCE;
        beta = beta_next;
        terms = terms_next;
        if converged {
            return Ok(finish(beta, &terms, log_likelihood_start));
        }
    }

    Ok(None)
}

fn finish(mode: [f64; 2], terms: &GlmTerms, log_likelihood_start: f64) -> Option<CensoringFit> {
    let information = information_matrix(terms);
    cholesky_lower(&information)?;
    if !(mode[0].is_finite() && mode[1].is_finite()) {
        return None;
    }
    let covariance = matrix_inverse(&information).ok()?;
    let chol_cov = cholesky_lower(&covariance)?;
    Some(CensoringFit {
        mode,
        information,
        chol_cov,
        log_likelihood_start,
    })
}
