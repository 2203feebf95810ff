//! Per-draw calibration of protein means against known concentrations.
//!
//! For every draw the protein means of the standards are regressed on their
//! known concentrations by ordinary least squares, and the fit is inverted
//! to put every protein on the concentration scale.

use log::info;
use rayon::prelude::*;
use thiserror::Error;

use crate::data::KnownConcentrations;
use crate::model::{CalibrationDraws, DrawSet, Trace};
use crate::utils::usize_to_f64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("calibration needs at least two distinct known concentrations, found {distinct}")]
    DegenerateCalibration { distinct: usize },
    #[error("known concentration given for protein {protein}, but only {n_proteins} proteins exist")]
    UnknownProtein { protein: usize, n_proteins: usize },
    #[error("no known concentrations were supplied")]
    EmptyCalibrationSet,
    #[error("draw {iteration} has a zero calibration slope")]
    ZeroSlope { iteration: usize },
}

fn mean(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count();
    values.sum::<f64>() / usize_to_f64(n)
}

/// Intercept and slope of `mu_known` on `concentrations`, population moments.
fn fit_draw(mu_known: &[f64], concentrations: &[f64], concentration_mean: f64, variance: f64) -> [f64; 2] {
    let mu_mean = mean(mu_known.iter().copied());
    let covariance = mean(
        mu_known
            .iter()
            .zip(concentrations)
            .map(|(&mu, &conc)| (mu - mu_mean) * (conc - concentration_mean)),
    );
    let slope = covariance / variance;
    [concentration_mean.mul_add(-slope, mu_mean), slope]
}

/// Calibration coefficients and concentrations for every draw of `mu`.
///
/// # Errors
///
/// Returns `CalibrationError` for an empty or degenerate standard set, an
/// unknown protein index, or a draw whose slope is exactly zero.
pub fn calibrate(
    mu: &Trace<f64>,
    known: &KnownConcentrations,
) -> Result<CalibrationDraws, CalibrationError> {
    if known.is_empty() {
        return Err(CalibrationError::EmptyCalibrationSet);
    }
    let n_proteins = mu.width();
    if let Some(&protein) = known.proteins.iter().find(|&&protein| protein >= n_proteins) {
        return Err(CalibrationError::UnknownProtein {
            protein,
            n_proteins,
        });
    }
    let mut distinct = known.concentrations.clone();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    if distinct.len() < 2 {
        return Err(CalibrationError::DegenerateCalibration {
            distinct: distinct.len(),
        });
    }

    let concentrations = &known.concentrations;
    let concentration_mean = mean(concentrations.iter().copied());
    let variance = mean(
        concentrations
            .iter()
            .map(|&conc| (conc - concentration_mean) * (conc - concentration_mean)),
    );

    let n_iterations = mu.n_iterations();
    let rows = (0..n_iterations)
        .into_par_iter()
        .map(|iteration| {
            let row = mu.row(iteration);
            let mu_known: Vec<f64> = known.proteins.iter().map(|&protein| row[protein]).collect();
            let [intercept, slope] =
                fit_draw(&mu_known, concentrations, concentration_mean, variance);
            if slope == 0.0 {
                return Err(CalibrationError::ZeroSlope { iteration });
            }
            let calibrated: Vec<f64> = row.iter().map(|&value| (value - intercept) / slope).collect();
            Ok(([intercept, slope], calibrated))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut beta = Trace::zeros(n_iterations, 2);
    let mut concentration = Trace::zeros(n_iterations, n_proteins);
    for (iteration, (coefficients, calibrated)) in rows.iter().enumerate() {
        beta.set_row(iteration, coefficients);
        concentration.set_row(iteration, calibrated);
    }
    Ok(CalibrationDraws {
        beta,
        concentration,
        concentration_dist: None,
    })
}

/// Compute the calibration of `draws` and replace its calibration block.
/// On error the draw set is left untouched.
///
/// # Errors
///
/// Returns `CalibrationError` as [`calibrate`] does.
pub fn apply_calibration(
    draws: &mut DrawSet,
    known: &KnownConcentrations,
) -> Result<(), CalibrationError> {
    let calibration = calibrate(&draws.mu, known)?;
    info!(
        "calibrated {} proteins against {} standards over {} draws",
        draws.mu.width(),
        known.len(),
        draws.n_iterations()
    );
    draws.calibration = Some(calibration);
    Ok(())
}
