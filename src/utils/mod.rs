/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared linear algebra and numeric conversion helpers.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Small helpers for faer solves, Cholesky factors and the count to float
//! conversion used across the sampler, calibration and summary code.

use faer::Mat;
use faer::prelude::Solve;
use thiserror::Error;

/// Failure of a dense linear solve.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("linear solve produced non-finite values")]
pub struct SolveError;

/// # Errors
///
/// Returns `SolveError` if the solve produces non-finite values.
pub fn solve_linear_system(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>, SolveError> {
    if !matrix_is_finite(a) || !matrix_is_finite(b) {
        return Err(SolveError);
    }
    let lu = a.full_piv_lu();
    let solution = lu.solve(b.clone());
    if !matrix_is_finite(&solution) {
        return Err(SolveError);
    }
    Ok(solution)
}

/// Inverse of a square matrix through an LU solve against the identity.
///
/// # Errors
///
/// Returns `SolveError` if the matrix is singular or not finite.
pub fn matrix_inverse(matrix: &Mat<f64>) -> Result<Mat<f64>, SolveError> {
    let dim = matrix.nrows();
    solve_linear_system(matrix, &identity_matrix(dim))
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

#[must_use]
pub fn identity_matrix(dim: usize) -> Mat<f64> {
    Mat::from_fn(dim, dim, |row, col| if row == col { 1.0 } else { 0.0 })
}

/// Lower Cholesky factor, or `None` if the matrix is not positive definite.
#[must_use]
pub fn cholesky_lower(matrix: &Mat<f64>) -> Option<Mat<f64>> {
    let dim = matrix.ncols();
    if matrix.nrows() != dim {
        return None;
    }
    let mut lower = Mat::<f64>::zeros(dim, dim);
    for row in 0..dim {
        for col in 0..=row {
            let mut sum = matrix[(row, col)];
            for k in 0..col {
                sum -= lower[(row, k)] * lower[(col, k)];
            }
            if row == col {
                if !(sum > 0.0) {
                    return None;
                }
                lower[(row, col)] = sum.sqrt();
            } else {
                let denom = lower[(col, col)];
                if denom <= 0.0 {
                    return None;
                }
                lower[(row, col)] = sum / denom;
            }
        }
    }
    Some(lower)
}

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn solve_linear_system_rejects_non_finite_rhs() {
        let a = identity_matrix(2);
        let b = Mat::from_fn(2, 1, |i, _| if i == 0 { f64::NAN } else { 1.0 });
        let err = solve_linear_system(&a, &b).expect_err("non-finite rhs should fail");
        assert_eq!(err, SolveError);
    }

    #[test]
    fn inverse_of_diagonal_matrix() {
        let matrix = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 + usize_to_f64(i) } else { 0.0 });
        let inverse = matrix_inverse(&matrix).expect("diagonal matrix is invertible");
        assert_relative_eq!(inverse[(0, 0)], 0.5, epsilon = 1.0e-12);
        assert_relative_eq!(inverse[(1, 1)], 1.0 / 3.0, epsilon = 1.0e-12);
        assert_relative_eq!(inverse[(0, 1)], 0.0, epsilon = 1.0e-12);
    }

    #[test]
    fn cholesky_reconstructs_matrix() {
        let matrix = Mat::from_fn(2, 2, |i, j| match (i, j) {
            (0, 0) => 4.0,
            (1, 1) => 3.0,
            _ => 1.0,
        });
        let lower = cholesky_lower(&matrix).expect("positive definite");
        let product = &lower * lower.transpose();
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(product[(i, j)], matrix[(i, j)], epsilon = 1.0e-12);
            }
        }
    }

    #[test]
    fn cholesky_rejects_indefinite_matrix() {
        let matrix = Mat::from_fn(2, 2, |i, j| if i == j { -1.0 } else { 0.0 });
        assert!(cholesky_lower(&matrix).is_none());
    }
}
