//! Dense linear solves for the assembled network.
//!
//! Well-posed square systems go through an LU factorisation. Rectangular or
//! singular systems fall back to the minimum-norm least-squares solution
//! from an SVD, which also yields the rank and a nullspace basis for
//! diagnosing under-constrained topologies.

use log::warn;
use nalgebra::linalg::{LU, SVD};
use nalgebra::{DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveMethod {
    Exact,
    LeastSquares,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub x: DVector<f64>,
    pub method: SolveMethod,
    pub residual_norm: f64,
}

#[derive(Debug, Clone)]
pub struct LeastSquaresSolution {
    pub x: DVector<f64>,
    pub residual_norm: f64,
    pub rank: usize,
    /// Orthonormal basis of the nullspace, one column per free direction.
    pub nullspace: DMatrix<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinearSolver {
    /// Matrices with a larger condition number are treated as singular.
    pub condition_threshold: f64,
    /// Singular values below `rank_tolerance * σ_max` count as zero.
    pub rank_tolerance: f64,
}

impl Default for LinearSolver {
    fn default() -> Self {
        Self {
            condition_threshold: 1e12,
            rank_tolerance: 1e-12,
        }
    }
}

impl LinearSolver {
    pub fn new(condition_threshold: f64) -> Self {
        Self {
            condition_threshold,
            ..Self::default()
        }
    }

    /// Unique solution of a square, well-conditioned system.
    ///
    /// Fails with `SingularSystem` when the 2-norm condition number exceeds
    /// the threshold.
    pub fn solve_exact(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
        check_shapes(a, b)?;
        if a.nrows() != a.ncols() {
            return Err(Error::DimensionMismatch {
                context: "exact solve requires a square matrix",
                expected: a.nrows(),
                actual: a.ncols(),
            });
        }

        let condition = condition_number(a);
        if !(condition <= self.condition_threshold) {
            return Err(Error::SingularSystem {
                condition,
                threshold: self.condition_threshold,
            });
        }

        let x = a.clone().lu().solve(b).ok_or(Error::SingularSystem {
            condition: f64::INFINITY,
            threshold: self.condition_threshold,
        })?;
        check_finite(&x)?;
        Ok(x)
    }

    /// Exact solve when possible, least squares otherwise.
    ///
    /// Never fails on singularity; only on shape mismatch.
    pub fn solve(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<Solution> {
        check_shapes(a, b)?;

        if a.nrows() == a.ncols() {
            let lu = a.clone().lu();
            let estimate = lu_condition_estimate(&lu);
            if estimate <= self.condition_threshold {
                if let Some(x) = lu.solve(b) {
                    if x.iter().all(|v| v.is_finite()) {
                        let residual_norm = (a * &x - b).norm();
                        return Ok(Solution {
                            x,
                            method: SolveMethod::Exact,
                            residual_norm,
                        });
                    }
                }
            }
            warn!(
                "square system {}x{} is singular (condition estimate {:e}), using least squares",
                a.nrows(),
                a.ncols(),
                estimate
            );
        }

        let ls = self.least_squares(a, b)?;
        Ok(Solution {
            x: ls.x,
            method: SolveMethod::LeastSquares,
            residual_norm: ls.residual_norm,
        })
    }

    /// Minimum-norm least-squares solution with rank and nullspace.
    pub fn least_squares(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<LeastSquaresSolution> {
        check_shapes(a, b)?;
        let (m, n) = a.shape();
        if n == 0 {
            return Ok(LeastSquaresSolution {
                x: DVector::zeros(0),
                residual_norm: b.norm(),
                rank: 0,
                nullspace: DMatrix::zeros(0, 0),
            });
        }

        // Zero rows leave the solution unchanged but make the SVD return a
        // complete n x n right basis for wide matrices.
        let rows = m.max(n);
        let mut padded = DMatrix::<f64>::zeros(rows, n);
        padded.view_mut((0, 0), (m, n)).copy_from(a);
        let mut padded_b = DVector::<f64>::zeros(rows);
        padded_b.rows_mut(0, m).copy_from(b);

        let svd = SVD::new(padded, true, true);
        let sigma_max = svd.singular_values.max();
        let eps = (self.rank_tolerance * sigma_max).max(f64::MIN_POSITIVE);

        let x = if sigma_max > 0.0 {
            svd.solve(&padded_b, eps)
                .map_err(|e| Error::Decomposition(e.to_string()))?
        } else {
            DVector::zeros(n)
        };
        check_finite(&x)?;

        let v_t = svd
            .v_t
            .as_ref()
            .ok_or_else(|| Error::Decomposition("right singular vectors unavailable".to_string()))?;
        let null_rows: Vec<usize> = svd
            .singular_values
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s <= eps)
            .map(|(i, _)| i)
            .collect();
        let rank = n - null_rows.len();
        let mut nullspace = DMatrix::<f64>::zeros(n, null_rows.len());
        for (col, &row) in null_rows.iter().enumerate() {
            nullspace.set_column(col, &v_t.row(row).transpose());
        }

        let residual_norm = (a * &x - b).norm();
        Ok(LeastSquaresSolution {
            x,
            residual_norm,
            rank,
            nullspace,
        })
    }
}

/// 2-norm condition number, `σ_max / σ_min`.
pub fn condition_number(a: &DMatrix<f64>) -> f64 {
    let sv = SVD::new(a.clone(), false, false).singular_values;
    if sv.is_empty() {
        return 1.0;
    }
    let max = sv.max();
    let min = sv.min();
    if min <= 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}

/// Cheap condition estimate from the pivots of an LU factorisation.
fn lu_condition_estimate(lu: &LU<f64, Dyn, Dyn>) -> f64 {
    let u = lu.u();
    let diag = u.diagonal();
    if diag.is_empty() {
        return 1.0;
    }
    let max = diag.amax();
    let min = diag.iter().fold(f64::INFINITY, |acc, v| acc.min(v.abs()));
    if min == 0.0 || !min.is_finite() {
        f64::INFINITY
    } else {
        max / min
    }
}

fn check_shapes(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<()> {
    if a.nrows() != b.len() {
        return Err(Error::DimensionMismatch {
            context: "right-hand side length",
            expected: a.nrows(),
            actual: b.len(),
        });
    }
    Ok(())
}

fn check_finite(x: &DVector<f64>) -> Result<()> {
    match x.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(Error::NonFiniteSolution { index }),
        None => Ok(()),
    }
}
