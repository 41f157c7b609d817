pub mod eigen;
pub mod precondition;
pub mod sparse_lu;

use nalgebra::{DMatrix, DVector};
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::{error, warn};

pub use eigen::EigenSolver;
pub use precondition::{PreconditionedHessian, precondition_hessian};
pub use sparse_lu::SparseLuSolver;

/// Primary strategy for the Newton system. The eigen-decomposition
/// pseudo-inverse is always available as the fallback.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverType {
    #[default]
    SparseLu,
    DenseEigen,
}

impl Display for LinearSolverType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LinearSolverType::SparseLu => write!(f, "Sparse LU"),
            LinearSolverType::DenseEigen => write!(f, "Dense eigen-decomposition"),
        }
    }
}

/// Linear algebra specific error types for hv-newton
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Matrix factorization failed (LU, eigen-decomposition)
    #[error("Matrix factorization failed: {0}")]
    FactorizationFailed(String),

    /// Singular or near-singular matrix detected
    #[error("Singular matrix detected (matrix is not invertible)")]
    SingularMatrix,

    /// Failed to create sparse matrix from triplets
    #[error("Failed to create sparse matrix: {0}")]
    SparseMatrixCreation(String),

    /// The solve produced NaN or Inf
    #[error("Numerical instability detected: {0}")]
    NumericalInstability(String),

    /// Matrix and right-hand side do not fit together
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| LinAlgError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    /// (e.g. faer's `FaerError` or `LuError`).
    ///
    /// # Example
    /// ```ignore
    /// SymbolicLu::try_new(matrix.symbolic())
    ///     .map_err(|e| {
    ///         LinAlgError::FactorizationFailed("Symbolic LU failed".to_string())
    ///             .log_with_source(e)
    ///     })?;
    /// ```
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// A solver for square systems `A x = b`.
pub trait LinearSystemSolver {
    /// Solve `matrix * x = rhs`.
    ///
    /// # Errors
    /// Returns `LinAlgError` if:
    /// - Matrix factorization fails
    /// - The solution contains NaN or Inf
    fn solve(&mut self, matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> LinAlgResult<DVector<f64>>;
}

/// Which strategy produced a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStrategy {
    SparseLu,
    EigenPseudoInverse,
    /// Every strategy failed; the solution is the zero vector
    Zero,
}

impl Display for SolveStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SolveStrategy::SparseLu => write!(f, "sparse LU"),
            SolveStrategy::EigenPseudoInverse => write!(f, "eigen pseudo-inverse"),
            SolveStrategy::Zero => write!(f, "zero"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub solution: DVector<f64>,
    pub strategy: SolveStrategy,
}

/// Solve `matrix * x = rhs`, falling back to the eigen pseudo-inverse when the
/// primary solver fails. Never errors: if both strategies fail the solution is
/// zero, so the caller's step is a no-op.
pub fn solve_with_fallback(
    solver_type: LinearSolverType,
    matrix: &DMatrix<f64>,
    rhs: &DVector<f64>,
) -> SolveOutcome {
    if solver_type == LinearSolverType::SparseLu {
        match SparseLuSolver::new().solve(matrix, rhs) {
            Ok(solution) => {
                return SolveOutcome {
                    solution,
                    strategy: SolveStrategy::SparseLu,
                };
            }
            Err(e) => warn!("Sparse LU solve failed ({e}), falling back to eigen-decomposition"),
        }
    }

    match EigenSolver::new().solve(matrix, rhs) {
        Ok(solution) => SolveOutcome {
            solution,
            strategy: SolveStrategy::EigenPseudoInverse,
        },
        Err(e) => {
            error!("Eigen-decomposition fallback failed ({e}), using a zero step");
            SolveOutcome {
                solution: DVector::zeros(rhs.len()),
                strategy: SolveStrategy::Zero,
            }
        }
    }
}

/// Check that `matrix` is square and matches `rhs`.
pub(crate) fn check_system(matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> LinAlgResult<()> {
    if !matrix.is_square() || matrix.nrows() != rhs.len() {
        return Err(LinAlgError::DimensionMismatch(format!(
            "matrix is {}x{}, right-hand side has {} rows",
            matrix.nrows(),
            matrix.ncols(),
            rhs.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    const TOLERANCE: f64 = 1e-10;

    #[test]
    fn test_regular_system_uses_sparse_lu() {
        let a = dmatrix![4.0, 1.0; 1.0, 3.0];
        let b = dvector![1.0, 2.0];
        let outcome = solve_with_fallback(LinearSolverType::SparseLu, &a, &b);

        assert_eq!(outcome.strategy, SolveStrategy::SparseLu);
        assert!((&a * &outcome.solution - &b).norm() < TOLERANCE);
    }

    #[test]
    fn test_singular_system_falls_back_to_eigen() {
        // rank one: the second row is twice the first
        let a = dmatrix![1.0, 2.0; 2.0, 4.0];
        let b = dvector![1.0, 2.0];
        let outcome = solve_with_fallback(LinearSolverType::SparseLu, &a, &b);

        assert_eq!(outcome.strategy, SolveStrategy::EigenPseudoInverse);
        assert!(outcome.solution.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_matrix_yields_finite_solution() {
        let a = DMatrix::zeros(3, 3);
        let b = dvector![1.0, 0.0, -1.0];
        let outcome = solve_with_fallback(LinearSolverType::SparseLu, &a, &b);
        assert!(outcome.solution.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_dense_eigen_is_primary_when_selected() {
        let a = dmatrix![-2.0, 0.0; 0.0, -1.0];
        let b = dvector![2.0, 1.0];
        let outcome = solve_with_fallback(LinearSolverType::DenseEigen, &a, &b);

        assert_eq!(outcome.strategy, SolveStrategy::EigenPseudoInverse);
        assert!((outcome.solution - dvector![-1.0, -1.0]).norm() < TOLERANCE);
    }
}
