use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::linalg::{LinAlgError, LinAlgResult, LinearSystemSolver, check_system};

/// Eigenvalues with magnitude at or below this are treated as zero
pub const EIGEN_ZERO_TOL: f64 = 1e-8;
/// Replacement for vanishing eigenvalues
pub const EIGEN_CLAMP: f64 = 1e-6;

/// Pseudo-inverse solve through the symmetric eigen-decomposition
/// `A = V diag(w) V^T`: `x = V diag(1 / w) V^T b`, with vanishing eigenvalues
/// replaced by [`EIGEN_CLAMP`].
///
/// Always yields a finite solution for finite input, which makes it the fallback
/// for singular Newton systems.
#[derive(Debug, Default)]
pub struct EigenSolver {
    clamped: usize,
}

impl EigenSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Eigenvalues clamped during the last solve
    pub fn clamped(&self) -> usize {
        self.clamped
    }
}

impl LinearSystemSolver for EigenSolver {
    fn solve(&mut self, matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> LinAlgResult<DVector<f64>> {
        check_system(matrix, rhs)?;
        if matrix.iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
            return Err(LinAlgError::NumericalInstability(
                "non-finite entries in the linear system".to_string(),
            ));
        }

        // the KKT matrix is symmetric up to round-off
        let symmetric = (matrix + matrix.transpose()) * 0.5;
        let eigen = SymmetricEigen::new(symmetric);

        self.clamped = 0;
        let inv_w = eigen.eigenvalues.map(|w| {
            if w.abs() <= EIGEN_ZERO_TOL {
                self.clamped += 1;
                1.0 / EIGEN_CLAMP
            } else {
                1.0 / w
            }
        });

        let v = &eigen.eigenvectors;
        let projected = v.transpose() * rhs;
        let solution = v * projected.component_mul(&inv_w);

        if solution.iter().any(|x| !x.is_finite()) {
            return Err(LinAlgError::FactorizationFailed(
                "eigen-decomposition produced a non-finite solution".to_string(),
            ));
        }
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_matches_inverse_on_regular_matrix() -> TestResult {
        let a = dmatrix![-3.0, 1.0; 1.0, -2.0];
        let b = dvector![1.0, 1.0];
        let mut solver = EigenSolver::new();
        let x = solver.solve(&a, &b)?;

        assert!((&a * &x - &b).norm() < 1e-10);
        assert_eq!(solver.clamped(), 0);
        Ok(())
    }

    #[test]
    fn test_clamps_zero_eigenvalues() -> TestResult {
        let a = dmatrix![1.0, 0.0; 0.0, 0.0];
        let b = dvector![2.0, 3e-6];
        let mut solver = EigenSolver::new();
        let x = solver.solve(&a, &b)?;

        assert_eq!(solver.clamped(), 1);
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_rejects_non_finite_input() {
        let a = dmatrix![f64::NAN, 0.0; 0.0, 1.0];
        let b = dvector![1.0, 1.0];
        assert!(EigenSolver::new().solve(&a, &b).is_err());
    }
}
