use faer::{
    Mat,
    linalg::solvers::Solve,
    sparse::linalg::solvers::{Lu, SymbolicLu},
    sparse::{SparseColMat, Triplet},
};
use nalgebra::{DMatrix, DVector};

use crate::linalg::{LinAlgError, LinAlgResult, LinearSystemSolver, check_system};

/// Direct sparse LU solve of the (possibly KKT-augmented) Newton system.
///
/// Newton matrices of a partition are block-structured: the HV Hessian couples
/// neighbouring points only, and the constraint blocks are block-diagonal. The
/// dense assembly is converted to compressed columns keeping exact non-zeros.
#[derive(Debug, Default)]
pub struct SparseLuSolver {
    /// Non-zeros of the last factorized matrix
    nnz: usize,
}

impl SparseLuSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries in the last converted matrix
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    fn to_sparse(&mut self, matrix: &DMatrix<f64>) -> LinAlgResult<SparseColMat<usize, f64>> {
        let n = matrix.nrows();
        let mut triplets = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let value = matrix[(i, j)];
                if value != 0.0 {
                    triplets.push(Triplet::new(i, j, value));
                }
            }
        }
        self.nnz = triplets.len();

        SparseColMat::try_new_from_triplets(n, n, &triplets).map_err(|e| {
            LinAlgError::SparseMatrixCreation("Failed to create Newton matrix".to_string())
                .log_with_source(e)
        })
    }
}

impl LinearSystemSolver for SparseLuSolver {
    fn solve(&mut self, matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> LinAlgResult<DVector<f64>> {
        check_system(matrix, rhs)?;
        let n = rhs.len();
        if n == 0 {
            return Ok(DVector::zeros(0));
        }

        // faer's numeric LU panics on an exactly zero pivot
        check_pivots(matrix)?;
        let sparse = self.to_sparse(matrix)?;

        let symbolic = SymbolicLu::try_new(sparse.symbolic()).map_err(|e| {
            LinAlgError::FactorizationFailed("Symbolic LU decomposition failed".to_string())
                .log_with_source(e)
        })?;
        let lu = Lu::try_new_with_symbolic(symbolic, sparse.as_ref())
            .map_err(|e| LinAlgError::SingularMatrix.log_with_source(e))?;

        let b = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let x = lu.solve(&b);

        let solution = DVector::from_fn(n, |i, _| x[(i, 0)]);
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(LinAlgError::NumericalInstability(
                "sparse LU produced a non-finite solution".to_string(),
            ));
        }
        Ok(solution)
    }
}

/// Reject matrices whose partially pivoted dense LU has a pivot below
/// `n * eps * max|a_ij|`.
fn check_pivots(matrix: &DMatrix<f64>) -> LinAlgResult<()> {
    let scale = matrix.amax();
    if !scale.is_finite() {
        return Err(LinAlgError::NumericalInstability(
            "Newton matrix has non-finite entries".to_string(),
        ));
    }
    let tol = matrix.nrows() as f64 * f64::EPSILON * scale;
    let u = matrix.clone().lu().u();
    if scale == 0.0 || u.diagonal().iter().any(|p| p.abs() <= tol) {
        return Err(LinAlgError::SingularMatrix);
    }
    Ok(())
}
