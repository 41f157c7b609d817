//! Problem definition: objective and constraint callables plus box bounds.
//!
//! The optimizer treats the multi-objective function and the equality constraints
//! as black boxes that provide values, Jacobians and Hessians at a decision point.
//! Implementations typically come from analytic formulas or automatic
//! differentiation.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::core::{CoreError, CoreResult};

/// A vector-valued objective `f: R^dim -> R^n_objectives` with first and second
/// derivatives.
pub trait MultiObjective: Send + Sync {
    /// Dimension of the decision space
    fn dim(&self) -> usize;

    /// Number of objectives
    fn n_objectives(&self) -> usize;

    /// Objective vector at `x`
    fn evaluate(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Jacobian at `x`, shape `(n_objectives, dim)`
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;

    /// Hessians at `x`: one `(dim, dim)` matrix per objective
    fn hessian(&self, x: &DVector<f64>) -> Vec<DMatrix<f64>>;
}

/// Equality constraints `h(x) = 0` with `h: R^dim -> R^n_eq`.
pub trait EqualityConstraints: Send + Sync {
    /// Residual vector `h(x)`
    fn residual(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Jacobian at `x`, shape `(n_eq, dim)`
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;

    /// Hessians at `x`: one `(dim, dim)` matrix per constraint component
    fn hessian(&self, x: &DVector<f64>) -> Vec<DMatrix<f64>>;
}

/// Box constraints `lower <= x <= upper`, validated once at construction.
///
/// Infinite entries are allowed; they only forbid uniform sampling of the initial
/// population.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Bounds {
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> CoreResult<Self> {
        if lower.len() != upper.len() {
            return Err(CoreError::InvalidBounds(format!(
                "lower has {} entries, upper has {}",
                lower.len(),
                upper.len()
            ))
            .log());
        }
        if let Some(i) = (0..lower.len()).find(|&i| lower[i].is_nan() || upper[i].is_nan()) {
            return Err(CoreError::InvalidBounds(format!("NaN bound at coordinate {i}")).log());
        }
        if let Some(i) = (0..lower.len()).find(|&i| lower[i] > upper[i]) {
            return Err(CoreError::InvalidBounds(format!(
                "lower[{i}] = {} exceeds upper[{i}] = {}",
                lower[i], upper[i]
            ))
            .log());
        }
        Ok(Self { lower, upper })
    }

    /// The same interval `[lower, upper]` on every coordinate.
    pub fn uniform(dim: usize, lower: f64, upper: f64) -> CoreResult<Self> {
        Self::new(
            DVector::from_element(dim, lower),
            DVector::from_element(dim, upper),
        )
    }

    /// `(-inf, inf)` on every coordinate.
    pub fn unbounded(dim: usize) -> Self {
        Self {
            lower: DVector::from_element(dim, f64::NEG_INFINITY),
            upper: DVector::from_element(dim, f64::INFINITY),
        }
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    pub fn is_finite(&self) -> bool {
        self.lower.iter().chain(self.upper.iter()).all(|v| v.is_finite())
    }

    pub fn contains(&self, x: &DVector<f64>) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(v, (lo, hi))| v >= lo && v <= hi)
    }

    /// Largest finite coordinate range `max(upper - lower)`, or `None` when no
    /// coordinate has a finite range.
    pub fn max_range(&self) -> Option<f64> {
        (&self.upper - &self.lower)
            .iter()
            .copied()
            .filter(|r| r.is_finite())
            .reduce(f64::max)
    }
}

/// The objective together with the optional equality constraints.
#[derive(Clone)]
pub struct Problem {
    objective: Arc<dyn MultiObjective>,
    constraints: Option<Arc<dyn EqualityConstraints>>,
}

impl Problem {
    pub fn new(objective: Arc<dyn MultiObjective>) -> Self {
        Self {
            objective,
            constraints: None,
        }
    }

    pub fn with_constraints(mut self, constraints: Arc<dyn EqualityConstraints>) -> Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn objective(&self) -> &Arc<dyn MultiObjective> {
        &self.objective
    }

    pub fn constraints(&self) -> Option<&Arc<dyn EqualityConstraints>> {
        self.constraints.as_ref()
    }

    pub fn is_constrained(&self) -> bool {
        self.constraints.is_some()
    }

    pub fn dim(&self) -> usize {
        self.objective.dim()
    }

    pub fn n_objectives(&self) -> usize {
        self.objective.n_objectives()
    }

    /// Number of equality constraint components, inferred from `h(x)`.
    pub fn n_eq_constraints(&self, x: &DVector<f64>) -> usize {
        self.constraints
            .as_ref()
            .map_or(0, |h| h.residual(x).len())
    }

    /// Constraint Hessians at `x`, checked to be exactly `n_eq` blocks of
    /// `(dim, dim)`.
    pub fn constraint_hessian(&self, x: &DVector<f64>, n_eq: usize) -> CoreResult<Vec<DMatrix<f64>>> {
        let Some(h) = self.constraints.as_ref() else {
            return Ok(Vec::new());
        };
        let blocks = h.hessian(x);
        let dim = x.len();
        if blocks.len() != n_eq || blocks.iter().any(|b| b.shape() != (dim, dim)) {
            return Err(CoreError::DimensionMismatch(format!(
                "constraint Hessian must be {n_eq} blocks of {dim}x{dim}, got {} blocks",
                blocks.len()
            ))
            .log());
        }
        Ok(blocks)
    }

    /// Constraint Jacobian at `x`, checked to be `(n_eq, dim)`.
    pub fn constraint_jacobian(&self, x: &DVector<f64>, n_eq: usize) -> CoreResult<DMatrix<f64>> {
        let Some(h) = self.constraints.as_ref() else {
            return Ok(DMatrix::zeros(0, x.len()));
        };
        let jac = h.jacobian(x);
        if jac.shape() != (n_eq, x.len()) {
            return Err(CoreError::DimensionMismatch(format!(
                "constraint Jacobian must be {n_eq}x{}, got {}x{}",
                x.len(),
                jac.nrows(),
                jac.ncols()
            ))
            .log());
        }
        Ok(jac)
    }

    /// Constraint residual at `x` (empty without constraints).
    pub fn constraint_residual(&self, x: &DVector<f64>) -> DVector<f64> {
        self.constraints
            .as_ref()
            .map_or_else(|| DVector::zeros(0), |h| h.residual(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn test_bounds_rejects_inverted_interval() {
        let result = Bounds::new(dvector![0.0, 2.0], dvector![1.0, 1.0]);
        assert!(matches!(result, Err(CoreError::InvalidBounds(_))));
    }

    #[test]
    fn test_bounds_rejects_length_mismatch() {
        let result = Bounds::new(dvector![0.0], dvector![1.0, 1.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_bounds_contains_and_range() -> Result<(), Box<dyn std::error::Error>> {
        let bounds = Bounds::new(dvector![0.0, -2.0], dvector![1.0, 2.0])?;
        assert!(bounds.contains(&dvector![0.5, 0.0]));
        assert!(bounds.contains(&dvector![1.0, -2.0]));
        assert!(!bounds.contains(&dvector![1.5, 0.0]));
        assert_eq!(bounds.max_range(), Some(4.0));
        assert!(bounds.is_finite());
        Ok(())
    }

    #[test]
    fn test_unbounded_has_no_finite_range() {
        let bounds = Bounds::unbounded(3);
        assert!(!bounds.is_finite());
        assert_eq!(bounds.max_range(), None);
        assert!(bounds.contains(&dvector![1e9, -1e9, 0.0]));
    }
}
