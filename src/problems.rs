//! Analytic test problems used by the tests, the bench and the demo binary.

use nalgebra::{DMatrix, DVector};

use crate::core::problem::{EqualityConstraints, MultiObjective};

/// Two squared distances to anchor points:
/// `f_1(x) = ||x - a||^2`, `f_2(x) = ||x - b||^2`.
///
/// The Pareto set is the segment between `a` and `b`.
#[derive(Debug, Clone)]
pub struct BiQuadratic {
    a: DVector<f64>,
    b: DVector<f64>,
}

impl BiQuadratic {
    pub fn new(a: DVector<f64>, b: DVector<f64>) -> Self {
        debug_assert_eq!(a.len(), b.len(), "anchor points must share a dimension");
        Self { a, b }
    }

    pub fn anchors(&self) -> (&DVector<f64>, &DVector<f64>) {
        (&self.a, &self.b)
    }

    /// `n` evenly spaced points of the Pareto set, from `a` to `b`.
    pub fn pareto_set(&self, n: usize) -> Vec<DVector<f64>> {
        let denom = n.saturating_sub(1).max(1) as f64;
        (0..n)
            .map(|i| {
                let t = i as f64 / denom;
                &self.a * (1.0 - t) + &self.b * t
            })
            .collect()
    }

    /// Objective values of [`BiQuadratic::pareto_set`].
    pub fn pareto_front(&self, n: usize) -> Vec<DVector<f64>> {
        self.pareto_set(n).iter().map(|x| self.evaluate(x)).collect()
    }
}

impl MultiObjective for BiQuadratic {
    fn dim(&self) -> usize {
        self.a.len()
    }

    fn n_objectives(&self) -> usize {
        2
    }

    fn evaluate(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![(x - &self.a).norm_squared(), (x - &self.b).norm_squared()])
    }

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(2, self.dim());
        jac.row_mut(0).copy_from(&((x - &self.a) * 2.0).transpose());
        jac.row_mut(1).copy_from(&((x - &self.b) * 2.0).transpose());
        jac
    }

    fn hessian(&self, _x: &DVector<f64>) -> Vec<DMatrix<f64>> {
        let h = DMatrix::identity(self.dim(), self.dim()) * 2.0;
        vec![h.clone(), h]
    }
}

/// Sphere constraint `h(x) = ||x - c||^2 - r^2 = 0`.
#[derive(Debug, Clone)]
pub struct CircleConstraint {
    center: DVector<f64>,
    radius: f64,
}

impl CircleConstraint {
    pub fn new(center: DVector<f64>, radius: f64) -> Self {
        Self { center, radius }
    }
}

impl EqualityConstraints for CircleConstraint {
    fn residual(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_element(1, (x - &self.center).norm_squared() - self.radius * self.radius)
    }

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let grad = (x - &self.center) * 2.0;
        DMatrix::from_row_slice(1, x.len(), grad.as_slice())
    }

    fn hessian(&self, x: &DVector<f64>) -> Vec<DMatrix<f64>> {
        vec![DMatrix::identity(x.len(), x.len()) * 2.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn test_bi_quadratic_jacobian_matches_finite_differences() {
        let problem = BiQuadratic::new(dvector![0.0, 0.0], dvector![1.0, 0.5]);
        let x = dvector![0.3, -0.2];
        let jac = problem.jacobian(&x);
        let h = 1e-6;

        for j in 0..2 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[j] += h;
            xm[j] -= h;
            let fd = (problem.evaluate(&xp) - problem.evaluate(&xm)) / (2.0 * h);
            for i in 0..2 {
                assert!((jac[(i, j)] - fd[i]).abs() < TOLERANCE);
            }
        }
    }

    #[test]
    fn test_pareto_set_endpoints() {
        let problem = BiQuadratic::new(dvector![0.0, 0.0], dvector![1.0, 0.0]);
        let set = problem.pareto_set(5);
        assert_eq!(set.len(), 5);
        assert_eq!(set[0], dvector![0.0, 0.0]);
        assert_eq!(set[4], dvector![1.0, 0.0]);
    }

    #[test]
    fn test_circle_constraint_residual() {
        let h = CircleConstraint::new(dvector![0.0, 0.0], 1.0);
        assert!(h.residual(&dvector![1.0, 0.0])[0].abs() < 1e-15);
        assert!((h.residual(&dvector![2.0, 0.0])[0] - 3.0).abs() < 1e-15);
        let jac = h.jacobian(&dvector![1.0, 2.0]);
        assert_eq!(jac.shape(), (1, 2));
        assert_eq!(jac[(0, 0)], 2.0);
        assert_eq!(jac[(0, 1)], 4.0);
    }
}
