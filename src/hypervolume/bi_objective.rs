//! Exact hypervolume derivatives for two objectives.
//!
//! In objective space the 2-D hypervolume is a sum of rectangles spanned by the
//! non-dominated points sorted on the first objective:
//!
//! ```text
//! HV = sum_k (y1_{k+1} - y1_k) * (r2 - y2_k),   y1_{K} := r1
//! ```
//!
//! Differentiating gives, for staircase point `k`,
//!
//! ```text
//! dHV/dy1_k = y2_k - y2_{k-1}            (y2_{-1} := r2)
//! dHV/dy2_k = -(y1_{k+1} - y1_k)
//! ```
//!
//! and a Hessian whose only non-zeros are `d2HV/dy1_k dy2_k = 1` and
//! `d2HV/dy1_k dy2_{k-1} = -1` (plus the symmetric entries). Dominated points and
//! points outside the reference box have zero derivatives.
//!
//! Everything is computed in minimization form. Maximization negates objectives
//! and reference point, which flips the gradient sign and leaves the Hessian
//! unchanged.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use web_time as time;

use crate::core::problem::MultiObjective;
use crate::hypervolume::{HypervolumeDerivatives, HypervolumeGradient, HypervolumeHessian};

/// Hypervolume of a bi-objective problem, chained to the decision space through
/// the objective Jacobian and Hessians.
pub struct BiObjectiveHypervolume {
    objective: Arc<dyn MultiObjective>,
    reference: DVector<f64>,
    minimization: bool,
}

impl BiObjectiveHypervolume {
    /// The reference point is checked against the problem by
    /// [`Hvn::new`](crate::optimizer::Hvn::new); only its first two entries are read.
    pub fn new(objective: Arc<dyn MultiObjective>, reference: DVector<f64>, minimization: bool) -> Self {
        Self {
            objective,
            reference,
            minimization,
        }
    }

    fn sign(&self) -> f64 {
        if self.minimization { 1.0 } else { -1.0 }
    }

    /// Indices of the staircase points (in minimization form), sorted by the
    /// first objective. Duplicates keep only the first of their sorted run.
    fn staircase(&self, objectives: &[DVector<f64>]) -> Vec<usize> {
        let s = self.sign();
        let (r1, r2) = (s * self.reference[0], s * self.reference[1]);

        let mut inside: Vec<usize> = (0..objectives.len())
            .filter(|&i| s * objectives[i][0] < r1 && s * objectives[i][1] < r2)
            .collect();
        inside.sort_by(|&a, &b| {
            let (ya, yb) = (&objectives[a], &objectives[b]);
            (s * ya[0])
                .total_cmp(&(s * yb[0]))
                .then((s * ya[1]).total_cmp(&(s * yb[1])))
        });

        let mut best_y2 = r2;
        let mut front = Vec::with_capacity(inside.len());
        for i in inside {
            let y2 = s * objectives[i][1];
            if y2 < best_y2 {
                best_y2 = y2;
                front.push(i);
            }
        }
        front
    }

    /// Gradient of the hypervolume w.r.t. each objective vector, in the caller's
    /// orientation.
    fn objective_gradient(&self, objectives: &[DVector<f64>], front: &[usize]) -> Vec<DVector<f64>> {
        let s = self.sign();
        let (r1, r2) = (s * self.reference[0], s * self.reference[1]);
        let mut grad = vec![DVector::zeros(2); objectives.len()];

        for (k, &i) in front.iter().enumerate() {
            let y1 = s * objectives[i][0];
            let y2 = s * objectives[i][1];
            let prev_y2 = if k == 0 {
                r2
            } else {
                s * objectives[front[k - 1]][1]
            };
            let next_y1 = front.get(k + 1).map_or(r1, |&j| s * objectives[j][0]);

            grad[i][0] = s * (y2 - prev_y2);
            grad[i][1] = -s * (next_y1 - y1);
        }
        grad
    }

    /// Non-zero entries `(i, a, j, b, value)` of the objective-space Hessian,
    /// `d2HV / dy_{i,a} dy_{j,b}`, both triangles included.
    fn objective_hessian(front: &[usize]) -> Vec<(usize, usize, usize, usize, f64)> {
        let mut entries = Vec::with_capacity(4 * front.len());
        for (k, &i) in front.iter().enumerate() {
            entries.push((i, 0, i, 1, 1.0));
            entries.push((i, 1, i, 0, 1.0));
            if k > 0 {
                let prev = front[k - 1];
                entries.push((i, 0, prev, 1, -1.0));
                entries.push((prev, 1, i, 0, -1.0));
            }
        }
        entries
    }
}

impl HypervolumeDerivatives for BiObjectiveHypervolume {
    fn reference_point(&self) -> &DVector<f64> {
        &self.reference
    }

    fn minimization(&self) -> bool {
        self.minimization
    }

    fn hypervolume(&self, objectives: &[DVector<f64>]) -> f64 {
        let s = self.sign();
        let (r1, r2) = (s * self.reference[0], s * self.reference[1]);
        let front = self.staircase(objectives);

        front
            .iter()
            .enumerate()
            .map(|(k, &i)| {
                let next_y1 = front.get(k + 1).map_or(r1, |&j| s * objectives[j][0]);
                (next_y1 - s * objectives[i][0]) * (r2 - s * objectives[i][1])
            })
            .sum()
    }

    fn hypervolume_at(&self, primal: &[DVector<f64>]) -> f64 {
        let objectives: Vec<DVector<f64>> =
            primal.iter().map(|x| self.objective.evaluate(x)).collect();
        self.hypervolume(&objectives)
    }

    fn gradient(&self, primal: &[DVector<f64>]) -> HypervolumeGradient {
        let dim = self.objective.dim();
        let start = time::Instant::now();
        let objectives: Vec<DVector<f64>> =
            primal.iter().map(|x| self.objective.evaluate(x)).collect();
        let jacobians: Vec<_> = primal.iter().map(|x| self.objective.jacobian(x)).collect();
        let elapsed = start.elapsed();

        let front = self.staircase(&objectives);
        let grad_y = self.objective_gradient(&objectives, &front);

        let mut hv_dx = DVector::zeros(primal.len() * dim);
        for (i, (jac, g)) in jacobians.iter().zip(&grad_y).enumerate() {
            hv_dx.rows_mut(i * dim, dim).copy_from(&(jac.transpose() * g));
        }

        HypervolumeGradient { hv_dx, elapsed }
    }

    fn hessian(&self, primal: &[DVector<f64>], objectives: &[DVector<f64>]) -> HypervolumeHessian {
        let dim = self.objective.dim();
        let n = primal.len();

        let start = time::Instant::now();
        let jacobians: Vec<DMatrix<f64>> =
            primal.iter().map(|x| self.objective.jacobian(x)).collect();
        let hessians: Vec<Vec<DMatrix<f64>>> =
            primal.iter().map(|x| self.objective.hessian(x)).collect();
        let elapsed = start.elapsed();

        let front = self.staircase(objectives);
        let grad_y = self.objective_gradient(objectives, &front);

        let mut hv_dx = DVector::zeros(n * dim);
        let mut hv_dx2 = DMatrix::zeros(n * dim, n * dim);

        for i in 0..n {
            let jac = &jacobians[i];
            hv_dx
                .rows_mut(i * dim, dim)
                .copy_from(&(jac.transpose() * &grad_y[i]));

            // second-order term of the chain rule: sum_m g_im * d2f_m/dx2
            let mut block = hv_dx2.view_mut((i * dim, i * dim), (dim, dim));
            for (m, h) in hessians[i].iter().enumerate() {
                block += h * grad_y[i][m];
            }
        }

        for (i, a, j, b, value) in Self::objective_hessian(&front) {
            let outer = jacobians[i].row(a).transpose() * jacobians[j].row(b) * value;
            let mut block = hv_dx2.view_mut((i * dim, j * dim), (dim, dim));
            block += outer;
        }

        HypervolumeHessian {
            hv_dx,
            hv_dx2,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::BiQuadratic;
    use nalgebra::dvector;

    const TOLERANCE: f64 = 1e-5;

    fn provider() -> BiObjectiveHypervolume {
        let objective = Arc::new(BiQuadratic::new(dvector![0.0, 0.0], dvector![1.0, 0.0]));
        BiObjectiveHypervolume::new(objective, dvector![2.0, 2.0], true)
    }

    fn points() -> Vec<DVector<f64>> {
        vec![dvector![0.3, 0.1], dvector![0.6, 0.2], dvector![0.8, -0.1]]
    }

    fn anchored(reference: DVector<f64>) -> BiObjectiveHypervolume {
        BiObjectiveHypervolume::new(provider().objective.clone(), reference, true)
    }

    #[test]
    fn test_hypervolume_of_staircase() {
        let hv = anchored(dvector![4.0, 4.0]);
        let objectives = vec![dvector![1.0, 3.0], dvector![2.0, 2.0], dvector![3.0, 1.0]];
        // rectangles 1x1 + 1x2 + 1x3
        assert!((hv.hypervolume(&objectives) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_dominated_and_outside_points_do_not_count() {
        let hv = anchored(dvector![4.0, 4.0]);
        let base = vec![dvector![1.0, 3.0], dvector![3.0, 1.0]];
        let mut extended = base.clone();
        extended.push(dvector![3.5, 3.5]);
        extended.push(dvector![5.0, 0.0]);
        extended.push(dvector![1.0, 3.0]);
        assert!((hv.hypervolume(&base) - hv.hypervolume(&extended)).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let hv = provider();
        let x = points();
        let grad = hv.gradient(&x).hv_dx;
        let h = 1e-6;
        for i in 0..x.len() {
            for j in 0..2 {
                let mut xp = x.clone();
                let mut xm = x.clone();
                xp[i][j] += h;
                xm[i][j] -= h;
                let fd = (hv.hypervolume_at(&xp) - hv.hypervolume_at(&xm)) / (2.0 * h);
                assert!(
                    (grad[i * 2 + j] - fd).abs() < TOLERANCE,
                    "gradient mismatch at ({i}, {j}): {} vs {fd}",
                    grad[i * 2 + j]
                );
            }
        }
    }

    #[test]
    fn test_hessian_matches_finite_differences_of_gradient() {
        let hv = provider();
        let x = points();
        let objectives: Vec<DVector<f64>> = x.iter().map(|p| hv.objective.evaluate(p)).collect();
        let hessian = hv.hessian(&x, &objectives).hv_dx2;
        let h = 1e-6;

        for i in 0..x.len() {
            for j in 0..2 {
                let mut xp = x.clone();
                let mut xm = x.clone();
                xp[i][j] += h;
                xm[i][j] -= h;
                let fd = (hv.gradient(&xp).hv_dx - hv.gradient(&xm).hv_dx) / (2.0 * h);
                for r in 0..fd.len() {
                    assert!(
                        (hessian[(r, i * 2 + j)] - fd[r]).abs() < 1e-4,
                        "Hessian mismatch at ({r}, {})",
                        i * 2 + j
                    );
                }
            }
        }
        assert!((&hessian - hessian.transpose()).abs().max() < 1e-12);
    }

    #[test]
    fn test_maximization_flips_gradient_sign() {
        let objective: Arc<dyn MultiObjective> =
            Arc::new(BiQuadratic::new(dvector![0.0, 0.0], dvector![1.0, 0.0]));
        let min = BiObjectiveHypervolume::new(objective.clone(), dvector![2.0, 2.0], true);

        // maximizing -f against -r is the same problem as minimizing f against r
        let negated = Arc::new(Negated(objective));
        let max = BiObjectiveHypervolume::new(negated, dvector![-2.0, -2.0], false);

        let x = points();
        assert!((min.hypervolume_at(&x) - max.hypervolume_at(&x)).abs() < 1e-12);
        let diff = min.gradient(&x).hv_dx - max.gradient(&x).hv_dx;
        assert!(diff.norm() < 1e-12);
    }

    struct Negated(Arc<dyn MultiObjective>);

    impl MultiObjective for Negated {
        fn dim(&self) -> usize {
            self.0.dim()
        }
        fn n_objectives(&self) -> usize {
            self.0.n_objectives()
        }
        fn evaluate(&self, x: &DVector<f64>) -> DVector<f64> {
            -self.0.evaluate(x)
        }
        fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            -self.0.jacobian(x)
        }
        fn hessian(&self, x: &DVector<f64>) -> Vec<DMatrix<f64>> {
            self.0.hessian(x).into_iter().map(|h| -h).collect()
        }
    }
}
