//! Generational Distance.
//!
//! `GD(Y) = (1/N Σ_i d_i^p)^(1/p)` with `d_i` the distance of approximation point
//! `y_i` to its nearest reference point.

use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::sync::Arc;

use crate::core::problem::MultiObjective;
use crate::indicator::{
    IndicatorDerivatives, IndicatorError, IndicatorResult, PointSet, ReferenceSet, SetIndicator,
    check_dim, clamped_pow, linearize, objective_points, weighted_hessian,
};
use crate::matching::nearest;

pub struct GenerationalDistance {
    reference: ReferenceSet,
    objective: Option<Arc<dyn MultiObjective>>,
    p: f64,
}

impl GenerationalDistance {
    pub fn new(reference: ReferenceSet, p: f64) -> Self {
        Self {
            reference,
            objective: None,
            p,
        }
    }

    /// Attach the objective used for decision-space inputs and derivatives.
    pub fn with_objective(mut self, objective: Arc<dyn MultiObjective>) -> Self {
        self.objective = Some(objective);
        self
    }

    pub fn reference(&self) -> &ReferenceSet {
        &self.reference
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    /// Nearest reference point and distance of every point of `y`.
    fn nearest_references(&self, y: &[DVector<f64>]) -> IndicatorResult<Vec<(usize, f64)>> {
        check_dim(y, self.reference.dim())?;
        y.iter()
            .map(|p| {
                nearest(p, self.reference.reference_set())
                    .ok_or_else(|| IndicatorError::EmptyReferenceSet.log())
            })
            .collect()
    }
}

impl fmt::Display for GenerationalDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GD")
    }
}

impl SetIndicator for GenerationalDistance {
    fn compute(&mut self, points: PointSet<'_>) -> IndicatorResult<f64> {
        let y = objective_points(points, self.objective.as_ref())?;
        let nearest = self.nearest_references(&y)?;
        let mean = nearest.iter().map(|(_, d)| d.powf(self.p)).sum::<f64>() / y.len() as f64;
        Ok(mean.powf(1.0 / self.p))
    }

    /// Derivatives of `GD^p`.
    ///
    /// The Hessian is exact for `p = 2`. For other `p` it adds the rank-one term
    /// `p (p - 2) / N d^(p-4) (J^T diff)(J^T diff)^T` to the `p = 2` shaped
    /// curvature `p / N (J^T J + Σ_k diff_k H_k)` without scaling the latter by
    /// `d^(p-2)`.
    fn compute_derivatives(
        &mut self,
        x: &[DVector<f64>],
        y: Option<&[DVector<f64>]>,
        compute_hessian: bool,
        jacobian: Option<&[DMatrix<f64>]>,
    ) -> IndicatorResult<IndicatorDerivatives> {
        let lin = linearize(x, y, jacobian, compute_hessian, self.objective.as_ref())?;
        let nearest = self.nearest_references(&lin.y)?;

        let n = x.len() as f64;
        let p = self.p;
        let c1 = p / n;
        let c2 = p * (p - 2.0) / n;

        let mut gradient = Vec::with_capacity(x.len());
        let mut hessian = compute_hessian.then(|| Vec::with_capacity(x.len()));
        for (i, &(r, d)) in nearest.iter().enumerate() {
            let diff = &lin.y[i] - &self.reference.reference_set()[r];
            let jac = &lin.jacobian[i];
            let grad = jac.transpose() * &diff;
            gradient.push(&grad * (c1 * clamped_pow(d, p - 2.0)));

            if let (Some(out), Some(blocks)) = (hessian.as_mut(), lin.hessian.as_ref()) {
                let dim = x[i].len();
                let mut h = (jac.transpose() * jac + weighted_hessian(&blocks[i], &diff, dim)) * c1;
                if p != 2.0 {
                    h += &grad * grad.transpose() * (c2 * clamped_pow(d, p - 4.0));
                }
                out.push(h);
            }
        }

        Ok(IndicatorDerivatives { gradient, hessian })
    }
}
