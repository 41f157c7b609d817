//! Inverted Generational Distance.
//!
//! Without cluster matching `IGD(Y) = (1/M Σ_j d_j^p)^(1/p)`, with `d_j` the
//! distance of reference point `r_j` to its nearest approximation point. With
//! cluster matching every approximation point gets its own medoid target from the
//! [`ReferenceSet`] and the value is the mean squared distance to the targets.
//!
//! Derivatives use the `p = 2` formulas in both modes:
//!
//! - nearest neighbour: `∇_i = 2/M J_i^T (m_i y_i - Z_i)` where `m_i` counts the
//!   reference points whose nearest approximation point is `y_i` and `Z_i` sums
//!   them
//! - cluster matching: `∇_i = 2 J_i^T (y_i - t_i)`, the derivative of
//!   `Σ_i ||y_i - t_i||^2` for fixed targets `t_i`

use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::sync::Arc;

use crate::core::problem::MultiObjective;
use crate::indicator::{
    IndicatorDerivatives, IndicatorError, IndicatorResult, PointSet, ReferenceSet, SetIndicator,
    check_dim, linearize, objective_points, weighted_hessian,
};
use crate::matching::nearest;

pub struct InvertedGenerationalDistance {
    reference: ReferenceSet,
    objective: Option<Arc<dyn MultiObjective>>,
    p: f64,
    cluster_matching: bool,
}

/// Nearest-neighbour assignment from reference points to approximation points.
struct Coverage {
    /// Distance of every reference point to its nearest approximation point
    distances: Vec<f64>,
    /// Number of reference points per approximation point
    counts: Vec<f64>,
    /// Sum of those reference points per approximation point
    sums: Vec<DVector<f64>>,
}

impl InvertedGenerationalDistance {
    pub fn new(reference: ReferenceSet, p: f64) -> Self {
        Self {
            reference,
            objective: None,
            p,
            cluster_matching: false,
        }
    }

    /// Attach the objective used for decision-space inputs and derivatives.
    pub fn with_objective(mut self, objective: Arc<dyn MultiObjective>) -> Self {
        self.objective = Some(objective);
        self
    }

    pub fn with_cluster_matching(mut self, cluster_matching: bool) -> Self {
        self.cluster_matching = cluster_matching;
        self
    }

    pub fn cluster_matching(&self) -> bool {
        self.cluster_matching
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    pub fn reference(&self) -> &ReferenceSet {
        &self.reference
    }

    /// Mutable access, e.g. to toggle re-matching or move medoids.
    pub fn reference_mut(&mut self) -> &mut ReferenceSet {
        &mut self.reference
    }

    fn coverage(&self, y: &[DVector<f64>]) -> IndicatorResult<Coverage> {
        check_dim(y, self.reference.dim())?;
        let dim = self.reference.dim();
        let mut coverage = Coverage {
            distances: Vec::with_capacity(self.reference.len()),
            counts: vec![0.0; y.len()],
            sums: vec![DVector::zeros(dim); y.len()],
        };
        for r in self.reference.reference_set() {
            let (i, d) = nearest(r, y).ok_or_else(|| {
                IndicatorError::DimensionMismatch("approximation set is empty".into()).log()
            })?;
            coverage.distances.push(d);
            coverage.counts[i] += 1.0;
            coverage.sums[i] += r;
        }
        Ok(coverage)
    }
}

impl fmt::Display for InvertedGenerationalDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cluster_matching {
            write!(f, "IGD (w/matching)")
        } else {
            write!(f, "IGD")
        }
    }
}

impl SetIndicator for InvertedGenerationalDistance {
    fn compute(&mut self, points: PointSet<'_>) -> IndicatorResult<f64> {
        let y = objective_points(points, self.objective.as_ref())?;
        if self.cluster_matching {
            let targets = self.reference.match_points(&y)?;
            let total: f64 = y
                .iter()
                .zip(targets)
                .map(|(p, t)| (p - t).norm_squared())
                .sum();
            return Ok(total / y.len() as f64);
        }

        let coverage = self.coverage(&y)?;
        let mean = coverage
            .distances
            .iter()
            .map(|d| d.powf(self.p))
            .sum::<f64>()
            / coverage.distances.len() as f64;
        Ok(mean.powf(1.0 / self.p))
    }

    fn compute_derivatives(
        &mut self,
        x: &[DVector<f64>],
        y: Option<&[DVector<f64>]>,
        compute_hessian: bool,
        jacobian: Option<&[DMatrix<f64>]>,
    ) -> IndicatorResult<IndicatorDerivatives> {
        let lin = linearize(x, y, jacobian, compute_hessian, self.objective.as_ref())?;

        // per point: difference vector and multiplicity of J^T J
        let (c, diffs, counts): (f64, Vec<DVector<f64>>, Vec<f64>) = if self.cluster_matching {
            let targets = self.reference.match_points(&lin.y)?;
            let diffs = lin.y.iter().zip(targets).map(|(p, t)| p - t).collect();
            (2.0, diffs, vec![1.0; x.len()])
        } else {
            let coverage = self.coverage(&lin.y)?;
            let diffs = lin
                .y
                .iter()
                .zip(coverage.counts.iter().zip(&coverage.sums))
                .map(|(p, (m, z))| p * *m - z)
                .collect();
            (2.0 / self.reference.len() as f64, diffs, coverage.counts)
        };

        let mut gradient = Vec::with_capacity(x.len());
        let mut hessian = compute_hessian.then(|| Vec::with_capacity(x.len()));
        for (i, diff) in diffs.iter().enumerate() {
            let jac = &lin.jacobian[i];
            gradient.push(jac.transpose() * diff * c);

            if let (Some(out), Some(blocks)) = (hessian.as_mut(), lin.hessian.as_ref()) {
                let dim = x[i].len();
                out.push(
                    (jac.transpose() * jac * counts[i] + weighted_hessian(&blocks[i], diff, dim)) * c,
                );
            }
        }

        Ok(IndicatorDerivatives { gradient, hessian })
    }
}
