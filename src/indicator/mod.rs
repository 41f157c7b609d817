//! Set-distance indicators with analytic derivatives.
//!
//! - [`GenerationalDistance`] (GD): how close an approximation set is to a
//!   reference set
//! - [`InvertedGenerationalDistance`] (IGD): how well an approximation set covers
//!   a reference set, optionally through one-to-one cluster matching
//! - [`ReferenceSet`]: the (possibly multi-component) reference set and its
//!   persistent medoid matching
//!
//! Derivatives are those of `indicator^p` with respect to the decision variables,
//! one gradient vector and one Hessian block per approximation point.

use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::core::problem::MultiObjective;
use crate::matching::MatchingError;

pub mod gd;
pub mod igd;
pub mod reference_set;

pub use gd::GenerationalDistance;
pub use igd::InvertedGenerationalDistance;
pub use reference_set::ReferenceSet;

/// Indicator-specific error types for hv-newton
#[derive(Debug, Clone, Error)]
pub enum IndicatorError {
    /// Fewer reference components than approximation-set partitions
    #[error("{components} reference components cannot cover {partitions} partitions")]
    ComponentMismatch { components: usize, partitions: usize },

    /// A reference component has fewer points than the partition matched to it
    #[error("Reference component {component} has {size} points, {required} are needed")]
    ComponentTooSmall {
        component: usize,
        size: usize,
        required: usize,
    },

    /// An explicit partition of the approximation set is not a partition of it
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    /// Decision points were given but no objective callables are attached
    #[error("No objective function attached to the indicator")]
    MissingObjective,

    /// Point dimensions disagree
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The reference set (or one of its components) has no points
    #[error("Reference set is empty")]
    EmptyReferenceSet,

    /// `set_medoid` was called for a point without a current match
    #[error("Approximation point {index} has no matched medoid")]
    NotMatched { index: usize },

    /// Clustering failed
    #[error("Matching error: {0}")]
    Matching(#[from] MatchingError),
}

impl IndicatorError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for indicator operations
pub type IndicatorResult<T> = Result<T, IndicatorError>;

/// Input of an indicator: decision points (mapped through the objective) or
/// objective points directly.
#[derive(Debug, Clone, Copy)]
pub enum PointSet<'a> {
    Decision(&'a [DVector<f64>]),
    Objective(&'a [DVector<f64>]),
}

/// Per-point derivatives of `indicator^p`.
#[derive(Debug, Clone)]
pub struct IndicatorDerivatives {
    /// One `dim` vector per point
    pub gradient: Vec<DVector<f64>>,
    /// One `dim x dim` block per point, when requested
    pub hessian: Option<Vec<DMatrix<f64>>>,
}

/// A set indicator that can drive a Newton-type set optimizer.
///
/// Methods take `&mut self` because cluster matching caches its state between
/// calls.
pub trait SetIndicator {
    /// Indicator value of an approximation set.
    fn compute(&mut self, points: PointSet<'_>) -> IndicatorResult<f64>;

    /// Gradient (and Hessian) of `indicator^p` with respect to the decision
    /// points `x`.
    ///
    /// * `y` - Objective values of `x`; evaluated when `None`
    /// * `jacobian` - Objective Jacobians at `x`; evaluated when `None`
    fn compute_derivatives(
        &mut self,
        x: &[DVector<f64>],
        y: Option<&[DVector<f64>]>,
        compute_hessian: bool,
        jacobian: Option<&[DMatrix<f64>]>,
    ) -> IndicatorResult<IndicatorDerivatives>;
}

/// Objective points of a [`PointSet`].
pub(crate) fn objective_points(
    points: PointSet<'_>,
    objective: Option<&Arc<dyn MultiObjective>>,
) -> IndicatorResult<Vec<DVector<f64>>> {
    match points {
        PointSet::Objective(y) => Ok(y.to_vec()),
        PointSet::Decision(x) => {
            let objective = objective.ok_or_else(|| IndicatorError::MissingObjective.log())?;
            Ok(x.iter().map(|p| objective.evaluate(p)).collect())
        }
    }
}

/// Objective values, Jacobians and (optionally) Hessians at `x`, reusing what the
/// caller already has.
pub(crate) struct Linearization {
    pub y: Vec<DVector<f64>>,
    pub jacobian: Vec<DMatrix<f64>>,
    pub hessian: Option<Vec<Vec<DMatrix<f64>>>>,
}

pub(crate) fn linearize(
    x: &[DVector<f64>],
    y: Option<&[DVector<f64>]>,
    jacobian: Option<&[DMatrix<f64>]>,
    compute_hessian: bool,
    objective: Option<&Arc<dyn MultiObjective>>,
) -> IndicatorResult<Linearization> {
    let require = || objective.ok_or_else(|| IndicatorError::MissingObjective.log());

    let y = match y {
        Some(y) => y.to_vec(),
        None => objective_points(PointSet::Decision(x), objective)?,
    };
    let jacobian = match jacobian {
        Some(j) => j.to_vec(),
        None => {
            let objective = require()?;
            x.iter().map(|p| objective.jacobian(p)).collect()
        }
    };
    let hessian = if compute_hessian {
        let objective = require()?;
        Some(x.iter().map(|p| objective.hessian(p)).collect())
    } else {
        None
    };

    if y.len() != x.len() || jacobian.len() != x.len() {
        return Err(IndicatorError::DimensionMismatch(format!(
            "{} decision points, {} objective points, {} Jacobians",
            x.len(),
            y.len(),
            jacobian.len()
        ))
        .log());
    }
    Ok(Linearization {
        y,
        jacobian,
        hessian,
    })
}

pub(crate) fn check_dim(points: &[DVector<f64>], dim: usize) -> IndicatorResult<()> {
    match points.iter().position(|p| p.len() != dim) {
        Some(i) => Err(IndicatorError::DimensionMismatch(format!(
            "point {i} has dimension {}, reference set has {dim}",
            points[i].len()
        ))
        .log()),
        None => Ok(()),
    }
}

/// `d^e`, with `0^e = 0` for `e != 0`.
pub(crate) fn clamped_pow(d: f64, e: f64) -> f64 {
    if e == 0.0 {
        1.0
    } else if d == 0.0 {
        0.0
    } else {
        d.powf(e)
    }
}

/// `Σ_k w_k H_k` for per-objective Hessian blocks.
pub(crate) fn weighted_hessian(blocks: &[DMatrix<f64>], weights: &DVector<f64>, dim: usize) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(dim, dim);
    for (h, w) in blocks.iter().zip(weights.iter()) {
        out += h * *w;
    }
    out
}
