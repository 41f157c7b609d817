//! Hypervolume indicator and its derivatives with respect to the decision points.
//!
//! The HVN optimizer only consumes this interface. Providers stack the
//! derivatives of all `N` points of a set: the gradient has length `N * dim` and
//! the Hessian is `(N * dim, N * dim)`, point-major (point `i` owns rows
//! `i * dim .. (i + 1) * dim`).
//!
//! Providers time their own function evaluations so the optimizer can report the
//! CPU time spent in objective callables separately from linear algebra.

pub mod bi_objective;

pub use bi_objective::BiObjectiveHypervolume;

use nalgebra::{DMatrix, DVector};
use web_time as time;

/// Hypervolume gradient of a set.
#[derive(Debug, Clone)]
pub struct HypervolumeGradient {
    /// Stacked gradient, length `N * dim`
    pub hv_dx: DVector<f64>,
    /// Time spent evaluating the objective callables
    pub elapsed: time::Duration,
}

/// Hypervolume gradient and Hessian of a set.
#[derive(Debug, Clone)]
pub struct HypervolumeHessian {
    /// Stacked gradient, length `N * dim`
    pub hv_dx: DVector<f64>,
    /// Hessian, `(N * dim, N * dim)`
    pub hv_dx2: DMatrix<f64>,
    /// Time spent evaluating the objective callables
    pub elapsed: time::Duration,
}

/// Value, gradient and Hessian provider for the hypervolume indicator.
pub trait HypervolumeDerivatives: Send {
    /// The reference point bounding the dominated region
    fn reference_point(&self) -> &DVector<f64>;

    /// Orientation of the objectives the provider was built for
    fn minimization(&self) -> bool;

    /// Hypervolume of a set of objective vectors.
    fn hypervolume(&self, objectives: &[DVector<f64>]) -> f64;

    /// Hypervolume of the image of a set of decision points.
    fn hypervolume_at(&self, primal: &[DVector<f64>]) -> f64;

    /// Gradient w.r.t. the stacked decision points.
    fn gradient(&self, primal: &[DVector<f64>]) -> HypervolumeGradient;

    /// Gradient and Hessian w.r.t. the stacked decision points. `objectives` are
    /// the cached images of `primal`.
    fn hessian(&self, primal: &[DVector<f64>], objectives: &[DVector<f64>]) -> HypervolumeHessian;
}
