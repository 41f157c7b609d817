//! Point-set matching primitives used by the reference-set matcher.
//!
//! - [`distance`]: Euclidean pairwise distances, nearest neighbours and the directed
//!   Hausdorff distance
//! - [`assignment`]: minimum-cost bipartite assignment on rectangular cost matrices
//! - [`kmedoids`]: k-medoids clustering (k-medoids++ seeding, alternating updates)

use thiserror::Error;
use tracing::error;

pub mod assignment;
pub mod distance;
pub mod kmedoids;

pub use assignment::min_cost_assignment;
pub use distance::{cdist, directed_hausdorff, euclidean, nearest};
pub use kmedoids::{KMedoids, KMedoidsFit};

/// Matching-specific error types for hv-newton
#[derive(Debug, Clone, Error)]
pub enum MatchingError {
    /// More clusters requested than there are points
    #[error("Cannot form {k} clusters from {n} points")]
    InvalidClusterCount { k: usize, n: usize },
}

impl MatchingError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for matching operations
pub type MatchingResult<T> = Result<T, MatchingError>;
