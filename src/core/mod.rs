//! Core building blocks of the Hypervolume Newton method
//!
//! - Problem formulation: objective and equality-constraint callables, box bounds
//! - Population: primal/dual points and their cached objective values
//! - Dominance sorting and the per-iteration partition structure

pub mod pareto;
pub mod partition;
pub mod population;
pub mod problem;

use thiserror::Error;
use tracing::error;

/// Core module error types. All of them are configuration errors: they are
/// raised immediately and never retried.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Lower/upper bound vectors are inconsistent
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    /// A point of the initial guess lies outside the box
    #[error("Initial guess point {index} lies outside the bounds")]
    InitialGuessOutOfBounds { index: usize },

    /// Uniform initialization was requested but some bound is infinite
    #[error("Cannot sample the initial population: bounds are not finite and no initial guess was given")]
    UnboundedSampling,

    /// Dimension mismatch between callables, points and bounds
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid input parameter or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// Bounds::new(lower, upper).map_err(|e| e.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the underlying source error
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;
