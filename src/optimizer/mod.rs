//! The Hypervolume Newton optimizer.
//!
//! - [`newton`]: per-partition Newton system assembly (optionally KKT-augmented)
//!   and its robust solve
//! - [`line_search`]: backtracking line searches under box constraints
//! - [`hvn`]: the driver that partitions the population, steps every partition and
//!   records the history

use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::error;

use crate::core::CoreError;
use crate::linalg;

pub mod hvn;
pub mod line_search;
pub mod newton;

pub use hvn::Hvn;
pub use line_search::{HypervolumeLineSearch, LineSearchConfig, LineSearchOutcome};
pub use newton::{NewtonStep, NewtonSystemBuilder};

// Re-export observer types from the observers module
pub use crate::observers::{OptObserver, OptObserverVec};

/// Optimizer-specific error types for hv-newton
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// Linear system solve failed during optimization
    #[error("Linear system solve failed: {0}")]
    LinearSolveFailed(String),

    /// Invalid optimization parameters provided
    #[error("Invalid optimization parameters: {0}")]
    InvalidParameters(String),

    /// A callable returned data of the wrong shape
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Pruning or configuration left no point to optimize
    #[error("Population is empty")]
    EmptyPopulation,

    /// Linear algebra operation failed
    #[error("Linear algebra error: {0}")]
    LinAlg(#[from] linalg::LinAlgError),

    /// Problem or population error raised while stepping
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| OptimizerError::from(e).log())?;
    /// ```
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

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The iteration budget was used up
    MaxIterations { iterations: usize },
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MaxIterations { iterations } => {
                write!(f, "maximum iterations reached ({iterations})")
            }
        }
    }
}

/// Status of an optimization process
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OptimizationStatus {
    /// No stop criterion is met yet
    #[default]
    Running,
    /// A stop criterion fired
    Converged(StopReason),
}

impl OptimizationStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, OptimizationStatus::Running)
    }
}

impl Display for OptimizationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::Running => write!(f, "Running"),
            OptimizationStatus::Converged(reason) => write!(f, "Stopped: {reason}"),
        }
    }
}
