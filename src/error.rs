//! Error types for the hv-newton library
//!
//! This module provides the main error and result types used throughout the library.
//! All errors use the `thiserror` crate for automatic trait implementations.
//!
//! # Error Hierarchy
//!
//! - **`HvnError`** is the top-level error exposed to users via public APIs
//! - **Module errors** (`CoreError`, `OptimizerError`, `IndicatorError`, `LinAlgError`)
//!   are wrapped inside `HvnError`
//! - **Error sources** are preserved, allowing full error chain inspection
//!
//! Only configuration errors surface here. Numerical degeneracy (indefinite Hessians,
//! singular systems, line searches that run out of attempts) is logged and recovered
//! from inside the optimizer.
//!
//! Example error chain:
//! ```text
//! HvnError::Core(
//!     CoreError::InitialGuessOutOfBounds { index: 3 }
//! )
//! ```

use crate::{
    core::CoreError, indicator::IndicatorError, linalg::LinAlgError, optimizer::OptimizerError,
};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the hv-newton library
pub type HvnResult<T> = Result<T, HvnError>;

/// Main error type for the hv-newton library
#[derive(Debug, Error)]
pub enum HvnError {
    /// Core module errors (bounds, population, problem callables)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Optimization algorithm errors
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// Linear algebra errors
    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),

    /// Set indicator and reference matching errors
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}

impl HvnError {
    /// Get the full error chain as a string for logging and debugging.
    ///
    /// ```rust,ignore
    /// if let Err(e) = optimizer.run() {
    ///     warn!("Full chain: {}", e.chain());
    /// }
    /// ```
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Get a compact single-line error chain for logging
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hvn_error_display() {
        let error = HvnError::from(LinAlgError::SingularMatrix);
        assert!(error.to_string().contains("Singular matrix"));
    }

    #[test]
    fn test_hvn_error_chain() {
        let optimizer_error = OptimizerError::from(LinAlgError::FactorizationFailed(
            "sparse LU factorization failed".to_string(),
        ));
        let error = HvnError::from(optimizer_error);

        let chain = error.chain();
        assert!(chain.contains("factorization"));
        assert!(chain.contains("LU"));
    }

    #[test]
    fn test_hvn_error_chain_compact() {
        let error = HvnError::from(CoreError::InvalidInput("population is empty".to_string()));
        assert!(error.chain_compact().contains("population is empty"));
    }

    #[test]
    fn test_transparent_error_conversion() {
        let indicator_error = IndicatorError::ComponentMismatch {
            components: 1,
            partitions: 2,
        };

        let error: HvnError = indicator_error.into();
        match error {
            HvnError::Indicator(_) => {}
            _ => panic!("Expected Indicator variant"),
        }
    }
}
