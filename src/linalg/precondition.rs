//! Shift the hypervolume Hessian until it is negative definite.
//!
//! The HV Hessian of a set is frequently indefinite. A Newton step on it can then
//! point towards a saddle or a minimum, so `H` is replaced by `H - tau I` with the
//! smallest `tau` (on a geometric schedule) for which `-H + tau I` admits a
//! Cholesky factorization.

use nalgebra::DMatrix;
use tracing::warn;

/// Minimum shift
pub const PRECONDITION_BETA: f64 = 1e-6;
/// Cholesky attempts before giving up
pub const PRECONDITION_MAX_ATTEMPTS: usize = 35;
/// Growth factor of the shift after a failed attempt
pub const PRECONDITION_GROWTH: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct PreconditionedHessian {
    /// `H - tau I`
    pub hessian: DMatrix<f64>,
    pub tau: f64,
    /// Cholesky factorizations tried
    pub attempts: usize,
    /// `false` when all attempts failed; `hessian` then uses the last `tau`
    pub converged: bool,
}

/// Pre-condition `hessian` to negative definiteness.
///
/// Starts from `tau = 0` when `min(diag(-H)) > 0`, else `-min(diag(-H)) + beta`,
/// and grows it to `max(1.5 tau, beta)` after each failed factorization. When
/// every attempt fails a warning is logged and the last `tau` is used anyway.
pub fn precondition_hessian(hessian: &DMatrix<f64>) -> PreconditionedHessian {
    let n = hessian.nrows();
    if n == 0 {
        return PreconditionedHessian {
            hessian: hessian.clone(),
            tau: 0.0,
            attempts: 0,
            converged: true,
        };
    }

    let negated = -hessian;
    let min_diag = negated.diagonal().min();
    let mut tau = if min_diag > 0.0 {
        0.0
    } else {
        -min_diag + PRECONDITION_BETA
    };

    let identity = DMatrix::<f64>::identity(n, n);
    let mut converged = false;
    let mut attempts = 0;
    while attempts < PRECONDITION_MAX_ATTEMPTS {
        attempts += 1;
        if (&negated + &identity * tau).cholesky().is_some() {
            converged = true;
            break;
        }
        tau = (PRECONDITION_GROWTH * tau).max(PRECONDITION_BETA);
    }

    if !converged {
        warn!(
            "Pre-conditioning the HV Hessian failed after {} attempts (tau = {:.3e})",
            attempts, tau
        );
    }

    PreconditionedHessian {
        hessian: hessian - identity * tau,
        tau,
        attempts,
        converged,
    }
}
