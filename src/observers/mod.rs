//! Observer pattern for HVN monitoring.
//!
//! Observers registered on [`Hvn`](crate::optimizer::Hvn) are notified after every
//! iteration with the current population, so progress can be recorded or plotted
//! without touching the optimizer.
//!
//! ```text
//! ┌─────────────────┐
//! │       Hvn       │
//! └────────┬────────┘
//!          │ observers.notify(population, iteration)
//!          ├──────────────┬──────────────┐
//!          ▼              ▼              ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │ History  │  │ Metrics  │  │  Custom  │
//!    │ Recorder │  │ Observer │  │ Observer │
//!    └──────────┘  └──────────┘  └──────────┘
//! ```
//!
//! # Custom Observer
//!
//! ```no_run
//! use hv_newton::observers::OptObserver;
//! use hv_newton::Population;
//!
//! struct SizeObserver {
//!     min_size: std::sync::Mutex<usize>,
//! }
//!
//! impl OptObserver for SizeObserver {
//!     fn on_step(&self, population: &Population, _iteration: usize) {
//!         if let Ok(mut min) = self.min_size.lock() {
//!             *min = (*min).min(population.len());
//!         }
//!     }
//! }
//! ```

use nalgebra::{DMatrix, DVector};

use crate::core::population::Population;

/// Observer trait for monitoring HVN progress.
///
/// Observers must be `Send`. Use interior mutability (`Mutex`, atomics) to record
/// state, and handle errors internally: an observer never aborts a run.
pub trait OptObserver: Send {
    /// Called after each iteration (0 = initial population).
    fn on_step(&self, population: &Population, iteration: usize);

    /// Called before `on_step` with the iteration's scalar metrics.
    ///
    /// * `hypervolume` - HV of the population after the step
    /// * `delta_hv` - `|HV_k - HV_{k-1}|`, infinite on the first iteration
    /// * `mean_step_size` - Average accepted line-search step size
    /// * `kkt_residual` - Median KKT residual norm of the non-dominated points
    ///   (constrained problems only)
    fn set_iteration_metrics(
        &self,
        _hypervolume: f64,
        _delta_hv: f64,
        _mean_step_size: f64,
        _kkt_residual: Option<f64>,
    ) {
    }

    /// Newton system of one partition, for observers that inspect its structure.
    fn set_newton_system(&self, _partition: usize, _hessian: &DMatrix<f64>, _gradient: &DVector<f64>) {}
}

/// Collection of observers, notified in registration order.
#[derive(Default)]
pub struct OptObserverVec {
    observers: Vec<Box<dyn OptObserver>>,
}

impl OptObserverVec {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add(&mut self, observer: impl OptObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    #[inline]
    pub fn set_iteration_metrics(
        &self,
        hypervolume: f64,
        delta_hv: f64,
        mean_step_size: f64,
        kkt_residual: Option<f64>,
    ) {
        for observer in &self.observers {
            observer.set_iteration_metrics(hypervolume, delta_hv, mean_step_size, kkt_residual);
        }
    }

    #[inline]
    pub fn set_newton_system(&self, partition: usize, hessian: &DMatrix<f64>, gradient: &DVector<f64>) {
        for observer in &self.observers {
            observer.set_newton_system(partition, hessian, gradient);
        }
    }

    /// Notify all observers. A no-op when none are registered.
    #[inline]
    pub fn notify(&self, population: &Population, iteration: usize) {
        for observer in &self.observers {
            observer.on_step(population, iteration);
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observers.len()
    }
}
