//! # HV Newton
//!
//! A second-order set optimizer for multi-objective problems. The Hypervolume Newton
//! method (HVN) moves a finite approximation set towards the Pareto front by applying
//! Newton-Raphson steps to the hypervolume indicator, optionally subject to equality
//! constraints handled through a KKT-augmented system.
//!
//! ## Features
//!
//! - **Hypervolume Newton optimizer**: partitions the population by dominance rank and
//!   feasibility and solves one Newton system per partition
//! - **Robust linear algebra**: Hessian pre-conditioning to negative definiteness, sparse
//!   LU solve with an eigen-decomposition pseudo-inverse fallback
//! - **Globalization**: backtracking line search under box constraints, with a dedicated
//!   variant that restores feasibility of dominated infeasible points
//! - **Set indicators**: Generational Distance and Inverted Generational Distance with
//!   analytic gradients and Hessians, including cluster-based reference matching
//!
//! ## Modules
//!
//! - [`core`]: problem traits, bounds, population, dominance sorting and partitions
//! - [`hypervolume`]: the hypervolume derivative interface and a bi-objective provider
//! - [`linalg`]: pre-conditioning and linear system solvers
//! - [`optimizer`]: Newton system assembly, line search and the HVN driver
//! - [`indicator`]: GD / IGD and the reference-set matcher
//! - [`matching`]: distance helpers, k-medoids clustering and min-cost assignment

pub mod core;
pub mod error;
pub mod hypervolume;
pub mod indicator;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod matching;
pub mod observers;
pub mod optimizer;
pub mod problems;

pub use core::population::Population;
pub use core::problem::{Bounds, EqualityConstraints, MultiObjective, Problem};
pub use error::{HvnError, HvnResult};

pub use hypervolume::{BiObjectiveHypervolume, HypervolumeDerivatives};
pub use indicator::{
    GenerationalDistance, InvertedGenerationalDistance, PointSet, ReferenceSet, SetIndicator,
};
pub use linalg::LinearSolverType;
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level, init_logger_with_verbosity};
pub use observers::{OptObserver, OptObserverVec};
pub use optimizer::{
    Hvn, OptimizationStatus,
    hvn::{HvnConfig, HvnSolution},
};
