//! Hypervolume Newton (HVN) driver.
//!
//! Each iteration prunes near-duplicate points, partitions the population by
//! dominance front and feasibility, solves one Newton system per partition, runs a
//! backtracking line search per partition (per point for dominated infeasible
//! points) and moves every point by `step_size * step`.
//!
//! # Example
//!
//! ```no_run
//! use hv_newton::problems::BiQuadratic;
//! use hv_newton::{BiObjectiveHypervolume, Bounds, Hvn, HvnConfig, Problem};
//! use nalgebra::dvector;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let objective = Arc::new(BiQuadratic::new(dvector![0.0, 0.0], dvector![1.0, 0.0]));
//! let hv = BiObjectiveHypervolume::new(objective.clone(), dvector![2.0, 2.0], true);
//!
//! let config = HvnConfig::new()
//!     .with_population_size(10)
//!     .with_bounds(Bounds::uniform(2, -0.5, 1.5)?)
//!     .with_max_iterations(20)
//!     .with_seed(42);
//!
//! let mut hvn = Hvn::new(Problem::new(objective), Box::new(hv), config)?;
//! let solution = hvn.run()?;
//! println!("{}", solution.summary);
//! # Ok(())
//! # }
//! ```

use nalgebra::DVector;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use tracing::{debug, info};
use web_time as time;

use crate::core::partition::Partitioning;
use crate::core::population::Population;
use crate::core::problem::{Bounds, Problem};
use crate::error::HvnResult;
use crate::hypervolume::HypervolumeDerivatives;
use crate::linalg::LinearSolverType;
use crate::optimizer::line_search::{
    HypervolumeLineSearch, LineSearchConfig, constraint_violation_line_search,
};
use crate::optimizer::newton::NewtonSystemBuilder;
use crate::optimizer::{OptObserver, OptObserverVec, OptimizationStatus, OptimizerError, StopReason};

/// Relative pruning distance: `eps = PRUNE_FACTOR * max(upper - lower)`
const PRUNE_FACTOR: f64 = 1e-3;

/// Configuration of the HVN optimizer.
///
/// ```
/// use hv_newton::optimizer::hvn::HvnConfig;
///
/// let config = HvnConfig::new()
///     .with_population_size(20)
///     .with_max_iterations(50)
///     .with_verbose(true);
/// assert_eq!(config.mu, 20);
/// ```
///
/// `xtol` and `hv_tol` are kept for completeness but never stop a run; only
/// `max_iterations` does.
#[derive(Debug, Clone)]
pub struct HvnConfig {
    /// Population size
    pub mu: usize,
    /// Box constraints; `None` means unbounded, which requires `x0`
    pub bounds: Option<Bounds>,
    /// Initial primal points, `mu` of them
    pub x0: Option<Vec<DVector<f64>>>,
    pub max_iterations: usize,
    /// Whether the objectives are minimized (drives the dominance sort)
    pub minimization: bool,
    /// Step-size tolerance (inactive)
    pub xtol: f64,
    /// Hypervolume-change tolerance (inactive)
    pub hv_tol: f64,
    /// Log a per-iteration summary at `info` level
    pub verbose: bool,
    /// Seed of the uniform initial sampling; `None` draws from the OS
    pub seed: Option<u64>,
    /// Primary strategy of the Newton solve
    pub linear_solver_type: LinearSolverType,
    pub line_search: LineSearchConfig,
    /// A point is feasible when every `|h_k(x)| <= feasibility_tol`
    pub feasibility_tol: f64,
}

impl Default for HvnConfig {
    fn default() -> Self {
        Self {
            mu: 5,
            bounds: None,
            x0: None,
            max_iterations: 100,
            minimization: true,
            xtol: 1e-3,
            hv_tol: f64::NEG_INFINITY,
            verbose: false,
            seed: None,
            linear_solver_type: LinearSolverType::default(),
            line_search: LineSearchConfig::default(),
            feasibility_tol: 1e-4,
        }
    }
}

impl HvnConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_population_size(mut self, mu: usize) -> Self {
        self.mu = mu;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Set the initial points; also sets `mu` to their count.
    pub fn with_initial_points(mut self, x0: Vec<DVector<f64>>) -> Self {
        self.mu = x0.len();
        self.x0 = Some(x0);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_minimization(mut self, minimization: bool) -> Self {
        self.minimization = minimization;
        self
    }

    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    pub fn with_hv_tol(mut self, hv_tol: f64) -> Self {
        self.hv_tol = hv_tol;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_linear_solver_type(mut self, linear_solver_type: LinearSolverType) -> Self {
        self.linear_solver_type = linear_solver_type;
        self
    }

    pub fn with_line_search(mut self, line_search: LineSearchConfig) -> Self {
        self.line_search = line_search;
        self
    }

    pub fn with_feasibility_tol(mut self, feasibility_tol: f64) -> Self {
        self.feasibility_tol = feasibility_tol;
        self
    }

    fn validate(&self) -> Result<(), OptimizerError> {
        let ls = &self.line_search;
        let problem = if self.mu == 0 {
            Some("population size must be positive".to_string())
        } else if ls.max_attempts == 0 {
            Some("line search needs at least one attempt".to_string())
        } else if !(ls.shrink_factor > 0.0 && ls.shrink_factor < 1.0) {
            Some(format!("shrink factor {} outside (0, 1)", ls.shrink_factor))
        } else if !(ls.boundary_fraction > 0.0 && ls.boundary_fraction <= 1.0) {
            Some(format!("boundary fraction {} outside (0, 1]", ls.boundary_fraction))
        } else if !(self.feasibility_tol >= 0.0) {
            Some(format!("feasibility tolerance {} is negative", self.feasibility_tol))
        } else {
            None
        };
        match problem {
            Some(msg) => Err(OptimizerError::InvalidParameters(msg).log()),
            None => Ok(()),
        }
    }

    /// Print configuration parameters (debug level)
    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:        Hypervolume Newton\n  Linear solver: {}\n  Population size:     {}\n  Bounds:              {}\n  Initial points:      {}\n  Max iterations:      {}\n  Minimization:        {}\n  xtol (inactive):     {:.2e}\n  HV tol (inactive):   {:.2e}\n  Seed:                {:?}\n  Line Search:\n  HV Armijo:           {:.2e}\n  Feasibility Armijo:  {:.2e}\n  Max attempts:        {}\n  Boundary fraction:   {:.2}\n  Feasibility tol:     {:.2e}",
            self.linear_solver_type,
            self.mu,
            if self.bounds.is_some() { "box" } else { "none" },
            if self.x0.is_some() { "given" } else { "sampled" },
            self.max_iterations,
            self.minimization,
            self.xtol,
            self.hv_tol,
            self.seed,
            self.line_search.hv_armijo,
            self.line_search.feasibility_armijo,
            self.line_search.max_attempts,
            self.line_search.boundary_fraction,
            self.feasibility_tol,
        );
    }
}

/// Per-iteration record of a run. Every vector has one entry per iteration.
#[derive(Debug, Clone, Default)]
pub struct HvnHistory {
    pub hypervolume: Vec<f64>,
    pub primal: Vec<Vec<DVector<f64>>>,
    pub objectives: Vec<Vec<DVector<f64>>>,
    /// Time spent in objective, constraint and HV callables
    pub fe_time: Vec<time::Duration>,
    /// Mean primal displacement of the points; infinite until two consecutive
    /// snapshots have the same size
    pub delta_x: Vec<f64>,
    /// Mean objective displacement, same convention as `delta_x`
    pub delta_y: Vec<f64>,
    pub delta_hv: Vec<f64>,
    /// Median KKT residual norm over non-dominated points (constrained only)
    pub kkt_residual_norm: Vec<f64>,
}

impl HvnHistory {
    pub fn len(&self) -> usize {
        self.hypervolume.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypervolume.is_empty()
    }
}

/// Per-iteration statistics for the debug table.
#[derive(Debug, Clone)]
pub struct IterationStats {
    pub iteration: usize,
    pub hypervolume: f64,
    pub delta_hv: f64,
    pub delta_x: f64,
    pub n_points: usize,
    pub n_partitions: usize,
    pub mean_step_size: f64,
    /// Line searches that ran out of attempts
    pub ls_failures: usize,
    pub fe_time_ms: f64,
    pub iter_time_ms: f64,
    pub total_time_ms: f64,
}

impl IterationStats {
    pub fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>11}  {:>11}  {:>6}  {:>5}  {:>11}  {:>7}  {:>11}  {:>11}  {:>13}",
            "iter",
            "HV",
            "|dHV|",
            "|dX|",
            "points",
            "parts",
            "step_size",
            "ls_fail",
            "fe_time",
            "iter_time",
            "total_time"
        );
    }

    pub fn print_line(&self) {
        debug!(
            "{:>4}  {:>13.6e}  {:>11.2e}  {:>11.2e}  {:>6}  {:>5}  {:>11.2e}  {:>7}  {:>9.2}ms  {:>9.2}ms  {:>11.2}ms",
            self.iteration,
            self.hypervolume,
            self.delta_hv,
            self.delta_x,
            self.n_points,
            self.n_partitions,
            self.mean_step_size,
            self.ls_failures,
            self.fe_time_ms,
            self.iter_time_ms,
            self.total_time_ms
        );
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct HvnSummary {
    pub initial_hypervolume: f64,
    pub final_hypervolume: f64,
    pub iterations: usize,
    pub initial_points: usize,
    pub final_points: usize,
    /// Line searches that ran out of attempts, over the whole run
    pub line_search_failures: usize,
    pub total_time: time::Duration,
    pub total_fe_time: time::Duration,
    pub average_time_per_iteration: time::Duration,
    pub status: OptimizationStatus,
}

impl Display for HvnSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hypervolume Newton Final Result")?;
        writeln!(f, "{}", self.status)?;
        writeln!(f)?;
        writeln!(f, "Hypervolume:")?;
        writeln!(f, "  Initial:  {:.6e}", self.initial_hypervolume)?;
        writeln!(f, "  Final:    {:.6e}", self.final_hypervolume)?;
        writeln!(
            f,
            "  Gain:     {:.6e}",
            self.final_hypervolume - self.initial_hypervolume
        )?;
        writeln!(f)?;
        writeln!(f, "Population:")?;
        writeln!(f, "  Initial points: {}", self.initial_points)?;
        writeln!(f, "  Final points:   {}", self.final_points)?;
        writeln!(f)?;
        writeln!(f, "Iterations:")?;
        writeln!(f, "  Total:                  {}", self.iterations)?;
        writeln!(f, "  Line search failures:   {}", self.line_search_failures)?;
        writeln!(f)?;
        writeln!(f, "Performance:")?;
        writeln!(
            f,
            "  Total time:             {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )?;
        writeln!(
            f,
            "  Function evaluations:   {:.2}ms",
            self.total_fe_time.as_secs_f64() * 1000.0
        )?;
        writeln!(
            f,
            "  Average per iteration:  {:.2}ms",
            self.average_time_per_iteration.as_secs_f64() * 1000.0
        )?;
        Ok(())
    }
}

/// Final state of a run.
#[derive(Debug, Clone)]
pub struct HvnSolution {
    pub primal: Vec<DVector<f64>>,
    /// Lagrange multipliers (empty vectors when unconstrained)
    pub dual: Vec<DVector<f64>>,
    pub objectives: Vec<DVector<f64>>,
    pub status: OptimizationStatus,
    pub history: HvnHistory,
    pub summary: HvnSummary,
}

/// What the last `one_step` left behind for `log`.
#[derive(Debug, Clone, Default)]
struct StepRecord {
    /// Per-point `[primal | dual]` gradient (KKT residual), post-pruning indices
    gradient: Vec<DVector<f64>>,
    nondominated: Vec<usize>,
    n_partitions: usize,
    step_sizes: Vec<f64>,
    mean_step_size: f64,
    ls_failures: usize,
    fe_time: time::Duration,
}

/// The Hypervolume Newton optimizer.
pub struct Hvn {
    config: HvnConfig,
    problem: Problem,
    hypervolume: Box<dyn HypervolumeDerivatives>,
    bounds: Bounds,
    population: Population,
    iteration: usize,
    status: OptimizationStatus,
    history: HvnHistory,
    last_step: StepRecord,
    total_ls_failures: usize,
    observers: OptObserverVec,
}

impl Hvn {
    /// Create the optimizer and its initial population.
    ///
    /// Fails on invalid configuration, on a reference point whose length differs
    /// from the number of objectives, on a provider oriented differently from
    /// `config.minimization`, and on the population rules of
    /// [`Population::initialize`].
    pub fn new(
        problem: Problem,
        hypervolume: Box<dyn HypervolumeDerivatives>,
        config: HvnConfig,
    ) -> HvnResult<Self> {
        config.validate()?;

        let n_obj = problem.n_objectives();
        if hypervolume.reference_point().len() != n_obj {
            return Err(OptimizerError::InvalidParameters(format!(
                "reference point has {} entries, problem has {n_obj} objectives",
                hypervolume.reference_point().len()
            ))
            .log()
            .into());
        }
        if hypervolume.minimization() != config.minimization {
            return Err(OptimizerError::InvalidParameters(format!(
                "hypervolume provider uses minimization = {}, configuration uses {}",
                hypervolume.minimization(),
                config.minimization
            ))
            .log()
            .into());
        }

        let bounds = config
            .bounds
            .clone()
            .unwrap_or_else(|| Bounds::unbounded(problem.dim()));
        let population = Population::initialize(
            &problem,
            &bounds,
            config.mu,
            config.x0.as_deref(),
            config.seed,
        )?;

        Ok(Self {
            config,
            problem,
            hypervolume,
            bounds,
            population,
            iteration: 0,
            status: OptimizationStatus::Running,
            history: HvnHistory::default(),
            last_step: StepRecord::default(),
            total_ls_failures: 0,
            observers: OptObserverVec::new(),
        })
    }

    /// Register an observer, notified after every iteration.
    pub fn add_observer(&mut self, observer: impl OptObserver + 'static) {
        self.observers.add(observer);
    }

    pub fn config(&self) -> &HvnConfig {
        &self.config
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn history(&self) -> &HvnHistory {
        &self.history
    }

    pub fn status(&self) -> &OptimizationStatus {
        &self.status
    }

    /// Completed iterations
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Per-point step sizes of the last iteration, in population order
    pub fn step_sizes(&self) -> &[f64] {
        &self.last_step.step_sizes
    }

    /// Hypervolume of the current objective values
    pub fn current_hypervolume(&self) -> f64 {
        self.hypervolume.hypervolume(self.population.objectives())
    }

    fn prune_eps(&self) -> f64 {
        self.bounds
            .max_range()
            .map_or(PRUNE_FACTOR, |range| PRUNE_FACTOR * range)
    }

    /// `true` per point when every equality constraint holds within
    /// `feasibility_tol`; all `true` for unconstrained problems.
    fn feasibility_mask(&self) -> Vec<bool> {
        let tol = self.config.feasibility_tol;
        self.population
            .primal()
            .iter()
            .map(|x| {
                !self.problem.is_constrained()
                    || self
                        .problem
                        .constraint_residual(x)
                        .iter()
                        .all(|h| h.abs() <= tol)
            })
            .collect()
    }

    /// One HVN iteration.
    pub fn one_step(&mut self) -> HvnResult<()> {
        self.population.prune(self.prune_eps());
        if self.population.is_empty() {
            return Err(OptimizerError::EmptyPopulation.log().into());
        }

        let feasible = self.feasibility_mask();
        let partitioning = Partitioning::build(
            self.population.objectives(),
            &feasible,
            self.config.minimization,
        );

        let n = self.population.len();
        let dim = self.population.dim();
        let mut steps = vec![DVector::zeros(dim); n];
        let mut step_sizes = vec![0.0; n];
        let mut gradient = vec![DVector::zeros(dim); n];
        let mut ls_failures = 0;
        let mut fe_time = time::Duration::ZERO;

        {
            let builder = NewtonSystemBuilder::new(
                &self.problem,
                self.hypervolume.as_ref(),
                self.config.linear_solver_type,
            );
            let line_search =
                HypervolumeLineSearch::new(&builder, &self.bounds, self.config.line_search);
            let pop = &self.population;

            for partition in partitioning.iter() {
                let idx = &partition.indices;
                let primal = gather(pop.primal(), idx);
                let dual = gather(pop.dual(), idx);
                let objectives = gather(pop.objectives(), idx);

                let system = builder.assemble(&primal, &dual, &objectives)?;
                if !self.observers.is_empty() {
                    self.observers
                        .set_newton_system(partition.key, &system.hessian, &system.gradient);
                }
                let newton = builder.solve(&system);
                fe_time += newton.fe_time;

                for (k, &i) in idx.iter().enumerate() {
                    steps[i] = newton.step[k].clone();
                    gradient[i] = newton.gradient[k].clone();
                }

                // positions within the partition
                let (restore, improve): (Vec<usize>, Vec<usize>) = if partition.key == 0 {
                    (0..idx.len())
                        .partition(|&k| partitioning.dominated_infeasible.contains(&idx[k]))
                } else {
                    (Vec::new(), (0..idx.len()).collect())
                };

                for &k in &restore {
                    let outcome = constraint_violation_line_search(
                        &builder,
                        &primal[k],
                        &newton.step[k],
                        &self.bounds,
                        &self.config.line_search,
                    )?;
                    fe_time += outcome.fe_time;
                    ls_failures += usize::from(!outcome.accepted);
                    step_sizes[idx[k]] = outcome.step_size;
                }

                if !improve.is_empty() {
                    let outcome = line_search.search(
                        &gather(&primal, &improve),
                        &gather(&dual, &improve),
                        &gather(&newton.step, &improve),
                        &gather(&newton.gradient, &improve),
                    )?;
                    fe_time += outcome.fe_time;
                    ls_failures += usize::from(!outcome.accepted);
                    for &k in &improve {
                        step_sizes[idx[k]] = outcome.step_size;
                    }
                }
            }
        }

        self.population.apply_step(&steps, &step_sizes)?;
        let start = time::Instant::now();
        self.population.evaluate(self.problem.objective().as_ref())?;
        fe_time += start.elapsed();

        self.iteration += 1;
        self.total_ls_failures += ls_failures;
        self.last_step = StepRecord {
            gradient,
            nondominated: partitioning.nondominated,
            n_partitions: partitioning.partitions.len(),
            mean_step_size: step_sizes.iter().sum::<f64>() / n as f64,
            step_sizes,
            ls_failures,
            fe_time,
        };
        Ok(())
    }

    /// Record the state reached by the last `one_step` in the history and notify
    /// observers. Returns the iteration statistics.
    pub fn log(&mut self, iteration_time: time::Duration, total_time: time::Duration) -> IterationStats {
        let hv = self.current_hypervolume();
        let primal = self.population.primal().to_vec();
        let objectives = self.population.objectives().to_vec();

        let (mut delta_x, mut delta_y, mut delta_hv) = (f64::INFINITY, f64::INFINITY, f64::INFINITY);
        if let (Some(prev_x), Some(prev_y), Some(prev_hv)) = (
            self.history.primal.last(),
            self.history.objectives.last(),
            self.history.hypervolume.last(),
        ) {
            delta_hv = (hv - prev_hv).abs();
            // pruning changes the population size; keep the previous deltas then
            delta_x = mean_displacement(prev_x, &primal)
                .or(self.history.delta_x.last().copied())
                .unwrap_or(f64::INFINITY);
            delta_y = mean_displacement(prev_y, &objectives)
                .or(self.history.delta_y.last().copied())
                .unwrap_or(f64::INFINITY);
        }

        let kkt_residual = if self.problem.is_constrained() {
            let norms: Vec<f64> = self
                .last_step
                .nondominated
                .iter()
                .filter_map(|&i| self.last_step.gradient.get(i))
                .map(|g| g.norm())
                .collect();
            Some(median(norms))
        } else {
            None
        };

        let fe_time = self.last_step.fe_time;
        self.history.hypervolume.push(hv);
        self.history.primal.push(primal);
        self.history.objectives.push(objectives);
        self.history.fe_time.push(fe_time);
        self.history.delta_x.push(delta_x);
        self.history.delta_y.push(delta_y);
        self.history.delta_hv.push(delta_hv);
        if let Some(g) = kkt_residual {
            self.history.kkt_residual_norm.push(g);
        }

        if self.config.verbose {
            info!("iteration {} ---", self.iteration);
            info!("HV: {}", hv);
            info!("CPU time of FEs: {:.3}ms", fe_time.as_secs_f64() * 1000.0);
            if let Some(g) = kkt_residual {
                info!("G norm: {}", g);
            }
        }

        let stats = IterationStats {
            iteration: self.iteration,
            hypervolume: hv,
            delta_hv,
            delta_x,
            n_points: self.population.len(),
            n_partitions: self.last_step.n_partitions,
            mean_step_size: self.last_step.mean_step_size,
            ls_failures: self.last_step.ls_failures,
            fe_time_ms: fe_time.as_secs_f64() * 1000.0,
            iter_time_ms: iteration_time.as_secs_f64() * 1000.0,
            total_time_ms: total_time.as_secs_f64() * 1000.0,
        };
        if tracing::enabled!(tracing::Level::DEBUG) {
            stats.print_line();
        }

        self.observers
            .set_iteration_metrics(hv, delta_hv, self.last_step.mean_step_size, kkt_residual);
        self.observers.notify(&self.population, self.iteration);
        stats
    }

    /// Check the stop criteria and update the status. `xtol` and `hv_tol` do not
    /// take part.
    pub fn terminate(&mut self) -> bool {
        if self.iteration >= self.config.max_iterations {
            self.status = OptimizationStatus::Converged(StopReason::MaxIterations {
                iterations: self.iteration,
            });
        }
        !self.status.is_running()
    }

    /// Iterate until a stop criterion fires.
    pub fn run(&mut self) -> HvnResult<HvnSolution> {
        let start = time::Instant::now();
        let initial_hypervolume = self.current_hypervolume();
        let initial_points = self.population.len();

        if tracing::enabled!(tracing::Level::DEBUG) {
            self.config.print_configuration();
            IterationStats::print_header();
        }
        if !self.observers.is_empty() {
            self.observers
                .set_iteration_metrics(initial_hypervolume, f64::INFINITY, 0.0, None);
            self.observers.notify(&self.population, 0);
        }

        while !self.terminate() {
            let iter_start = time::Instant::now();
            self.one_step()?;
            self.log(iter_start.elapsed(), start.elapsed());
        }

        let total_time = start.elapsed();
        let summary = HvnSummary {
            initial_hypervolume,
            final_hypervolume: self.current_hypervolume(),
            iterations: self.iteration,
            initial_points,
            final_points: self.population.len(),
            line_search_failures: self.total_ls_failures,
            total_time,
            total_fe_time: self.history.fe_time.iter().sum(),
            average_time_per_iteration: if self.iteration > 0 {
                total_time / self.iteration as u32
            } else {
                time::Duration::ZERO
            },
            status: self.status.clone(),
        };
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("{}", summary);
        }

        Ok(HvnSolution {
            primal: self.population.primal().to_vec(),
            dual: self.population.dual().to_vec(),
            objectives: self.population.objectives().to_vec(),
            status: self.status.clone(),
            history: self.history.clone(),
            summary,
        })
    }
}

fn gather(points: &[DVector<f64>], idx: &[usize]) -> Vec<DVector<f64>> {
    idx.iter().map(|&i| points[i].clone()).collect()
}

/// Mean Euclidean distance between matching rows; `None` on a size change.
fn mean_displacement(prev: &[DVector<f64>], curr: &[DVector<f64>]) -> Option<f64> {
    if prev.len() != curr.len() || curr.is_empty() {
        return None;
    }
    let total: f64 = prev.iter().zip(curr).map(|(a, b)| (a - b).norm()).sum();
    Some(total / curr.len() as f64)
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreError;
    use crate::error::HvnError;
    use crate::hypervolume::BiObjectiveHypervolume;
    use crate::problems::{BiQuadratic, CircleConstraint};
    use nalgebra::dvector;
    use std::sync::{Arc, Mutex};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn objective() -> Arc<BiQuadratic> {
        Arc::new(BiQuadratic::new(dvector![0.0, 0.0], dvector![1.0, 0.0]))
    }

    fn three_points() -> Vec<DVector<f64>> {
        vec![dvector![0.3, 0.1], dvector![0.5, 0.1], dvector![0.7, 0.1]]
    }

    fn hvn(reference: DVector<f64>, config: HvnConfig) -> HvnResult<Hvn> {
        let objective = objective();
        let hv = BiObjectiveHypervolume::new(objective.clone(), reference, true);
        Hvn::new(Problem::new(objective), Box::new(hv), config)
    }

    #[test]
    fn test_default_config() {
        let config = HvnConfig::default();
        assert_eq!(config.mu, 5);
        assert_eq!(config.xtol, 1e-3);
        assert_eq!(config.hv_tol, f64::NEG_INFINITY);
        assert!(config.minimization);
        assert!(!config.verbose);
        assert_eq!(config.feasibility_tol, 1e-4);
        assert_eq!(config.line_search.max_attempts, 6);
    }

    #[test]
    fn test_one_step_does_not_decrease_hypervolume() -> TestResult {
        for reference in [dvector![1.0, 1.0], dvector![2.0, 2.0]] {
            let config = HvnConfig::new()
                .with_bounds(Bounds::uniform(2, -0.5, 1.5)?)
                .with_initial_points(three_points());
            let mut hvn = hvn(reference, config)?;

            let before = hvn.current_hypervolume();
            hvn.one_step()?;
            let after = hvn.current_hypervolume();

            assert_eq!(hvn.population().len(), 3);
            assert!(after >= before - 1e-12, "HV dropped from {before} to {after}");
        }
        Ok(())
    }

    #[test]
    fn test_run_stops_at_max_iterations_and_records_history() -> TestResult {
        let bounds = Bounds::uniform(2, -0.5, 1.5)?;
        let config = HvnConfig::new()
            .with_bounds(bounds.clone())
            .with_initial_points(three_points())
            .with_max_iterations(5);
        let mut hvn = hvn(dvector![2.0, 2.0], config)?;

        let solution = hvn.run()?;
        assert_eq!(
            solution.status,
            OptimizationStatus::Converged(StopReason::MaxIterations { iterations: 5 })
        );
        assert_eq!(solution.history.len(), 5);
        assert_eq!(solution.history.delta_hv.len(), 5);
        assert!(solution.history.delta_hv[0].is_infinite());
        assert!(solution.history.kkt_residual_norm.is_empty());
        assert!(solution.primal.iter().all(|x| bounds.contains(x)));
        assert!(solution.summary.final_hypervolume >= solution.summary.initial_hypervolume - 1e-12);
        Ok(())
    }

    #[test]
    fn test_zero_iterations_returns_initial_population() -> TestResult {
        let config = HvnConfig::new()
            .with_initial_points(three_points())
            .with_max_iterations(0);
        let mut hvn = hvn(dvector![2.0, 2.0], config)?;
        let solution = hvn.run()?;

        assert!(solution.history.is_empty());
        assert_eq!(solution.primal, three_points());
        Ok(())
    }

    #[test]
    fn test_duplicates_are_pruned_in_one_step() -> TestResult {
        let mut x0 = three_points();
        x0.push(dvector![0.5, 0.1]);
        let config = HvnConfig::new()
            .with_bounds(Bounds::uniform(2, -0.5, 1.5)?)
            .with_initial_points(x0);
        let mut hvn = hvn(dvector![2.0, 2.0], config)?;

        hvn.one_step()?;
        assert_eq!(hvn.population().len(), 3);
        assert_eq!(hvn.population().objectives().len(), 3);
        Ok(())
    }

    #[test]
    fn test_unbounded_without_initial_points_is_rejected() {
        let result = hvn(dvector![2.0, 2.0], HvnConfig::new().with_seed(1));
        assert!(matches!(
            result,
            Err(HvnError::Core(CoreError::UnboundedSampling))
        ));
    }

    #[test]
    fn test_invalid_configuration_is_rejected() -> TestResult {
        let result = hvn(dvector![2.0, 2.0], HvnConfig::new().with_population_size(0));
        assert!(matches!(
            result,
            Err(HvnError::Optimizer(OptimizerError::InvalidParameters(_)))
        ));

        let config = HvnConfig::new().with_bounds(Bounds::uniform(2, 0.0, 1.0)?);
        let result = hvn(dvector![2.0, 2.0, 2.0], config);
        assert!(matches!(
            result,
            Err(HvnError::Optimizer(OptimizerError::InvalidParameters(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_orientation_mismatch_is_rejected() -> TestResult {
        let config = HvnConfig::new()
            .with_initial_points(three_points())
            .with_minimization(false);
        let result = hvn(dvector![2.0, 2.0], config);
        assert!(matches!(
            result,
            Err(HvnError::Optimizer(OptimizerError::InvalidParameters(_)))
        ));

        let objective = objective();
        let hv = BiObjectiveHypervolume::new(objective.clone(), dvector![-2.0, -2.0], false);
        let config = HvnConfig::new()
            .with_initial_points(three_points())
            .with_minimization(false);
        assert!(Hvn::new(Problem::new(objective), Box::new(hv), config).is_ok());
        Ok(())
    }

    #[test]
    fn test_constrained_run_records_kkt_residual() -> TestResult {
        let objective = objective();
        let problem = Problem::new(objective.clone()).with_constraints(Arc::new(
            CircleConstraint::new(dvector![0.5, 0.0], 0.4),
        ));
        let hv = BiObjectiveHypervolume::new(objective, dvector![2.0, 2.0], true);
        let bounds = Bounds::uniform(2, -0.5, 1.5)?;
        let config = HvnConfig::new()
            .with_bounds(bounds.clone())
            .with_initial_points(vec![
                dvector![0.2, 0.3],
                dvector![0.5, 0.45],
                dvector![0.8, 0.3],
                dvector![0.6, 0.9],
            ])
            .with_max_iterations(4);
        let mut hvn = Hvn::new(problem, Box::new(hv), config)?;

        let solution = hvn.run()?;
        assert_eq!(solution.history.kkt_residual_norm.len(), 4);
        assert!(solution.dual.iter().all(|l| l.len() == 1));
        for (x, l) in solution.primal.iter().zip(&solution.dual) {
            assert!(bounds.contains(x));
            assert!(x.iter().chain(l.iter()).all(|v| v.is_finite()));
        }
        Ok(())
    }

    #[test]
    fn test_dominated_infeasible_point_gets_its_own_step_size() -> TestResult {
        let objective = objective();
        let problem = Problem::new(objective.clone()).with_constraints(Arc::new(
            CircleConstraint::new(dvector![0.5, 0.0], 0.5),
        ));
        let hv = BiObjectiveHypervolume::new(objective, dvector![2.0, 2.0], true);
        let r = 0.5 * 3f64.sqrt() / 2.0;
        let config = HvnConfig::new().with_initial_points(vec![
            dvector![0.5, 0.5],
            dvector![0.75, r],
            dvector![0.25, r],
            // dominated by the first point, h = 0.75
            dvector![0.5, 1.0],
        ]);
        let mut hvn = Hvn::new(problem, Box::new(hv), config)?;
        hvn.one_step()?;

        let sizes = hvn.step_sizes();
        assert_eq!(sizes.len(), 4);
        // the feasible non-dominated points share one HV step size
        assert_eq!(sizes[0], sizes[1]);
        assert_eq!(sizes[1], sizes[2]);
        // the linearized constraint step h(x) + J s = 0 is accepted in full
        assert_eq!(sizes[3], 1.0);
        let moved = &hvn.population().primal()[3];
        assert!((moved[0] - 0.5).abs() < 1e-9);
        assert!((moved[1] - 0.625).abs() < 1e-9);
        Ok(())
    }

    struct Recorder {
        iterations: Arc<Mutex<Vec<usize>>>,
    }

    impl OptObserver for Recorder {
        fn on_step(&self, _population: &Population, iteration: usize) {
            if let Ok(mut guard) = self.iterations.lock() {
                guard.push(iteration);
            }
        }
    }

    #[test]
    fn test_observers_see_every_iteration() -> TestResult {
        let iterations = Arc::new(Mutex::new(Vec::new()));
        let config = HvnConfig::new()
            .with_bounds(Bounds::uniform(2, -0.5, 1.5)?)
            .with_initial_points(three_points())
            .with_max_iterations(3);
        let mut hvn = hvn(dvector![2.0, 2.0], config)?;
        hvn.add_observer(Recorder {
            iterations: iterations.clone(),
        });
        hvn.run()?;

        let seen = iterations.lock().map_err(|e| e.to_string())?;
        assert_eq!(*seen, vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(Vec::new()).is_nan());
    }
}
