//! Backtracking line searches with Armijo-type acceptance under box constraints.
//!
//! Every search starts from the largest step that keeps all primal coordinates a
//! safety margin away from the bounds, so an accepted (or exhausted) step size
//! never moves a point out of the box.

use nalgebra::DVector;
use tracing::warn;
use web_time as time;

use crate::core::problem::Bounds;
use crate::optimizer::OptimizerResult;
use crate::optimizer::newton::NewtonSystemBuilder;

/// Constants of the backtracking searches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchConfig {
    /// Armijo constant of the hypervolume / KKT-residual search
    pub hv_armijo: f64,
    /// Armijo constant of the constraint-violation search
    pub feasibility_armijo: f64,
    /// Step sizes tried before giving up
    pub max_attempts: usize,
    /// Fraction of the distance to the nearest bound the first trial may cover
    pub boundary_fraction: f64,
    /// Step size reduction after a rejected trial
    pub shrink_factor: f64,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            hv_armijo: 1e-5,
            feasibility_armijo: 1e-4,
            max_attempts: 6,
            boundary_fraction: 0.25,
            shrink_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LineSearchOutcome {
    pub step_size: f64,
    /// `false` when every trial was rejected; `step_size` is then the last trial
    pub accepted: bool,
    pub attempts: usize,
    /// Time spent in objective and constraint callables
    pub fe_time: time::Duration,
}

/// Largest initial step size: `min(1, fraction * min_j dist_j / |s_j|)` over the
/// primal coordinates moving towards a bound. `1` when no coordinate does.
pub fn max_feasible_step(
    primal: &[DVector<f64>],
    steps: &[DVector<f64>],
    bounds: &Bounds,
    boundary_fraction: f64,
) -> f64 {
    let (lower, upper) = (bounds.lower(), bounds.upper());
    let mut ratio = f64::INFINITY;
    for (x, step) in primal.iter().zip(steps) {
        for j in 0..x.len() {
            let s = step[j];
            let dist = if s < 0.0 {
                (x[j] - lower[j]).abs()
            } else if s > 0.0 {
                (upper[j] - x[j]).abs()
            } else {
                continue;
            };
            ratio = ratio.min(dist / s.abs());
        }
    }
    (boundary_fraction * ratio).min(1.0)
}

fn displaced(points: &[DVector<f64>], steps: &[DVector<f64>], offset: usize, alpha: f64) -> Vec<DVector<f64>> {
    points
        .iter()
        .zip(steps)
        .map(|(x, s)| x + s.rows(offset, x.len()) * alpha)
        .collect()
}

/// Backtracking search along the Newton direction of a set of points.
///
/// Unconstrained, a step size `a` is accepted when
/// `HV(X + a s) - HV(X) >= c a <G, s>`. With equality constraints the KKT
/// residual has to shrink: `||G(X + a s)|| <= (1 - c a) ||G(X)||`.
pub struct HypervolumeLineSearch<'a> {
    builder: &'a NewtonSystemBuilder<'a>,
    bounds: &'a Bounds,
    config: LineSearchConfig,
}

impl<'a> HypervolumeLineSearch<'a> {
    pub fn new(builder: &'a NewtonSystemBuilder<'a>, bounds: &'a Bounds, config: LineSearchConfig) -> Self {
        Self {
            builder,
            bounds,
            config,
        }
    }

    /// `steps` and `gradient` are per-point `[primal | dual]` rows.
    pub fn search(
        &self,
        primal: &[DVector<f64>],
        dual: &[DVector<f64>],
        steps: &[DVector<f64>],
        gradient: &[DVector<f64>],
    ) -> OptimizerResult<LineSearchOutcome> {
        let c = self.config.hv_armijo;
        let constrained = self.builder.problem().is_constrained();
        let d = self.builder.problem().dim();
        let mut fe_time = time::Duration::ZERO;

        let mut alpha = max_feasible_step(primal, steps, self.bounds, self.config.boundary_fraction);

        let baseline = if constrained {
            gradient.iter().map(|g| g.norm_squared()).sum::<f64>().sqrt()
        } else {
            let start = time::Instant::now();
            let hv = self.builder.hypervolume().hypervolume_at(primal);
            fe_time += start.elapsed();
            hv
        };
        let inc: f64 = gradient.iter().zip(steps).map(|(g, s)| g.dot(s)).sum();

        for attempt in 1..=self.config.max_attempts {
            let primal_trial = displaced(primal, steps, 0, alpha);

            let accepted = if constrained {
                let dual_trial = displaced(dual, steps, d, alpha);
                let residual = self.builder.compute_kkt_residual(&primal_trial, &dual_trial)?;
                fe_time += residual.fe_time;
                residual.norm() <= (1.0 - c * alpha) * baseline
            } else {
                let start = time::Instant::now();
                let hv = self.builder.hypervolume().hypervolume_at(&primal_trial);
                fe_time += start.elapsed();
                hv - baseline >= c * alpha * inc
            };

            if accepted {
                return Ok(LineSearchOutcome {
                    step_size: alpha,
                    accepted: true,
                    attempts: attempt,
                    fe_time,
                });
            }
            if attempt < self.config.max_attempts {
                alpha *= self.config.shrink_factor;
            }
        }

        warn!(
            "Armijo backtracking line search failed after {} attempts, using step size {:.3e}",
            self.config.max_attempts, alpha
        );
        Ok(LineSearchOutcome {
            step_size: alpha,
            accepted: false,
            attempts: self.config.max_attempts,
            fe_time,
        })
    }
}

/// Backtracking search that reduces the constraint violation of a single point.
///
/// With `f(x) = ½||h(x)||²` and `g = J_h(x)^T h(x)`, a step size `a` is accepted
/// when `f(x + a s) - f(x) <= c a <g, s>`. Only the primal part of the step is
/// used.
pub fn constraint_violation_line_search(
    builder: &NewtonSystemBuilder<'_>,
    x: &DVector<f64>,
    step: &DVector<f64>,
    bounds: &Bounds,
    config: &LineSearchConfig,
) -> OptimizerResult<LineSearchOutcome> {
    let problem = builder.problem();
    let c = config.feasibility_armijo;
    let s = step.rows(0, x.len()).into_owned();

    let start = time::Instant::now();
    let h = problem.constraint_residual(x);
    let jac = problem.constraint_jacobian(x, h.len())?;
    let mut fe_time = start.elapsed();

    let violation = 0.5 * h.norm_squared();
    let dec = (jac.transpose() * &h).dot(&s);

    let mut alpha = max_feasible_step(
        std::slice::from_ref(x),
        std::slice::from_ref(step),
        bounds,
        config.boundary_fraction,
    );

    for attempt in 1..=config.max_attempts {
        let start = time::Instant::now();
        let trial = 0.5 * problem.constraint_residual(&(x + &s * alpha)).norm_squared();
        fe_time += start.elapsed();

        if trial - violation <= c * alpha * dec {
            return Ok(LineSearchOutcome {
                step_size: alpha,
                accepted: true,
                attempts: attempt,
                fe_time,
            });
        }
        if attempt < config.max_attempts {
            alpha *= config.shrink_factor;
        }
    }

    warn!(
        "Constraint-violation line search failed after {} attempts, using step size {:.3e}",
        config.max_attempts, alpha
    );
    Ok(LineSearchOutcome {
        step_size: alpha,
        accepted: false,
        attempts: config.max_attempts,
        fe_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::problem::Problem;
    use crate::hypervolume::{BiObjectiveHypervolume, HypervolumeDerivatives};
    use crate::linalg::LinearSolverType;
    use crate::problems::{BiQuadratic, CircleConstraint};
    use nalgebra::dvector;
    use std::sync::Arc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn setup() -> (Problem, BiObjectiveHypervolume) {
        let objective = Arc::new(BiQuadratic::new(dvector![0.0, 0.0], dvector![1.0, 0.0]));
        let problem = Problem::new(objective.clone()).with_constraints(Arc::new(
            CircleConstraint::new(dvector![0.0, 0.0], 0.5),
        ));
        let hv = BiObjectiveHypervolume::new(objective, dvector![2.0, 2.0], true);
        (problem, hv)
    }

    #[test]
    fn test_max_feasible_step() -> TestResult {
        let bounds = Bounds::uniform(2, 0.0, 1.0)?;
        let x = vec![dvector![0.5, 0.5]];

        let towards_upper = max_feasible_step(&x, &[dvector![1.0, 0.0]], &bounds, 0.25);
        assert!((towards_upper - 0.125).abs() < 1e-15);

        let towards_lower = max_feasible_step(&x, &[dvector![0.0, -2.0]], &bounds, 0.25);
        assert!((towards_lower - 0.0625).abs() < 1e-15);

        assert_eq!(max_feasible_step(&x, &[dvector![0.0, 0.0]], &bounds, 0.25), 1.0);
        assert_eq!(max_feasible_step(&x, &[dvector![0.01, 0.0]], &bounds, 0.25), 1.0);
        Ok(())
    }

    #[test]
    fn test_max_feasible_step_ignores_infinite_bounds() {
        let bounds = Bounds::unbounded(2);
        let x = vec![dvector![0.5, 0.5]];
        assert_eq!(max_feasible_step(&x, &[dvector![100.0, -100.0]], &bounds, 0.25), 1.0);
    }

    #[test]
    fn test_any_step_size_keeps_points_inside() -> TestResult {
        let bounds = Bounds::uniform(2, 0.0, 1.0)?;
        let x = vec![dvector![0.9, 0.05], dvector![0.2, 0.999]];
        let steps = vec![dvector![3.0, -1.0], dvector![-0.5, 2.0]];
        let alpha = max_feasible_step(&x, &steps, &bounds, 0.25);

        for (p, s) in x.iter().zip(&steps) {
            assert!(bounds.contains(&(p + s * alpha)));
        }
        Ok(())
    }

    #[test]
    fn test_constraint_violation_search_accepts_descent() -> TestResult {
        let (problem, hv) = setup();
        let builder = NewtonSystemBuilder::new(&problem, &hv, LinearSolverType::SparseLu);
        let bounds = Bounds::uniform(2, -2.0, 2.0)?;

        // h(1, 0) = 0.75; the step lands exactly on the circle
        let x = dvector![1.0, 0.0];
        let step = dvector![-0.5, 0.0, 0.0];
        let outcome = constraint_violation_line_search(
            &builder,
            &x,
            &step,
            &bounds,
            &LineSearchConfig::default(),
        )?;

        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.step_size, 1.0);
        Ok(())
    }

    #[test]
    fn test_constraint_violation_search_exhaustion_returns_last_trial() -> TestResult {
        let (problem, hv) = setup();
        let builder = NewtonSystemBuilder::new(&problem, &hv, LinearSolverType::SparseLu);
        let bounds = Bounds::uniform(2, -2.0, 2.0)?;

        // moving away from the circle never reduces the violation
        let x = dvector![1.0, 0.0];
        let step = dvector![0.5, 0.0, 0.0];
        let outcome = constraint_violation_line_search(
            &builder,
            &x,
            &step,
            &bounds,
            &LineSearchConfig::default(),
        )?;

        assert!(!outcome.accepted);
        assert_eq!(outcome.attempts, 6);
        // first trial 0.25 * 1 / 0.5, halved five times
        assert!((outcome.step_size - 0.5 / 32.0).abs() < 1e-15);
        Ok(())
    }

    #[test]
    fn test_hypervolume_search_does_not_decrease_hv() -> TestResult {
        let objective = Arc::new(BiQuadratic::new(dvector![0.0, 0.0], dvector![1.0, 0.0]));
        let problem = Problem::new(objective.clone());
        let hv = BiObjectiveHypervolume::new(objective, dvector![1.0, 1.0], true);
        let builder = NewtonSystemBuilder::new(&problem, &hv, LinearSolverType::SparseLu);
        let bounds = Bounds::uniform(2, -0.5, 1.5)?;

        let primal = vec![dvector![0.3, 0.1], dvector![0.5, 0.1], dvector![0.7, 0.1]];
        let dual = vec![DVector::zeros(0); 3];
        let objectives: Vec<_> = primal.iter().map(|x| problem.objective().evaluate(x)).collect();
        let newton = builder.build_and_solve(&primal, &dual, &objectives)?;

        let search = HypervolumeLineSearch::new(&builder, &bounds, LineSearchConfig::default());
        let outcome = search.search(&primal, &dual, &newton.step, &newton.gradient)?;
        assert!(outcome.step_size > 0.0 && outcome.step_size <= 1.0);

        let moved = displaced(&primal, &newton.step, 0, outcome.step_size);
        if outcome.accepted {
            assert!(hv.hypervolume_at(&moved) >= hv.hypervolume_at(&primal) - 1e-12);
        }
        assert!(moved.iter().all(|x| bounds.contains(x)));
        Ok(())
    }

    /// Circle through both anchors; its KKT point for a single point is
    /// `x = (0.5, 0.5)`, `λ = 3`.
    fn circle_setup() -> (Problem, BiObjectiveHypervolume) {
        let objective = Arc::new(BiQuadratic::new(dvector![0.0, 0.0], dvector![1.0, 0.0]));
        let problem = Problem::new(objective.clone()).with_constraints(Arc::new(
            CircleConstraint::new(dvector![0.5, 0.0], 0.5),
        ));
        let hv = BiObjectiveHypervolume::new(objective, dvector![2.0, 2.0], true);
        (problem, hv)
    }

    #[test]
    fn test_constrained_search_accepts_residual_decrease() -> TestResult {
        let (problem, hv) = circle_setup();
        let builder = NewtonSystemBuilder::new(&problem, &hv, LinearSolverType::SparseLu);
        let bounds = Bounds::unbounded(2);

        let primal = vec![dvector![0.6, 0.45]];
        let dual = vec![dvector![2.0]];
        let gradient = builder.compute_kkt_residual(&primal, &dual)?.per_point;
        // straight to the KKT point
        let steps = vec![dvector![-0.1, 0.05, 1.0]];

        let search = HypervolumeLineSearch::new(&builder, &bounds, LineSearchConfig::default());
        let outcome = search.search(&primal, &dual, &steps, &gradient)?;
        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.step_size, 1.0);

        let at_kkt = builder.compute_kkt_residual(&[dvector![0.5, 0.5]], &[dvector![3.0]])?;
        assert!(at_kkt.norm() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_constrained_search_rejects_unchanged_residual() -> TestResult {
        let (problem, hv) = circle_setup();
        let builder = NewtonSystemBuilder::new(&problem, &hv, LinearSolverType::SparseLu);
        let bounds = Bounds::unbounded(2);

        let primal = vec![dvector![0.6, 0.45]];
        let dual = vec![dvector![2.0]];
        let gradient = builder.compute_kkt_residual(&primal, &dual)?.per_point;
        let steps = vec![DVector::zeros(3)];

        let search = HypervolumeLineSearch::new(&builder, &bounds, LineSearchConfig::default());
        let outcome = search.search(&primal, &dual, &steps, &gradient)?;
        assert!(!outcome.accepted);
        assert_eq!(outcome.attempts, 6);
        assert!((outcome.step_size - 1.0 / 32.0).abs() < 1e-15);
        Ok(())
    }
}
