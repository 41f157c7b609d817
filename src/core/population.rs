//! The approximation set optimized by HVN.
//!
//! Each point carries a primal vector in decision space and, for constrained
//! problems, a dual vector of Lagrange multipliers. Objective values are cached
//! per point and refreshed after every update. All three stay aligned by index;
//! pruning removes whole points and never adds any.

use nalgebra::DVector;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::core::problem::{Bounds, MultiObjective, Problem};
use crate::core::{CoreError, CoreResult};

/// Relative tolerance for objective near-equality
pub const OBJECTIVE_RTOL: f64 = 1e-5;
/// Absolute tolerance for objective near-equality
pub const OBJECTIVE_ATOL: f64 = 1e-8;

/// `|a_k - b_k| <= atol + rtol * |b_k|` on at least one coordinate `k`.
pub fn shares_coordinate(a: &DVector<f64>, b: &DVector<f64>, rtol: f64, atol: f64) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .any(|(x, y)| (x - y).abs() <= atol + rtol * y.abs())
}

#[derive(Debug, Clone)]
pub struct Population {
    primal: Vec<DVector<f64>>,
    dual: Vec<DVector<f64>>,
    objectives: Vec<DVector<f64>>,
    dim_primal: usize,
    n_eq_cstr: usize,
}

impl Population {
    /// Create the initial population.
    ///
    /// With `x0` every point must lie inside `bounds` and exactly `mu` points must be
    /// given. Without it the points are drawn uniformly from the box, which then has
    /// to be finite. Dual variables start at `1 / mu`.
    pub fn initialize(
        problem: &Problem,
        bounds: &Bounds,
        mu: usize,
        x0: Option<&[DVector<f64>]>,
        seed: Option<u64>,
    ) -> CoreResult<Self> {
        let dim = problem.dim();
        if mu == 0 {
            return Err(CoreError::InvalidInput("population size must be positive".into()).log());
        }
        if bounds.dim() != dim {
            return Err(CoreError::DimensionMismatch(format!(
                "bounds have dimension {}, objective expects {dim}",
                bounds.dim()
            ))
            .log());
        }

        let primal: Vec<DVector<f64>> = match x0 {
            Some(points) => {
                if points.len() != mu {
                    return Err(CoreError::InvalidInput(format!(
                        "initial guess has {} points, population size is {mu}",
                        points.len()
                    ))
                    .log());
                }
                if let Some(i) = points.iter().position(|x| x.len() != dim) {
                    return Err(CoreError::DimensionMismatch(format!(
                        "initial guess point {i} has dimension {}, expected {dim}",
                        points[i].len()
                    ))
                    .log());
                }
                if let Some(index) = points.iter().position(|x| !bounds.contains(x)) {
                    return Err(CoreError::InitialGuessOutOfBounds { index }.log());
                }
                points.to_vec()
            }
            None => {
                if !bounds.is_finite() {
                    return Err(CoreError::UnboundedSampling.log());
                }
                let mut rng = match seed {
                    Some(s) => StdRng::seed_from_u64(s),
                    None => StdRng::from_os_rng(),
                };
                (0..mu)
                    .map(|_| {
                        DVector::from_fn(dim, |j, _| {
                            rng.random_range(bounds.lower()[j]..=bounds.upper()[j])
                        })
                    })
                    .collect()
            }
        };

        let n_eq_cstr = problem.n_eq_constraints(&primal[0]);
        let dual = vec![DVector::from_element(n_eq_cstr, 1.0 / mu as f64); mu];

        let mut population = Self {
            primal,
            dual,
            objectives: Vec::new(),
            dim_primal: dim,
            n_eq_cstr,
        };
        population.evaluate(problem.objective().as_ref())?;

        debug!(
            "Initialized population: {} points, dim {}, {} equality constraints",
            mu, dim, n_eq_cstr
        );
        Ok(population)
    }

    pub fn len(&self) -> usize {
        self.primal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primal.is_empty()
    }

    pub fn dim_primal(&self) -> usize {
        self.dim_primal
    }

    pub fn n_eq_cstr(&self) -> usize {
        self.n_eq_cstr
    }

    /// Length of the primal-dual point, `dim_primal + n_eq_cstr`
    pub fn dim(&self) -> usize {
        self.dim_primal + self.n_eq_cstr
    }

    pub fn primal(&self) -> &[DVector<f64>] {
        &self.primal
    }

    pub fn dual(&self) -> &[DVector<f64>] {
        &self.dual
    }

    pub fn objectives(&self) -> &[DVector<f64>] {
        &self.objectives
    }

    /// Concatenated `[primal | dual]` vector of point `i`.
    pub fn point(&self, i: usize) -> DVector<f64> {
        let mut x = DVector::zeros(self.dim());
        x.rows_mut(0, self.dim_primal).copy_from(&self.primal[i]);
        x.rows_mut(self.dim_primal, self.n_eq_cstr)
            .copy_from(&self.dual[i]);
        x
    }

    /// Recompute every cached objective vector from the primal points.
    pub fn evaluate(&mut self, objective: &dyn MultiObjective) -> CoreResult<()> {
        let n_obj = objective.n_objectives();
        let objectives: Vec<DVector<f64>> =
            self.primal.iter().map(|x| objective.evaluate(x)).collect();
        if let Some(i) = objectives.iter().position(|y| y.len() != n_obj) {
            return Err(CoreError::DimensionMismatch(format!(
                "objective returned {} values at point {i}, expected {n_obj}",
                objectives[i].len()
            ))
            .log());
        }
        self.objectives = objectives;
        Ok(())
    }

    /// Move every point along its primal-dual step: `x_i += step_size_i * step_i`.
    ///
    /// Objectives are stale afterwards until [`Population::evaluate`] runs.
    pub fn apply_step(&mut self, steps: &[DVector<f64>], step_sizes: &[f64]) -> CoreResult<()> {
        if steps.len() != self.len() || step_sizes.len() != self.len() {
            return Err(CoreError::DimensionMismatch(format!(
                "{} steps and {} step sizes for {} points",
                steps.len(),
                step_sizes.len(),
                self.len()
            ))
            .log());
        }
        if let Some(i) = steps.iter().position(|s| s.len() != self.dim()) {
            return Err(CoreError::DimensionMismatch(format!(
                "step {i} has length {}, expected {}",
                steps[i].len(),
                self.dim()
            ))
            .log());
        }

        for (i, (step, &alpha)) in steps.iter().zip(step_sizes).enumerate() {
            self.primal[i] += step.rows(0, self.dim_primal) * alpha;
            self.dual[i] += step.rows(self.dim_primal, self.n_eq_cstr) * alpha;
        }
        Ok(())
    }

    /// Drop near-duplicate points and return the kept indices (ascending).
    ///
    /// A point is dropped when its primal vector is closer than `eps` to an earlier
    /// kept point, or when one of its objective values matches the same objective of
    /// an earlier kept point (see [`shares_coordinate`]); for two objectives such a
    /// point is weakly dominated or weakly dominates. The first occurrence always
    /// survives, so pruning an already pruned population is a no-op.
    pub fn prune(&mut self, eps: f64) -> Vec<usize> {
        let by_primal = first_occurrences(&self.primal, |a, b| (a - b).norm() < eps);
        let by_objective = first_occurrences(&self.objectives, |a, b| {
            shares_coordinate(a, b, OBJECTIVE_RTOL, OBJECTIVE_ATOL)
        });

        let kept: Vec<usize> = (0..self.len())
            .filter(|&i| by_primal[i] && by_objective[i])
            .collect();

        if kept.len() < self.len() {
            debug!("Pruned {} near-duplicate points", self.len() - kept.len());
            self.retain(&kept);
        }
        kept
    }

    fn retain(&mut self, kept: &[usize]) {
        self.primal = kept.iter().map(|&i| self.primal[i].clone()).collect();
        self.dual = kept.iter().map(|&i| self.dual[i].clone()).collect();
        self.objectives = kept.iter().map(|&i| self.objectives[i].clone()).collect();
    }
}

/// Greedy scan: a point is kept unless it is `close` to an earlier kept point.
fn first_occurrences<F>(points: &[DVector<f64>], close: F) -> Vec<bool>
where
    F: Fn(&DVector<f64>, &DVector<f64>) -> bool,
{
    let mut kept_idx: Vec<usize> = Vec::with_capacity(points.len());
    let mut keep = vec![false; points.len()];
    for (i, p) in points.iter().enumerate() {
        if !kept_idx.iter().any(|&k| close(&points[k], p)) {
            kept_idx.push(i);
            keep[i] = true;
        }
    }
    keep
}
