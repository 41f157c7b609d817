//! Newton system of one partition.
//!
//! For `N` points of primal dimension `d` and `p` equality constraints the unknowns
//! are laid out primal-block first: `[x_1 .. x_N | λ_1 .. λ_N]`.
//!
//! Unconstrained, the system is `H s = -∇HV` with `H` the pre-conditioned HV
//! Hessian. With constraints it is the KKT system
//!
//! ```text
//! ┌                  ┐ ┌    ┐     ┌                 ┐
//! │ H + ddH    dH^T  │ │ sx │ = - │ ∇HV + dH^T λ    │
//! │ dH         0     │ │ sλ │     │ h(X)            │
//! └                  ┘ └    ┘     └                 ┘
//! ```
//!
//! where `dH` is block-diagonal in the per-point constraint Jacobians and `ddH` is
//! block-diagonal in `Σ_k λ_ik ∇²h_k(x_i)`.

use nalgebra::{DMatrix, DVector};
use tracing::debug;
use web_time as time;

use crate::core::problem::Problem;
use crate::hypervolume::HypervolumeDerivatives;
use crate::linalg::{self, LinearSolverType, SolveStrategy};
use crate::optimizer::{OptimizerError, OptimizerResult};

/// Assembled (pre-conditioned) Newton system of a partition.
#[derive(Debug, Clone)]
pub struct KktSystem {
    pub hessian: DMatrix<f64>,
    pub gradient: DVector<f64>,
    pub n_points: usize,
    pub dim_primal: usize,
    pub n_eq: usize,
    /// Diagonal shift applied to the HV Hessian
    pub tau: f64,
    /// Time spent in objective and constraint callables
    pub fe_time: time::Duration,
}

impl KktSystem {
    /// Split a stacked vector (step or gradient) into per-point `[primal | dual]`
    /// rows, in input order.
    pub fn split_points(&self, stacked: &DVector<f64>) -> Vec<DVector<f64>> {
        let (n, d, p) = (self.n_points, self.dim_primal, self.n_eq);
        (0..n)
            .map(|i| {
                let mut row = DVector::zeros(d + p);
                row.rows_mut(0, d).copy_from(&stacked.rows(i * d, d));
                row.rows_mut(d, p).copy_from(&stacked.rows(n * d + i * p, p));
                row
            })
            .collect()
    }
}

/// Newton direction of a partition.
#[derive(Debug, Clone)]
pub struct NewtonStep {
    /// Per-point `[primal | dual]` step
    pub step: Vec<DVector<f64>>,
    /// Per-point `[primal | dual]` gradient (the KKT residual when constrained)
    pub gradient: Vec<DVector<f64>>,
    pub strategy: SolveStrategy,
    pub tau: f64,
    pub fe_time: time::Duration,
}

/// KKT residual `G(X)` of a set of points.
#[derive(Debug, Clone)]
pub struct KktResidual {
    /// Per-point `[∇HV_i + J_i^T λ_i | h(x_i)]`
    pub per_point: Vec<DVector<f64>>,
    pub fe_time: time::Duration,
}

impl KktResidual {
    /// Frobenius norm over all points
    pub fn norm(&self) -> f64 {
        self.per_point
            .iter()
            .map(|g| g.norm_squared())
            .sum::<f64>()
            .sqrt()
    }
}

/// Builds and solves the Newton system of a partition.
pub struct NewtonSystemBuilder<'a> {
    problem: &'a Problem,
    hypervolume: &'a dyn HypervolumeDerivatives,
    solver_type: LinearSolverType,
}

impl<'a> NewtonSystemBuilder<'a> {
    pub fn new(
        problem: &'a Problem,
        hypervolume: &'a dyn HypervolumeDerivatives,
        solver_type: LinearSolverType,
    ) -> Self {
        Self {
            problem,
            hypervolume,
            solver_type,
        }
    }

    pub fn problem(&self) -> &Problem {
        self.problem
    }

    pub fn hypervolume(&self) -> &dyn HypervolumeDerivatives {
        self.hypervolume
    }

    fn check_points(&self, primal: &[DVector<f64>], dual: &[DVector<f64>]) -> OptimizerResult<(usize, usize)> {
        if primal.is_empty() {
            return Err(OptimizerError::EmptyPopulation.log());
        }
        if primal.len() != dual.len() {
            return Err(OptimizerError::DimensionMismatch(format!(
                "{} primal and {} dual vectors",
                primal.len(),
                dual.len()
            ))
            .log());
        }
        let n_eq = if self.problem.is_constrained() { dual[0].len() } else { 0 };
        Ok((self.problem.dim(), n_eq))
    }

    /// Assemble the pre-conditioned Newton (or KKT) system.
    pub fn assemble(
        &self,
        primal: &[DVector<f64>],
        dual: &[DVector<f64>],
        objectives: &[DVector<f64>],
    ) -> OptimizerResult<KktSystem> {
        let (d, p) = self.check_points(primal, dual)?;
        let n = primal.len();

        let hv = self.hypervolume.hessian(primal, objectives);
        if hv.hv_dx.len() != n * d || hv.hv_dx2.shape() != (n * d, n * d) {
            return Err(OptimizerError::DimensionMismatch(format!(
                "HV derivatives for {n} points of dimension {d} have gradient length {} and Hessian {}x{}",
                hv.hv_dx.len(),
                hv.hv_dx2.nrows(),
                hv.hv_dx2.ncols()
            ))
            .log());
        }
        let mut fe_time = hv.elapsed;

        let pre = linalg::precondition_hessian(&hv.hv_dx2);

        if p == 0 {
            return Ok(KktSystem {
                hessian: pre.hessian,
                gradient: hv.hv_dx,
                n_points: n,
                dim_primal: d,
                n_eq: 0,
                tau: pre.tau,
                fe_time,
            });
        }

        let start = time::Instant::now();
        let mut residuals = Vec::with_capacity(n);
        let mut jacobians = Vec::with_capacity(n);
        let mut curvatures = Vec::with_capacity(n);
        for (x, lambda) in primal.iter().zip(dual) {
            let residual = self.problem.constraint_residual(x);
            if residual.len() != p || lambda.len() != p {
                return Err(OptimizerError::DimensionMismatch(format!(
                    "{} constraint values and {} multipliers, expected {p}",
                    residual.len(),
                    lambda.len()
                ))
                .log());
            }
            residuals.push(residual);
            jacobians.push(self.problem.constraint_jacobian(x, p)?);
            let hessians = self.problem.constraint_hessian(x, p)?;
            let mut ddh = DMatrix::zeros(d, d);
            for (k, h) in hessians.iter().enumerate() {
                ddh += h * lambda[k];
            }
            curvatures.push(ddh);
        }
        fe_time += start.elapsed();

        let size = n * (d + p);
        let mut hessian = DMatrix::zeros(size, size);
        let mut gradient = DVector::zeros(size);
        hessian.view_mut((0, 0), (n * d, n * d)).copy_from(&pre.hessian);

        for i in 0..n {
            let (row_x, row_l) = (i * d, n * d + i * p);
            let jac = &jacobians[i];

            let mut block = hessian.view_mut((row_x, row_x), (d, d));
            block += &curvatures[i];
            hessian.view_mut((row_l, row_x), (p, d)).copy_from(jac);
            hessian
                .view_mut((row_x, row_l), (d, p))
                .copy_from(&jac.transpose());

            gradient
                .rows_mut(row_x, d)
                .copy_from(&(hv.hv_dx.rows(row_x, d) + jac.transpose() * &dual[i]));
            gradient.rows_mut(row_l, p).copy_from(&residuals[i]);
        }

        Ok(KktSystem {
            hessian,
            gradient,
            n_points: n,
            dim_primal: d,
            n_eq: p,
            tau: pre.tau,
            fe_time,
        })
    }

    /// Assemble and solve the Newton system; the step is never NaN and the solve
    /// never fails past the eigen fallback.
    pub fn build_and_solve(
        &self,
        primal: &[DVector<f64>],
        dual: &[DVector<f64>],
        objectives: &[DVector<f64>],
    ) -> OptimizerResult<NewtonStep> {
        let system = self.assemble(primal, dual, objectives)?;
        Ok(self.solve(&system))
    }

    /// Solve an assembled system for `-gradient`.
    pub fn solve(&self, system: &KktSystem) -> NewtonStep {
        let outcome = linalg::solve_with_fallback(self.solver_type, &system.hessian, &(-&system.gradient));

        debug!(
            "Newton system {}x{} solved by {} (tau = {:.3e})",
            system.hessian.nrows(),
            system.hessian.ncols(),
            outcome.strategy,
            system.tau
        );

        NewtonStep {
            step: system.split_points(&outcome.solution),
            gradient: system.split_points(&system.gradient),
            strategy: outcome.strategy,
            tau: system.tau,
            fe_time: system.fe_time,
        }
    }

    /// KKT residual `G(X)` (the plain HV gradient when unconstrained).
    pub fn compute_kkt_residual(
        &self,
        primal: &[DVector<f64>],
        dual: &[DVector<f64>],
    ) -> OptimizerResult<KktResidual> {
        let (d, p) = self.check_points(primal, dual)?;
        let grad = self.hypervolume.gradient(primal);
        if grad.hv_dx.len() != primal.len() * d {
            return Err(OptimizerError::DimensionMismatch(format!(
                "HV gradient has length {}, expected {}",
                grad.hv_dx.len(),
                primal.len() * d
            ))
            .log());
        }

        let start = time::Instant::now();
        let mut per_point = Vec::with_capacity(primal.len());
        for (i, (x, lambda)) in primal.iter().zip(dual).enumerate() {
            let mut g = DVector::zeros(d + p);
            let hv_dx = grad.hv_dx.rows(i * d, d);
            if p == 0 {
                g.copy_from(&hv_dx);
            } else {
                let jac = self.problem.constraint_jacobian(x, p)?;
                g.rows_mut(0, d).copy_from(&(hv_dx + jac.transpose() * lambda));
                g.rows_mut(d, p)
                    .copy_from(&self.problem.constraint_residual(x));
            }
            per_point.push(g);
        }

        Ok(KktResidual {
            per_point,
            fe_time: grad.elapsed + start.elapsed(),
        })
    }
}
