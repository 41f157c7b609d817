use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use hv_newton::indicator::{
    GenerationalDistance, InvertedGenerationalDistance, PointSet, ReferenceSet, SetIndicator,
};
use hv_newton::problems::{BiQuadratic, CircleConstraint};
use hv_newton::{
    BiObjectiveHypervolume, Bounds, Hvn, HvnConfig, LinearSolverType, Problem,
    init_logger, init_logger_with_verbosity,
};
use nalgebra::dvector;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "hvn_demo")]
#[command(about = "Run the Hypervolume Newton method on a bi-objective quadratic problem")]
struct Args {
    /// Population size
    #[arg(short = 'n', long, default_value = "10")]
    population: usize,

    /// Maximum number of HVN iterations
    #[arg(short, long, default_value = "20")]
    max_iterations: usize,

    /// Seed of the initial sampling
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Restrict the decision space to a circle through both anchors
    #[arg(long)]
    constrained: bool,

    /// Primary linear solver: "lu" (sparse LU) or "eigen" (dense eigen-decomposition)
    #[arg(long, default_value = "lu")]
    solver: String,

    /// Reference point coordinate (used for both objectives)
    #[arg(long, default_value = "2.0")]
    reference: f64,

    /// Enable per-iteration debug tables
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let objective = Arc::new(BiQuadratic::new(dvector![0.0, 0.0], dvector![1.0, 0.0]));
    let mut problem = Problem::new(objective.clone());
    if args.constrained {
        problem = problem.with_constraints(Arc::new(CircleConstraint::new(
            dvector![0.5, 0.0],
            0.5,
        )));
    }

    let solver = match args.solver.as_str() {
        "lu" => LinearSolverType::SparseLu,
        "eigen" => LinearSolverType::DenseEigen,
        other => return Err(format!("unknown solver '{other}', use 'lu' or 'eigen'").into()),
    };

    let reference = dvector![args.reference, args.reference];
    let hv = BiObjectiveHypervolume::new(objective.clone(), reference, true);
    let config = HvnConfig::new()
        .with_population_size(args.population)
        .with_bounds(Bounds::uniform(2, -0.5, 1.5)?)
        .with_max_iterations(args.max_iterations)
        .with_seed(args.seed)
        .with_linear_solver_type(solver)
        .with_verbose(args.verbose);

    info!(
        "HVN: {} points, {} iterations, {} solver{}",
        args.population,
        args.max_iterations,
        solver,
        if args.constrained { ", circle constraint" } else { "" }
    );

    let start = Instant::now();
    let mut hvn = Hvn::new(problem, Box::new(hv), config)?;
    let solution = hvn.run()?;
    let elapsed = start.elapsed();

    info!("{}", solution.summary);

    let front = ReferenceSet::single(objective.pareto_front(200), 2.0)?;
    let mut gd = GenerationalDistance::new(front.clone(), 2.0);
    let mut igd = InvertedGenerationalDistance::new(front, 2.0);
    let y = PointSet::Objective(&solution.objectives);
    let gd_value = gd.compute(y)?;
    let igd_value = igd.compute(y)?;
    info!("{}: {:.6e}, {}: {:.6e}", gd, gd_value, igd, igd_value);
    info!("Total wall time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    Ok(())
}

fn main() {
    let args = Args::parse();
    // the summary is logged at INFO, the iteration tables at DEBUG
    if args.verbose {
        init_logger_with_verbosity(true);
    } else {
        init_logger();
    }

    if let Err(e) = run(&args) {
        error!("HVN demo failed: {}", e);
        std::process::exit(1);
    }
}
