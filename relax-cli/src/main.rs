//! Command-line driver for the relax solver.
//!
//! Exit codes: 0 when the run reached Converged, Terminated, or Infeasible;
//! 2 on argument-parse failure (clap); 3 when the run Failed on a
//! non-differentiable point; 1 on any fatal error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use relax_core::{
    single_run, DriverParams, InputParams, ProjectionType, Registry, SolverKind, SolverStatus,
    TableFormat,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum SolverChoice {
    /// Bound-constrained quasi-Newton (L-BFGS-B) maximizer.
    QuasiNewton,
    /// Nesterov accelerated-gradient maximizer.
    AcceleratedGradient,
}

#[derive(Parser)]
#[command(name = "relax")]
#[command(about = "Lagrangian dual-decomposition solver for block-separable LPs")]
struct Cli {
    /// Shape of the per-block feasible set
    #[arg(long = "driver.projectionType", default_value = "simplex")]
    projection_type: ProjectionType,

    /// Objective class name resolved through the registry
    #[arg(long = "driver.objectiveClass")]
    objective_class: String,

    /// Output directory for log/dual/violation/primal artifacts
    #[arg(long = "driver.solverOutputPath")]
    solver_output_path: PathBuf,

    /// Block table (JSON lines of {id, costs, entries})
    #[arg(long = "input.ACblocksPath")]
    ac_blocks_path: Option<PathBuf>,

    /// Constraint right-hand side b as an index/value table
    #[arg(long = "input.vectorBPath")]
    vector_b_path: Option<PathBuf>,

    /// Encoding of input index/value tables
    #[arg(long = "input.format", default_value = "json")]
    input_format: TableFormat,

    /// Warm-restart dual table from a previous run
    #[arg(long = "driver.initialLambdaPath")]
    initial_lambda_path: Option<PathBuf>,

    /// Quadratic smoothing weight
    #[arg(long = "driver.gamma", default_value_t = 1e-3)]
    gamma: f64,

    /// Encoding of persisted index/value tables
    #[arg(long = "driver.outputFormat", default_value = "json")]
    output_format: TableFormat,

    /// Persist the primal certificate when the objective supplies one
    #[arg(long = "driver.savePrimal")]
    save_primal: bool,

    /// 0 = warnings only, 1 = run summary, 2 = per-iteration detail
    #[arg(long = "driver.verbosity", default_value_t = 1)]
    verbosity: u8,

    /// Maximizer to run
    #[arg(long = "driver.solver", value_enum, default_value = "quasi-newton")]
    solver: SolverChoice,

    /// Iteration cap for the maximizer
    #[arg(long = "driver.maxIter", default_value_t = 100)]
    max_iter: usize,

    /// Relative dual-improvement tolerance
    #[arg(long = "driver.dualTolerance", default_value_t = 1e-8)]
    dual_tolerance: f64,

    /// Absolute constraint-violation tolerance
    #[arg(long = "driver.slackTolerance", default_value_t = 5e-6)]
    slack_tolerance: f64,

    /// Objective-specific arguments after `--`, passed through verbatim
    #[arg(last = true)]
    extra: Vec<String>,
}

fn run(cli: Cli) -> anyhow::Result<SolverStatus> {
    let driver = DriverParams {
        objective_class: cli.objective_class,
        projection: cli.projection_type,
        gamma: cli.gamma,
        output_path: cli.solver_output_path,
        initial_dual_path: cli.initial_lambda_path,
        output_format: cli.output_format,
        save_primal: cli.save_primal,
        verbosity: cli.verbosity,
        solver: match cli.solver {
            SolverChoice::QuasiNewton => SolverKind::QuasiNewton,
            SolverChoice::AcceleratedGradient => SolverKind::AcceleratedGradient,
        },
        max_iter: cli.max_iter,
        dual_tolerance: cli.dual_tolerance,
        slack_tolerance: cli.slack_tolerance,
    };
    let input = InputParams {
        blocks_path: cli.ac_blocks_path,
        vector_b_path: cli.vector_b_path,
        format: cli.input_format,
    };

    let registry = Registry::with_builtins();
    let summary = single_run(&registry, &driver, &input, &cli.extra, None)
        .context("solver run failed")?;
    Ok(summary.status)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .init();

    match run(cli) {
        Ok(status) if status.exit_ok() => ExitCode::SUCCESS,
        Ok(status) => {
            error!("solver finished with status {}", status);
            ExitCode::from(3)
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(1)
        }
    }
}
