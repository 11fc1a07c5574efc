//! Solver driver: compose an objective, an initial dual, and a maximizer,
//! run the maximization, and persist the outputs.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::io::{self, TableFormat};
use crate::linalg::sparse::{self, SparseVec};
use crate::objective::ObjectiveError;
use crate::objectives::ProjectionType;
use crate::registry::{ObjectiveContext, Registry};
use crate::solver::agd::{AcceleratedGradientMaximizer, AgdParams};
use crate::solver::lbfgsb::{QuasiNewtonMaximizer, QuasiNewtonParams};
use crate::solver::{Maximizer, SolverStatus};

/// Driver-level errors. Only these propagate to the top-level handler; a
/// Failed or Infeasible run is a normal result.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown objective class `{class}`; known classes: {known}")]
    ObjectiveLoad { class: String, known: String },

    #[error("objective failed: {0}")]
    Objective(#[from] ObjectiveError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed table {path}: {message}")]
    Malformed { path: String, message: String },
}

/// Which maximizer the driver builds when the caller does not supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    #[default]
    QuasiNewton,
    AcceleratedGradient,
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverParams {
    pub objective_class: String,
    pub projection: ProjectionType,
    pub gamma: f64,
    pub output_path: PathBuf,
    pub initial_dual_path: Option<PathBuf>,
    pub output_format: TableFormat,
    pub save_primal: bool,
    pub verbosity: u8,
    pub solver: SolverKind,
    pub max_iter: usize,
    pub dual_tolerance: f64,
    pub slack_tolerance: f64,
}

impl Default for DriverParams {
    fn default() -> Self {
        Self {
            objective_class: String::new(),
            projection: ProjectionType::Simplex,
            gamma: 1e-3,
            output_path: PathBuf::from("solver-output"),
            initial_dual_path: None,
            output_format: TableFormat::Json,
            save_primal: false,
            verbosity: 1,
            solver: SolverKind::QuasiNewton,
            max_iter: 100,
            dual_tolerance: 1e-8,
            slack_tolerance: 5e-6,
        }
    }
}

/// Input data locations.
#[derive(Debug, Clone, Default)]
pub struct InputParams {
    pub blocks_path: Option<PathBuf>,
    pub vector_b_path: Option<PathBuf>,
    pub format: TableFormat,
}

/// What a run produced, for callers that want more than the exit code.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub status: SolverStatus,
    pub iterations: usize,
    /// Non-zero components of the final dual.
    pub active_constraints: usize,
    pub dual_objective: Option<f64>,
    pub lambda: SparseVec,
}

fn build_maximizer(params: &DriverParams) -> Box<dyn Maximizer> {
    match params.solver {
        SolverKind::QuasiNewton => Box::new(QuasiNewtonMaximizer::new(QuasiNewtonParams {
            max_iter: params.max_iter,
            dual_tolerance: params.dual_tolerance,
            slack_tolerance: params.slack_tolerance,
            ..Default::default()
        })),
        SolverKind::AcceleratedGradient => {
            Box::new(AcceleratedGradientMaximizer::new(AgdParams {
                max_iter: params.max_iter,
                dual_tolerance: params.dual_tolerance,
                ..Default::default()
            }))
        }
    }
}

/// Run one solve end to end: build the objective from the registry, load the
/// starting dual, maximize, and persist dual/violation/log (and the primal
/// when requested).
pub fn single_run(
    registry: &Registry,
    driver: &DriverParams,
    input: &InputParams,
    extra_args: &[String],
    fast_solver: Option<&dyn Maximizer>,
) -> Result<RunSummary, DriverError> {
    let built;
    let maximizer: &dyn Maximizer = match fast_solver {
        Some(solver) => solver,
        None => {
            built = build_maximizer(driver);
            built.as_ref()
        }
    };

    let context = ObjectiveContext {
        gamma: driver.gamma,
        projection: driver.projection,
        input,
        args: extra_args,
    };
    let objective = registry.create(&driver.objective_class, &context)?;

    let initial = io::load_initial_dual(
        driver.initial_dual_path.as_deref(),
        objective.dual_dimensionality(),
        driver.output_format,
    )?;

    let output = maximizer.maximize(objective.as_ref(), initial, driver.verbosity)?;

    let active_constraints = sparse::nnz(&output.lambda);
    info!(
        status = %output.state.status,
        iterations = output.state.iterations,
        active_constraints,
        dual = output.result.as_ref().map(|r| r.dual_objective),
        "solve finished"
    );

    let primal = if driver.save_primal {
        let table = objective.primal_for_saving(&output.lambda);
        if table.is_none() {
            warn!(
                objective = %driver.objective_class,
                "primal saving requested but the objective supplies no primal"
            );
        }
        table
    } else {
        None
    };

    let violation = output
        .result
        .as_ref()
        .map(|r| r.dual_gradient.clone())
        .unwrap_or_else(|| sparse::zeros(output.lambda.dim()));
    io::write_outputs(
        &driver.output_path,
        &output.state.log.render(),
        &output.lambda,
        &violation,
        primal.as_ref(),
        driver.output_format,
    )?;

    Ok(RunSummary {
        status: output.state.status,
        iterations: output.state.iterations,
        active_constraints,
        dual_objective: output.result.as_ref().map(|r| r.dual_objective),
        lambda: output.lambda,
    })
}
