//! Bound-constrained quasi-Newton maximizer for the concave dual.
//!
//! The dual maximization `max d(lambda) s.t. lambda >= 0` is handed to the
//! L-BFGS engine as the minimization of `-d`, so the evaluation closure
//! returns `(-d, -grad d)` and the secant pairs carry the inverted gradient
//! differences. The quasi-Newton machinery itself is ordinary; the
//! interesting logic is the convergence controller inside the closure.
//!
//! The engine's line search re-evaluates the objective at non-monotone probe
//! points it may subsequently abandon, so a pure violation-based test can
//! fire on a point the engine never settles on. The controller therefore
//! requires the violation to stay under `slack_tolerance` for
//! `hold_convergence_iters` evaluations past the last useful dual
//! improvement. Improvements smaller than `dual_tolerance` (relative) do not
//! refresh the hold window, so "violation is small" and "nothing useful is
//! happening anymore" must agree for the whole window before the run is
//! declared converged.

use tracing::{debug, info};

use crate::linalg::sparse::{self, SparseVec};
use crate::objective::{DualObjective, EvalResult, IterationLog, ObjectiveError};
use crate::solver::lbfgs::EngineParams;
use crate::solver::{Maximizer, OptimizerState, RunLog, SolverOutput, SolverStatus};

/// Parameters of the quasi-Newton maximizer.
#[derive(Debug, Clone)]
pub struct QuasiNewtonParams {
    /// Maximum accepted steps of the inner engine.
    pub max_iter: usize,

    /// Secant history size.
    pub memory: usize,

    /// Relative dual-improvement threshold; smaller changes are not useful.
    pub dual_tolerance: f64,

    /// Absolute violation threshold for the convergence test.
    pub slack_tolerance: f64,

    /// Evaluations the violation test must hold past the last useful
    /// improvement.
    pub hold_convergence_iters: usize,
}

impl Default for QuasiNewtonParams {
    fn default() -> Self {
        Self {
            max_iter: 100,
            memory: 50,
            dual_tolerance: 1e-8,
            slack_tolerance: 5e-6,
            hold_convergence_iters: 10,
        }
    }
}

/// L-BFGS-B dual maximizer restricted to the non-negative orthant.
#[derive(Debug, Clone, Default)]
pub struct QuasiNewtonMaximizer {
    pub params: QuasiNewtonParams,
}

impl QuasiNewtonMaximizer {
    pub fn new(params: QuasiNewtonParams) -> Self {
        Self { params }
    }
}

/// Snapshot of the last evaluation that improved the dual by more than the
/// relative tolerance.
struct UsefulResult {
    eval_index: usize,
    lambda: SparseVec,
    result: EvalResult,
}

struct Controller<'a> {
    objective: &'a dyn DualObjective,
    params: &'a QuasiNewtonParams,
    verbosity: u8,
    evals: usize,
    status: SolverStatus,
    last_useful: Option<UsefulResult>,
    iter_log: IterationLog,
    log: RunLog,
    fatal: Option<ObjectiveError>,
}

impl<'a> Controller<'a> {
    fn new(objective: &'a dyn DualObjective, params: &'a QuasiNewtonParams, verbosity: u8) -> Self {
        Self {
            objective,
            params,
            verbosity,
            evals: 0,
            status: SolverStatus::Running,
            last_useful: None,
            iter_log: IterationLog::default(),
            log: RunLog::default(),
            fatal: None,
        }
    }

    fn last_value(&self) -> f64 {
        self.last_useful
            .as_ref()
            .map(|u| u.result.dual_objective)
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// The evaluation closure handed to the inner engine.
    fn evaluate(&mut self, x: &[f64]) -> (f64, Vec<f64>) {
        // After a terminal status the run is over; keep reporting a
        // stationary point so the engine's remaining line-search probes
        // cannot disturb the recorded result.
        if self.status != SolverStatus::Running {
            return (-self.last_value(), vec![0.0; x.len()]);
        }

        let index = self.evals;
        self.evals += 1;

        self.iter_log.clear();
        self.iter_log.put("iteration", index);

        let lambda = sparse::from_dense(x);
        let result = match self.objective.calculate(&lambda, &mut self.iter_log, self.verbosity) {
            Ok(result) => result,
            Err(ObjectiveError::NonDifferentiable(message)) => {
                self.status = SolverStatus::Failed;
                self.log
                    .append(format!("iter={} non-differentiable: {}", index, message));
                return (-self.last_value(), vec![0.0; x.len()]);
            }
            Err(err) => {
                self.fatal = Some(err);
                return (f64::INFINITY, vec![0.0; x.len()]);
            }
        };

        self.log.append_iteration(index, &result, &self.iter_log);
        if self.verbosity >= 2 {
            debug!(
                iteration = index,
                dual = result.dual_objective,
                violation = result.max_violation,
                "dual evaluation"
            );
        }

        // Convergence test. The engine calls the closure once to bootstrap
        // its state before the first true step, so evaluations 0 and 1 are
        // exempt.
        let last_useful_index = self.last_useful.as_ref().map(|u| u.eval_index).unwrap_or(0);
        if self.status == SolverStatus::Running
            && index >= 2
            && result.max_violation < self.params.slack_tolerance
            && index - last_useful_index > self.params.hold_convergence_iters
        {
            self.status = SolverStatus::Converged;
            self.log.append(format!(
                "iter={} converged: violation {:.3e} held below {:.3e} for {} evaluations",
                index,
                result.max_violation,
                self.params.slack_tolerance,
                self.params.hold_convergence_iters
            ));
        }

        // Useful-improvement tracking. Re-evaluating the same point yields
        // zero improvement and must not refresh the window.
        let improved = match &self.last_useful {
            None => true,
            Some(useful) => {
                let denom = useful.result.dual_objective.abs().max(f64::EPSILON);
                (result.dual_objective - useful.result.dual_objective) / denom
                    > self.params.dual_tolerance
            }
        };
        if improved {
            self.last_useful = Some(UsefulResult {
                eval_index: index,
                lambda,
                result: result.clone(),
            });
            if self.objective.check_infeasibility(&result) {
                self.status = SolverStatus::Infeasible;
                self.log.append(format!(
                    "iter={} infeasible: dual {:.6e} exceeds primal upper bound {:.6e}",
                    index, result.dual_objective, result.primal_upper_bound
                ));
            }
        }

        // Once a terminal status is set, a zero gradient makes the engine
        // treat the point as stationary and stop on its next test.
        if self.status != SolverStatus::Running {
            (-result.dual_objective, vec![0.0; x.len()])
        } else {
            let grad = sparse::to_dense(&result.dual_gradient);
            (-result.dual_objective, grad.iter().map(|&g| -g).collect())
        }
    }
}

impl Maximizer for QuasiNewtonMaximizer {
    fn maximize(
        &self,
        objective: &dyn DualObjective,
        initial: SparseVec,
        verbosity: u8,
    ) -> Result<SolverOutput, ObjectiveError> {
        let dim = objective.dual_dimensionality();
        if initial.dim() != dim {
            return Err(ObjectiveError::Eval(format!(
                "initial dual has dimension {}, objective expects {}",
                initial.dim(),
                dim
            )));
        }

        let mut controller = Controller::new(objective, &self.params, verbosity);
        let engine = EngineParams {
            max_iter: self.params.max_iter,
            memory: self.params.memory,
            ..Default::default()
        };
        let lower = vec![0.0; dim];
        let upper = vec![f64::INFINITY; dim];
        let x0 = sparse::to_dense(&initial);

        let run = engine.minimize(x0, &lower, &upper, |x| controller.evaluate(x));

        if let Some(err) = controller.fatal {
            return Err(err);
        }

        let mut status = controller.status;
        if status == SolverStatus::Running {
            status = if run.iterations >= self.params.max_iter {
                SolverStatus::Terminated
            } else {
                SolverStatus::Converged
            };
        }

        // Failed and Infeasible return the last useful iterate; the engine
        // may have stepped past it during the final line search. Otherwise
        // the engine's final iterate is the answer, with the last useful
        // result as the value snapshot.
        let (lambda, result) = match status {
            SolverStatus::Failed | SolverStatus::Infeasible => match controller.last_useful {
                Some(useful) => (useful.lambda, Some(useful.result)),
                None => (initial, None),
            },
            _ => (
                sparse::from_dense(&run.x),
                controller.last_useful.map(|u| u.result),
            ),
        };

        if verbosity >= 1 {
            info!(
                status = %status,
                iterations = run.iterations,
                evaluations = run.evaluations,
                "quasi-Newton maximization finished"
            );
        }

        let mut log = controller.log;
        log.append(format!(
            "status={} iterations={} evaluations={}",
            status, run.iterations, run.evaluations
        ));

        Ok(SolverOutput {
            lambda,
            result,
            state: OptimizerState {
                iterations: run.iterations,
                status,
                log,
            },
        })
    }
}
