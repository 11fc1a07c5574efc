//! Nesterov accelerated ascent on the dual.
//!
//! The companion maximizer for unconstrained or warm-up runs. Each step
//! extrapolates a trial point from the momentum sequence, evaluates the
//! objective there, and takes a backtracking gradient step. Convergence is
//! dual-only: one iteration whose relative dual change falls below
//! `dual_tolerance` ends the run.
//!
//! Sign handling: with `project_nonnegative` set (the default) every iterate
//! is clipped at zero, so a coordinate whose gradient points negative from
//! the boundary stays exactly 0.0. Turning the flag off leaves the iterates
//! unconstrained and negative components may appear.

use tracing::{debug, info};

use crate::linalg::sparse::{self, SparseVec};
use crate::objective::{DualObjective, EvalResult, IterationLog, ObjectiveError};
use crate::solver::{dot, Maximizer, OptimizerState, RunLog, SolverOutput, SolverStatus};

/// Parameters of the accelerated-gradient maximizer.
#[derive(Debug, Clone)]
pub struct AgdParams {
    pub max_iter: usize,

    /// Relative dual-change threshold for convergence.
    pub dual_tolerance: f64,

    /// Line-search starting step.
    pub initial_step: f64,

    /// Armijo sufficient-increase constant.
    pub armijo_c: f64,

    /// Backtracking halvings per step.
    pub max_backtracks: usize,

    /// Clip iterates at zero.
    pub project_nonnegative: bool,
}

impl Default for AgdParams {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            dual_tolerance: 1e-8,
            initial_step: 1.0,
            armijo_c: 1e-4,
            max_backtracks: 30,
            project_nonnegative: true,
        }
    }
}

/// Accelerated gradient ascent maximizer.
#[derive(Debug, Clone, Default)]
pub struct AcceleratedGradientMaximizer {
    pub params: AgdParams,
}

impl AcceleratedGradientMaximizer {
    pub fn new(params: AgdParams) -> Self {
        Self { params }
    }

    fn project(&self, x: &mut [f64]) {
        if self.params.project_nonnegative {
            for xi in x.iter_mut() {
                if *xi < 0.0 {
                    *xi = 0.0;
                }
            }
        }
    }
}

impl Maximizer for AcceleratedGradientMaximizer {
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
        let params = &self.params;

        let mut momentum_prev = sparse::to_dense(&initial);
        self.project(&mut momentum_prev);
        let mut momentum = momentum_prev.clone();

        let mut iter_log = IterationLog::default();
        let mut log = RunLog::default();
        let mut status = SolverStatus::Running;
        let mut last: Option<EvalResult> = None;
        let mut iterations = 0usize;

        let mut calculate = |point: &[f64],
                             iter_log: &mut IterationLog,
                             log: &mut RunLog,
                             index: usize|
         -> Result<Option<EvalResult>, ObjectiveError> {
            iter_log.clear();
            iter_log.put("iteration", index);
            let lambda = sparse::from_dense(point);
            match objective.calculate(&lambda, iter_log, verbosity) {
                Ok(result) => {
                    log.append_iteration(index, &result, iter_log);
                    Ok(Some(result))
                }
                Err(ObjectiveError::NonDifferentiable(message)) => {
                    log.append(format!("iter={} non-differentiable: {}", index, message));
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        };

        for k in 1..=params.max_iter {
            iterations = k;

            // Trial point: momentum extrapolation with the (k-1)/(k+2) rule.
            let beta = (k as f64 - 1.0) / (k as f64 + 2.0);
            let mut trial: Vec<f64> = momentum
                .iter()
                .zip(momentum_prev.iter())
                .map(|(&m, &p)| m + beta * (m - p))
                .collect();
            self.project(&mut trial);

            let Some(result) = calculate(&trial, &mut iter_log, &mut log, k)? else {
                status = SolverStatus::Failed;
                break;
            };
            if verbosity >= 2 {
                debug!(
                    iteration = k,
                    dual = result.dual_objective,
                    violation = result.max_violation,
                    "trial evaluation"
                );
            }

            if let Some(prev) = &last {
                let denom = prev.dual_objective.abs().max(f64::EPSILON);
                if (result.dual_objective - prev.dual_objective).abs() / denom
                    < params.dual_tolerance
                {
                    status = SolverStatus::Converged;
                    log.append(format!(
                        "iter={} converged: relative dual change below {:.3e}",
                        k, params.dual_tolerance
                    ));
                    last = Some(result);
                    break;
                }
            }

            let grad = sparse::to_dense(&result.dual_gradient);
            let grad_norm_sq = dot(&grad, &grad);
            if grad_norm_sq == 0.0 {
                status = SolverStatus::Converged;
                log.append(format!("iter={} converged: zero gradient", k));
                last = Some(result);
                break;
            }

            // Ascent step with Armijo backtracking. A failed search keeps
            // the momentum point, which stalls the dual change and trips
            // the convergence test on the next iteration.
            let mut step = params.initial_step;
            let mut next = momentum.clone();
            for _ in 0..=params.max_backtracks {
                let mut cand: Vec<f64> = trial
                    .iter()
                    .zip(grad.iter())
                    .map(|(&ti, &gi)| ti + step * gi)
                    .collect();
                self.project(&mut cand);
                let Some(probe) = calculate(&cand, &mut iter_log, &mut log, k)? else {
                    status = SolverStatus::Failed;
                    break;
                };
                if probe.dual_objective
                    >= result.dual_objective + params.armijo_c * step * grad_norm_sq
                {
                    next = cand;
                    break;
                }
                step *= 0.5;
            }
            if status == SolverStatus::Failed {
                break;
            }

            momentum_prev = momentum;
            momentum = next;
            last = Some(result);
        }

        if status == SolverStatus::Running {
            status = SolverStatus::Terminated;
        }

        if verbosity >= 1 {
            info!(status = %status, iterations, "accelerated-gradient maximization finished");
        }
        log.append(format!("status={} iterations={}", status, iterations));

        Ok(SolverOutput {
            lambda: sparse::from_dense(&momentum),
            result: last,
            state: OptimizerState {
                iterations,
                status,
                log,
            },
        })
    }
}
