//! Closed-form quadratic objective for smoke runs and tests.

use std::time::Instant;

use crate::linalg::sparse::{self, SparseVec};
use crate::objective::{DualObjective, EvalResult, IterationLog, ObjectiveError};

/// Concave quadratic dual `d(lambda) = -||lambda - center||^2` with gradient
/// `-2 (lambda - center)`.
///
/// Cheap to evaluate and with a known maximizer (the center, clipped by
/// whatever sign constraint the maximizer enforces), so it exercises the
/// full optimizer loop without any distributed machinery.
#[derive(Debug, Clone)]
pub struct CenteredQuadratic {
    center: Vec<f64>,
    upper_bound: f64,
}

impl CenteredQuadratic {
    pub fn new(center: Vec<f64>) -> Self {
        Self {
            center,
            upper_bound: f64::INFINITY,
        }
    }

    /// Override the primal upper bound used by the infeasibility check.
    pub fn with_primal_upper_bound(mut self, upper_bound: f64) -> Self {
        self.upper_bound = upper_bound;
        self
    }
}

impl DualObjective for CenteredQuadratic {
    fn calculate(
        &self,
        lambda: &SparseVec,
        iter_log: &mut IterationLog,
        _verbosity: u8,
    ) -> Result<EvalResult, ObjectiveError> {
        let start = Instant::now();
        if lambda.dim() != self.center.len() {
            return Err(ObjectiveError::Eval(format!(
                "dual has dimension {}, expected {}",
                lambda.dim(),
                self.center.len()
            )));
        }

        let x = sparse::to_dense(lambda);
        let mut value = 0.0;
        let mut grad = vec![0.0; x.len()];
        for i in 0..x.len() {
            let diff = x[i] - self.center[i];
            value -= diff * diff;
            grad[i] = -2.0 * diff;
        }
        let gradient = sparse::from_dense(&grad);
        let max_violation = sparse::max_positive_entry(&gradient);
        iter_log.put("solve_ms", start.elapsed().as_millis());

        Ok(EvalResult {
            dual_objective: value,
            dual_gradient: gradient,
            primal_objective: value,
            primal_upper_bound: self.upper_bound,
            max_violation,
            primal: None,
        })
    }

    fn dual_dimensionality(&self) -> usize {
        self.center.len()
    }

    fn primal_upper_bound(&self) -> f64 {
        self.upper_bound
    }
}
