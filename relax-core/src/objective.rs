//! Objective-evaluation contract between the dual maximizers and the
//! LP implementations.
//!
//! An objective owns the (possibly distributed) problem data and exposes a
//! single evaluation entry point: given a dual vector it returns the dual
//! value, the dual gradient, the constraint-violation metadata, and an
//! optional primal certificate. The maximizers call it strictly
//! sequentially; all parallelism lives behind this trait.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::linalg::sparse::SparseVec;

/// Tolerance added to the primal upper bound in the infeasibility check.
pub const INFEASIBILITY_EPS: f64 = 1e-9;

/// Errors an objective evaluation can raise.
#[derive(Error, Debug)]
pub enum ObjectiveError {
    /// The inner argmin is non-unique at the supplied dual point, so the
    /// dual has no gradient there. Simplex ties do this; the quasi-Newton
    /// maximizer converts it into a terminal status rather than a crash.
    #[error("dual is non-differentiable at the current point: {0}")]
    NonDifferentiable(String),

    /// Anything else: bad data, a failed distributed computation. Fatal.
    #[error("objective evaluation failed: {0}")]
    Eval(String),
}

/// Per-evaluation key/value log.
///
/// Cleared at the top of each evaluation; the objective populates timing
/// fields, the maximizer appends the rendered entries to the run log.
#[derive(Debug, Clone, Default)]
pub struct IterationLog {
    entries: BTreeMap<String, String>,
}

impl IterationLog {
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn put(&mut self, key: &str, value: impl ToString) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a single `key=value` line fragment.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.entries {
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{}={}", k, v);
        }
        out
    }
}

/// One row of a persistable primal certificate. The value layout inside
/// `values` is chosen by the objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimalRecord {
    pub block_id: i64,
    pub values: Vec<f64>,
}

/// The serializable primal view.
pub type PrimalTable = Vec<PrimalRecord>;

/// Immutable result of one dual evaluation.
#[derive(Debug, Clone)]
pub struct EvalResult {
    /// Dual objective d(lambda).
    pub dual_objective: f64,

    /// Dual gradient: A x*(lambda) - b. Constraint i is satisfied iff
    /// component i is <= 0; a positive component is a violated constraint.
    pub dual_gradient: SparseVec,

    /// Primal objective value at the inner solution x*(lambda).
    pub primal_objective: f64,

    /// Upper bound on the primal optimum (+inf when the objective cannot
    /// supply one; disables the infeasibility check).
    pub primal_upper_bound: f64,

    /// max over i of max(0, gradient_i): the worst constraint violation.
    pub max_violation: f64,

    /// Optional primal view for saving.
    pub primal: Option<PrimalTable>,
}

/// The contract every LP flavor implements.
///
/// `calculate` must be deterministic in `lambda`; the maximizers never call
/// it concurrently.
pub trait DualObjective: std::fmt::Debug {
    /// Evaluate dual value, gradient, inner primal solution, and violation
    /// metadata at `lambda`. Must populate `iter_log` with timing fields.
    fn calculate(
        &self,
        lambda: &SparseVec,
        iter_log: &mut IterationLog,
        verbosity: u8,
    ) -> Result<EvalResult, ObjectiveError>;

    /// Number of coupling constraints (dimension of the dual space).
    fn dual_dimensionality(&self) -> usize;

    /// Any finite valid upper bound on the primal optimum. The default +inf
    /// disables the infeasibility check.
    fn primal_upper_bound(&self) -> f64 {
        f64::INFINITY
    }

    /// By weak duality the dual value never exceeds the primal optimum, so
    /// a dual value above any valid primal upper bound certifies that the
    /// primal has no feasible point.
    fn check_infeasibility(&self, result: &EvalResult) -> bool {
        result.dual_objective > self.primal_upper_bound() + INFEASIBILITY_EPS
    }

    /// Final primal certificate for persistence, if the objective can
    /// produce one.
    fn primal_for_saving(&self, lambda: &SparseVec) -> Option<PrimalTable> {
        let _ = lambda;
        None
    }
}
