//! Block-separable LP objective with quadratic smoothing.
//!
//! The primal is `min c'x + (gamma/2)||x||^2  s.t.  A x <= b,  x in X`,
//! where X is a Cartesian product of per-block simple sets. Dualizing the
//! coupling rows decomposes the evaluation into independent per-block
//! subproblems: with reduced cost `r_j = c_j + A_j' lambda` the inner
//! solution is the simplex projection of `-r_j / gamma` (or a coordinate-wise
//! greedy choice on a box). With `gamma = 0` the simplex subproblem
//! degenerates to a vertex argmin, which is non-unique on ties — that is the
//! non-differentiable case the maximizer has to survive.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::linalg::sparse::{self, SparseVec};
use crate::objective::{
    DualObjective, EvalResult, IterationLog, ObjectiveError, PrimalRecord, PrimalTable,
};
use crate::objectives::projection::{clamp_box, project_simplex};
use crate::objectives::ProjectionType;

/// One variable block: its cost vector and its slice of the coupling
/// constraint matrix as `(constraint row, local column, coefficient)`
/// triplets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: i64,
    pub costs: Vec<f64>,
    pub entries: Vec<(usize, usize, f64)>,
}

/// Block-separable LP objective.
#[derive(Debug, Clone)]
pub struct SeparableQpObjective {
    blocks: Vec<Block>,
    b: Vec<f64>,
    gamma: f64,
    projection: ProjectionType,
    upper_bound: f64,
}

impl SeparableQpObjective {
    /// Build and validate. `b` fixes the dual dimensionality; every
    /// constraint row referenced by a block must exist.
    pub fn new(
        blocks: Vec<Block>,
        b: Vec<f64>,
        gamma: f64,
        projection: ProjectionType,
    ) -> Result<Self, String> {
        if gamma < 0.0 {
            return Err(format!("gamma must be non-negative, got {}", gamma));
        }
        let m = b.len();
        for block in &blocks {
            if block.costs.is_empty() {
                return Err(format!("block {} has no variables", block.id));
            }
            for &(row, col, _) in &block.entries {
                if row >= m {
                    return Err(format!(
                        "block {} references constraint {} (m={})",
                        block.id, row, m
                    ));
                }
                if col >= block.costs.len() {
                    return Err(format!(
                        "block {} references variable {} ({} variables)",
                        block.id,
                        col,
                        block.costs.len()
                    ));
                }
            }
        }

        let upper_bound = primal_upper_bound(&blocks, gamma, projection);
        Ok(Self {
            blocks,
            b,
            gamma,
            projection,
            upper_bound,
        })
    }

    /// Override the primal upper bound used by the infeasibility check.
    pub fn with_primal_upper_bound(mut self, upper_bound: f64) -> Self {
        self.upper_bound = upper_bound;
        self
    }

    /// Inner argmin of `r'x + (gamma/2)||x||^2` over the block's simple set.
    fn inner_solve(&self, reduced: &[f64], block_id: i64) -> Result<Vec<f64>, ObjectiveError> {
        match self.projection {
            ProjectionType::Simplex => {
                if self.gamma > 0.0 {
                    let target: Vec<f64> = reduced.iter().map(|&r| -r / self.gamma).collect();
                    Ok(project_simplex(&target))
                } else {
                    // Vertex argmin; a tie means the dual is not
                    // differentiable here.
                    let mut best = 0usize;
                    for (i, &r) in reduced.iter().enumerate() {
                        if r < reduced[best] {
                            best = i;
                        }
                    }
                    let ties = reduced.iter().filter(|&&r| r == reduced[best]).count();
                    if ties > 1 {
                        return Err(ObjectiveError::NonDifferentiable(format!(
                            "block {}: {} tied simplex vertices",
                            block_id, ties
                        )));
                    }
                    let mut x = vec![0.0; reduced.len()];
                    x[best] = 1.0;
                    Ok(x)
                }
            }
            ProjectionType::Greedy => {
                if self.gamma > 0.0 {
                    let target: Vec<f64> = reduced.iter().map(|&r| -r / self.gamma).collect();
                    Ok(clamp_box(&target, 0.0, 1.0))
                } else {
                    let mut x = Vec::with_capacity(reduced.len());
                    for (i, &r) in reduced.iter().enumerate() {
                        if r == 0.0 {
                            return Err(ObjectiveError::NonDifferentiable(format!(
                                "block {}: zero reduced cost at variable {}",
                                block_id, i
                            )));
                        }
                        x.push(if r < 0.0 { 1.0 } else { 0.0 });
                    }
                    Ok(x)
                }
            }
        }
    }
}

/// Sum over blocks of the objective's maximum over the simple set: a valid
/// upper bound on any feasible primal value, hence on the primal optimum.
fn primal_upper_bound(blocks: &[Block], gamma: f64, projection: ProjectionType) -> f64 {
    blocks
        .iter()
        .map(|block| match projection {
            ProjectionType::Simplex => {
                let max_cost = block.costs.iter().fold(f64::NEG_INFINITY, |a, &c| a.max(c));
                max_cost + gamma / 2.0
            }
            ProjectionType::Greedy => block
                .costs
                .iter()
                .map(|&c| (c + gamma / 2.0).max(0.0))
                .sum(),
        })
        .sum()
}

impl DualObjective for SeparableQpObjective {
    fn calculate(
        &self,
        lambda: &SparseVec,
        iter_log: &mut IterationLog,
        _verbosity: u8,
    ) -> Result<EvalResult, ObjectiveError> {
        let start = Instant::now();
        let m = self.b.len();
        if lambda.dim() != m {
            return Err(ObjectiveError::Eval(format!(
                "dual has dimension {}, expected {}",
                lambda.dim(),
                m
            )));
        }

        let lam = sparse::to_dense(lambda);
        let mut ax = vec![0.0; m];
        let mut inner_value = 0.0;
        let mut primal_value = 0.0;
        let mut primal = Vec::with_capacity(self.blocks.len());

        for block in &self.blocks {
            // Reduced cost r = c + A_j' lambda.
            let mut reduced = block.costs.clone();
            for &(row, col, coeff) in &block.entries {
                reduced[col] += coeff * lam[row];
            }

            let x = self.inner_solve(&reduced, block.id)?;

            for &(row, col, coeff) in &block.entries {
                ax[row] += coeff * x[col];
            }
            let norm_sq: f64 = x.iter().map(|&xi| xi * xi).sum();
            let reg = 0.5 * self.gamma * norm_sq;
            inner_value += x.iter().zip(reduced.iter()).map(|(&xi, &ri)| xi * ri).sum::<f64>() + reg;
            primal_value +=
                x.iter().zip(block.costs.iter()).map(|(&xi, &ci)| xi * ci).sum::<f64>() + reg;

            primal.push(PrimalRecord {
                block_id: block.id,
                values: x,
            });
        }

        let lambda_b: f64 = lam.iter().zip(self.b.iter()).map(|(&l, &bi)| l * bi).sum();
        let dual_objective = inner_value - lambda_b;

        let grad_dense: Vec<f64> = ax.iter().zip(self.b.iter()).map(|(&a, &bi)| a - bi).collect();
        let dual_gradient = sparse::from_dense(&grad_dense);
        let max_violation = sparse::max_positive_entry(&dual_gradient);

        iter_log.put("blocks", self.blocks.len());
        iter_log.put("solve_ms", start.elapsed().as_millis());

        Ok(EvalResult {
            dual_objective,
            dual_gradient,
            primal_objective: primal_value,
            primal_upper_bound: self.upper_bound,
            max_violation,
            primal: Some(primal),
        })
    }

    fn dual_dimensionality(&self) -> usize {
        self.b.len()
    }

    fn primal_upper_bound(&self) -> f64 {
        self.upper_bound
    }

    fn primal_for_saving(&self, lambda: &SparseVec) -> Option<PrimalTable> {
        let mut log = IterationLog::default();
        self.calculate(lambda, &mut log, 0)
            .ok()
            .and_then(|result| result.primal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_block_problem(gamma: f64) -> SeparableQpObjective {
        // One block, two variables on a simplex, one coupling row
        // x_0 <= 0.3.
        let block = Block {
            id: 0,
            costs: vec![0.0, 1.0],
            entries: vec![(0, 0, 1.0)],
        };
        SeparableQpObjective::new(vec![block], vec![0.3], gamma, ProjectionType::Simplex).unwrap()
    }

    #[test]
    fn test_evaluation_at_zero_dual() {
        let objective = single_block_problem(2.0);
        let mut log = IterationLog::default();
        let result = objective
            .calculate(&sparse::zeros(1), &mut log, 0)
            .unwrap();

        // r = (0, 1); x* = proj_simplex(0, -0.5) = (0.75, 0.25);
        // d = r'x + (gamma/2)||x||^2 = 0.25 + 0.625 = 0.875;
        // gradient = A x - b = 0.75 - 0.3 = 0.45.
        assert!((result.dual_objective - 0.875).abs() < 1e-12);
        let grad = sparse::to_dense(&result.dual_gradient);
        assert!((grad[0] - 0.45).abs() < 1e-12);
        assert!((result.max_violation - 0.45).abs() < 1e-12);
        assert!(result.primal.is_some());
    }

    #[test]
    fn test_vertex_tie_is_non_differentiable() {
        let block = Block {
            id: 7,
            costs: vec![1.0, 1.0],
            entries: vec![(0, 0, 1.0)],
        };
        let objective =
            SeparableQpObjective::new(vec![block], vec![1.0], 0.0, ProjectionType::Simplex)
                .unwrap();
        let mut log = IterationLog::default();
        let err = objective
            .calculate(&sparse::zeros(1), &mut log, 0)
            .unwrap_err();
        assert!(matches!(err, ObjectiveError::NonDifferentiable(_)));
    }

    #[test]
    fn test_greedy_box_inner_solve() {
        let block = Block {
            id: 1,
            costs: vec![-1.0, 2.0],
            entries: vec![(0, 0, 1.0), (0, 1, 1.0)],
        };
        let objective =
            SeparableQpObjective::new(vec![block], vec![1.5], 0.0, ProjectionType::Greedy)
                .unwrap();
        let mut log = IterationLog::default();
        let result = objective
            .calculate(&sparse::zeros(1), &mut log, 0)
            .unwrap();

        // r = (-1, 2): greedy picks x = (1, 0); d = -1; gradient = 1 - 1.5.
        assert!((result.dual_objective - (-1.0)).abs() < 1e-12);
        assert_eq!(result.max_violation, 0.0);
    }

    #[test]
    fn test_validation_rejects_bad_rows() {
        let block = Block {
            id: 0,
            costs: vec![1.0],
            entries: vec![(5, 0, 1.0)],
        };
        assert!(
            SeparableQpObjective::new(vec![block], vec![1.0], 0.1, ProjectionType::Simplex)
                .is_err()
        );
    }

    #[test]
    fn test_upper_bound_is_valid() {
        let objective = single_block_problem(2.0);
        // Simplex bound: max cost + gamma/2 = 1 + 1 = 2, and every feasible
        // primal value is below it.
        assert!((objective.primal_upper_bound() - 2.0).abs() < 1e-12);
        let mut log = IterationLog::default();
        let result = objective
            .calculate(&sparse::zeros(1), &mut log, 0)
            .unwrap();
        assert!(result.primal_objective <= objective.primal_upper_bound());
    }
}
