//! End-to-end tests for the dual maximizers and the driver.
//!
//! These exercise the full optimizer loop against closed-form and
//! block-separable objectives, including the terminal statuses that are
//! outcomes rather than errors (Infeasible, Failed).

use std::cell::Cell;

use relax_core::linalg::sparse;
use relax_core::objective::{DualObjective, EvalResult, IterationLog, ObjectiveError};
use relax_core::objectives::separable_qp::{Block, SeparableQpObjective};
use relax_core::objectives::simple::CenteredQuadratic;
use relax_core::objectives::ProjectionType;
use relax_core::solver::agd::{AcceleratedGradientMaximizer, AgdParams};
use relax_core::solver::lbfgsb::{QuasiNewtonMaximizer, QuasiNewtonParams};
use relax_core::solver::{Maximizer, SolverStatus};

/// Deterministic LCG, same recipe as the benchmark generators.
fn lcg(seed: u64) -> impl FnMut() -> f64 {
    let mut state = seed;
    move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) as f64) / (u32::MAX as f64)
    }
}

/// 20 simplex blocks of 5 variables, one cap constraint per variable:
/// x_{j,i} <= 0.3 with 100 coupling rows in total. Feasible (each block can
/// spread its unit mass over 5 capped coordinates) and with several caps
/// active at the optimum because the cheapest coordinates want all the mass.
fn capped_assignment_problem() -> SeparableQpObjective {
    let mut rand = lcg(42);
    let blocks: Vec<Block> = (0..20)
        .map(|j| Block {
            id: j as i64,
            costs: (0..5).map(|_| -rand()).collect(),
            entries: (0..5).map(|i| (j * 5 + i, i, 1.0)).collect(),
        })
        .collect();
    SeparableQpObjective::new(blocks, vec![0.3; 100], 1e-3, ProjectionType::Simplex).unwrap()
}

#[test]
fn test_agd_clips_negative_coordinate() {
    // Concave quadratic with maximum at (3, -2). Starting from the origin
    // the second coordinate is pulled negative and pinned at zero by the
    // non-negative clip, so the solution is (3, 0) with y exactly 0.0.
    let objective = CenteredQuadratic::new(vec![3.0, -2.0]);
    let maximizer = AcceleratedGradientMaximizer::new(AgdParams {
        max_iter: 1000,
        dual_tolerance: 1e-10,
        ..Default::default()
    });

    let output = maximizer
        .maximize(&objective, sparse::zeros(2), 0)
        .unwrap();

    assert_eq!(output.state.status, SolverStatus::Converged);
    let lambda = sparse::to_dense(&output.lambda);
    assert!((lambda[0] - 3.0).abs() < 1e-3, "lambda = {:?}", lambda);
    assert_eq!(lambda[1], 0.0);
}

#[test]
fn test_agd_without_clip_goes_negative() {
    let objective = CenteredQuadratic::new(vec![3.0, -2.0]);
    let maximizer = AcceleratedGradientMaximizer::new(AgdParams {
        max_iter: 1000,
        dual_tolerance: 1e-10,
        project_nonnegative: false,
        ..Default::default()
    });

    let output = maximizer
        .maximize(&objective, sparse::zeros(2), 0)
        .unwrap();

    let lambda = sparse::to_dense(&output.lambda);
    assert!((lambda[0] - 3.0).abs() < 1e-3);
    assert!(lambda[1] < -1.0, "expected unconstrained descent, got {:?}", lambda);
}

#[test]
fn test_quasi_newton_on_capped_assignment() {
    let objective = capped_assignment_problem();
    let maximizer = QuasiNewtonMaximizer::new(QuasiNewtonParams {
        max_iter: 2000,
        ..Default::default()
    });

    let output = maximizer
        .maximize(&objective, sparse::zeros(100), 0)
        .unwrap();

    assert_eq!(output.state.status, SolverStatus::Converged);
    let result = output.result.as_ref().unwrap();
    assert!(
        result.max_violation <= 5e-6,
        "violation {} above tolerance",
        result.max_violation
    );

    let active = sparse::nnz(&output.lambda);
    assert!((1..=100).contains(&active), "active = {}", active);

    // Multipliers stay in the orthant.
    for (_, &v) in output.lambda.iter() {
        assert!(v >= 0.0);
    }
}

#[test]
fn test_quasi_newton_is_deterministic() {
    let objective = capped_assignment_problem();
    let maximizer = QuasiNewtonMaximizer::new(QuasiNewtonParams {
        max_iter: 500,
        ..Default::default()
    });

    let a = maximizer.maximize(&objective, sparse::zeros(100), 0).unwrap();
    let b = maximizer.maximize(&objective, sparse::zeros(100), 0).unwrap();

    assert_eq!(a.state.status, b.state.status);
    assert!(sparse::approx_eq(&a.lambda, &b.lambda, 0.0));
    assert_eq!(
        a.result.as_ref().unwrap().dual_objective,
        b.result.as_ref().unwrap().dual_objective
    );
}

#[test]
fn test_forced_upper_bound_detects_infeasibility() {
    // Reusing the feasible problem but lying about the primal upper bound:
    // as soon as the ascent pushes the dual past the bound the run must stop
    // with the witnessing iterate.
    let reference = capped_assignment_problem();
    let maximizer = QuasiNewtonMaximizer::new(QuasiNewtonParams {
        max_iter: 2000,
        ..Default::default()
    });
    let optimum = maximizer
        .maximize(&reference, sparse::zeros(100), 0)
        .unwrap()
        .result
        .unwrap()
        .dual_objective;

    let bound = optimum - 1.0;
    let objective = capped_assignment_problem().with_primal_upper_bound(bound);
    let output = maximizer
        .maximize(&objective, sparse::zeros(100), 0)
        .unwrap();

    assert_eq!(output.state.status, SolverStatus::Infeasible);
    let result = output.result.as_ref().unwrap();
    assert!(result.dual_objective > bound);

    // The returned dual is the witnessing iterate: re-evaluating there
    // reproduces the recorded dual value.
    let mut log = IterationLog::default();
    let replay = objective.calculate(&output.lambda, &mut log, 0).unwrap();
    assert!((replay.dual_objective - result.dual_objective).abs() < 1e-12);
}

#[test]
fn test_infinite_negative_bound_is_immediately_infeasible() {
    let objective =
        CenteredQuadratic::new(vec![3.0, -2.0]).with_primal_upper_bound(f64::NEG_INFINITY);
    let maximizer = QuasiNewtonMaximizer::default();

    let output = maximizer
        .maximize(&objective, sparse::zeros(2), 0)
        .unwrap();

    // The very first useful improvement (the bootstrap evaluation) already
    // exceeds the bound.
    assert_eq!(output.state.status, SolverStatus::Infeasible);
    assert_eq!(sparse::to_dense(&output.lambda), vec![0.0, 0.0]);
}

#[test]
fn test_max_iter_zero_terminates_at_initial_dual() {
    let objective = CenteredQuadratic::new(vec![3.0, -2.0]);
    let maximizer = QuasiNewtonMaximizer::new(QuasiNewtonParams {
        max_iter: 0,
        ..Default::default()
    });
    let initial = sparse::from_pairs(2, vec![(0, 1.0), (1, 2.0)]).unwrap();

    let output = maximizer.maximize(&objective, initial.clone(), 0).unwrap();

    assert_eq!(output.state.status, SolverStatus::Terminated);
    assert!(sparse::approx_eq(&output.lambda, &initial, 0.0));
    // The bootstrap evaluation still ran, so a result snapshot exists.
    assert!(output.result.is_some());
}

/// Wrapper that fails with NonDifferentiable on one specific evaluation.
#[derive(Debug)]
struct FailingObjective {
    inner: CenteredQuadratic,
    fail_at: usize,
    calls: Cell<usize>,
}

impl DualObjective for FailingObjective {
    fn calculate(
        &self,
        lambda: &sparse::SparseVec,
        iter_log: &mut IterationLog,
        verbosity: u8,
    ) -> Result<EvalResult, ObjectiveError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if call == self.fail_at {
            return Err(ObjectiveError::NonDifferentiable(
                "tied inner argmin".to_string(),
            ));
        }
        self.inner.calculate(lambda, iter_log, verbosity)
    }

    fn dual_dimensionality(&self) -> usize {
        self.inner.dual_dimensionality()
    }
}

#[test]
fn test_non_differentiable_returns_last_useful_result() {
    // From (10, 10) the first accepted step lands on (0, 0); the evaluation
    // after that raises NonDifferentiable. The maximizer must report Failed
    // and hand back the (0, 0) iterate with its dual value.
    let objective = FailingObjective {
        inner: CenteredQuadratic::new(vec![3.0, -2.0]),
        fail_at: 2,
        calls: Cell::new(0),
    };
    let maximizer = QuasiNewtonMaximizer::default();
    let initial = sparse::from_pairs(2, vec![(0, 10.0), (1, 10.0)]).unwrap();

    let output = maximizer.maximize(&objective, initial, 0).unwrap();

    assert_eq!(output.state.status, SolverStatus::Failed);
    assert_eq!(sparse::to_dense(&output.lambda), vec![0.0, 0.0]);
    let result = output.result.as_ref().unwrap();
    assert!((result.dual_objective - (-13.0)).abs() < 1e-12);
}

#[test]
fn test_quadratic_solved_by_quasi_newton() {
    // Bound-constrained optimum of the (3, -2)-centered quadratic over the
    // orthant is (3, 0).
    let objective = CenteredQuadratic::new(vec![3.0, -2.0]);
    let maximizer = QuasiNewtonMaximizer::default();

    let output = maximizer
        .maximize(&objective, sparse::zeros(2), 0)
        .unwrap();

    assert_eq!(output.state.status, SolverStatus::Converged);
    let lambda = sparse::to_dense(&output.lambda);
    assert!((lambda[0] - 3.0).abs() < 1e-6);
    assert_eq!(lambda[1], 0.0);
}
