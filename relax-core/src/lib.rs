//! Relax: a Lagrangian dual-decomposition solver for block-separable
//! linear programs.
//!
//! The solver attacks large LPs of the form
//!
//! ```text
//! minimize    c^T x + (gamma/2) ||x||^2
//! subject to  A x <= b,  x in X
//! ```
//!
//! where X is a Cartesian product of simple sets (a probability simplex or a
//! box per block) and the coupling constraints `A x <= b` are relatively
//! few. Dualizing the coupling rows yields a concave dual whose evaluation
//! decomposes into independent per-block projections; the dual is maximized
//! over the non-negative orthant with a first-order method.
//!
//! # Components
//!
//! - **Objective contract** ([`objective::DualObjective`]): one evaluation
//!   entry point returning dual value, sparse gradient, violation metadata,
//!   and an optional primal certificate. Concrete objectives own the
//!   (possibly distributed) data; the optimizer sees a pure function.
//! - **Quasi-Newton maximizer** ([`solver::lbfgsb::QuasiNewtonMaximizer`]):
//!   L-BFGS-B restricted to `lambda >= 0` with a convergence controller
//!   layering violation- and improvement-based stopping on top of the inner
//!   line search.
//! - **Accelerated-gradient maximizer**
//!   ([`solver::agd::AcceleratedGradientMaximizer`]): Nesterov ascent for
//!   unconstrained or warm-up runs.
//! - **Driver** ([`driver::single_run`]): objective registry, initial-dual
//!   loading (warm restarts), and result persistence.
//!
//! # Example
//!
//! ```ignore
//! use relax_core::objectives::simple::CenteredQuadratic;
//! use relax_core::solver::lbfgsb::QuasiNewtonMaximizer;
//! use relax_core::solver::Maximizer;
//! use relax_core::linalg::sparse;
//!
//! let objective = CenteredQuadratic::new(vec![3.0, -2.0]);
//! let maximizer = QuasiNewtonMaximizer::default();
//! let output = maximizer.maximize(&objective, sparse::zeros(2), 1)?;
//! println!("status: {}", output.state.status);
//! ```

#![warn(clippy::all)]

pub mod driver;
pub mod io;
pub mod linalg;
pub mod objective;
pub mod objectives;
pub mod registry;
pub mod solver;

pub use driver::{single_run, DriverError, DriverParams, InputParams, RunSummary, SolverKind};
pub use io::TableFormat;
pub use linalg::sparse::SparseVec;
pub use objective::{DualObjective, EvalResult, IterationLog, ObjectiveError};
pub use objectives::ProjectionType;
pub use registry::{ObjectiveContext, Registry};
pub use solver::agd::{AcceleratedGradientMaximizer, AgdParams};
pub use solver::lbfgsb::{QuasiNewtonMaximizer, QuasiNewtonParams};
pub use solver::{Maximizer, OptimizerState, SolverOutput, SolverStatus};
