//! Objective implementations.
//!
//! One complete block-separable LP objective plus a closed-form quadratic
//! fixture for smoke runs and tests.

pub mod projection;
pub mod separable_qp;
pub mod simple;

use std::fmt;
use std::str::FromStr;

/// Shape of the per-block feasible set X_j.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    /// Probability simplex per block.
    Simplex,

    /// Unit box per block; the inner argmin is a coordinate-wise greedy
    /// choice.
    Greedy,
}

impl fmt::Display for ProjectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionType::Simplex => write!(f, "simplex"),
            ProjectionType::Greedy => write!(f, "greedy"),
        }
    }
}

impl FromStr for ProjectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simplex" => Ok(ProjectionType::Simplex),
            "greedy" => Ok(ProjectionType::Greedy),
            other => Err(format!("unknown projection type `{}`", other)),
        }
    }
}
