//! Linear algebra support.
//!
//! Sparse vector types and the dense/sparse conversion helpers used at the
//! optimizer boundary.

pub mod sparse;
