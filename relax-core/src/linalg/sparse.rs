//! Sparse vector types and operations.
//!
//! The dual vector and its gradient are sparse over the coupling-constraint
//! index set, while the quasi-Newton engine works on dense slices. This
//! module provides the helpers for both views and the single place where the
//! dense/sparse mismatch is visible.

use sprs::CsVecI;

/// Sparse vector of f64 indexed by constraint index.
pub type SparseVec = CsVecI<f64, usize>;

/// Build a sparse vector of the given dimension from (index, value) pairs.
///
/// Pairs need not be sorted on input. Out-of-range indices and duplicates
/// are rejected.
pub fn from_pairs(dim: usize, mut pairs: Vec<(usize, f64)>) -> Result<SparseVec, String> {
    pairs.sort_by_key(|&(i, _)| i);
    let mut indices = Vec::with_capacity(pairs.len());
    let mut values = Vec::with_capacity(pairs.len());
    for (i, v) in pairs {
        if i >= dim {
            return Err(format!("index {} out of range (dim={})", i, dim));
        }
        if indices.last() == Some(&i) {
            return Err(format!("duplicate index {}", i));
        }
        indices.push(i);
        values.push(v);
    }
    Ok(SparseVec::new(dim, indices, values))
}

/// The zero vector of the given dimension.
pub fn zeros(dim: usize) -> SparseVec {
    SparseVec::new(dim, Vec::new(), Vec::new())
}

/// Convert a dense slice to a sparse vector, dropping exact zeros.
pub fn from_dense(x: &[f64]) -> SparseVec {
    let mut indices = Vec::new();
    let mut values = Vec::new();
    for (i, &v) in x.iter().enumerate() {
        if v != 0.0 {
            indices.push(i);
            values.push(v);
        }
    }
    SparseVec::new(x.len(), indices, values)
}

/// Expand a sparse vector into a dense `Vec<f64>`.
pub fn to_dense(v: &SparseVec) -> Vec<f64> {
    let mut out = vec![0.0; v.dim()];
    for (i, &val) in v.iter() {
        out[i] = val;
    }
    out
}

/// Number of stored entries that are actually non-zero.
pub fn nnz(v: &SparseVec) -> usize {
    v.iter().filter(|&(_, &val)| val != 0.0).count()
}

/// Dot product of two sparse vectors over the same index set.
pub fn dot(a: &SparseVec, b: &SparseVec) -> f64 {
    debug_assert_eq!(a.dim(), b.dim());
    a.dot(b)
}

/// y += alpha * x for a sparse x and dense y.
pub fn axpy(alpha: f64, x: &SparseVec, y: &mut [f64]) {
    debug_assert_eq!(x.dim(), y.len());
    for (i, &val) in x.iter() {
        y[i] += alpha * val;
    }
}

/// Largest positive entry, or 0.0 when every entry is non-positive.
///
/// Applied to the dual gradient this is the violation metadata: constraint i
/// is satisfied iff its gradient component is <= 0.
pub fn max_positive_entry(v: &SparseVec) -> f64 {
    v.iter().fold(0.0_f64, |acc, (_, &val)| acc.max(val))
}

/// Componentwise equality within an absolute tolerance.
pub fn approx_eq(a: &SparseVec, b: &SparseVec, tol: f64) -> bool {
    if a.dim() != b.dim() {
        return false;
    }
    let ad = to_dense(a);
    let bd = to_dense(b);
    ad.iter().zip(bd.iter()).all(|(x, y)| (x - y).abs() <= tol)
}
