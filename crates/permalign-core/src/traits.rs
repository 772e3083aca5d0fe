// crates/permalign-core/src/traits.rs

use ndarray::Array2;

use crate::error::PermAlignError;
use crate::permutation::PermutationIndices;

/// Trait for linear assignment (maximum weight bipartite matching).
///
/// Implemented by permalign-solvers (`HungarianSolver`).
pub trait AssignmentSolver: Send + Sync {
    /// Find the permutation maximizing `sum_i scores[i, perm[i]]`.
    ///
    /// Must be deterministic for a given score matrix.
    fn solve(&self, scores: &Array2<f64>) -> Result<PermutationIndices, PermAlignError>;
}

/// Result of a bounded scalar minimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarMinimum {
    /// Abscissa of the best point found.
    pub x: f64,
    /// Function value at `x`.
    pub fx: f64,
    /// Number of function evaluations spent.
    pub evaluations: usize,
}

/// Trait for bounded one-dimensional minimization.
///
/// Implemented by permalign-solvers (`BoundedBrent`).
pub trait LineSearch: Send + Sync {
    /// Minimize `f` over the closed interval `[lower, upper]`.
    fn minimize(
        &self,
        f: &mut dyn FnMut(f64) -> f64,
        lower: f64,
        upper: f64,
    ) -> Result<ScalarMinimum, PermAlignError>;
}
