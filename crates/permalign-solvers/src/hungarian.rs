// crates/permalign-solvers/src/hungarian.rs
//
// Maximum weight linear assignment via the Hungarian method
// (shortest augmenting path with dual potentials, O(n^3)).

use ndarray::Array2;

use permalign_core::permutation::PermutationIndices;
use permalign_core::{AssignmentSolver, PermAlignError};

/// Exact linear assignment solver.
///
/// Returns the permutation maximizing `sum_i scores[i, perm[i]]`, which is
/// the vertex of the Birkhoff polytope maximizing `trace(scores^T X)`.
/// Ties are broken deterministically by row then column order.
#[derive(Debug, Clone, Copy, Default)]
pub struct HungarianSolver;

impl HungarianSolver {
    pub fn new() -> Self {
        Self
    }
}

impl AssignmentSolver for HungarianSolver {
    fn solve(&self, scores: &Array2<f64>) -> Result<PermutationIndices, PermAlignError> {
        let (rows, cols) = scores.dim();
        if rows != cols {
            return Err(PermAlignError::ShapeMismatch(format!(
                "assignment needs a square score matrix, got {}x{}",
                rows, cols
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(PermAlignError::InvalidInput(
                "score matrix contains non-finite entries".to_string(),
            ));
        }
        let n = rows;
        if n == 0 {
            return Ok(Vec::new());
        }

        // Minimize the negated scores. Indices below are 1-based; row/column
        // 0 is the virtual source of each augmenting search.
        let cost = |i: usize, j: usize| -scores[[i - 1, j - 1]];

        let mut u = vec![0.0_f64; n + 1];
        let mut v = vec![0.0_f64; n + 1];
        // owner[j] = row currently assigned to column j (0 = free).
        let mut owner = vec![0usize; n + 1];
        let mut way = vec![0usize; n + 1];

        for i in 1..=n {
            owner[0] = i;
            let mut j0 = 0usize;
            let mut min_slack = vec![f64::INFINITY; n + 1];
            let mut used = vec![false; n + 1];

            loop {
                used[j0] = true;
                let i0 = owner[j0];
                let mut delta = f64::INFINITY;
                let mut j1 = 0usize;

                for j in 1..=n {
                    if used[j] {
                        continue;
                    }
                    let slack = cost(i0, j) - u[i0] - v[j];
                    if slack < min_slack[j] {
                        min_slack[j] = slack;
                        way[j] = j0;
                    }
                    if min_slack[j] < delta {
                        delta = min_slack[j];
                        j1 = j;
                    }
                }

                if j1 == 0 {
                    return Err(PermAlignError::Solver(
                        "augmenting path search found no free column".to_string(),
                    ));
                }

                for j in 0..=n {
                    if used[j] {
                        u[owner[j]] += delta;
                        v[j] -= delta;
                    } else {
                        min_slack[j] -= delta;
                    }
                }

                j0 = j1;
                if owner[j0] == 0 {
                    break;
                }
            }

            // Flip the augmenting path back to the source.
            loop {
                let j1 = way[j0];
                owner[j0] = owner[j1];
                j0 = j1;
                if j0 == 0 {
                    break;
                }
            }
        }

        let mut assignment = vec![0usize; n];
        for j in 1..=n {
            if owner[j] != 0 {
                assignment[owner[j] - 1] = j - 1;
            }
        }

        tracing::trace!("Solved {}x{} assignment", n, n);
        Ok(assignment)
    }
}
