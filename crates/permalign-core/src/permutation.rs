// crates/permalign-core/src/permutation.rs
//
// Permutation representations: relaxed matrices and hardened index arrays.

use ndarray::Array2;

use crate::error::PermAlignError;

/// A (relaxed) permutation matrix. During optimization this is a point of
/// the Birkhoff polytope; after hardening it is exactly 0/1.
pub type PermutationMatrix = Array2<f64>;

/// A hardened permutation: `perm[i]` is the permutee unit matched to unit `i`
/// of the fixed network, i.e. `P[i, perm[i]] = 1`.
pub type PermutationIndices = Vec<usize>;

/// The identity permutation of size `n`.
pub fn identity_indices(n: usize) -> PermutationIndices {
    (0..n).collect()
}

/// Check that `perm` is a bijection on `0..perm.len()`.
pub fn is_permutation(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    for &p in perm {
        if p >= perm.len() || seen[p] {
            return false;
        }
        seen[p] = true;
    }
    true
}

/// Expand an index array into its 0/1 matrix.
pub fn indices_to_matrix(perm: &[usize]) -> Result<PermutationMatrix, PermAlignError> {
    if !is_permutation(perm) {
        return Err(PermAlignError::InvalidInput(format!(
            "{:?} is not a permutation",
            perm
        )));
    }
    let n = perm.len();
    let mut m = Array2::zeros((n, n));
    for (i, &j) in perm.iter().enumerate() {
        m[[i, j]] = 1.0;
    }
    Ok(m)
}

/// Inverse permutation: `inverse[perm[i]] = i`.
///
/// Fails with `InvalidInput` if `perm` is not a bijection on `0..perm.len()`.
pub fn inverse(perm: &[usize]) -> Result<PermutationIndices, PermAlignError> {
    if !is_permutation(perm) {
        return Err(PermAlignError::InvalidInput(format!(
            "{:?} is not a permutation of 0..{}",
            perm,
            perm.len()
        )));
    }
    let mut inv = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p] = i;
    }
    Ok(inv)
}

/// Largest deviation of any row or column sum from 1.
pub fn doubly_stochastic_error(m: &PermutationMatrix) -> f64 {
    let rows = m
        .rows()
        .into_iter()
        .map(|r| (r.sum() - 1.0).abs())
        .fold(0.0_f64, f64::max);
    let cols = m
        .columns()
        .into_iter()
        .map(|c| (c.sum() - 1.0).abs())
        .fold(0.0_f64, f64::max);
    rows.max(cols)
}
