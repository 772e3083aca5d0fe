// crates/permalign-matching/src/problem.rs
//
// A validated matching problem: the two parameter sets, the topology that
// links them, and the dimension of every permutation variable.

use std::collections::BTreeMap;

use ndarray::Array2;

use permalign_core::permutation::indices_to_matrix;
use permalign_core::{ParameterSet, PermAlignError, PermutationIndices, PermutationTopology};

use crate::objective::{global_objective, gradients, PermMatrices};

/// Borrowed inputs of one matching run, checked once up front.
#[derive(Debug, Clone)]
pub struct MatchingProblem<'a> {
    params_a: &'a ParameterSet,
    params_b: &'a ParameterSet,
    topology: &'a PermutationTopology,
    perm_sizes: BTreeMap<String, usize>,
}

impl<'a> MatchingProblem<'a> {
    /// Validate shapes and derive the variable sizes.
    ///
    /// `params_a` is the fixed network, `params_b` the one being permuted.
    pub fn new(
        params_a: &'a ParameterSet,
        params_b: &'a ParameterSet,
        topology: &'a PermutationTopology,
    ) -> Result<Self, PermAlignError> {
        let perm_sizes = topology.perm_sizes(params_a, params_b)?;
        Ok(Self {
            params_a,
            params_b,
            topology,
            perm_sizes,
        })
    }

    pub fn topology(&self) -> &'a PermutationTopology {
        self.topology
    }

    pub fn perm_sizes(&self) -> &BTreeMap<String, usize> {
        &self.perm_sizes
    }

    /// Objective of the given relaxed matrices.
    pub fn objective(&self, perms: &PermMatrices) -> Result<f64, PermAlignError> {
        global_objective(self.params_a, self.params_b, perms, self.topology)
    }

    /// Per-variable linearized gradients at the given matrices.
    pub fn gradients(&self, perms: &PermMatrices) -> Result<PermMatrices, PermAlignError> {
        gradients(self.params_a, self.params_b, perms, self.topology)
    }

    /// Identity matrix for every variable.
    pub fn identity_matrices(&self) -> PermMatrices {
        self.perm_sizes
            .iter()
            .map(|(name, &n)| (name.clone(), Array2::eye(n)))
            .collect()
    }

    /// Exact permutation matrices for hardened indices. Every optimizable
    /// variable must be present with the right length; a missing fixed
    /// variable is the identity.
    pub fn matrices_from_indices(
        &self,
        indices: &BTreeMap<String, PermutationIndices>,
    ) -> Result<PermMatrices, PermAlignError> {
        self.perm_sizes
            .iter()
            .map(|(name, &n)| -> Result<(String, Array2<f64>), PermAlignError> {
                let perm = match indices.get(name) {
                    Some(perm) => perm,
                    None if !self.topology.is_optimizable(name) => {
                        return Ok((name.clone(), Array2::eye(n)));
                    }
                    None => {
                        return Err(PermAlignError::NotFound(format!("permutation '{}'", name)));
                    }
                };
                if perm.len() != n {
                    return Err(PermAlignError::ShapeMismatch(format!(
                        "permutation '{}' has length {} but the variable has size {}",
                        name,
                        perm.len(),
                        n
                    )));
                }
                Ok((name.clone(), indices_to_matrix(perm)?))
            })
            .collect()
    }
}
