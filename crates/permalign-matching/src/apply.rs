// crates/permalign-matching/src/apply.rs
//
// Apply hardened permutations to a parameter set.

use std::collections::BTreeMap;

use ndarray::Axis;

use permalign_core::permutation::{identity_indices, is_permutation};
use permalign_core::{ParameterSet, PermAlignError, PermutationIndices, PermutationTopology};

/// Gather every parameter of `params` along the axes its permutations act on,
/// producing the permutee aligned to the fixed network.
///
/// Axis `a` of a parameter permuted by `perm` becomes
/// `out[.., i, ..] = params[.., perm[i], ..]`. Parameters the topology does
/// not mention are copied as is. A missing entry is treated as identity for
/// fixed variables and is an error for optimizable ones.
pub fn apply_permutation(
    params: &ParameterSet,
    topology: &PermutationTopology,
    permutations: &BTreeMap<String, PermutationIndices>,
) -> Result<ParameterSet, PermAlignError> {
    let mut resolved: BTreeMap<&str, PermutationIndices> = BTreeMap::new();
    for var in topology.variables() {
        let perm = match permutations.get(&var.name) {
            Some(p) => p.clone(),
            None if !var.optimizable => {
                let (param, axis) = var.axes.first().ok_or_else(|| {
                    PermAlignError::Topology(format!("'{}' acts on no axes", var.name))
                })?;
                let extent = params.require(param)?.shape().get(*axis).copied().ok_or_else(|| {
                    PermAlignError::ShapeMismatch(format!("'{}' has no axis {}", param, axis))
                })?;
                identity_indices(extent)
            }
            None => {
                return Err(PermAlignError::NotFound(format!(
                    "permutation '{}'",
                    var.name
                )))
            }
        };
        if !is_permutation(&perm) {
            return Err(PermAlignError::InvalidInput(format!(
                "'{}' is not a permutation of 0..{}",
                var.name,
                perm.len()
            )));
        }
        resolved.insert(var.name.as_str(), perm);
    }

    let mut aligned = ParameterSet::new();
    for (name, tensor) in params.iter() {
        let mut out = tensor.clone();
        if let Some(perms) = topology.perms_for_param(name) {
            for (axis, var) in [(0usize, &perms.row), (1usize, &perms.col)] {
                let Some(var) = var else { continue };
                let perm = resolved
                    .get(var.as_str())
                    .ok_or_else(|| PermAlignError::NotFound(format!("permutation '{}'", var)))?;
                if axis >= out.ndim() || out.len_of(Axis(axis)) != perm.len() {
                    return Err(PermAlignError::ShapeMismatch(format!(
                        "'{}' of length {} does not fit axis {} of '{}' {:?}",
                        var,
                        perm.len(),
                        axis,
                        name,
                        out.shape()
                    )));
                }
                out = out.select(Axis(axis), perm);
            }
        }
        aligned.insert(name.clone(), out);
    }

    Ok(aligned)
}
