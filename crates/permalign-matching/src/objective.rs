// crates/permalign-matching/src/objective.rs
//
// Layer-wise similarity objective and its per-permutation gradient.
//
// For a parameter W with row permutation P and column permutation Q the
// similarity term is <Wa, P Wb Q^T>. The objective is linear in P when Q is
// held fixed and vice versa, so each variable's gradient is assembled from
// the terms where it appears, freezing the other side. This is the
// Frank-Wolfe linearization, not the joint derivative.

use std::borrow::Cow;
use std::collections::BTreeMap;

use ndarray::{Array2, ArrayD};

use permalign_core::{ParamPerms, ParameterSet, PermAlignError, PermutationMatrix, PermutationTopology};

use crate::algebra::{apply_along_column, apply_along_row, axis_gram, inner_product, permute_axis};

/// Current (relaxed) matrix of every permutation variable, by name.
pub type PermMatrices = BTreeMap<String, PermutationMatrix>;

fn lookup<'a>(
    perm_matrices: &'a PermMatrices,
    name: &Option<String>,
) -> Result<Option<&'a PermutationMatrix>, PermAlignError> {
    match name {
        None => Ok(None),
        Some(n) => perm_matrices
            .get(n)
            .map(Some)
            .ok_or_else(|| PermAlignError::NotFound(format!("permutation matrix '{}'", n))),
    }
}

/// Similarity of one parameter pair under the given permutations:
/// `<Wa, P Wb Q^T>`, with identity wherever a side is `None`.
///
/// Rank 1 gives a dot product, rank 2 the Frobenius inner product, and
/// higher ranks the generalized trace over the two channel axes with the
/// kernel axes contracted elementwise.
pub fn layer_similarity(
    wa: &ArrayD<f64>,
    wb: &ArrayD<f64>,
    row_perm: Option<&PermutationMatrix>,
    col_perm: Option<&PermutationMatrix>,
) -> Result<f64, PermAlignError> {
    if wa.shape() != wb.shape() {
        return Err(PermAlignError::ShapeMismatch(format!(
            "fixed tensor {:?} vs permutee tensor {:?}",
            wa.shape(),
            wb.shape()
        )));
    }

    let mut wb_perm = match row_perm {
        Some(p) => Cow::Owned(apply_along_row(wb, p.view())?),
        None => Cow::Borrowed(wb),
    };
    if let Some(q) = col_perm {
        wb_perm = Cow::Owned(apply_along_column(&wb_perm, q.t())?);
    }

    inner_product(wa, &wb_perm)
}

fn param_pair<'a>(
    params_a: &'a ParameterSet,
    params_b: &'a ParameterSet,
    name: &str,
) -> Result<(&'a ArrayD<f64>, &'a ArrayD<f64>), PermAlignError> {
    Ok((params_a.require(name)?, params_b.require(name)?))
}

/// Total similarity over every parameter named in the topology.
/// Larger is better.
pub fn global_objective(
    params_a: &ParameterSet,
    params_b: &ParameterSet,
    perm_matrices: &PermMatrices,
    topology: &PermutationTopology,
) -> Result<f64, PermAlignError> {
    let mut total = 0.0;
    for (param, ParamPerms { row, col }) in topology.params() {
        let (wa, wb) = param_pair(params_a, params_b, param)?;
        let row_perm = lookup(perm_matrices, row)?;
        let col_perm = lookup(perm_matrices, col)?;
        total += layer_similarity(wa, wb, row_perm, col_perm)?;
    }
    Ok(total)
}

/// Gradient of the objective with respect to each permutation matrix in
/// `perm_matrices`.
///
/// Row term for the row permutation of W (column permutation Q frozen):
/// contract `Wa` against `Wb Q^T` over every axis except 0.
/// Column term for the column permutation of W (row permutation P frozen):
/// contract `Wa` against `P Wb` over every axis except 1.
pub fn gradients(
    params_a: &ParameterSet,
    params_b: &ParameterSet,
    perm_matrices: &PermMatrices,
    topology: &PermutationTopology,
) -> Result<PermMatrices, PermAlignError> {
    let mut grads: PermMatrices = perm_matrices
        .iter()
        .map(|(name, m)| (name.clone(), Array2::zeros(m.raw_dim())))
        .collect();

    for (param, ParamPerms { row, col }) in topology.params() {
        let (wa, wb) = param_pair(params_a, params_b, param)?;
        let row_perm = lookup(perm_matrices, row)?;
        let col_perm = lookup(perm_matrices, col)?;

        if let Some(row_name) = row {
            let wb_cols = match col_perm {
                Some(q) => Cow::Owned(permute_axis(wb, q.view(), 1)?),
                None => Cow::Borrowed(wb),
            };
            let term = axis_gram(wa, &wb_cols, 0)?;
            accumulate(&mut grads, row_name, &term)?;
        }

        if let Some(col_name) = col {
            let wb_rows = match row_perm {
                Some(p) => Cow::Owned(apply_along_row(wb, p.view())?),
                None => Cow::Borrowed(wb),
            };
            let term = axis_gram(wa, &wb_rows, 1)?;
            accumulate(&mut grads, col_name, &term)?;
        }
    }

    Ok(grads)
}

fn accumulate(
    grads: &mut PermMatrices,
    name: &str,
    term: &Array2<f64>,
) -> Result<(), PermAlignError> {
    let grad = grads
        .get_mut(name)
        .ok_or_else(|| PermAlignError::NotFound(format!("permutation matrix '{}'", name)))?;
    if grad.dim() != term.dim() {
        return Err(PermAlignError::ShapeMismatch(format!(
            "gradient term {:?} for '{}' does not match its {:?} matrix",
            term.dim(),
            name,
            grad.dim()
        )));
    }
    *grad += term;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array, IxDyn};
    use permalign_core::permutation::indices_to_matrix;
    use permalign_core::PermutationVariable;

    fn two_layer() -> (ParameterSet, PermutationTopology) {
        let mut params = ParameterSet::new();
        params.insert("layer_0.weight", arr2(&[[1.0, 2.0], [0.0, 1.0], [3.0, -1.0]]).into_dyn());
        params.insert("layer_0.bias", arr1(&[0.5, -0.5, 1.0]).into_dyn());
        params.insert("layer_1.weight", arr2(&[[1.0, 0.0, 2.0], [-1.0, 1.0, 0.5]]).into_dyn());
        params.insert("layer_1.bias", arr1(&[0.1, 0.2]).into_dyn());
        (params, PermutationTopology::mlp(2).unwrap())
    }

    fn identity_perms() -> PermMatrices {
        let mut perms = PermMatrices::new();
        perms.insert("P_0".to_string(), Array2::eye(3));
        perms.insert("P_final".to_string(), Array2::eye(2));
        perms
    }

    #[test]
    fn matrix_similarity_is_trace_of_product() {
        let wa = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let wb = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
        let p = indices_to_matrix(&[1, 0]).unwrap();
        let q = arr2(&[[0.3, 0.7], [0.7, 0.3]]);
        let got = layer_similarity(&wa.clone().into_dyn(), &wb.clone().into_dyn(), Some(&p), Some(&q)).unwrap();
        let expected = wa.t().dot(&p.dot(&wb).dot(&q.t())).diag().sum();
        assert!((got - expected).abs() < 1e-12);
    }

    #[test]
    fn kernel_similarity_is_generalized_trace() {
        let wa = Array::from_shape_fn(IxDyn(&[2, 3, 2, 2]), |ix| (ix[0] + 2 * ix[1] + ix[2] * ix[3]) as f64);
        let wb = Array::from_shape_fn(IxDyn(&[2, 3, 2, 2]), |ix| (ix[0] * ix[1]) as f64 - ix[3] as f64);
        let p = indices_to_matrix(&[1, 0]).unwrap();
        let got = layer_similarity(&wa, &wb, Some(&p), None).unwrap();

        // trace_{out} sum_{in,kh,kw} wa[o, i, h, w] * wb[p(o), i, h, w]
        let mut expected = 0.0;
        for o in 0..2 {
            for i in 0..3 {
                for h in 0..2 {
                    for w in 0..2 {
                        expected += wa[&[o, i, h, w][..]] * wb[&[1 - o, i, h, w][..]];
                    }
                }
            }
        }
        assert!((got - expected).abs() < 1e-12);
    }

    #[test]
    fn identity_objective_is_sum_of_squares() {
        let (params, topo) = two_layer();
        let obj = global_objective(&params, &params, &identity_perms(), &topo).unwrap();
        let expected: f64 = params.iter().map(|(_, t)| t.iter().map(|x| x * x).sum::<f64>()).sum();
        assert!((obj - expected).abs() < 1e-12);
    }

    #[test]
    fn gradient_matches_finite_differences_of_linear_objective() {
        // With one free variable the objective is linear in it, so
        // <grad, E_ij> equals the change from a unit bump of entry (i, j).
        let (params_a, topo) = two_layer();
        let mut params_b = params_a.clone();
        params_b.insert("layer_0.bias", arr1(&[2.0, 0.0, -1.0]).into_dyn());

        let perms = identity_perms();
        let grads = gradients(&params_a, &params_b, &perms, &topo).unwrap();
        let base = global_objective(&params_a, &params_b, &perms, &topo).unwrap();

        for i in 0..3 {
            for j in 0..3 {
                let mut bumped = perms.clone();
                bumped.get_mut("P_0").unwrap()[[i, j]] += 1.0;
                let obj = global_objective(&params_a, &params_b, &bumped, &topo).unwrap();
                let fd = obj - base;
                let g = grads["P_0"][[i, j]];
                assert!((fd - g).abs() < 1e-9, "entry ({}, {}): fd {} vs grad {}", i, j, fd, g);
            }
        }
    }

    #[test]
    fn row_and_column_terms_use_the_frozen_side() {
        let wa = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let wb = arr2(&[[2.0, -1.0], [0.5, 1.5]]);
        let mut params_a = ParameterSet::new();
        let mut params_b = ParameterSet::new();
        params_a.insert("w", wa.clone().into_dyn());
        params_b.insert("w", wb.clone().into_dyn());
        let topo = PermutationTopology::new(vec![
            PermutationVariable::new("P", vec![("w".to_string(), 0)]),
            PermutationVariable::new("Q", vec![("w".to_string(), 1)]),
        ])
        .unwrap();

        let p = arr2(&[[0.25, 0.75], [0.75, 0.25]]);
        let q = indices_to_matrix(&[1, 0]).unwrap();
        let mut perms = PermMatrices::new();
        perms.insert("P".to_string(), p.clone());
        perms.insert("Q".to_string(), q.clone());

        let grads = gradients(&params_a, &params_b, &perms, &topo).unwrap();
        // d/dP <A, P B Q^T> = A Q B^T ; d/dQ = A^T P B
        let expected_p = wa.dot(&q).dot(&wb.t());
        let expected_q = wa.t().dot(&p).dot(&wb);
        for (g, e) in grads["P"].iter().zip(expected_p.iter()) {
            assert!((g - e).abs() < 1e-12);
        }
        for (g, e) in grads["Q"].iter().zip(expected_q.iter()) {
            assert!((g - e).abs() < 1e-12);
        }
    }

    #[test]
    fn missing_permutation_matrix_is_not_found() {
        let (params, topo) = two_layer();
        let mut perms = identity_perms();
        perms.remove("P_0");
        let err = global_objective(&params, &params, &perms, &topo).unwrap_err();
        assert!(matches!(err, PermAlignError::NotFound(_)));
    }
}
