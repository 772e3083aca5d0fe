// crates/permalign-matching/src/algebra.rs
//
// Tensor permutation algebra.
//
// Everything here is built on one primitive, `permute_axis`, which mixes the
// slices of a tensor along a single axis with an n x n matrix:
//
//   out[.., i, ..] = sum_j m[i, j] * x[.., j, ..]
//
// It works for any rank, so biases, linear weights, and convolution kernels
// all go through the same code path.

use ndarray::{Array2, ArrayD, ArrayView2, Axis};

use permalign_core::PermAlignError;

/// Mix the slices of `tensor` along `axis` with `matrix`.
///
/// `matrix` must be square with side equal to the extent of `axis`.
/// The result has the same shape as `tensor`. Zero weights are skipped, so
/// exact permutation matrices cost one copy per slice.
pub fn permute_axis(
    tensor: &ArrayD<f64>,
    matrix: ArrayView2<f64>,
    axis: usize,
) -> Result<ArrayD<f64>, PermAlignError> {
    if axis >= tensor.ndim() {
        return Err(PermAlignError::ShapeMismatch(format!(
            "cannot permute axis {} of a rank-{} tensor",
            axis,
            tensor.ndim()
        )));
    }
    let n = tensor.len_of(Axis(axis));
    if matrix.dim() != (n, n) {
        return Err(PermAlignError::ShapeMismatch(format!(
            "axis {} has extent {} but the permutation is {}x{}",
            axis,
            n,
            matrix.nrows(),
            matrix.ncols()
        )));
    }

    let mut out = ArrayD::zeros(tensor.raw_dim());
    for i in 0..n {
        let mut dst = out.index_axis_mut(Axis(axis), i);
        for j in 0..n {
            let w = matrix[[i, j]];
            if w != 0.0 {
                dst.scaled_add(w, &tensor.index_axis(Axis(axis), j));
            }
        }
    }
    Ok(out)
}

/// `P x`: mix rows (axis 0). Valid for every rank, including vectors.
pub fn apply_along_row(
    tensor: &ArrayD<f64>,
    perm: ArrayView2<f64>,
) -> Result<ArrayD<f64>, PermAlignError> {
    permute_axis(tensor, perm, 0)
}

/// `x M`: mix columns (axis 1). Requires rank >= 2.
pub fn apply_along_column(
    tensor: &ArrayD<f64>,
    perm: ArrayView2<f64>,
) -> Result<ArrayD<f64>, PermAlignError> {
    if tensor.ndim() < 2 {
        return Err(PermAlignError::ShapeMismatch(
            "column permutation of a vector".to_string(),
        ));
    }
    permute_axis(tensor, perm.t(), 1)
}

/// Elementwise inner product `sum(a * b)` of two same-shaped tensors.
///
/// For matrices this is `trace(a^T b)`; for kernels it is the generalized
/// trace that contracts the kernel dims together with the channel dims.
pub fn inner_product(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<f64, PermAlignError> {
    if a.shape() != b.shape() {
        return Err(PermAlignError::ShapeMismatch(format!(
            "inner product of {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Gram matrix over one axis: `g[i, j] = <a[.., i, ..], b[.., j, ..]>`,
/// contracting every other axis.
///
/// With `axis = 0` on matrices this is `a b^T`; with `axis = 1` it is
/// `a^T b`. Vectors contract nothing and give the outer product.
pub fn axis_gram(
    a: &ArrayD<f64>,
    b: &ArrayD<f64>,
    axis: usize,
) -> Result<Array2<f64>, PermAlignError> {
    if a.shape() != b.shape() {
        return Err(PermAlignError::ShapeMismatch(format!(
            "gram of {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    if axis >= a.ndim() {
        return Err(PermAlignError::ShapeMismatch(format!(
            "cannot contract around axis {} of a rank-{} tensor",
            axis,
            a.ndim()
        )));
    }
    let n = a.len_of(Axis(axis));
    Ok(Array2::from_shape_fn((n, n), |(i, j)| {
        let ai = a.index_axis(Axis(axis), i);
        let bj = b.index_axis(Axis(axis), j);
        ai.iter().zip(bj.iter()).map(|(x, y)| x * y).sum::<f64>()
    }))
}
