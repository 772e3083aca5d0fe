// crates/permalign-matching/src/init.rs
//
// Starting points for the Frank-Wolfe trials: identity, uniform random, or a
// random matrix normalized onto the Birkhoff polytope with Sinkhorn-Knopp.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use permalign_core::{PermAlignError, PermutationMatrix, PermutationTopology};

use crate::objective::PermMatrices;

/// How each trial's permutation matrices are initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum InitializationMethod {
    /// Identity matrix per variable.
    Identity,
    /// Uniform random entries in [0, 1). Not doubly stochastic.
    Random,
    /// Uniform random entries normalized with Sinkhorn-Knopp.
    Sinkhorn,
}

impl fmt::Display for InitializationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitializationMethod::Identity => write!(f, "identity"),
            InitializationMethod::Random => write!(f, "random"),
            InitializationMethod::Sinkhorn => write!(f, "sinkhorn"),
        }
    }
}

impl FromStr for InitializationMethod {
    type Err = PermAlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(InitializationMethod::Identity),
            "random" => Ok(InitializationMethod::Random),
            "sinkhorn" => Ok(InitializationMethod::Sinkhorn),
            other => Err(PermAlignError::InvalidConfig(format!(
                "unknown initialization method '{}' (expected identity, random, or sinkhorn)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for InitializationMethod {
    type Error = PermAlignError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Configuration for the Sinkhorn-Knopp normalization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SinkhornConfig {
    /// Allowed deviation of every row and column sum from 1. Default: 1e-10.
    #[serde(default = "default_sinkhorn_tolerance")]
    pub tolerance: f64,
    /// Maximum number of row+column sweeps. Default: 1000.
    #[serde(default = "default_sinkhorn_iterations")]
    pub max_iterations: usize,
}

fn default_sinkhorn_tolerance() -> f64 {
    1e-10
}

fn default_sinkhorn_iterations() -> usize {
    1000
}

impl Default for SinkhornConfig {
    fn default() -> Self {
        Self {
            tolerance: default_sinkhorn_tolerance(),
            max_iterations: default_sinkhorn_iterations(),
        }
    }
}

const SCALE_GUARD: f64 = 1e-16;

fn within_tolerance(m: &Array2<f64>, tolerance: f64) -> bool {
    m.rows().into_iter().all(|r| (r.sum() - 1.0).abs() < tolerance)
        && m.columns().into_iter().all(|c| (c.sum() - 1.0).abs() < tolerance)
}

/// Scale a non-negative square matrix to (approximately) doubly stochastic.
///
/// Alternately divides every row, then every column, by its sum until all
/// sums are within `config.tolerance` of 1. At the iteration cap the last
/// iterate is returned as is.
///
/// Fails with `InvalidInput` on negative or NaN entries and with
/// `ShapeMismatch` on a non-square matrix.
pub fn sinkhorn_knopp(
    matrix: &Array2<f64>,
    config: &SinkhornConfig,
) -> Result<PermutationMatrix, PermAlignError> {
    if matrix.iter().any(|&x| !(x >= 0.0)) {
        return Err(PermAlignError::InvalidInput(
            "Sinkhorn-Knopp needs a non-negative matrix".to_string(),
        ));
    }
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(PermAlignError::ShapeMismatch(format!(
            "Sinkhorn-Knopp needs a square matrix, got {}x{}",
            rows, cols
        )));
    }

    let mut m = matrix / (matrix.sum() + SCALE_GUARD);

    for iteration in 0..config.max_iterations {
        for mut row in m.rows_mut() {
            let scale = 1.0 / (row.sum() + SCALE_GUARD);
            row *= scale;
        }
        for mut col in m.columns_mut() {
            let scale = 1.0 / (col.sum() + SCALE_GUARD);
            col *= scale;
        }

        if within_tolerance(&m, config.tolerance) {
            tracing::trace!("Sinkhorn-Knopp converged after {} sweeps", iteration + 1);
            return Ok(m);
        }
    }

    tracing::debug!(
        "Sinkhorn-Knopp hit the iteration cap ({}) before reaching tolerance {}",
        config.max_iterations,
        config.tolerance
    );
    Ok(m)
}

/// Starting matrix for one optimizable variable of size `n`.
pub fn initialize_perm_matrix<R: Rng>(
    n: usize,
    method: InitializationMethod,
    sinkhorn: &SinkhornConfig,
    rng: &mut R,
) -> Result<PermutationMatrix, PermAlignError> {
    match method {
        InitializationMethod::Identity => Ok(Array2::eye(n)),
        InitializationMethod::Random => Ok(Array2::from_shape_fn((n, n), |_| rng.gen::<f64>())),
        InitializationMethod::Sinkhorn => {
            let raw = Array2::from_shape_fn((n, n), |_| rng.gen::<f64>());
            sinkhorn_knopp(&raw, sinkhorn)
        }
    }
}

/// Starting matrices for every variable. Variables that are not optimizable
/// always start (and stay) at identity.
pub fn initialize_perm_matrices<R: Rng>(
    perm_sizes: &BTreeMap<String, usize>,
    topology: &PermutationTopology,
    method: InitializationMethod,
    sinkhorn: &SinkhornConfig,
    rng: &mut R,
) -> Result<PermMatrices, PermAlignError> {
    perm_sizes
        .iter()
        .map(|(name, &n)| -> Result<(String, PermutationMatrix), PermAlignError> {
            let matrix = if topology.is_optimizable(name) {
                initialize_perm_matrix(n, method, sinkhorn, rng)?
            } else {
                Array2::eye(n)
            };
            Ok((name.clone(), matrix))
        })
        .collect()
}
