// crates/permalign-core/src/params.rs
//
// Named parameter tensors of one network.

use std::collections::BTreeMap;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::PermAlignError;

/// A dense parameter tensor of rank 1 (bias), 2 (linear weight),
/// or 3-4 (convolution kernel, trailing dims are kernel extents).
pub type Tensor = ArrayD<f64>;

/// All parameters of one network, keyed by parameter name
/// (e.g. "layer_0.weight", "layer_0.bias").
///
/// Ordered by name so that iteration (and therefore floating point
/// accumulation) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    tensors: BTreeMap<String, Tensor>,
}

impl ParameterSet {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self {
            tensors: BTreeMap::new(),
        }
    }

    /// Insert or replace a tensor.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }

    /// Get a tensor by name.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Get a tensor by name, failing with `NotFound` if it is absent.
    pub fn require(&self, name: &str) -> Result<&Tensor, PermAlignError> {
        self.tensors
            .get(name)
            .ok_or_else(|| PermAlignError::NotFound(format!("parameter '{}'", name)))
    }

    /// Iterate over `(name, tensor)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.tensors.iter()
    }

    /// Parameter names in order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.tensors.keys()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl FromIterator<(String, Tensor)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}
