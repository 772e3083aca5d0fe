// crates/permalign-core/src/topology.rs
//
// Permutation topology: which permutation variable acts on which
// parameter axis.
//
// The topology is given as an ordered list of permutation variables, each
// with the (parameter, axis) pairs it permutes. From that list we derive the
// inverse adjacency param -> (row perm, col perm) once, so the objective and
// gradient never have to scan the variables to find who permutes a tensor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PermAlignError;
use crate::params::ParameterSet;

/// Conventional name of the output-layer permutation, fixed to identity.
pub const FINAL_PERMUTATION: &str = "P_final";

/// One permutation variable and every parameter axis it acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermutationVariable {
    /// Variable name (e.g. "P_0").
    pub name: String,
    /// Ordered (parameter name, axis) pairs. Axis 0 permutes rows,
    /// axis 1 permutes columns.
    pub axes: Vec<(String, usize)>,
    /// Whether the optimizer may move this variable. The output-layer
    /// permutation is not optimizable and stays the identity.
    #[serde(default = "default_optimizable")]
    pub optimizable: bool,
}

fn default_optimizable() -> bool {
    true
}

impl PermutationVariable {
    /// Create an optimizable permutation variable.
    pub fn new(name: impl Into<String>, axes: Vec<(String, usize)>) -> Self {
        Self {
            name: name.into(),
            axes,
            optimizable: true,
        }
    }

    /// Create a variable that is held at identity.
    pub fn fixed(name: impl Into<String>, axes: Vec<(String, usize)>) -> Self {
        Self {
            name: name.into(),
            axes,
            optimizable: false,
        }
    }
}

/// The permutations acting on the first two axes of one parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamPerms {
    /// Permutation acting on axis 0.
    pub row: Option<String>,
    /// Permutation acting on axis 1.
    pub col: Option<String>,
}

/// Bidirectional adjacency between permutation variables and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<PermutationVariable>",
    into = "Vec<PermutationVariable>"
)]
pub struct PermutationTopology {
    variables: Vec<PermutationVariable>,
    position: BTreeMap<String, usize>,
    param_perms: BTreeMap<String, ParamPerms>,
}

impl PermutationTopology {
    /// Build the topology and its inverse adjacency.
    ///
    /// Fails with `Topology` on duplicate variable names, axes other than
    /// 0 or 1, or a parameter axis claimed by two variables.
    pub fn new(variables: Vec<PermutationVariable>) -> Result<Self, PermAlignError> {
        let mut position = BTreeMap::new();
        let mut param_perms: BTreeMap<String, ParamPerms> = BTreeMap::new();

        for (idx, var) in variables.iter().enumerate() {
            if position.insert(var.name.clone(), idx).is_some() {
                return Err(PermAlignError::Topology(format!(
                    "duplicate permutation variable '{}'",
                    var.name
                )));
            }
            if var.axes.is_empty() {
                return Err(PermAlignError::Topology(format!(
                    "permutation '{}' acts on no parameters",
                    var.name
                )));
            }

            for (param, axis) in &var.axes {
                let entry = param_perms.entry(param.clone()).or_default();
                let slot = match *axis {
                    0 => &mut entry.row,
                    1 => &mut entry.col,
                    other => {
                        return Err(PermAlignError::Topology(format!(
                            "permutation '{}' acts on axis {} of '{}'; only axes 0 and 1 are supported",
                            var.name, other, param
                        )))
                    }
                };
                if let Some(existing) = slot.as_ref() {
                    return Err(PermAlignError::Topology(format!(
                        "axis {} of '{}' is claimed by both '{}' and '{}'",
                        axis, param, existing, var.name
                    )));
                }
                *slot = Some(var.name.clone());
            }
        }

        Ok(Self {
            variables,
            position,
            param_perms,
        })
    }

    /// Topology of a plain multi-layer perceptron with parameters named
    /// `layer_{i}.weight` (shape `[out, in]`) and `layer_{i}.bias`.
    ///
    /// Hidden layer `i` gets variable `P_{i}`; the output rows get the
    /// fixed variable `P_final`.
    pub fn mlp(num_layers: usize) -> Result<Self, PermAlignError> {
        if num_layers == 0 {
            return Err(PermAlignError::Topology(
                "an MLP needs at least one layer".to_string(),
            ));
        }
        let weight = |i: usize| format!("layer_{}.weight", i);
        let bias = |i: usize| format!("layer_{}.bias", i);

        let mut variables: Vec<PermutationVariable> = (0..num_layers - 1)
            .map(|i| {
                PermutationVariable::new(
                    format!("P_{}", i),
                    vec![(weight(i), 0), (bias(i), 0), (weight(i + 1), 1)],
                )
            })
            .collect();
        let last = num_layers - 1;
        variables.push(PermutationVariable::fixed(
            FINAL_PERMUTATION,
            vec![(weight(last), 0), (bias(last), 0)],
        ));

        Self::new(variables)
    }

    /// All variables in declaration order.
    pub fn variables(&self) -> &[PermutationVariable] {
        &self.variables
    }

    /// Look up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&PermutationVariable> {
        self.position.get(name).map(|&i| &self.variables[i])
    }

    /// Whether the named variable is optimized (unknown names are not).
    pub fn is_optimizable(&self, name: &str) -> bool {
        self.variable(name).map(|v| v.optimizable).unwrap_or(false)
    }

    /// Names of the variables the optimizer may move.
    pub fn optimizable_names(&self) -> impl Iterator<Item = &str> {
        self.variables
            .iter()
            .filter(|v| v.optimizable)
            .map(|v| v.name.as_str())
    }

    /// Row/column permutations of one parameter, if it is permuted at all.
    pub fn perms_for_param(&self, param: &str) -> Option<&ParamPerms> {
        self.param_perms.get(param)
    }

    /// Every permuted parameter with its row/column permutations, by name.
    pub fn params(&self) -> impl Iterator<Item = (&String, &ParamPerms)> {
        self.param_perms.iter()
    }

    /// Derive the dimension each variable controls and validate every
    /// referenced axis against both parameter sets.
    ///
    /// Corresponding tensors must have identical shapes in both models, and
    /// every axis a variable touches must have the same extent.
    pub fn perm_sizes(
        &self,
        params_a: &ParameterSet,
        params_b: &ParameterSet,
    ) -> Result<BTreeMap<String, usize>, PermAlignError> {
        let mut sizes = BTreeMap::new();

        for var in &self.variables {
            let mut size: Option<usize> = None;
            for (param, axis) in &var.axes {
                let wa = params_a.require(param)?;
                let wb = params_b.require(param)?;
                if wa.shape() != wb.shape() {
                    return Err(PermAlignError::ShapeMismatch(format!(
                        "'{}' has shape {:?} in the fixed model but {:?} in the permutee",
                        param,
                        wa.shape(),
                        wb.shape()
                    )));
                }
                if *axis >= wa.ndim() {
                    return Err(PermAlignError::ShapeMismatch(format!(
                        "'{}' (rank {}) has no axis {} for '{}'",
                        param,
                        wa.ndim(),
                        axis,
                        var.name
                    )));
                }
                let extent = wa.shape()[*axis];
                match size {
                    None => size = Some(extent),
                    Some(n) if n != extent => {
                        return Err(PermAlignError::ShapeMismatch(format!(
                            "'{}' expects dimension {} but axis {} of '{}' has extent {}",
                            var.name, n, axis, param, extent
                        )))
                    }
                    Some(_) => {}
                }
            }
            // Non-empty axes are guaranteed by `new`.
            if let Some(n) = size {
                sizes.insert(var.name.clone(), n);
            }
        }

        Ok(sizes)
    }
}

impl TryFrom<Vec<PermutationVariable>> for PermutationTopology {
    type Error = PermAlignError;

    fn try_from(variables: Vec<PermutationVariable>) -> Result<Self, Self::Error> {
        Self::new(variables)
    }
}

impl From<PermutationTopology> for Vec<PermutationVariable> {
    fn from(topology: PermutationTopology) -> Self {
        topology.variables
    }
}
