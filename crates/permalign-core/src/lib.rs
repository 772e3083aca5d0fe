// crates/permalign-core/src/lib.rs
//
// permalign-core: Core types, traits, and topology bookkeeping for
// permutation-based weight matching.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines the parameter containers, the permutation topology linking each
// permutation variable to the tensors it acts on, the error type, and the
// collaborator traits (linear assignment, scalar line search).

pub mod error;
pub mod params;
pub mod permutation;
pub mod topology;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use permalign_core::ParameterSet;`

// Parameter types
pub use params::{ParameterSet, Tensor};

// Permutation types
pub use permutation::{PermutationIndices, PermutationMatrix};

// Topology types
pub use topology::{ParamPerms, PermutationTopology, PermutationVariable};

// Error type
pub use error::PermAlignError;

// Traits
pub use traits::{AssignmentSolver, LineSearch, ScalarMinimum};
