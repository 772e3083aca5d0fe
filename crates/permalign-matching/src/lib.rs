// crates/permalign-matching/src/lib.rs
//
// permalign-matching: Frank-Wolfe weight matching.
//
// Finds, per permutation variable, the permutation of the permutee network's
// hidden units that maximizes its layer-wise similarity to the fixed network.
// The permutation matrices are relaxed to the Birkhoff polytope, improved by
// Frank-Wolfe steps (gradient, assignment projection, line search), and
// finally hardened back to exact permutations.

pub mod algebra;
pub mod apply;
pub mod config;
pub mod driver;
pub mod init;
pub mod objective;
pub mod problem;
pub mod trial;

pub use apply::apply_permutation;
pub use config::MatchingConfig;
pub use driver::{weight_matching, FrankWolfeMatcher, MatchResult, TrialSummary};
pub use init::{sinkhorn_knopp, InitializationMethod, SinkhornConfig};
pub use objective::{global_objective, gradients, layer_similarity, PermMatrices};
pub use problem::MatchingProblem;
pub use trial::{run_trial, TrialOutcome, TrialState, TrialStateMachine};
