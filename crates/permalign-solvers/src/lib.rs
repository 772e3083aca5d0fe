// crates/permalign-solvers/src/lib.rs
//
// permalign-solvers: Numerical collaborators for the Frank-Wolfe matcher.
//
// Provides the default linear assignment solver (Hungarian / shortest
// augmenting path) used both as the Frank-Wolfe direction oracle and for
// hardening, and the bounded Brent minimizer used for the step size line
// search. Both implement the traits defined in permalign-core.

pub mod brent;
pub mod hungarian;

pub use brent::BoundedBrent;
pub use hungarian::HungarianSolver;
