// crates/permalign-matching/src/trial.rs
//
// One Frank-Wolfe trial over the product of Birkhoff polytopes.
//
// Valid transitions:
//   Initialized -> Iterating -> Converged | MaxIterReached
//   Initialized -> MaxIterReached   (iteration cap of zero)

use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use permalign_core::permutation::indices_to_matrix;
use permalign_core::{AssignmentSolver, LineSearch, PermAlignError, PermutationMatrix, PermutationTopology};

use crate::config::MatchingConfig;
use crate::init::initialize_perm_matrices;
use crate::objective::PermMatrices;
use crate::problem::MatchingProblem;

/// Lifecycle states of a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    /// Matrices initialized, no step taken yet.
    Initialized,
    /// Taking Frank-Wolfe steps.
    Iterating,
    /// Stopped after `patience` iterations without improvement.
    Converged,
    /// Stopped at the iteration cap.
    MaxIterReached,
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialState::Initialized => write!(f, "Initialized"),
            TrialState::Iterating => write!(f, "Iterating"),
            TrialState::Converged => write!(f, "Converged"),
            TrialState::MaxIterReached => write!(f, "MaxIterReached"),
        }
    }
}

/// State machine guarding the trial lifecycle.
pub struct TrialStateMachine {
    pub current: TrialState,
}

impl TrialStateMachine {
    pub fn new() -> Self {
        Self {
            current: TrialState::Initialized,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition(&mut self, new_state: TrialState) -> Result<(), PermAlignError> {
        let valid = matches!(
            (self.current, new_state),
            (TrialState::Initialized, TrialState::Iterating)
                | (TrialState::Initialized, TrialState::MaxIterReached)
                | (TrialState::Iterating, TrialState::Converged)
                | (TrialState::Iterating, TrialState::MaxIterReached)
        );

        if valid {
            tracing::debug!("Trial state transition: {} -> {}", self.current, new_state);
            self.current = new_state;
            Ok(())
        } else {
            Err(PermAlignError::InvalidState(format!(
                "Invalid trial transition: {} -> {}",
                self.current, new_state
            )))
        }
    }

    /// Whether the trial has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.current,
            TrialState::Converged | TrialState::MaxIterReached
        )
    }
}

impl Default for TrialStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a finished trial hands back to the driver.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    /// Seed the trial's initialization was drawn from.
    pub seed: u64,
    /// Final relaxed matrices.
    pub perm_matrices: PermMatrices,
    /// Initial matrices followed by one snapshot per iteration, if requested.
    pub history: Option<Vec<PermMatrices>>,
    /// Objective of `perm_matrices`.
    pub objective: f64,
    /// Objective of the initial state and after every iteration.
    pub objective_trace: Vec<f64>,
    /// Number of iterations taken.
    pub iterations: usize,
    pub final_state: TrialState,
}

/// Chosen step along the segment from the current point to the vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub t: f64,
    pub objective: f64,
}

/// Project each optimizable variable's gradient onto the permutation vertex
/// maximizing `<grad, X>`. Fixed variables get no target.
pub fn project_gradients<A: AssignmentSolver + ?Sized>(
    topology: &PermutationTopology,
    grads: &PermMatrices,
    solver: &A,
) -> Result<PermMatrices, PermAlignError> {
    grads
        .iter()
        .filter(|(name, _)| topology.is_optimizable(name))
        .map(|(name, grad)| -> Result<(String, PermutationMatrix), PermAlignError> {
            let perm = solver.solve(grad)?;
            Ok((name.clone(), indices_to_matrix(&perm)?))
        })
        .collect()
}

/// `(1 - t) * current + t * target` for every variable with a target.
/// Variables without one are carried over unchanged.
pub fn interpolate(current: &PermMatrices, targets: &PermMatrices, t: f64) -> PermMatrices {
    current
        .iter()
        .map(|(name, p)| {
            let next = match targets.get(name) {
                Some(v) => {
                    let mut out = p * (1.0 - t);
                    out.scaled_add(t, v);
                    out
                }
                None => p.clone(),
            };
            (name.clone(), next)
        })
        .collect()
}

/// Line search over `t in [0, 1]`, guarded by both endpoints.
///
/// The candidate from `line_search` is taken only if it strictly beats
/// staying put, and `t = 1` only if it strictly beats the candidate.
pub fn choose_step<L: LineSearch + ?Sized>(
    problem: &MatchingProblem<'_>,
    current: &PermMatrices,
    targets: &PermMatrices,
    current_objective: f64,
    line_search: &L,
) -> Result<Step, PermAlignError> {
    let mut failure: Option<PermAlignError> = None;
    let mut neg_objective = |t: f64| -> f64 {
        match problem.objective(&interpolate(current, targets, t)) {
            Ok(obj) => -obj,
            Err(e) => {
                failure.get_or_insert(e);
                f64::NAN
            }
        }
    };

    let candidate = line_search.minimize(&mut neg_objective, 0.0, 1.0)?;
    let at_one = neg_objective(1.0);
    if let Some(e) = failure {
        return Err(e);
    }

    let mut best = Step {
        t: 0.0,
        objective: current_objective,
    };
    if -candidate.fx > best.objective {
        best = Step {
            t: candidate.x,
            objective: -candidate.fx,
        };
    }
    if -at_one > best.objective {
        best = Step {
            t: 1.0,
            objective: -at_one,
        };
    }
    Ok(best)
}

/// Run one trial from `seed` until patience runs out or the iteration cap.
pub fn run_trial<A, L>(
    problem: &MatchingProblem<'_>,
    solver: &A,
    line_search: &L,
    config: &MatchingConfig,
    seed: u64,
) -> Result<TrialOutcome, PermAlignError>
where
    A: AssignmentSolver + ?Sized,
    L: LineSearch + ?Sized,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let mut perms = initialize_perm_matrices(
        problem.perm_sizes(),
        problem.topology(),
        config.initialization,
        &config.sinkhorn,
        &mut rng,
    )?;

    let mut objective = problem.objective(&perms)?;
    let mut objective_trace = vec![objective];
    let mut history = config.return_history.then(|| vec![perms.clone()]);
    let mut machine = TrialStateMachine::new();

    let mut best = objective;
    let mut stale = 0usize;
    let mut iterations = 0usize;

    if config.max_iterations == 0 {
        machine.transition(TrialState::MaxIterReached)?;
    } else {
        machine.transition(TrialState::Iterating)?;
    }

    while !machine.is_terminal() {
        iterations += 1;

        let grads = problem.gradients(&perms)?;
        let targets = project_gradients(problem.topology(), &grads, solver)?;
        let step = choose_step(problem, &perms, &targets, objective, line_search)?;

        perms = interpolate(&perms, &targets, step.t);
        objective = problem.objective(&perms)?;
        objective_trace.push(objective);
        if let Some(h) = history.as_mut() {
            h.push(perms.clone());
        }

        if objective - best < config.min_improvement {
            stale += 1;
        } else {
            stale = 0;
            best = objective;
        }

        tracing::debug!(
            "Iteration {}: step {:.6}, objective {:.6}, patience {}/{}",
            iterations,
            step.t,
            objective,
            stale,
            config.patience
        );

        if stale >= config.patience {
            machine.transition(TrialState::Converged)?;
        } else if iterations >= config.max_iterations {
            machine.transition(TrialState::MaxIterReached)?;
        }
    }

    Ok(TrialOutcome {
        seed,
        perm_matrices: perms,
        history,
        objective,
        objective_trace,
        iterations,
        final_state: machine.current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::InitializationMethod;
    use ndarray::{Array1, Array2};
    use permalign_core::permutation::doubly_stochastic_error;
    use permalign_core::ParameterSet;
    use permalign_solvers::{BoundedBrent, HungarianSolver};
    use rand::Rng;

    fn random_mlp(widths: &[usize], rng: &mut StdRng) -> ParameterSet {
        let mut params = ParameterSet::new();
        for (i, pair) in widths.windows(2).enumerate() {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let w = Array2::from_shape_fn((fan_out, fan_in), |_| rng.gen_range(-1.0..1.0));
            let b = Array1::from_shape_fn(fan_out, |_| rng.gen_range(-1.0..1.0));
            params.insert(format!("layer_{}.weight", i), w.into_dyn());
            params.insert(format!("layer_{}.bias", i), b.into_dyn());
        }
        params
    }

    fn config(init: InitializationMethod) -> MatchingConfig {
        MatchingConfig {
            max_iterations: 30,
            return_history: true,
            ..MatchingConfig::new(init)
        }
    }

    #[test]
    fn state_machine_rejects_invalid_transitions() {
        let mut machine = TrialStateMachine::new();
        assert!(machine.transition(TrialState::Converged).is_err());
        machine.transition(TrialState::Iterating).unwrap();
        assert!(machine.transition(TrialState::Initialized).is_err());
        machine.transition(TrialState::Converged).unwrap();
        assert!(machine.is_terminal());
        assert!(matches!(
            machine.transition(TrialState::MaxIterReached),
            Err(PermAlignError::InvalidState(_))
        ));
    }

    #[test]
    fn iterates_stay_on_the_polytope() {
        let mut rng = StdRng::seed_from_u64(11);
        let params_a = random_mlp(&[6, 5, 4, 3], &mut rng);
        let params_b = random_mlp(&[6, 5, 4, 3], &mut rng);
        let topology = PermutationTopology::mlp(3).unwrap();
        let problem = MatchingProblem::new(&params_a, &params_b, &topology).unwrap();

        for init in [InitializationMethod::Identity, InitializationMethod::Sinkhorn] {
            let outcome = run_trial(
                &problem,
                &HungarianSolver,
                &BoundedBrent::default(),
                &config(init),
                5,
            )
            .unwrap();
            let history = outcome.history.unwrap();
            assert_eq!(history.len(), outcome.iterations + 1);
            for snapshot in &history {
                for (name, m) in snapshot {
                    let err = doubly_stochastic_error(m);
                    assert!(err < 1e-5, "{} off the polytope by {}", name, err);
                    assert!(m.iter().all(|&x| x >= -1e-12 && x <= 1.0 + 1e-12));
                }
            }
        }
    }

    #[test]
    fn objective_never_decreases() {
        let mut rng = StdRng::seed_from_u64(21);
        let params_a = random_mlp(&[8, 6, 6, 2], &mut rng);
        let params_b = random_mlp(&[8, 6, 6, 2], &mut rng);
        let topology = PermutationTopology::mlp(3).unwrap();
        let problem = MatchingProblem::new(&params_a, &params_b, &topology).unwrap();

        for init in [
            InitializationMethod::Identity,
            InitializationMethod::Random,
            InitializationMethod::Sinkhorn,
        ] {
            let outcome = run_trial(
                &problem,
                &HungarianSolver,
                &BoundedBrent::default(),
                &config(init),
                9,
            )
            .unwrap();
            for pair in outcome.objective_trace.windows(2) {
                assert!(pair[1] >= pair[0] - 1e-12, "{} init: {} -> {}", init, pair[0], pair[1]);
            }
            assert_eq!(outcome.objective, *outcome.objective_trace.last().unwrap());
        }
    }

    #[test]
    fn fixed_variable_stays_identity() {
        let mut rng = StdRng::seed_from_u64(2);
        let params_a = random_mlp(&[5, 4, 3], &mut rng);
        let params_b = random_mlp(&[5, 4, 3], &mut rng);
        let topology = PermutationTopology::mlp(2).unwrap();
        let problem = MatchingProblem::new(&params_a, &params_b, &topology).unwrap();

        let outcome = run_trial(
            &problem,
            &HungarianSolver,
            &BoundedBrent::default(),
            &config(InitializationMethod::Random),
            4,
        )
        .unwrap();
        for snapshot in outcome.history.unwrap() {
            assert_eq!(snapshot["P_final"], Array2::<f64>::eye(3));
        }
    }

    #[test]
    fn identical_networks_converge_at_identity() {
        let mut rng = StdRng::seed_from_u64(8);
        let params = random_mlp(&[7, 5, 3], &mut rng);
        let topology = PermutationTopology::mlp(2).unwrap();
        let problem = MatchingProblem::new(&params, &params, &topology).unwrap();
        let self_similarity: f64 = params
            .iter()
            .map(|(_, t)| t.iter().map(|x| x * x).sum::<f64>())
            .sum();

        let cfg = MatchingConfig {
            max_iterations: 100,
            ..MatchingConfig::new(InitializationMethod::Identity)
        };
        let outcome = run_trial(&problem, &HungarianSolver, &BoundedBrent::default(), &cfg, 0).unwrap();

        assert_eq!(outcome.final_state, TrialState::Converged);
        assert_eq!(outcome.iterations, cfg.patience);
        let drift = (&outcome.perm_matrices["P_0"] - &Array2::<f64>::eye(5))
            .iter()
            .fold(0.0_f64, |acc, x| acc.max(x.abs()));
        assert!(drift < 1e-12, "P_0 drifted from identity by {}", drift);
        for obj in &outcome.objective_trace {
            assert!((obj - self_similarity).abs() < 1e-9, "objective {} vs {}", obj, self_similarity);
        }
    }

    #[test]
    fn zero_iteration_cap_returns_the_initial_state() {
        let mut rng = StdRng::seed_from_u64(3);
        let params_a = random_mlp(&[4, 3, 2], &mut rng);
        let params_b = random_mlp(&[4, 3, 2], &mut rng);
        let topology = PermutationTopology::mlp(2).unwrap();
        let problem = MatchingProblem::new(&params_a, &params_b, &topology).unwrap();

        let cfg = MatchingConfig {
            max_iterations: 0,
            ..MatchingConfig::new(InitializationMethod::Identity)
        };
        let outcome = run_trial(&problem, &HungarianSolver, &BoundedBrent::default(), &cfg, 1).unwrap();
        assert_eq!(outcome.final_state, TrialState::MaxIterReached);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.objective_trace.len(), 1);
        assert!(outcome.history.is_none());
        assert_eq!(outcome.perm_matrices, problem.identity_matrices());
    }

    #[test]
    fn linear_objective_takes_the_full_step() {
        // With a single hidden layer the objective is linear in P_0, so the
        // first step must land exactly on the vertex.
        let mut rng = StdRng::seed_from_u64(17);
        let params_a = random_mlp(&[10, 4, 2], &mut rng);
        let params_b = random_mlp(&[10, 4, 2], &mut rng);
        let topology = PermutationTopology::mlp(2).unwrap();
        let problem = MatchingProblem::new(&params_a, &params_b, &topology).unwrap();

        let current = problem.identity_matrices();
        let grads = problem.gradients(&current).unwrap();
        let targets = project_gradients(&topology, &grads, &HungarianSolver).unwrap();
        assert!(!targets.contains_key("P_final"));

        let objective = problem.objective(&current).unwrap();
        let step = choose_step(&problem, &current, &targets, objective, &BoundedBrent::default()).unwrap();
        let at_vertex = problem.objective(&interpolate(&current, &targets, 1.0)).unwrap();
        if at_vertex > objective {
            assert_eq!(step.t, 1.0);
            assert_eq!(step.objective, at_vertex);
        } else {
            assert_eq!(step.t, 0.0);
        }
    }
}
