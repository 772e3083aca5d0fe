// crates/permalign-matching/src/driver.rs
//
// Multi-trial driver: runs independent Frank-Wolfe trials, keeps the best,
// and hardens its matrices into permutation indices.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use permalign_core::permutation::identity_indices;
use permalign_core::{
    AssignmentSolver, LineSearch, ParameterSet, PermAlignError, PermutationIndices,
    PermutationTopology,
};
use permalign_solvers::{BoundedBrent, HungarianSolver};

use crate::config::MatchingConfig;
use crate::objective::PermMatrices;
use crate::problem::MatchingProblem;
use crate::trial::{run_trial, TrialOutcome, TrialState};

/// Per-trial bookkeeping reported alongside the winning result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub index: usize,
    pub seed: u64,
    pub objective: f64,
    pub iterations: usize,
    pub final_state: TrialState,
}

impl From<(usize, &TrialOutcome)> for TrialSummary {
    fn from((index, outcome): (usize, &TrialOutcome)) -> Self {
        Self {
            index,
            seed: outcome.seed,
            objective: outcome.objective,
            iterations: outcome.iterations,
            final_state: outcome.final_state,
        }
    }
}

/// Result of a matching run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Hardened permutation per variable: `(P W)[i] = W[perm[i]]`.
    pub permutations: BTreeMap<String, PermutationIndices>,
    /// Relaxed objective of the winning trial.
    pub objective: f64,
    /// Objective after hardening.
    pub hardened_objective: f64,
    /// Seed of the winning trial.
    pub seed: u64,
    /// Index of the winning trial.
    pub best_trial: usize,
    /// How the winning trial stopped.
    pub final_state: TrialState,
    /// Iterations taken by the winning trial.
    pub iterations: usize,
    /// Objective of the winning trial after each iteration.
    pub objective_trace: Vec<f64>,
    /// Every trial, in the order run.
    pub trials: Vec<TrialSummary>,
    /// Matrices of the winning trial, initial state first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<PermMatrices>>,
}

/// Frank-Wolfe weight matcher with pluggable assignment and line-search
/// collaborators.
#[derive(Debug, Clone)]
pub struct FrankWolfeMatcher<A = HungarianSolver, L = BoundedBrent> {
    config: MatchingConfig,
    solver: A,
    line_search: L,
}

impl FrankWolfeMatcher {
    /// Matcher with the default Hungarian solver and bounded Brent search.
    pub fn new(config: MatchingConfig) -> Result<Self, PermAlignError> {
        Self::with_collaborators(config, HungarianSolver::new(), BoundedBrent::default())
    }
}

impl<A: AssignmentSolver, L: LineSearch> FrankWolfeMatcher<A, L> {
    pub fn with_collaborators(
        config: MatchingConfig,
        solver: A,
        line_search: L,
    ) -> Result<Self, PermAlignError> {
        config.validate()?;
        Ok(Self {
            config,
            solver,
            line_search,
        })
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Draw one seed per trial from the master seed (or OS entropy).
    fn trial_seeds(&self) -> Vec<u64> {
        let mut master = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        (0..self.config.num_trials).map(|_| master.gen()).collect()
    }

    /// Find the permutations of `params_b` that best align it to `params_a`.
    pub fn run(
        &self,
        params_a: &ParameterSet,
        params_b: &ParameterSet,
        topology: &PermutationTopology,
    ) -> Result<MatchResult, PermAlignError> {
        let problem = MatchingProblem::new(params_a, params_b, topology)?;
        tracing::info!(
            "Matching {} permutation variables over {} trials ({} initialization)",
            problem.perm_sizes().len(),
            self.config.num_trials,
            self.config.initialization
        );

        let (best, trials) = self.trial_seeds().into_iter().enumerate().try_fold(
            (None::<(usize, TrialOutcome)>, Vec::new()),
            |(best, mut trials), (index, seed)| {
                let outcome = run_trial(
                    &problem,
                    &self.solver,
                    &self.line_search,
                    &self.config,
                    seed,
                )?;
                tracing::info!(
                    "Trial {} (seed {}): objective {:.6} after {} iterations ({})",
                    index,
                    seed,
                    outcome.objective,
                    outcome.iterations,
                    outcome.final_state
                );
                trials.push(TrialSummary::from((index, &outcome)));

                let best = match best {
                    Some((i, b)) if !(outcome.objective > b.objective) => Some((i, b)),
                    _ => {
                        tracing::info!("Trial {} is the new best", index);
                        Some((index, outcome))
                    }
                };
                Ok::<_, PermAlignError>((best, trials))
            },
        )?;

        let (best_trial, outcome) = best.ok_or_else(|| {
            PermAlignError::InvalidConfig("num_trials must be at least 1".to_string())
        })?;

        let permutations = self.harden(&problem, &outcome.perm_matrices)?;
        let hardened_objective = problem.objective(&problem.matrices_from_indices(&permutations)?)?;
        tracing::info!(
            "Best trial {}: objective {:.6}, hardened {:.6}",
            best_trial,
            outcome.objective,
            hardened_objective
        );

        Ok(MatchResult {
            permutations,
            objective: outcome.objective,
            hardened_objective,
            seed: outcome.seed,
            best_trial,
            final_state: outcome.final_state,
            iterations: outcome.iterations,
            objective_trace: outcome.objective_trace,
            trials,
            history: outcome.history,
        })
    }

    /// Round relaxed matrices to the nearest permutation vertex. Fixed
    /// variables harden to identity.
    fn harden(
        &self,
        problem: &MatchingProblem<'_>,
        perm_matrices: &PermMatrices,
    ) -> Result<BTreeMap<String, PermutationIndices>, PermAlignError> {
        perm_matrices
            .iter()
            .map(|(name, m)| -> Result<(String, PermutationIndices), PermAlignError> {
                let perm = if problem.topology().is_optimizable(name) {
                    self.solver.solve(m)?
                } else {
                    identity_indices(m.nrows())
                };
                Ok((name.clone(), perm))
            })
            .collect()
    }
}

/// One-shot matching with the default collaborators.
pub fn weight_matching(
    params_a: &ParameterSet,
    params_b: &ParameterSet,
    topology: &PermutationTopology,
    config: MatchingConfig,
) -> Result<MatchResult, PermAlignError> {
    FrankWolfeMatcher::new(config)?.run(params_a, params_b, topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::InitializationMethod;
    use ndarray::{arr1, arr2};
    use permalign_core::ScalarMinimum;

    fn tiny_mlp() -> ParameterSet {
        let mut params = ParameterSet::new();
        params.insert("layer_0.weight", arr2(&[[1.0, -2.0], [0.5, 0.5], [3.0, 1.0]]).into_dyn());
        params.insert("layer_0.bias", arr1(&[0.1, 0.2, 0.3]).into_dyn());
        params.insert("layer_1.weight", arr2(&[[1.0, 0.0, -1.0], [2.0, 1.0, 0.0]]).into_dyn());
        params.insert("layer_1.bias", arr1(&[0.0, 1.0]).into_dyn());
        params
    }

    #[test]
    fn zero_trials_is_rejected_up_front() {
        let config = MatchingConfig {
            num_trials: 0,
            ..MatchingConfig::new(InitializationMethod::Identity)
        };
        assert!(matches!(
            FrankWolfeMatcher::new(config),
            Err(PermAlignError::InvalidConfig(_))
        ));
    }

    #[test]
    fn master_seed_makes_runs_reproducible() {
        let params_a = tiny_mlp();
        let mut params_b = tiny_mlp();
        params_b.insert("layer_0.bias", arr1(&[0.3, -0.2, 0.9]).into_dyn());
        let topology = PermutationTopology::mlp(2).unwrap();
        let config = MatchingConfig {
            seed: Some(1234),
            ..MatchingConfig::new(InitializationMethod::Sinkhorn)
        };

        let first = weight_matching(&params_a, &params_b, &topology, config.clone()).unwrap();
        let second = weight_matching(&params_a, &params_b, &topology, config).unwrap();
        assert_eq!(first.trials, second.trials);
        assert_eq!(first.permutations, second.permutations);
        assert_eq!(first.trials.len(), 3);
    }

    #[test]
    fn best_trial_has_the_highest_objective() {
        let params_a = tiny_mlp();
        let mut params_b = tiny_mlp();
        params_b.insert("layer_1.weight", arr2(&[[0.0, 1.0, 2.0], [1.0, -1.0, 0.5]]).into_dyn());
        let topology = PermutationTopology::mlp(2).unwrap();
        let config = MatchingConfig {
            seed: Some(7),
            num_trials: 4,
            ..MatchingConfig::new(InitializationMethod::Random)
        };

        let result = weight_matching(&params_a, &params_b, &topology, config).unwrap();
        let best = &result.trials[result.best_trial];
        assert_eq!(best.seed, result.seed);
        for (i, trial) in result.trials.iter().enumerate() {
            if i < result.best_trial {
                assert!(trial.objective < best.objective);
            } else {
                assert!(trial.objective <= best.objective);
            }
        }
        assert_eq!(result.permutations["P_final"], vec![0, 1]);
    }

    #[test]
    fn tied_trials_keep_the_first() {
        // Identity starts ignore the trial seed, so every trial ties.
        let params_a = tiny_mlp();
        let mut params_b = tiny_mlp();
        params_b.insert("layer_0.bias", arr1(&[0.3, -0.2, 0.9]).into_dyn());
        let topology = PermutationTopology::mlp(2).unwrap();
        let config = MatchingConfig {
            seed: Some(5),
            num_trials: 3,
            ..MatchingConfig::new(InitializationMethod::Identity)
        };

        let result = weight_matching(&params_a, &params_b, &topology, config).unwrap();
        assert_eq!(result.trials.len(), 3);
        for trial in &result.trials[1..] {
            assert_eq!(trial.objective, result.trials[0].objective);
        }
        assert_eq!(result.best_trial, 0);
        assert_eq!(result.seed, result.trials[0].seed);
    }

    /// Line search that never moves, to check the collaborator seam.
    struct Stay;

    impl LineSearch for Stay {
        fn minimize(
            &self,
            f: &mut dyn FnMut(f64) -> f64,
            _lower: f64,
            _upper: f64,
        ) -> Result<ScalarMinimum, PermAlignError> {
            Ok(ScalarMinimum {
                x: 0.0,
                fx: f(0.0),
                evaluations: 1,
            })
        }
    }

    #[test]
    fn custom_collaborators_are_used() {
        let params = tiny_mlp();
        let topology = PermutationTopology::mlp(2).unwrap();
        let config = MatchingConfig {
            seed: Some(0),
            num_trials: 1,
            max_iterations: 5,
            ..MatchingConfig::new(InitializationMethod::Identity)
        };
        let matcher = FrankWolfeMatcher::with_collaborators(config, HungarianSolver, Stay).unwrap();
        let result = matcher.run(&params, &params, &topology).unwrap();
        assert_eq!(result.permutations["P_0"], vec![0, 1, 2]);
        assert!((result.objective - result.hardened_objective).abs() < 1e-12);
        assert_eq!(result.iterations, 5);
    }
}
