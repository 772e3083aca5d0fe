// crates/permalign-matching/src/config.rs
//
// Configuration for a Frank-Wolfe weight matching run.

use serde::{Deserialize, Serialize};

use permalign_core::PermAlignError;

use crate::init::{InitializationMethod, SinkhornConfig};

/// Configuration for the multi-trial Frank-Wolfe matcher.
///
/// `initialization` has no default; every other field does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Starting point of each trial.
    pub initialization: InitializationMethod,
    /// Iteration cap per trial. Default: 100.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Number of independent trials. Default: 3.
    #[serde(default = "default_num_trials")]
    pub num_trials: usize,
    /// Keep the per-iteration matrices of the winning trial. Default: false.
    #[serde(default)]
    pub return_history: bool,
    /// Master seed from which the per-trial seeds are drawn.
    /// When absent, the seeds come from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Consecutive non-improving iterations before a trial stops. Default: 15.
    #[serde(default = "default_patience")]
    pub patience: usize,
    /// Smallest objective gain that counts as an improvement. Default: 1e-6.
    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,
    /// Sinkhorn-Knopp settings for the `sinkhorn` initialization.
    #[serde(default)]
    pub sinkhorn: SinkhornConfig,
}

fn default_max_iterations() -> usize {
    100
}

fn default_num_trials() -> usize {
    3
}

fn default_patience() -> usize {
    15
}

fn default_min_improvement() -> f64 {
    1e-6
}

impl MatchingConfig {
    /// Configuration with the given initialization and defaults elsewhere.
    pub fn new(initialization: InitializationMethod) -> Self {
        Self {
            initialization,
            max_iterations: default_max_iterations(),
            num_trials: default_num_trials(),
            return_history: false,
            seed: None,
            patience: default_patience(),
            min_improvement: default_min_improvement(),
            sinkhorn: SinkhornConfig::default(),
        }
    }

    /// Reject settings the matcher cannot run with.
    pub fn validate(&self) -> Result<(), PermAlignError> {
        if self.num_trials == 0 {
            return Err(PermAlignError::InvalidConfig(
                "num_trials must be at least 1".to_string(),
            ));
        }
        if self.patience == 0 {
            return Err(PermAlignError::InvalidConfig(
                "patience must be at least 1".to_string(),
            ));
        }
        if !self.min_improvement.is_finite() || self.min_improvement < 0.0 {
            return Err(PermAlignError::InvalidConfig(format!(
                "min_improvement must be a non-negative number, got {}",
                self.min_improvement
            )));
        }
        if !(self.sinkhorn.tolerance > 0.0) {
            return Err(PermAlignError::InvalidConfig(format!(
                "sinkhorn tolerance must be positive, got {}",
                self.sinkhorn.tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_everything_but_initialization() {
        let config: MatchingConfig = serde_json::from_str(r#"{"initialization": "sinkhorn"}"#).unwrap();
        assert_eq!(config.initialization, InitializationMethod::Sinkhorn);
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.num_trials, 3);
        assert!(!config.return_history);
        assert_eq!(config.patience, 15);
        assert!((config.min_improvement - 1e-6).abs() < 1e-18);
        assert_eq!(config.sinkhorn.max_iterations, 1000);
    }

    #[test]
    fn initialization_is_required() {
        let parsed: Result<MatchingConfig, _> = serde_json::from_str(r#"{"num_trials": 2}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_initialization_is_rejected_on_parse() {
        let parsed: Result<MatchingConfig, _> = serde_json::from_str(r#"{"initialization": "orthogonal"}"#);
        let message = parsed.unwrap_err().to_string();
        assert!(message.contains("unknown initialization method"), "{}", message);
    }

    #[test]
    fn zero_trials_is_invalid() {
        let config = MatchingConfig {
            num_trials: 0,
            ..MatchingConfig::new(InitializationMethod::Identity)
        };
        assert!(matches!(config.validate(), Err(PermAlignError::InvalidConfig(_))));
    }
}
