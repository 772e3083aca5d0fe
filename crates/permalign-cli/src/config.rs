// crates/permalign-cli/src/config.rs
//
// TOML configuration for the permalign CLI.
// Command-line flags override the values loaded here.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use permalign_core::PermAlignError;
use permalign_matching::{InitializationMethod, MatchingConfig, SinkhornConfig};

use crate::output::OutputFormat;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "~/.permalign/config.toml";

/// Configuration loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Initialization of each trial: identity, random, or sinkhorn.
    /// Unset means `--init` must be passed.
    #[serde(default)]
    pub initialization: Option<InitializationMethod>,

    /// Iteration cap per trial.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Number of independent trials.
    #[serde(default = "default_num_trials")]
    pub num_trials: usize,

    /// Include the winning trial's matrix history in JSON output.
    #[serde(default)]
    pub return_history: bool,

    /// Master seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Non-improving iterations before a trial stops.
    #[serde(default = "default_patience")]
    pub patience: usize,

    /// Smallest objective gain that counts as an improvement.
    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,

    #[serde(default)]
    pub sinkhorn: SinkhornConfig,

    /// Log level when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: table or json.
    #[serde(default = "default_output_format")]
    pub output_format: OutputFormat,
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

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_format() -> OutputFormat {
    OutputFormat::Table
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            initialization: None,
            max_iterations: default_max_iterations(),
            num_trials: default_num_trials(),
            return_history: false,
            seed: None,
            patience: default_patience(),
            min_improvement: default_min_improvement(),
            sinkhorn: SinkhornConfig::default(),
            log_level: default_log_level(),
            output_format: default_output_format(),
        }
    }
}

impl CliConfig {
    /// Load configuration from a TOML file. A leading `~` expands to the
    /// home directory.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(expand_home(path)?)?;
        let config: CliConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Library configuration for a matching run. `init` overrides the
    /// file; one of the two must name an initialization method.
    pub fn matching_config(
        &self,
        init: Option<InitializationMethod>,
    ) -> Result<MatchingConfig, PermAlignError> {
        let initialization = init.or(self.initialization).ok_or_else(|| {
            PermAlignError::InvalidConfig(
                "no initialization method set; pass --init or set `initialization` in the config file"
                    .to_string(),
            )
        })?;
        Ok(MatchingConfig {
            max_iterations: self.max_iterations,
            num_trials: self.num_trials,
            return_history: self.return_history,
            seed: self.seed,
            patience: self.patience,
            min_improvement: self.min_improvement,
            sinkhorn: self.sinkhorn,
            ..MatchingConfig::new(initialization)
        })
    }
}

fn expand_home(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir().ok_or("Could not determine home directory")?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
