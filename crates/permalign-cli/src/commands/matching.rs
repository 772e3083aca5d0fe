// crates/permalign-cli/src/commands/matching.rs
//
// `permalign match`: find the permutations aligning a permutee network to
// a fixed one.

use std::path::PathBuf;

use clap::Args;
use tabled::Tabled;

use permalign_core::{ParameterSet, PermutationTopology};
use permalign_matching::{apply_permutation, FrankWolfeMatcher, InitializationMethod, MatchResult};

use crate::commands::{read_json, write_json};
use crate::config::CliConfig;
use crate::output::{format_indices, format_json, format_table, OutputFormat};

/// Weight matching command.
#[derive(Debug, Args)]
pub struct MatchCmd {
    /// Parameters of the fixed network (JSON map of name -> tensor).
    #[arg(long)]
    pub fixed: PathBuf,

    /// Parameters of the network to permute.
    #[arg(long)]
    pub permutee: PathBuf,

    /// Permutation topology (JSON list of variables).
    #[arg(long)]
    pub topology: PathBuf,

    /// Initialization: identity, random, or sinkhorn. Required unless the
    /// config file sets `initialization`.
    #[arg(long)]
    pub init: Option<InitializationMethod>,

    /// Iteration cap per trial.
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Number of independent trials.
    #[arg(long)]
    pub trials: Option<usize>,

    /// Master seed for reproducible runs.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Keep the winning trial's matrix history in the saved result.
    #[arg(long)]
    pub history: bool,

    /// Write the full match result as JSON.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Write the permutee, aligned to the fixed network, as JSON.
    #[arg(long)]
    pub aligned_output: Option<PathBuf>,
}

#[derive(Tabled)]
struct PermutationRow {
    #[tabled(rename = "Variable")]
    name: String,
    #[tabled(rename = "Size")]
    size: usize,
    #[tabled(rename = "Moved")]
    moved: usize,
    #[tabled(rename = "Indices")]
    indices: String,
}

#[derive(Tabled)]
struct TrialRow {
    #[tabled(rename = "Trial")]
    index: String,
    #[tabled(rename = "Seed")]
    seed: u64,
    #[tabled(rename = "Objective")]
    objective: String,
    #[tabled(rename = "Iterations")]
    iterations: usize,
    #[tabled(rename = "State")]
    state: String,
}

/// Run the match command.
pub fn run(
    cmd: &MatchCmd,
    config: &CliConfig,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let params_a: ParameterSet = read_json(&cmd.fixed)?;
    let params_b: ParameterSet = read_json(&cmd.permutee)?;
    let topology: PermutationTopology = read_json(&cmd.topology)?;

    // Command-line flags override the config file.
    let mut matching = config.matching_config(cmd.init)?;
    if let Some(n) = cmd.max_iterations {
        matching.max_iterations = n;
    }
    if let Some(n) = cmd.trials {
        matching.num_trials = n;
    }
    if cmd.seed.is_some() {
        matching.seed = cmd.seed;
    }
    matching.return_history |= cmd.history;

    let result = FrankWolfeMatcher::new(matching)?.run(&params_a, &params_b, &topology)?;

    if let Some(path) = &cmd.output {
        write_json(path, &result)?;
        tracing::info!("Wrote match result to {}", path.display());
    }
    if let Some(path) = &cmd.aligned_output {
        let aligned = apply_permutation(&params_b, &topology, &result.permutations)?;
        write_json(path, &aligned)?;
        tracing::info!("Wrote aligned parameters to {}", path.display());
    }

    match format {
        OutputFormat::Json => println!("{}", format_json(&result)),
        OutputFormat::Table => print_tables(&result),
    }
    Ok(())
}

fn print_tables(result: &MatchResult) {
    let perms: Vec<PermutationRow> = result
        .permutations
        .iter()
        .map(|(name, perm)| PermutationRow {
            name: name.clone(),
            size: perm.len(),
            moved: perm.iter().enumerate().filter(|&(i, &p)| i != p).count(),
            indices: format_indices(perm),
        })
        .collect();

    let trials: Vec<TrialRow> = result
        .trials
        .iter()
        .map(|t| TrialRow {
            index: if t.index == result.best_trial {
                format!("{} *", t.index)
            } else {
                t.index.to_string()
            },
            seed: t.seed,
            objective: format!("{:.6}", t.objective),
            iterations: t.iterations,
            state: t.final_state.to_string(),
        })
        .collect();

    println!("{}", format_table(&perms));
    println!();
    println!("{}", format_table(&trials));
    println!();
    println!("Objective:          {:.6}", result.objective);
    println!("Hardened objective: {:.6}", result.hardened_objective);
}
