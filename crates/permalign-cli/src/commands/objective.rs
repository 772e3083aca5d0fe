// crates/permalign-cli/src/commands/objective.rs
//
// `permalign objective`: similarity of two networks, at identity or under
// given permutations.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use permalign_core::{ParameterSet, PermutationTopology};
use permalign_matching::{layer_similarity, MatchingProblem};

use crate::commands::{read_json, read_permutations};
use crate::output::{format_json, format_table, OutputFormat};

/// Similarity objective command.
#[derive(Debug, Args)]
pub struct ObjectiveCmd {
    /// Parameters of the fixed network.
    #[arg(long)]
    pub fixed: PathBuf,

    /// Parameters of the permutee network.
    #[arg(long)]
    pub permutee: PathBuf,

    /// Permutation topology (JSON list of variables).
    #[arg(long)]
    pub topology: PathBuf,

    /// Evaluate under these permutations instead of identity.
    #[arg(long)]
    pub permutations: Option<PathBuf>,
}

#[derive(Debug, Serialize, Tabled)]
struct ParamRow {
    #[tabled(rename = "Parameter")]
    parameter: String,
    #[tabled(rename = "Similarity")]
    similarity: f64,
}

#[derive(Debug, Serialize)]
struct ObjectiveReport {
    objective: f64,
    parameters: Vec<ParamRow>,
}

/// Run the objective command.
pub fn run(cmd: &ObjectiveCmd, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let params_a: ParameterSet = read_json(&cmd.fixed)?;
    let params_b: ParameterSet = read_json(&cmd.permutee)?;
    let topology: PermutationTopology = read_json(&cmd.topology)?;
    let problem = MatchingProblem::new(&params_a, &params_b, &topology)?;

    let perms = match &cmd.permutations {
        Some(path) => problem.matrices_from_indices(&read_permutations(path)?)?,
        None => problem.identity_matrices(),
    };

    let mut parameters = Vec::new();
    for (name, pp) in topology.params() {
        let row = pp.row.as_ref().and_then(|n| perms.get(n));
        let col = pp.col.as_ref().and_then(|n| perms.get(n));
        let similarity = layer_similarity(params_a.require(name)?, params_b.require(name)?, row, col)?;
        parameters.push(ParamRow {
            parameter: name.clone(),
            similarity,
        });
    }
    let report = ObjectiveReport {
        objective: problem.objective(&perms)?,
        parameters,
    };

    match format {
        OutputFormat::Json => println!("{}", format_json(&report)),
        OutputFormat::Table => {
            println!("{}", format_table(&report.parameters));
            println!();
            println!("Objective: {:.6}", report.objective);
        }
    }
    Ok(())
}
