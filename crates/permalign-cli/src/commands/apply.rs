// crates/permalign-cli/src/commands/apply.rs
//
// `permalign apply`: permute a parameter set with saved permutations.

use std::path::PathBuf;

use clap::Args;

use permalign_core::{ParameterSet, PermutationTopology};
use permalign_matching::apply_permutation;

use crate::commands::{read_json, read_permutations, write_json};

/// Apply permutations command.
#[derive(Debug, Args)]
pub struct ApplyCmd {
    /// Parameters to permute.
    #[arg(long)]
    pub params: PathBuf,

    /// Permutation topology (JSON list of variables).
    #[arg(long)]
    pub topology: PathBuf,

    /// Permutations: a name -> indices map or a saved match result.
    #[arg(long)]
    pub permutations: PathBuf,

    /// Where to write the permuted parameters.
    #[arg(long)]
    pub output: PathBuf,
}

/// Run the apply command.
pub fn run(cmd: &ApplyCmd) -> Result<(), Box<dyn std::error::Error>> {
    let params: ParameterSet = read_json(&cmd.params)?;
    let topology: PermutationTopology = read_json(&cmd.topology)?;
    let permutations = read_permutations(&cmd.permutations)?;

    let aligned = apply_permutation(&params, &topology, &permutations)?;
    write_json(&cmd.output, &aligned)?;

    println!(
        "Permuted {} parameters with {} permutations -> {}",
        aligned.len(),
        permutations.len(),
        cmd.output.display()
    );
    Ok(())
}
