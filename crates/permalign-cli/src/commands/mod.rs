// crates/permalign-cli/src/commands/mod.rs
//
// Command module declarations for the permalign CLI, plus the JSON file
// helpers they share.

pub mod apply;
pub mod matching;
pub mod objective;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use permalign_core::PermutationIndices;

/// File errors with the offending path attached.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("could not open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not valid JSON for this input: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let file = File::open(path).map_err(|source| CliError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize a value as pretty JSON into a file.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    let write_err = |source| CliError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| CliError::Write {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    writer.flush().map_err(write_err)
}

/// Read permutations either as a bare `name -> indices` map or from the
/// `permutations` field of a saved match result.
pub fn read_permutations(path: &Path) -> Result<BTreeMap<String, PermutationIndices>, CliError> {
    let value: serde_json::Value = read_json(path)?;
    let inner = match value.get("permutations") {
        Some(p) => p.clone(),
        None => value,
    };
    serde_json::from_value(inner).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
