// crates/permalign-cli/src/output.rs
//
// Output formatting utilities for the permalign CLI.
// Supports table and JSON output modes.

use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled};

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed table output (default).
    Table,
    /// JSON output for machine consumption.
    Json,
}

/// Format a slice of Tabled items as a table string.
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    Table::new(data).to_string()
}

/// Format a serializable value as a pretty-printed JSON string.
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("JSON serialization error: {}", e))
}

/// Render indices compactly, eliding the middle of long permutations.
pub fn format_indices(perm: &[usize]) -> String {
    const SHOWN: usize = 12;
    if perm.len() <= SHOWN {
        return format!("{:?}", perm);
    }
    let head: Vec<String> = perm[..SHOWN / 2].iter().map(|i| i.to_string()).collect();
    let tail: Vec<String> = perm[perm.len() - SHOWN / 2..].iter().map(|i| i.to_string()).collect();
    format!("[{}, ..., {}]", head.join(", "), tail.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Name")]
        name: &'static str,
        #[tabled(rename = "Value")]
        value: f64,
    }

    #[test]
    fn table_has_headers_and_rows() {
        let rendered = format_table(&[Row { name: "P_0", value: 1.5 }]);
        assert!(rendered.contains("Name"));
        assert!(rendered.contains("P_0"));
        assert!(rendered.contains("1.5"));
    }

    #[test]
    fn long_permutations_are_elided() {
        assert_eq!(format_indices(&[2, 0, 1]), "[2, 0, 1]");
        let long: Vec<usize> = (0..20).collect();
        assert_eq!(format_indices(&long), "[0, 1, 2, 3, 4, 5, ..., 14, 15, 16, 17, 18, 19]");
    }
}
