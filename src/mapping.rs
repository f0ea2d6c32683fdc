//! Input and output table mapping assembly.

use crate::parameters::strip_quotes;
use serde::{Deserialize, Serialize};

/// Logical name the source table is mapped to.
pub const INPUT_TABLE: &str = "input_table";

/// Logical name of the current snapshot inside the transformation.
pub const CURRENT_SNAPSHOT: &str = "current_snapshot";

/// Logical name of the snapshot produced by the transformation.
pub const NEW_SNAPSHOT: &str = "new_snapshot";

/// One entry of an input or output table mapping.
///
/// Unknown keys (column filters, load options, ...) are carried through
/// untouched so the user's mapping survives regeneration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_operator: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TableDescriptor {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }
}

/// Both mapping directions of a generated transformation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub input: Vec<TableDescriptor>,
    pub output: Vec<TableDescriptor>,
}

/// Values the mapping depends on, taken from the resolved pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotTarget<'a> {
    pub snapshot_table_id: &'a str,
    /// Case-normalized name of the actual column.
    pub actual_column: &'a str,
    /// Literal marking a row as actual, possibly quoted.
    pub actual_value: &'a str,
    pub snapshot_primary_key: &'a str,
}

/// Build the input mapping: the source table renamed to [`INPUT_TABLE`]
/// followed by the actual rows of the current snapshot.
pub fn input_mapping(source: &TableDescriptor, target: &SnapshotTarget<'_>) -> Vec<TableDescriptor> {
    let mut input = source.clone();
    input.destination = INPUT_TABLE.to_string();

    let snapshot = TableDescriptor {
        where_column: Some(target.actual_column.to_string()),
        where_values: Some(vec![strip_quotes(target.actual_value)]),
        where_operator: Some("eq".to_string()),
        ..TableDescriptor::new(target.snapshot_table_id, CURRENT_SNAPSHOT)
    };

    vec![input, snapshot]
}

/// Build the output mapping: [`NEW_SNAPSHOT`] loaded incrementally into
/// the snapshot table.
pub fn output_mapping(target: &SnapshotTarget<'_>) -> Vec<TableDescriptor> {
    vec![TableDescriptor {
        primary_key: Some(vec![target.snapshot_primary_key.to_string()]),
        incremental: Some(true),
        ..TableDescriptor::new(NEW_SNAPSHOT, target.snapshot_table_id)
    }]
}

pub fn build_mapping(source: &TableDescriptor, target: &SnapshotTarget<'_>) -> Mapping {
    Mapping {
        input: input_mapping(source, target),
        output: output_mapping(target),
    }
}
