//! Column definitions and the pure helpers that reshape them.
//!
//! Column lists flow through the generator in two shapes: plain names (for
//! CSV headers and template variables) and [`ColumnDefinition`]s carrying
//! type metadata (for typed table creation).

use serde::{Deserialize, Serialize};

/// Storage type metadata of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnType {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
}

impl ColumnType {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            length: None,
        }
    }

    pub fn with_length(type_name: impl Into<String>, length: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            length: Some(length.into()),
        }
    }

    pub fn varchar() -> Self {
        Self::new("VARCHAR")
    }
}

/// A named column with its type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub definition: ColumnType,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, definition: ColumnType) -> Self {
        Self {
            name: name.into(),
            definition,
        }
    }
}

/// Lower-case every column name, keeping definitions.
pub fn columns_to_lower(columns: &[ColumnDefinition]) -> Vec<ColumnDefinition> {
    columns
        .iter()
        .map(|c| ColumnDefinition::new(c.name.to_lowercase(), c.definition.clone()))
        .collect()
}

/// Upper-case every column name, keeping definitions.
pub fn columns_to_upper(columns: &[ColumnDefinition]) -> Vec<ColumnDefinition> {
    columns
        .iter()
        .map(|c| ColumnDefinition::new(c.name.to_uppercase(), c.definition.clone()))
        .collect()
}

pub fn transform_columns_case(
    columns: &[ColumnDefinition],
    uppercase: bool,
) -> Vec<ColumnDefinition> {
    if uppercase {
        columns_to_upper(columns)
    } else {
        columns_to_lower(columns)
    }
}

/// Apply the configured case to a single name.
pub fn transform_case(name: &str, uppercase: bool) -> String {
    if uppercase {
        name.to_uppercase()
    } else {
        name.to_lowercase()
    }
}

/// Merge column lists by name.
///
/// The first occurrence of a name fixes its position, the last occurrence
/// supplies its definition.
pub fn merge_columns(lists: &[&[ColumnDefinition]]) -> Vec<ColumnDefinition> {
    let mut merged: Vec<ColumnDefinition> = Vec::new();
    for list in lists {
        for column in list.iter() {
            match merged.iter_mut().find(|c| c.name == column.name) {
                Some(existing) => existing.definition = column.definition.clone(),
                None => merged.push(column.clone()),
            }
        }
    }
    merged
}

pub fn column_names(columns: &[ColumnDefinition]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

/// Trim every line of a multi-line fragment, keeping blank lines.
pub fn strip_indentation(s: &str) -> String {
    s.split('\n').map(str::trim).collect::<Vec<_>>().join("\n")
}
