//! Resolved generation inputs.

use crate::backend::Backend;
use crate::columns::ColumnDefinition;
use crate::error::{ScdError, ScdResult};

/// The `(not set, set)` literal pair used for flag columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagValues {
    pub unset: String,
    pub set: String,
}

impl FlagValues {
    pub fn new(unset: impl Into<String>, set: impl Into<String>) -> Self {
        Self {
            unset: unset.into(),
            set: set.into(),
        }
    }

    /// Parse `"<unset>/<set>"`, e.g. `"0/1"` or `"'N'/'Y'"`.
    pub fn parse(s: &str) -> ScdResult<Self> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            [unset, set] if !unset.trim().is_empty() && !set.trim().is_empty() => {
                Ok(Self::new(unset.trim(), set.trim()))
            }
            _ => Err(ScdError::config(format!(
                "Deleted flag value must have the form \"<not deleted>/<deleted>\", given \"{}\".",
                s
            ))),
        }
    }

    pub fn as_array(&self) -> [&str; 2] {
        [&self.unset, &self.set]
    }
}

impl Default for FlagValues {
    fn default() -> Self {
        Self::new("0", "1")
    }
}

/// Strip SQL quote characters from a literal.
pub fn strip_quotes(literal: &str) -> String {
    literal.chars().filter(|c| *c != '\'' && *c != '"').collect()
}

/// Immutable parameters of one generation run.
///
/// Built once by the resolver (or [`ParametersBuilder`] in tests) and
/// passed by reference to everything downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    backend: Backend,
    primary_key: Vec<String>,
    monitored_parameters: Vec<String>,
    timezone: String,
    deleted_flag: bool,
    use_datetime: bool,
    keep_delete_active: bool,
    current_timestamp_minus_one: bool,
    uppercase_columns: bool,
    start_date_name: String,
    end_date_name: String,
    actual_name: String,
    is_deleted_name: String,
    deleted_flag_value: FlagValues,
    end_date_value: String,
    effective_date_adjustment: i64,
    snapshot_table_name: String,
    input_table_definition: Vec<ColumnDefinition>,
}

impl Parameters {
    pub fn builder(backend: Backend, primary_key: Vec<String>) -> ParametersBuilder {
        ParametersBuilder::new(backend, primary_key)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn monitored_parameters(&self) -> &[String] {
        &self.monitored_parameters
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn has_deleted_flag(&self) -> bool {
        self.deleted_flag
    }

    pub fn use_datetime(&self) -> bool {
        self.use_datetime
    }

    pub fn keep_delete_active(&self) -> bool {
        self.keep_delete_active
    }

    pub fn current_timestamp_minus_one(&self) -> bool {
        self.current_timestamp_minus_one
    }

    pub fn uppercase_columns(&self) -> bool {
        self.uppercase_columns
    }

    pub fn start_date_name(&self) -> &str {
        &self.start_date_name
    }

    pub fn end_date_name(&self) -> &str {
        &self.end_date_name
    }

    pub fn actual_name(&self) -> &str {
        &self.actual_name
    }

    pub fn is_deleted_name(&self) -> &str {
        &self.is_deleted_name
    }

    pub fn deleted_flag_value(&self) -> &FlagValues {
        &self.deleted_flag_value
    }

    pub fn end_date_value(&self) -> &str {
        &self.end_date_value
    }

    pub fn effective_date_adjustment(&self) -> i64 {
        self.effective_date_adjustment
    }

    /// Custom snapshot table suffix, empty when default naming applies.
    pub fn snapshot_table_name(&self) -> &str {
        &self.snapshot_table_name
    }

    /// Typed columns of the input table, empty when the table is untyped.
    pub fn input_table_definition(&self) -> &[ColumnDefinition] {
        &self.input_table_definition
    }
}

/// Builder for [`Parameters`].
#[derive(Debug, Clone)]
pub struct ParametersBuilder {
    params: Parameters,
}

impl ParametersBuilder {
    pub fn new(backend: Backend, primary_key: Vec<String>) -> Self {
        Self {
            params: Parameters {
                backend,
                primary_key,
                monitored_parameters: Vec::new(),
                timezone: "UTC".to_string(),
                deleted_flag: false,
                use_datetime: false,
                keep_delete_active: false,
                current_timestamp_minus_one: false,
                uppercase_columns: false,
                start_date_name: "start_date".to_string(),
                end_date_name: "end_date".to_string(),
                actual_name: "actual".to_string(),
                is_deleted_name: "is_deleted".to_string(),
                deleted_flag_value: FlagValues::default(),
                end_date_value: "9999-12-31".to_string(),
                effective_date_adjustment: 0,
                snapshot_table_name: String::new(),
                input_table_definition: Vec::new(),
            },
        }
    }

    pub fn monitored_parameters(mut self, columns: Vec<String>) -> Self {
        self.params.monitored_parameters = columns;
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.params.timezone = timezone.into();
        self
    }

    pub fn deleted_flag(mut self, value: bool) -> Self {
        self.params.deleted_flag = value;
        self
    }

    pub fn use_datetime(mut self, value: bool) -> Self {
        self.params.use_datetime = value;
        self
    }

    pub fn keep_delete_active(mut self, value: bool) -> Self {
        self.params.keep_delete_active = value;
        self
    }

    pub fn current_timestamp_minus_one(mut self, value: bool) -> Self {
        self.params.current_timestamp_minus_one = value;
        self
    }

    pub fn uppercase_columns(mut self, value: bool) -> Self {
        self.params.uppercase_columns = value;
        self
    }

    pub fn start_date_name(mut self, name: impl Into<String>) -> Self {
        self.params.start_date_name = name.into();
        self
    }

    pub fn end_date_name(mut self, name: impl Into<String>) -> Self {
        self.params.end_date_name = name.into();
        self
    }

    pub fn actual_name(mut self, name: impl Into<String>) -> Self {
        self.params.actual_name = name.into();
        self
    }

    pub fn is_deleted_name(mut self, name: impl Into<String>) -> Self {
        self.params.is_deleted_name = name.into();
        self
    }

    pub fn deleted_flag_value(mut self, value: FlagValues) -> Self {
        self.params.deleted_flag_value = value;
        self
    }

    pub fn end_date_value(mut self, value: impl Into<String>) -> Self {
        self.params.end_date_value = value.into();
        self
    }

    pub fn effective_date_adjustment(mut self, days: i64) -> Self {
        self.params.effective_date_adjustment = days;
        self
    }

    pub fn snapshot_table_name(mut self, name: impl Into<String>) -> Self {
        self.params.snapshot_table_name = name.into();
        self
    }

    pub fn input_table_definition(mut self, columns: Vec<ColumnDefinition>) -> Self {
        self.params.input_table_definition = columns;
        self
    }

    pub fn build(self) -> Parameters {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_values_parse() {
        assert_eq!(FlagValues::parse("0/1").unwrap(), FlagValues::new("0", "1"));
        assert_eq!(
            FlagValues::parse("'no'/'yes'").unwrap(),
            FlagValues::new("'no'", "'yes'")
        );
        assert!(FlagValues::parse("01").is_err());
        assert!(FlagValues::parse("a/b/c").is_err());
        assert!(FlagValues::parse("/1").is_err());
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("'yes'"), "yes");
        assert_eq!(strip_quotes("\"N\""), "N");
        assert_eq!(strip_quotes("1"), "1");
    }

    #[test]
    fn test_builder_defaults() {
        let params = Parameters::builder(Backend::Snowflake, vec!["id".into()]).build();
        assert_eq!(params.primary_key(), ["id".to_string()]);
        assert!(params.monitored_parameters().is_empty());
        assert_eq!(params.actual_name(), "actual");
        assert_eq!(params.deleted_flag_value().as_array(), ["0", "1"]);
        assert_eq!(params.snapshot_table_name(), "");
    }
}
