//! Input table resolution and parameter validation.

use crate::backend::Backend;
use crate::config::ScdConfig;
use crate::error::{ColumnRole, ScdError, ScdResult};
use crate::mapping::{TableDescriptor, INPUT_TABLE};
use crate::parameters::{FlagValues, Parameters};
use crate::storage::{SchemaLookup, TableDetail};
use std::cell::OnceCell;

/// Finds the source table in the user's input mapping and reads its schema.
///
/// The schema lookup runs at most once per resolver, however many
/// consumers ask for the columns.
pub struct InputTableResolver<'a, S: SchemaLookup + ?Sized> {
    tables: &'a [TableDescriptor],
    lookup: &'a S,
    detail: OnceCell<TableDetail>,
}

impl<'a, S: SchemaLookup + ?Sized> InputTableResolver<'a, S> {
    pub fn new(tables: &'a [TableDescriptor], lookup: &'a S) -> Self {
        Self {
            tables,
            lookup,
            detail: OnceCell::new(),
        }
    }

    /// The descriptor of the source table.
    pub fn source(&self) -> ScdResult<&'a TableDescriptor> {
        match self.tables {
            [] => Err(ScdError::config(
                "Please specify one input table in the input mapping.",
            )),
            [only] => Ok(only),
            tables => {
                let mut candidates = tables.iter().filter(|t| t.destination == INPUT_TABLE);
                match (candidates.next(), candidates.next()) {
                    (Some(table), None) => Ok(table),
                    (None, _) => Err(ScdError::config(format!(
                        "Found \"{}\" tables in input mapping, but no source table with \"destination\" = \"{}\". Please set the source table in the input mapping.",
                        tables.len(),
                        INPUT_TABLE
                    ))),
                    (Some(_), Some(_)) => Err(ScdError::config(format!(
                        "Found more than one table with \"destination\" = \"{}\" in input mapping. Please keep only one source table.",
                        INPUT_TABLE
                    ))),
                }
            }
        }
    }

    pub fn source_table_id(&self) -> ScdResult<&'a str> {
        Ok(&self.source()?.source)
    }

    /// Schema of the source table, fetched on first use.
    pub fn table_detail(&self) -> ScdResult<&TableDetail> {
        if let Some(detail) = self.detail.get() {
            return Ok(detail);
        }

        let table_id = self.source_table_id()?;
        tracing::debug!("Looking up schema of {}", table_id);
        let detail = self
            .lookup
            .get_table(table_id)
            .map_err(|e| ScdError::remote(format!("Cannot read table \"{}\"", table_id), e))?;
        Ok(self.detail.get_or_init(|| detail))
    }

    pub fn columns(&self) -> ScdResult<&[String]> {
        Ok(&self.table_detail()?.columns)
    }
}

/// Build [`Parameters`] from the configuration, checking every configured
/// column against the discovered schema.
pub fn resolve_parameters<S: SchemaLookup + ?Sized>(
    config: &ScdConfig,
    resolver: &InputTableResolver<'_, S>,
) -> ScdResult<Parameters> {
    let backend = Backend::from_component_id(&config.component_id)?;

    let primary_key = config.primary_key_columns();
    if primary_key.is_empty() {
        return Err(ScdError::config("Primary key must contain at least one column."));
    }
    let monitored = config.monitored_columns();

    let table_id = resolver.source_table_id()?;
    let detail = resolver.table_detail()?;

    check_columns(ColumnRole::PrimaryKey, &primary_key, &detail.columns, table_id)?;
    check_columns(ColumnRole::MonitoredParameter, &monitored, &detail.columns, table_id)?;

    let input_table_definition = detail
        .definition
        .as_ref()
        .map(|d| d.columns.clone())
        .unwrap_or_default();

    Ok(Parameters::builder(backend, primary_key)
        .monitored_parameters(monitored)
        .timezone(&config.timezone)
        .deleted_flag(config.deleted_flag)
        .use_datetime(config.use_datetime)
        .keep_delete_active(config.keep_del_active)
        .current_timestamp_minus_one(config.current_timestamp_minus_one)
        .uppercase_columns(config.uppercase_columns)
        .start_date_name(&config.start_date_name)
        .end_date_name(&config.end_date_name)
        .actual_name(&config.actual_name)
        .is_deleted_name(&config.is_deleted_name)
        .deleted_flag_value(FlagValues::parse(&config.deleted_flag_value)?)
        .end_date_value(&config.end_date_value)
        .effective_date_adjustment(config.effective_date_adjustment)
        .snapshot_table_name(&config.snapshot_table_name)
        .input_table_definition(input_table_definition)
        .build())
}

fn check_columns(
    role: ColumnRole,
    configured: &[String],
    available: &[String],
    table_id: &str,
) -> ScdResult<()> {
    let missing: Vec<String> = configured
        .iter()
        .filter(|c| !available.contains(c))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ScdError::SchemaMismatch {
            role,
            columns: missing,
            table_id: table_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageError, StorageResult};
    use serde_json::json;
    use std::cell::Cell;

    struct CountingLookup {
        columns: Vec<&'static str>,
        calls: Cell<usize>,
    }

    impl CountingLookup {
        fn new(columns: Vec<&'static str>) -> Self {
            Self {
                columns,
                calls: Cell::new(0),
            }
        }
    }

    impl SchemaLookup for CountingLookup {
        fn get_table(&self, table_id: &str) -> StorageResult<TableDetail> {
            self.calls.set(self.calls.get() + 1);
            if table_id == "in.c-main.broken" {
                return Err(StorageError::new("Service unavailable"));
            }
            Ok(TableDetail {
                columns: self.columns.iter().map(|c| c.to_string()).collect(),
                definition: None,
            })
        }
    }

    fn config(primary_key: &str, monitored: &str) -> ScdConfig {
        ScdConfig::from_value(json!({
            "_componentId": "keboola.snowflake-transformation",
            "scd_type": "scd2",
            "primary_key": primary_key,
            "monitored_parameters": monitored,
            "timezone": "Europe/Prague",
        }))
        .unwrap()
    }

    fn tables(entries: &[(&str, &str)]) -> Vec<TableDescriptor> {
        entries
            .iter()
            .map(|(s, d)| TableDescriptor::new(*s, *d))
            .collect()
    }

    #[test]
    fn test_single_table_is_the_source() {
        let lookup = CountingLookup::new(vec![]);
        let tables = tables(&[("in.c-main.test", "test")]);
        let resolver = InputTableResolver::new(&tables, &lookup);
        assert_eq!(resolver.source_table_id().unwrap(), "in.c-main.test");
    }

    #[test]
    fn test_source_selected_by_destination() {
        let lookup = CountingLookup::new(vec![]);
        let tables = tables(&[("in.c-main.a", "a"), ("in.c-main.b", "input_table")]);
        let resolver = InputTableResolver::new(&tables, &lookup);
        assert_eq!(resolver.source_table_id().unwrap(), "in.c-main.b");
    }

    #[test]
    fn test_source_resolution_errors() {
        let lookup = CountingLookup::new(vec![]);

        let none: Vec<TableDescriptor> = Vec::new();
        let err = InputTableResolver::new(&none, &lookup).source().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please specify one input table in the input mapping."
        );

        let ambiguous = tables(&[("in.c-main.a", "a"), ("in.c-main.b", "b")]);
        let err = InputTableResolver::new(&ambiguous, &lookup)
            .source()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Found \"2\" tables in input mapping, but no source table with \"destination\" = \"input_table\". Please set the source table in the input mapping."
        );

        let duplicated = tables(&[("in.c-main.a", "input_table"), ("in.c-main.b", "input_table")]);
        assert!(InputTableResolver::new(&duplicated, &lookup).source().is_err());
    }

    #[test]
    fn test_schema_lookup_is_memoized() {
        let lookup = CountingLookup::new(vec!["id", "name"]);
        let tables = tables(&[("in.c-main.test", "test")]);
        let resolver = InputTableResolver::new(&tables, &lookup);

        resolver.columns().unwrap();
        resolver.table_detail().unwrap();
        resolve_parameters(&config("id", "name"), &resolver).unwrap();
        assert_eq!(lookup.calls.get(), 1);
    }

    #[test]
    fn test_lookup_failure_is_wrapped() {
        let lookup = CountingLookup::new(vec![]);
        let tables = tables(&[("in.c-main.broken", "test")]);
        let err = InputTableResolver::new(&tables, &lookup)
            .columns()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot read table \"in.c-main.broken\": Service unavailable"
        );
    }

    #[test]
    fn test_missing_primary_key_column() {
        let lookup = CountingLookup::new(vec!["id", "email"]);
        let tables = tables(&[("in.c-main.test", "test")]);
        let resolver = InputTableResolver::new(&tables, &lookup);

        let err = resolve_parameters(&config("name", "missing"), &resolver).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Primary key \"name\" not found in the input table \"in.c-main.test\"."
        );
    }

    #[test]
    fn test_missing_monitored_parameters() {
        let lookup = CountingLookup::new(vec!["id", "email"]);
        let tables = tables(&[("in.c-main.test", "test")]);
        let resolver = InputTableResolver::new(&tables, &lookup);

        let err = resolve_parameters(&config("id", "email, phone, fax"), &resolver).unwrap_err();
        match err {
            ScdError::SchemaMismatch { role, columns, .. } => {
                assert_eq!(role, ColumnRole::MonitoredParameter);
                assert_eq!(columns, vec!["phone", "fax"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_resolved_parameters() {
        let lookup = CountingLookup::new(vec!["id", "name", "email"]);
        let tables = tables(&[("in.c-main.test", "test")]);
        let resolver = InputTableResolver::new(&tables, &lookup);

        let params = resolve_parameters(&config(" id ", "name,email"), &resolver).unwrap();
        assert_eq!(params.backend(), Backend::Snowflake);
        assert_eq!(params.primary_key(), ["id".to_string()]);
        assert_eq!(
            params.monitored_parameters(),
            ["name".to_string(), "email".to_string()]
        );
        assert_eq!(params.timezone(), "Europe/Prague");
        assert!(params.input_table_definition().is_empty());
    }
}
