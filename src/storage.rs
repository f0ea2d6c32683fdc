//! Storage collaborators: schema lookup and snapshot table lifecycle.
//!
//! The generator only talks to storage through the [`SchemaLookup`] and
//! [`TableLifecycle`] traits. [`JsonCatalog`] implements both on top of a
//! local JSON document so the whole flow can run offline.

use crate::columns::ColumnDefinition;
use crate::error::{ScdError, ScdResult};
use crate::pattern::SnapshotSchema;
use crate::table_id::TableId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure reported by a storage collaborator.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StorageError(pub String);

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Typed column definition of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
}

/// Table detail as returned by the schema lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDetail {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<TableDefinition>,
}

/// Options of untyped table creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTableOptions {
    #[serde(rename = "primaryKey")]
    pub primary_key: String,
}

/// Request of typed table creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinitionRequest {
    pub name: String,
    #[serde(rename = "primaryKeysNames")]
    pub primary_keys_names: Vec<String>,
    pub columns: Vec<ColumnDefinition>,
}

/// Reads table metadata from storage.
pub trait SchemaLookup {
    fn get_table(&self, table_id: &str) -> StorageResult<TableDetail>;
}

/// Bucket and table existence checks and creation.
pub trait TableLifecycle {
    fn bucket_exists(&self, bucket_id: &str) -> StorageResult<bool>;

    fn create_bucket(&mut self, name: &str, stage: &str) -> StorageResult<()>;

    fn table_exists(&self, table_id: &str) -> StorageResult<bool>;

    fn create_table_async(
        &mut self,
        bucket_id: &str,
        name: &str,
        header: &[String],
        options: &CreateTableOptions,
    ) -> StorageResult<()>;

    fn create_table_definition(
        &mut self,
        bucket_id: &str,
        request: &TableDefinitionRequest,
    ) -> StorageResult<()>;
}

/// Make sure the snapshot table exists, creating its bucket and itself if not.
///
/// Returns `true` when the table was created.
pub fn ensure_snapshot_table<L: TableLifecycle + ?Sized>(
    lifecycle: &mut L,
    table_id: &str,
    schema: &SnapshotSchema,
    native_types: bool,
) -> ScdResult<bool> {
    let context = format!("Cannot create snapshot table \"{}\"", table_id);

    if lifecycle
        .table_exists(table_id)
        .map_err(|e| ScdError::remote(&context, e))?
    {
        tracing::debug!("Snapshot table {} already exists", table_id);
        return Ok(false);
    }

    // The id was produced by the table id generator, so a parse failure is a defect.
    let id = TableId::parse(table_id)
        .map_err(|e| ScdError::Application(format!("Invalid snapshot table id: {}", e)))?;
    let bucket_id = id.bucket_id();

    if !lifecycle
        .bucket_exists(&bucket_id)
        .map_err(|e| ScdError::remote(&context, e))?
    {
        tracing::info!("Creating bucket {}", bucket_id);
        lifecycle
            .create_bucket(id.bucket_display_name(), id.stage.as_str())
            .map_err(|e| ScdError::remote(&context, e))?;
    }

    if native_types {
        tracing::info!("Creating typed snapshot table {}", table_id);
        let request = TableDefinitionRequest {
            name: id.table.clone(),
            primary_keys_names: vec![schema.primary_key.clone()],
            columns: schema.typed_columns.clone(),
        };
        lifecycle
            .create_table_definition(&bucket_id, &request)
            .map_err(|e| ScdError::remote(&context, e))?;
    } else {
        tracing::info!("Creating snapshot table {}", table_id);
        let options = CreateTableOptions {
            primary_key: schema.primary_key.clone(),
        };
        lifecycle
            .create_table_async(&bucket_id, &id.table, &schema.header, &options)
            .map_err(|e| ScdError::remote(&context, e))?;
    }

    Ok(true)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CatalogData {
    #[serde(default)]
    buckets: Vec<String>,
    #[serde(default)]
    tables: BTreeMap<String, TableDetail>,
}

/// Storage catalog backed by a JSON file.
///
/// ```json
/// {
///   "buckets": ["in.c-main"],
///   "tables": { "in.c-main.customers": { "columns": ["id", "name"] } }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    path: Option<PathBuf>,
    data: CatalogData,
}

impl JsonCatalog {
    /// Catalog that lives only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a catalog file. A missing file starts an empty catalog that is
    /// written on the first change.
    pub fn open(path: impl AsRef<Path>) -> ScdResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            CatalogData::default()
        };
        Ok(Self {
            path: Some(path),
            data,
        })
    }

    /// Register a table, e.g. a source table known to exist.
    pub fn insert_table(&mut self, table_id: impl Into<String>, detail: TableDetail) {
        self.data.tables.insert(table_id.into(), detail);
    }

    pub fn table(&self, table_id: &str) -> Option<&TableDetail> {
        self.data.tables.get(table_id)
    }

    fn persist(&self) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(&self.data)
            .map_err(|e| StorageError::new(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| {
            StorageError::new(format!("Failed to write catalog {}: {}", path.display(), e))
        })
    }
}

impl SchemaLookup for JsonCatalog {
    fn get_table(&self, table_id: &str) -> StorageResult<TableDetail> {
        self.data
            .tables
            .get(table_id)
            .cloned()
            .ok_or_else(|| StorageError::new(format!("The table \"{}\" was not found.", table_id)))
    }
}

impl TableLifecycle for JsonCatalog {
    fn bucket_exists(&self, bucket_id: &str) -> StorageResult<bool> {
        let prefix = format!("{}.", bucket_id);
        Ok(self.data.buckets.iter().any(|b| b == bucket_id)
            || self.data.tables.keys().any(|t| t.starts_with(&prefix)))
    }

    fn create_bucket(&mut self, name: &str, stage: &str) -> StorageResult<()> {
        let bucket_id = format!("{}.c-{}", stage, name);
        if self.data.buckets.contains(&bucket_id) {
            return Err(StorageError::new(format!(
                "The bucket \"{}\" already exists.",
                bucket_id
            )));
        }
        self.data.buckets.push(bucket_id);
        self.persist()
    }

    fn table_exists(&self, table_id: &str) -> StorageResult<bool> {
        Ok(self.data.tables.contains_key(table_id))
    }

    fn create_table_async(
        &mut self,
        bucket_id: &str,
        name: &str,
        header: &[String],
        options: &CreateTableOptions,
    ) -> StorageResult<()> {
        if !header.contains(&options.primary_key) {
            return Err(StorageError::new(format!(
                "Primary key \"{}\" is not a column of the table.",
                options.primary_key
            )));
        }
        self.data.tables.insert(
            format!("{}.{}", bucket_id, name),
            TableDetail {
                columns: header.to_vec(),
                definition: None,
            },
        );
        self.persist()
    }

    fn create_table_definition(
        &mut self,
        bucket_id: &str,
        request: &TableDefinitionRequest,
    ) -> StorageResult<()> {
        self.data.tables.insert(
            format!("{}.{}", bucket_id, request.name),
            TableDetail {
                columns: request.columns.iter().map(|c| c.name.clone()).collect(),
                definition: Some(TableDefinition {
                    columns: request.columns.clone(),
                }),
            },
        );
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnType;

    fn schema() -> SnapshotSchema {
        SnapshotSchema {
            primary_key: "snapshot_pk".to_string(),
            header: vec!["snapshot_pk".to_string(), "start_date".to_string()],
            typed_columns: vec![
                ColumnDefinition::new("snapshot_pk", ColumnType::varchar()),
                ColumnDefinition::new("start_date", ColumnType::new("DATE")),
            ],
        }
    }

    /// Records every lifecycle call.
    #[derive(Default)]
    struct RecordingLifecycle {
        table_exists: bool,
        bucket_exists: bool,
        fail_create: bool,
        calls: Vec<String>,
    }

    impl TableLifecycle for RecordingLifecycle {
        fn bucket_exists(&self, _bucket_id: &str) -> StorageResult<bool> {
            Ok(self.bucket_exists)
        }

        fn create_bucket(&mut self, name: &str, stage: &str) -> StorageResult<()> {
            self.calls.push(format!("create_bucket {} {}", name, stage));
            Ok(())
        }

        fn table_exists(&self, _table_id: &str) -> StorageResult<bool> {
            Ok(self.table_exists)
        }

        fn create_table_async(
            &mut self,
            bucket_id: &str,
            name: &str,
            header: &[String],
            options: &CreateTableOptions,
        ) -> StorageResult<()> {
            self.calls.push(format!(
                "create_table_async {} {} [{}] {}",
                bucket_id,
                name,
                header.join(","),
                options.primary_key
            ));
            Ok(())
        }

        fn create_table_definition(
            &mut self,
            bucket_id: &str,
            request: &TableDefinitionRequest,
        ) -> StorageResult<()> {
            if self.fail_create {
                return Err(StorageError::new("Table creation failed"));
            }
            self.calls.push(format!(
                "create_table_definition {} {} {}",
                bucket_id,
                request.name,
                request.columns.len()
            ));
            Ok(())
        }
    }

    #[test]
    fn test_existing_table_is_left_alone() {
        let mut lifecycle = RecordingLifecycle {
            table_exists: true,
            ..Default::default()
        };
        let created = ensure_snapshot_table(
            &mut lifecycle,
            "out.c-test-bucket.snapshot-table",
            &schema(),
            true,
        )
        .unwrap();
        assert!(!created);
        assert!(lifecycle.calls.is_empty());
    }

    #[test]
    fn test_native_types_create_definition() {
        let mut lifecycle = RecordingLifecycle {
            bucket_exists: true,
            ..Default::default()
        };
        ensure_snapshot_table(
            &mut lifecycle,
            "out.c-test-bucket.snapshot-table",
            &schema(),
            true,
        )
        .unwrap();
        assert_eq!(
            lifecycle.calls,
            vec!["create_table_definition out.c-test-bucket snapshot-table 2"]
        );
    }

    #[test]
    fn test_untyped_create_with_header() {
        let mut lifecycle = RecordingLifecycle {
            bucket_exists: true,
            ..Default::default()
        };
        ensure_snapshot_table(
            &mut lifecycle,
            "out.c-test-bucket.snapshot-table",
            &schema(),
            false,
        )
        .unwrap();
        assert_eq!(
            lifecycle.calls,
            vec!["create_table_async out.c-test-bucket snapshot-table [snapshot_pk,start_date] snapshot_pk"]
        );
    }

    #[test]
    fn test_missing_bucket_is_created() {
        let mut lifecycle = RecordingLifecycle::default();
        ensure_snapshot_table(
            &mut lifecycle,
            "out.c-test-bucket.snapshot-table",
            &schema(),
            true,
        )
        .unwrap();
        assert_eq!(lifecycle.calls[0], "create_bucket test-bucket out");
        assert_eq!(lifecycle.calls.len(), 2);
    }

    #[test]
    fn test_creation_failure_is_wrapped() {
        let mut lifecycle = RecordingLifecycle {
            bucket_exists: true,
            fail_create: true,
            ..Default::default()
        };
        let err = ensure_snapshot_table(
            &mut lifecycle,
            "out.c-test-bucket.snapshot-table",
            &schema(),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ScdError::RemoteService { .. }));
        assert_eq!(
            err.to_string(),
            "Cannot create snapshot table \"out.c-test-bucket.snapshot-table\": Table creation failed"
        );
    }

    #[test]
    fn test_json_catalog_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "scd-pattern-catalog-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let mut catalog = JsonCatalog::open(&path).unwrap();
        catalog.insert_table(
            "in.c-main.customers",
            TableDetail {
                columns: vec!["id".into(), "name".into()],
                definition: None,
            },
        );
        assert!(catalog.bucket_exists("in.c-main").unwrap());
        assert!(!catalog.bucket_exists("out.c-main").unwrap());

        ensure_snapshot_table(&mut catalog, "out.c-main.customers_snapshot", &schema(), false)
            .unwrap();

        let reopened = JsonCatalog::open(&path).unwrap();
        assert!(reopened.bucket_exists("out.c-main").unwrap());
        assert_eq!(
            reopened.get_table("out.c-main.customers_snapshot").unwrap().columns,
            vec!["snapshot_pk", "start_date"]
        );
        assert!(reopened.get_table("in.c-main.missing").is_err());

        let _ = std::fs::remove_file(&path);
    }
}
