//! Storage table ids and deterministic snapshot table naming.

use crate::error::{ScdError, ScdResult};

/// Storage stage of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    In,
    Out,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::In => "in",
            Stage::Out => "out",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "in" => Some(Stage::In),
            "out" => Some(Stage::Out),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `<stage>.<bucket>.<table>` id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableId {
    pub stage: Stage,
    /// Bucket name without the stage, e.g. `c-main`.
    pub bucket: String,
    pub table: String,
}

impl TableId {
    /// Parse a table id. The table name is everything after the last dot.
    pub fn parse(id: &str) -> ScdResult<Self> {
        let (bucket_id, table) = id
            .rsplit_once('.')
            .filter(|(b, t)| !b.is_empty() && !t.is_empty())
            .ok_or_else(|| ScdError::config(format!("Unexpected format of the table id \"{}\".", id)))?;

        let (stage, bucket) = bucket_id
            .split_once('.')
            .and_then(|(s, b)| Stage::parse(s).map(|stage| (stage, b)))
            .filter(|(_, b)| !b.is_empty())
            .ok_or_else(|| {
                ScdError::config(format!(
                    "Expected bucket from IN/OUT stage, given \"{}\".",
                    bucket_id
                ))
            })?;

        Ok(Self {
            stage,
            bucket: bucket.to_string(),
            table: table.to_string(),
        })
    }

    /// Full bucket id, e.g. `out.c-main`.
    pub fn bucket_id(&self) -> String {
        format!("{}.{}", self.stage, self.bucket)
    }

    /// Bucket name as passed to bucket creation, without the `c-` prefix.
    pub fn bucket_display_name(&self) -> &str {
        self.bucket.strip_prefix("c-").unwrap_or(&self.bucket)
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.stage, self.bucket, self.table)
    }
}

/// Generates ids of tables derived from a source table.
///
/// Default names carry the configuration hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIdGenerator {
    config_hash: String,
    bucket: String,
    source_table_name: String,
}

impl TableIdGenerator {
    pub fn new(config_hash: impl Into<String>, source: &TableId) -> Self {
        Self {
            config_hash: config_hash.into(),
            bucket: source.bucket.clone(),
            source_table_name: source.table.clone(),
        }
    }

    /// `<stage>.<bucket>.<source>_<hash>_<name>`
    pub fn generate(&self, name: &str, stage: Stage) -> String {
        format!(
            "{}.{}.{}_{}_{}",
            stage, self.bucket, self.source_table_name, self.config_hash, name
        )
    }

    /// `<stage>.<bucket>.<source><suffix>`, without the hash.
    pub fn generate_direct(&self, suffix: &str, stage: Stage) -> String {
        format!("{}.{}.{}{}", stage, self.bucket, self.source_table_name, suffix)
    }

    /// Snapshot table id, honouring a custom suffix when configured.
    pub fn snapshot_table(&self, custom_suffix: &str) -> String {
        if custom_suffix.is_empty() {
            self.generate(SNAPSHOT_SUFFIX, Stage::Out)
        } else {
            self.generate_direct(custom_suffix, Stage::Out)
        }
    }
}

/// Suffix of default snapshot table names.
pub const SNAPSHOT_SUFFIX: &str = "snapshot";
