//! End-to-end generation.
//!
//! ```text
//! ComponentConfig ──► resolve() ──► ResolvedPattern ──► result()
//!                        │                │
//!                  SchemaLookup     ensure_snapshot_table()
//!                                         │
//!                                   TableLifecycle
//! ```

use crate::blocks::{generate_blocks, Block};
use crate::columns::transform_case;
use crate::config::{ComponentConfig, RuntimeConfig, StorageConfig, TableList};
use crate::error::ScdResult;
use crate::mapping::{build_mapping, Mapping, SnapshotTarget, TableDescriptor};
use crate::parameters::Parameters;
use crate::pattern::{self, SnapshotSchema, Variant};
use crate::resolver::{resolve_parameters, InputTableResolver};
use crate::storage::{ensure_snapshot_table, SchemaLookup, TableLifecycle};
use crate::table_id::{TableId, TableIdGenerator};
use crate::template::Context;
use serde::{Deserialize, Serialize};

/// The `parameters` section of the generated configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedParameters {
    pub blocks: Vec<Block>,
}

/// Everything a run produces: table mapping plus SQL blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub storage: StorageConfig,
    pub parameters: GeneratedParameters,
}

impl GenerationResult {
    /// All statements in execution order.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .blocks
            .iter()
            .flat_map(|b| &b.codes)
            .flat_map(|c| &c.script)
            .map(String::as_str)
    }
}

/// Inputs of one run after validation against the source schema.
#[derive(Debug, Clone)]
pub struct ResolvedPattern {
    pub variant: Variant,
    pub parameters: Parameters,
    /// The user's source descriptor, unchanged.
    pub source: TableDescriptor,
    pub source_table_id: TableId,
    pub snapshot_table_id: String,
    pub schema: SnapshotSchema,
}

/// Resolve the configuration against the source table schema.
///
/// The schema lookup runs exactly once.
pub fn resolve<S: SchemaLookup + ?Sized>(
    config: &ComponentConfig,
    lookup: &S,
) -> ScdResult<ResolvedPattern> {
    let variant: Variant = config.parameters.scd_type.parse()?;

    let resolver = InputTableResolver::new(config.input_tables(), lookup);
    let parameters = resolve_parameters(&config.parameters, &resolver)?;
    pattern::select_template(variant, parameters.backend())?;

    let source = resolver.source()?.clone();
    let source_table_id = TableId::parse(&source.source)?;

    let hash = config.parameters.hash()?;
    let snapshot_table_id = TableIdGenerator::new(hash, &source_table_id)
        .snapshot_table(parameters.snapshot_table_name());
    let schema = pattern::snapshot_schema(variant, &parameters);

    tracing::info!(
        "Resolved {} pattern for {} with snapshot table {}",
        variant,
        source_table_id,
        snapshot_table_id
    );

    Ok(ResolvedPattern {
        variant,
        parameters,
        source,
        source_table_id,
        snapshot_table_id,
        schema,
    })
}

impl ResolvedPattern {
    pub fn context(&self) -> Context {
        pattern::compute_context(self.variant, &self.parameters)
    }

    pub fn render_sql(&self) -> ScdResult<String> {
        pattern::render(self.variant, &self.parameters)
    }

    pub fn mapping(&self) -> Mapping {
        let actual_column = transform_case(
            self.parameters.actual_name(),
            self.parameters.uppercase_columns(),
        );
        let target = SnapshotTarget {
            snapshot_table_id: &self.snapshot_table_id,
            actual_column: &actual_column,
            actual_value: &self.parameters.deleted_flag_value().set,
            snapshot_primary_key: &self.schema.primary_key,
        };
        build_mapping(&self.source, &target)
    }

    /// Create the snapshot table if it does not exist yet.
    pub fn ensure_snapshot_table<L: TableLifecycle + ?Sized>(
        &self,
        lifecycle: &mut L,
        runtime: &RuntimeConfig,
    ) -> ScdResult<bool> {
        ensure_snapshot_table(
            lifecycle,
            &self.snapshot_table_id,
            &self.schema,
            runtime.has_native_types(),
        )
    }

    pub fn result(&self) -> ScdResult<GenerationResult> {
        let sql = self.render_sql()?;
        let blocks = generate_blocks(&sql);
        let mapping = self.mapping();

        tracing::debug!(
            "Generated {} statements",
            blocks.iter().flat_map(|b| &b.codes).map(|c| c.script.len()).sum::<usize>()
        );

        Ok(GenerationResult {
            storage: StorageConfig {
                input: TableList {
                    tables: mapping.input,
                },
                output: TableList {
                    tables: mapping.output,
                },
            },
            parameters: GeneratedParameters { blocks },
        })
    }
}

/// Generate SQL and mapping without touching storage.
pub fn generate<S: SchemaLookup + ?Sized>(
    config: &ComponentConfig,
    lookup: &S,
) -> ScdResult<GenerationResult> {
    resolve(config, lookup)?.result()
}

/// Generate, making sure the snapshot table exists first.
pub fn generate_with_snapshot<C: SchemaLookup + TableLifecycle + ?Sized>(
    config: &ComponentConfig,
    runtime: &RuntimeConfig,
    storage: &mut C,
) -> ScdResult<GenerationResult> {
    let resolved = resolve(config, &*storage)?;
    resolved.ensure_snapshot_table(storage, runtime)?;
    resolved.result()
}
