//! SCD pattern variants.
//!
//! A [`Variant`] fixes the special columns appended to the snapshot, the
//! date column in the snapshot primary key and the SQL templates. Everything
//! else is shared and derived from [`Parameters`] by pure functions:
//!
//! - [`special_columns`]: typed special columns with their template keys
//! - [`snapshot_schema`]: header and typed columns of the snapshot table
//! - [`compute_context`]: variables handed to the SQL template
//! - [`render`]: the rendered SQL

pub mod scd2;
pub mod scd4;

use crate::backend::Backend;
use crate::columns::{
    column_names, merge_columns, transform_case, transform_columns_case, ColumnDefinition,
    ColumnType,
};
use crate::error::{ScdError, ScdResult};
use crate::mapping::{CURRENT_SNAPSHOT, INPUT_TABLE, NEW_SNAPSHOT};
use crate::parameters::{strip_quotes, FlagValues, Parameters};
use crate::template::{Context, FilterSet, Template};
use serde_json::{json, Value};
use std::str::FromStr;

/// Column holding the composite snapshot key.
pub const COLUMN_SNAPSHOT_PK: &str = "snapshot_pk";

/// Date column of SCD4 snapshots.
pub const COLUMN_SNAPSHOT_DATE: &str = "snapshot_date";

/// History tracking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Row versioning with validity intervals.
    Scd2,
    /// Append-only snapshot history.
    Scd4,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Scd2 => "scd2",
            Variant::Scd4 => "scd4",
        }
    }

    fn definition(&self) -> &'static VariantDefinition {
        match self {
            Variant::Scd2 => &scd2::DEFINITION,
            Variant::Scd4 => &scd4::DEFINITION,
        }
    }
}

impl FromStr for Variant {
    type Err = ScdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scd2" => Ok(Variant::Scd2),
            "scd4" => Ok(Variant::Scd4),
            other => Err(ScdError::config(format!("Unknown scd type \"{}\"", other))),
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL template body for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateSource {
    pub name: &'static str,
    pub body: &'static str,
}

/// Per-variant behaviour, looked up by [`Variant::definition`].
pub(crate) struct VariantDefinition {
    /// Date column completing the snapshot primary key, before case normalization.
    pub date_column: fn(&Parameters) -> String,
    /// Special columns keyed by their `columnName` template key, before case normalization.
    pub special_columns: fn(&Parameters) -> Vec<SpecialColumn>,
    /// Variant-only template variables.
    pub extend_context: fn(&Parameters, &mut Context),
    pub templates: &'static [(Backend, TemplateSource)],
}

/// A special column together with its `columnName` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialColumn {
    pub key: &'static str,
    pub column: ColumnDefinition,
}

impl SpecialColumn {
    pub fn new(key: &'static str, name: impl Into<String>, definition: ColumnType) -> Self {
        Self {
            key,
            column: ColumnDefinition::new(name, definition),
        }
    }
}

/// Shape of the snapshot table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSchema {
    pub primary_key: String,
    /// `[primary_key] ++ all other columns`.
    pub header: Vec<String>,
    /// Typed columns for native-types table creation.
    pub typed_columns: Vec<ColumnDefinition>,
}

/// Type of the is-deleted flag column, derived from the flag literals.
///
/// A `0`/`1` pair is numeric, anything else is text wide enough for the
/// longer literal.
pub fn deleted_column_type(flags: &FlagValues) -> ColumnType {
    let unset = strip_quotes(&flags.unset);
    let set = strip_quotes(&flags.set);
    let numeric = matches!((unset.as_str(), set.as_str()), ("0", "1") | ("1", "0"));

    if numeric {
        ColumnType::with_length("NUMERIC", "1")
    } else {
        let length = unset.chars().count().max(set.chars().count());
        ColumnType::with_length("VARCHAR", length.to_string())
    }
}

/// Literal written to the actual column of deleted rows.
pub fn deleted_actual_value(params: &Parameters) -> &str {
    let flags = params.deleted_flag_value();
    if params.keep_delete_active() {
        &flags.set
    } else {
        &flags.unset
    }
}

/// `snapshot_pk` in the configured case.
pub fn snapshot_primary_key(params: &Parameters) -> String {
    transform_case(COLUMN_SNAPSHOT_PK, params.uppercase_columns())
}

/// Primary key followed by monitored parameters, as configured.
pub fn input_columns(params: &Parameters) -> Vec<String> {
    params
        .primary_key()
        .iter()
        .chain(params.monitored_parameters())
        .cloned()
        .collect()
}

/// Input columns in the configured case.
pub fn snapshot_input_columns(params: &Parameters) -> Vec<String> {
    input_columns(params)
        .iter()
        .map(|c| transform_case(c, params.uppercase_columns()))
        .collect()
}

/// Special columns of the variant in the configured case.
pub fn special_columns(variant: Variant, params: &Parameters) -> Vec<SpecialColumn> {
    (variant.definition().special_columns)(params)
        .into_iter()
        .map(|c| SpecialColumn {
            key: c.key,
            column: ColumnDefinition::new(
                transform_case(&c.column.name, params.uppercase_columns()),
                c.column.definition,
            ),
        })
        .collect()
}

/// Lower-case parts of the composite snapshot key.
pub fn snapshot_primary_key_parts(variant: Variant, params: &Parameters) -> Vec<String> {
    params
        .primary_key()
        .iter()
        .cloned()
        .chain(std::iter::once((variant.definition().date_column)(params)))
        .map(|c| c.to_lowercase())
        .collect()
}

/// Parts of the composite snapshot key as they are named in the snapshot table.
pub fn snapshot_primary_key_columns(variant: Variant, params: &Parameters) -> Vec<String> {
    params
        .primary_key()
        .iter()
        .cloned()
        .chain(std::iter::once((variant.definition().date_column)(params)))
        .map(|c| transform_case(&c, params.uppercase_columns()))
        .collect()
}

/// Input columns with their discovered types, `VARCHAR` when untyped.
fn input_columns_with_definition(params: &Parameters) -> Vec<ColumnDefinition> {
    let definition = params.input_table_definition();
    input_columns(params)
        .into_iter()
        .map(|name| {
            let column_type = definition
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.definition.clone())
                .unwrap_or_else(ColumnType::varchar);
            ColumnDefinition::new(name, column_type)
        })
        .collect()
}

/// Data columns followed by special columns, merged by name.
pub fn snapshot_all_columns_except_pk(variant: Variant, params: &Parameters) -> Vec<ColumnDefinition> {
    let data = transform_columns_case(&input_columns_with_definition(params), params.uppercase_columns());
    let special: Vec<ColumnDefinition> = special_columns(variant, params)
        .into_iter()
        .map(|c| c.column)
        .collect();
    merge_columns(&[&data[..], &special[..]])
}

pub fn snapshot_schema(variant: Variant, params: &Parameters) -> SnapshotSchema {
    let primary_key = snapshot_primary_key(params);
    let columns = snapshot_all_columns_except_pk(variant, params);

    let mut header = vec![primary_key.clone()];
    header.extend(column_names(&columns));

    let mut typed_columns = vec![ColumnDefinition::new(primary_key.clone(), ColumnType::varchar())];
    typed_columns.extend(columns);

    SnapshotSchema {
        primary_key,
        header,
        typed_columns,
    }
}

/// Template variables for a variant.
pub fn compute_context(variant: Variant, params: &Parameters) -> Context {
    let uppercase = params.uppercase_columns();
    let specials = special_columns(variant, params);

    let column_name: serde_json::Map<String, Value> = specials
        .iter()
        .map(|c| (c.key.to_string(), Value::String(c.column.name.clone())))
        .collect();

    let all_except_pk = column_names(&snapshot_all_columns_except_pk(variant, params));
    let primary_key_lower: Vec<String> = params.primary_key().iter().map(|c| c.to_lowercase()).collect();

    let mut context = Context::new();
    let mut set = |key: &str, value: Value| {
        context.insert(key.to_string(), value);
    };

    set("timezone", json!(params.timezone()));
    set("useDatetime", json!(params.use_datetime()));
    set("keepDeleteActive", json!(params.keep_delete_active()));
    set("hasDeletedFlag", json!(params.has_deleted_flag()));
    set("uppercaseColumns", json!(uppercase));
    set("inputPrimaryKey", json!(params.primary_key()));
    set("inputPrimaryKeyLower", json!(primary_key_lower));
    set("inputColumns", json!(input_columns(params)));
    set("snapshotPrimaryKeyName", json!(snapshot_primary_key(params)));
    set("snapshotPrimaryKeyParts", json!(snapshot_primary_key_parts(variant, params)));
    set("snapshotPrimaryKeyColumns", json!(snapshot_primary_key_columns(variant, params)));
    set("snapshotInputColumns", json!(snapshot_input_columns(params)));
    set("snapshotAllColumnsExceptPk", json!(all_except_pk));
    set("deletedActualValue", json!(deleted_actual_value(params)));
    set("deletedFlagValue", json!(params.deleted_flag_value().as_array()));
    set(
        "tableName",
        json!({
            "input": INPUT_TABLE,
            "currentSnapshot": CURRENT_SNAPSHOT,
            "newSnapshot": NEW_SNAPSHOT,
        }),
    );
    set("columnName", Value::Object(column_name));

    (variant.definition().extend_context)(params, &mut context);
    context
}

/// Template for the variant on a backend.
pub fn select_template(variant: Variant, backend: Backend) -> ScdResult<TemplateSource> {
    variant
        .definition()
        .templates
        .iter()
        .find(|(b, _)| *b == backend)
        .map(|(_, t)| *t)
        .ok_or_else(|| ScdError::UnsupportedBackend {
            backend: backend.to_string(),
        })
}

/// Render the SQL of a variant.
pub fn render(variant: Variant, params: &Parameters) -> ScdResult<String> {
    let source = select_template(variant, params.backend())?;
    let context = compute_context(variant, params);
    tracing::debug!(
        "Rendering {} for {} with {} variables",
        source.name,
        params.backend(),
        context.len()
    );

    let template = Template::parse(source.name, source.body)?;
    template.render(&context, &FilterSet::for_backend(params.backend()))
}
