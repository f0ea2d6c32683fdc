//! SCD type 4: periodic full snapshots.

use super::{
    deleted_column_type, SpecialColumn, TemplateSource, VariantDefinition, COLUMN_SNAPSHOT_DATE,
};
use crate::backend::Backend;
use crate::columns::ColumnType;
use crate::parameters::Parameters;
use crate::template::Context;
use serde_json::json;

pub(crate) static DEFINITION: VariantDefinition = VariantDefinition {
    date_column,
    special_columns,
    extend_context,
    templates: &[(
        Backend::Snowflake,
        TemplateSource {
            name: "scd4_snowflake.sql",
            body: include_str!("../../templates/scd4_snowflake.sql"),
        },
    )],
};

fn date_column(_params: &Parameters) -> String {
    COLUMN_SNAPSHOT_DATE.to_string()
}

// Snapshots always carry a timestamp, whatever `use_datetime` says.
fn special_columns(params: &Parameters) -> Vec<SpecialColumn> {
    let mut columns = vec![
        SpecialColumn::new("snapshotDate", COLUMN_SNAPSHOT_DATE, ColumnType::new("DATETIME")),
        SpecialColumn::new("actual", params.actual_name(), ColumnType::varchar()),
    ];
    if params.has_deleted_flag() {
        columns.push(SpecialColumn::new(
            "isDeleted",
            params.is_deleted_name(),
            deleted_column_type(params.deleted_flag_value()),
        ));
    }
    columns
}

fn extend_context(params: &Parameters, context: &mut Context) {
    let special: Vec<String> = super::special_columns(super::Variant::Scd4, params)
        .into_iter()
        .map(|c| c.column.name)
        .collect();
    context.insert("snapshotSpecialColumns".into(), json!(special));
    context.insert(
        "generateDeletedRecords".into(),
        json!(params.has_deleted_flag() || params.keep_delete_active()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnDefinition;
    use crate::pattern::{self, compute_context, snapshot_schema, Variant};
    use pretty_assertions::assert_eq;

    fn base() -> crate::parameters::ParametersBuilder {
        Parameters::builder(Backend::Snowflake, vec!["id".into()])
            .monitored_parameters(vec!["name".into()])
            .timezone("UTC")
    }

    #[test]
    fn test_deleted_flag_generates_deleted_records() {
        let params = base().deleted_flag(true).build();
        let context = compute_context(Variant::Scd4, &params);
        assert_eq!(context["generateDeletedRecords"], json!(true));
        assert_eq!(
            context["snapshotSpecialColumns"],
            json!(["snapshot_date", "actual", "is_deleted"])
        );
    }

    #[test]
    fn test_keep_delete_active_alone_generates_deleted_records() {
        let context = compute_context(Variant::Scd4, &base().keep_delete_active(true).build());
        assert_eq!(context["generateDeletedRecords"], json!(true));
        assert_eq!(context["snapshotSpecialColumns"], json!(["snapshot_date", "actual"]));

        let context = compute_context(Variant::Scd4, &base().build());
        assert_eq!(context["generateDeletedRecords"], json!(false));
    }

    #[test]
    fn test_snapshot_date_is_always_datetime() {
        let columns = pattern::special_columns(Variant::Scd4, &base().use_datetime(false).build());
        assert_eq!(
            columns[0].column,
            ColumnDefinition::new("snapshot_date", ColumnType::new("DATETIME"))
        );
    }

    #[test]
    fn test_header() {
        let schema = snapshot_schema(Variant::Scd4, &base().deleted_flag(true).build());
        assert_eq!(
            schema.header,
            vec!["snapshot_pk", "id", "name", "snapshot_date", "actual", "is_deleted"]
        );
    }

    #[test]
    fn test_render_skips_deleted_records_when_not_needed() {
        let sql = pattern::render(Variant::Scd4, &base().build()).unwrap();
        assert!(sql.contains("CREATE OR REPLACE TABLE \"last_current_records\""));
        assert!(!sql.contains("\"deleted_records\""));

        let sql = pattern::render(Variant::Scd4, &base().deleted_flag(true).build()).unwrap();
        assert!(sql.contains("CREATE OR REPLACE TABLE \"deleted_records\""));
        assert!(sql.contains("\"id\" || '|' || \"snapshot_date\" AS \"snapshot_pk\""));
    }
}
