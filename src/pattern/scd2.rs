//! SCD type 2: one row per value-change interval.

use super::{deleted_column_type, SpecialColumn, TemplateSource, VariantDefinition};
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
            name: "scd2_snowflake.sql",
            body: include_str!("../../templates/scd2_snowflake.sql"),
        },
    )],
};

fn date_column(params: &Parameters) -> String {
    params.start_date_name().to_string()
}

fn date_type(params: &Parameters) -> ColumnType {
    if params.use_datetime() {
        ColumnType::new("DATETIME")
    } else {
        ColumnType::new("DATE")
    }
}

fn special_columns(params: &Parameters) -> Vec<SpecialColumn> {
    let mut columns = vec![
        SpecialColumn::new("startDate", params.start_date_name(), date_type(params)),
        SpecialColumn::new("endDate", params.end_date_name(), date_type(params)),
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
    context.insert("endDateValue".into(), json!(params.end_date_value()));
    context.insert(
        "currentTimestampMinusOne".into(),
        json!(params.current_timestamp_minus_one()),
    );
    context.insert(
        "effectiveDateAdjustment".into(),
        json!(params.effective_date_adjustment()),
    );
}
