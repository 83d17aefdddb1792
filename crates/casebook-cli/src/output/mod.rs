pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// First array-of-rows field in a result object, e.g. a debt schedule or a
/// list of shareholder rows. Used when a result is better shown as a grid.
pub(crate) fn primary_rows(result: &serde_json::Map<String, Value>) -> Option<(&str, &[Value])> {
    const ROW_KEYS: [&str; 5] = ["schedule", "debt_schedule", "post_deal_structure", "years", "cash_events"];
    ROW_KEYS.iter().find_map(|k| match result.get(*k) {
        Some(Value::Array(arr)) if arr.iter().all(Value::is_object) && !arr.is_empty() => {
            Some((*k, arr.as_slice()))
        }
        _ => None,
    })
}
