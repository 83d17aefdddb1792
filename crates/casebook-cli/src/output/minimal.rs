use serde_json::Value;

/// Headline figure of each command, as a dotted path into the result.
const PRIORITY_PATHS: [&str; 10] = [
    "blended.net_irr",
    "comparison.advantage",
    "before.final_stage.series_c",
    "net_irr",
    "irr",
    "combined",
    "closing_debt",
    "sponsor_equity_amount",
    "ebit_cagr",
    "equity_value",
];

/// Print just the headline value of the output.
///
/// Falls back to the first field of the result object when none of the
/// known paths resolve to a non-null value.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    for path in &PRIORITY_PATHS {
        if let Some(val) = lookup(result_obj, path) {
            if !val.is_null() {
                println!("{}", format_minimal(val));
                return;
            }
        }
    }

    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |node, key| node.as_object()?.get(key))
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => arr
            .iter()
            .map(format_minimal)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
