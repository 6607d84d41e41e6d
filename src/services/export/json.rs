use anyhow::Result;
use serde_json::{Map, Value, json};

use crate::services::database::CellValue;

/// Render rows as an array of `{column: value}` objects.
pub fn to_json_objects(columns: &[String], rows: &[Vec<CellValue>], pretty: bool) -> Result<String> {
    let data: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut obj = Map::new();
            for (column, cell) in columns.iter().zip(row) {
                obj.insert(column.clone(), cell.to_json());
            }
            Value::Object(obj)
        })
        .collect();

    Ok(render(&Value::Array(data), pretty)?)
}

/// Render the result as a `{columns, rows}` envelope.
pub fn to_json_rows(columns: &[String], rows: &[Vec<CellValue>], pretty: bool) -> Result<String> {
    let envelope = json!({
        "columns": columns,
        "rows": rows,
    });
    Ok(render(&envelope, pretty)?)
}

fn render(value: &Value, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}
