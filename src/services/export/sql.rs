use crate::services::database::CellValue;

/// Inputs for INSERT statement generation.
#[derive(Debug, Clone)]
pub struct InsertStatementParams<'a> {
    pub schema: Option<&'a str>,
    pub table: &'a str,
    pub columns: &'a [String],
    pub rows: &'a [Vec<CellValue>],
    /// Couchbase quotes identifiers with backticks instead of double quotes.
    pub is_couchbase: bool,
}

/// One `INSERT INTO ... VALUES (...);` per row, newline-separated.
pub fn to_insert_statements(params: &InsertStatementParams<'_>) -> String {
    let table_ref = match params.schema {
        Some(schema) if !schema.is_empty() => format!(
            "{}.{}",
            quote_identifier(schema, params.is_couchbase),
            quote_identifier(params.table, params.is_couchbase)
        ),
        _ => quote_identifier(params.table, params.is_couchbase),
    };
    let column_list = params
        .columns
        .iter()
        .map(|c| quote_identifier(c, params.is_couchbase))
        .collect::<Vec<_>>()
        .join(", ");

    params
        .rows
        .iter()
        .map(|row| {
            let values = row.iter().map(sql_literal).collect::<Vec<_>>().join(", ");
            format!("INSERT INTO {table_ref} ({column_list}) VALUES ({values});")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Embedded quote characters are doubled, per both dialects.
pub fn quote_identifier(name: &str, is_couchbase: bool) -> String {
    if is_couchbase {
        format!("`{}`", name.replace('`', "``"))
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Literalize one cell value for an INSERT statement.
pub fn sql_literal(value: &CellValue) -> String {
    match value {
        CellValue::Null => "NULL".to_string(),
        CellValue::Bool(true) => "TRUE".to_string(),
        CellValue::Bool(false) => "FALSE".to_string(),
        CellValue::Number(n) if n.is_finite() => n.to_string(),
        CellValue::Number(n) => quote_string(&n.to_string()),
        CellValue::Text(s) => quote_string(s),
        CellValue::Json(v) => quote_string(&v.to_string()),
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
