use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single cell of a result set.
///
/// Backends hand values over as JSON, so the wire shape is untagged: `null`,
/// booleans, numbers and strings map onto their own variants, and any
/// remaining structure (objects, arrays) is carried opaquely as `Json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Json(serde_json::Value),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Display text for grid rendering and delimited export. `Null` renders
    /// as the caller-supplied placeholder since CSV and the grid disagree on
    /// how to show it.
    pub fn render(&self, null_value: &str) -> String {
        match self {
            CellValue::Null => null_value.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Json(v) => v.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::from(*b),
            CellValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Text(s) => serde_json::Value::from(s.clone()),
            CellValue::Json(v) => v.clone(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => CellValue::Number(f),
                None => CellValue::Json(serde_json::Value::Number(n)),
            },
            serde_json::Value::String(s) => CellValue::Text(s),
            other => CellValue::Json(other),
        }
    }

    /// Serialized form used wherever a cell value has to act as a map key
    /// (primary-key lookups during diffing).
    pub fn lookup_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(""))
    }
}

/// A row keyed by column name, as used by snapshots and the diff engine.
pub type RowObject = BTreeMap<String, CellValue>;

/// Per-column metadata reported by the backend alongside a result.
///
/// Absence of the metadata array on a result means no column is editable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub column_name: String,
    pub is_primary_key: bool,
    pub is_editable: bool,
}

/// The canonical tabular payload produced by query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_metadata: Option<Vec<ColumnMetadata>>,
    #[serde(default)]
    pub affected_rows: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl QueryResult {
    /// Empty SELECT-shaped result.
    pub fn empty() -> Self {
        Self {
            columns: vec![],
            rows: vec![],
            column_metadata: None,
            affected_rows: 0,
            total_count: None,
            limit: None,
            offset: None,
            has_more: None,
            execution_time_ms: None,
        }
    }

    /// Every row must match the column count, and the metadata array (when
    /// present) must be parallel to `columns`.
    pub fn check_shape(&self) -> Result<()> {
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                bail!(
                    "row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    self.columns.len()
                );
            }
        }
        if let Some(metadata) = &self.column_metadata {
            if metadata.len() != self.columns.len() {
                bail!(
                    "column metadata has {} entries, expected {}",
                    metadata.len(),
                    self.columns.len()
                );
            }
        }
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn metadata_for(&self, name: &str) -> Option<&ColumnMetadata> {
        let index = self.column_index(name)?;
        self.column_metadata.as_ref()?.get(index)
    }

    pub fn primary_key_columns(&self) -> Vec<&ColumnMetadata> {
        self.column_metadata
            .as_ref()
            .map(|metadata| metadata.iter().filter(|m| m.is_primary_key).collect())
            .unwrap_or_default()
    }

    pub fn is_column_editable(&self, name: &str) -> bool {
        self.metadata_for(name).is_some_and(|m| m.is_editable)
    }

    /// Server-side pagination fields are only present when the query was
    /// issued with a window.
    pub fn is_paginated(&self) -> bool {
        self.limit.is_some() && (self.total_count.is_some() || self.has_more.is_some())
    }

    /// Row as an object keyed by column name, straight from the source data.
    pub fn row_object(&self, index: usize) -> Option<RowObject> {
        let row = self.rows.get(index)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
        )
    }

    pub fn row_objects(&self) -> Vec<RowObject> {
        (0..self.rows.len())
            .filter_map(|i| self.row_object(i))
            .collect()
    }
}

/// Payload for persisting one edited row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowUpdate {
    pub schema: Option<String>,
    pub table: String,
    pub primary_key: RowObject,
    pub updates: RowObject,
}

/// Payload for deleting one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDelete {
    pub schema: Option<String>,
    pub table: String,
    pub primary_key: RowObject,
}
