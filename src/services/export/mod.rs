pub mod csv;
pub mod excel;
pub mod json;
pub mod sql;

// self:: disambiguates the module from the csv crate.
pub use self::csv::*;
pub use excel::*;
pub use json::*;
pub use sql::*;

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Output formats the grid can render a result set into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Csv,
    Tsv,
    Json,
    JsonRows,
    Sql,
    Xls,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json | ExportFormat::JsonRows => "json",
            ExportFormat::Sql => "sql",
            ExportFormat::Xls => "xls",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Tsv => "text/tab-separated-values",
            ExportFormat::Json | ExportFormat::JsonRows => "application/json",
            ExportFormat::Sql => "application/sql",
            ExportFormat::Xls => "application/vnd.ms-excel",
        }
    }
}

fn sanitize_filename_part(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_underscore = false;
    for ch in input.trim().chars() {
        let mapped = if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-') {
            ch
        } else {
            '_'
        };
        if mapped == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        out.push(mapped);
    }
    out.trim_matches('_').to_string()
}

/// `<part>(_<part>)*_<YYYY-MM-DD-HH-MM-SS>.<ext>`, with each part sanitized
/// down to filename-safe characters.
pub fn build_export_filename(parts: &[&str], ext: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d-%H-%M-%S").to_string();
    let mut safe_parts: Vec<String> = parts
        .iter()
        .map(|p| sanitize_filename_part(p))
        .filter(|p| !p.is_empty())
        .collect();
    safe_parts.push(timestamp.clone());

    let base = if safe_parts.len() == 1 {
        format!("query_results_{timestamp}")
    } else {
        safe_parts.join("_")
    };
    let ext = ext.strip_prefix('.').unwrap_or(ext);
    format!("{base}.{ext}")
}

/// Write rendered export text to disk.
pub async fn write_text_file(path: &Path, text: &str) -> Result<()> {
    async_fs::write(path, text).await?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "wrote export file");
    Ok(())
}
