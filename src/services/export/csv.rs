use anyhow::Result;
use csv::{ReaderBuilder, WriterBuilder};

use crate::services::database::CellValue;

/// Rendering options for delimited export.
#[derive(Debug, Clone)]
pub struct DelimitedTextOptions {
    pub delimiter: u8,
    pub quote: u8,
    pub include_header: bool,
    /// Text emitted for NULL cells.
    pub null_value: String,
    /// Prefix the output with a UTF-8 BOM so Excel detects the encoding.
    pub include_bom: bool,
}

impl Default for DelimitedTextOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            include_header: true,
            null_value: String::new(),
            include_bom: false,
        }
    }
}

impl DelimitedTextOptions {
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }

    pub fn excel_csv() -> Self {
        Self {
            include_bom: true,
            ..Self::default()
        }
    }
}

/// Render a result set as RFC 4180-style delimited text. Fields containing
/// the delimiter, the quote character or a line break are quoted, with
/// embedded quotes doubled.
pub fn to_delimited_text(
    columns: &[String],
    rows: &[Vec<CellValue>],
    opts: &DelimitedTextOptions,
) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .delimiter(opts.delimiter)
        .quote(opts.quote)
        .from_writer(Vec::new());

    if opts.include_header {
        writer.write_record(columns)?;
    }
    for row in rows {
        let record: Vec<String> = row
            .iter()
            .map(|cell| cell.render(&opts.null_value))
            .collect();
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner()?;
    let text = String::from_utf8(bytes)?;
    Ok(if opts.include_bom {
        format!("\u{feff}{text}")
    } else {
        text
    })
}

#[derive(Debug, Clone)]
pub struct CsvParseOptions {
    pub delimiter: u8,
    pub quote: u8,
    pub has_header: bool,
}

impl Default for CsvParseOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            has_header: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse delimited text back into columns and string rows. Headerless input
/// gets synthetic `column_<i>` names, as do blank header cells.
pub fn parse_csv(text: &str, opts: &CsvParseOptions) -> Result<ParsedCsv> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ReaderBuilder::new()
        .delimiter(opts.delimiter)
        .quote(opts.quote)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    if !opts.has_header {
        let columns = rows
            .first()
            .map(|row| (0..row.len()).map(|i| format!("column_{i}")).collect())
            .unwrap_or_default();
        return Ok(ParsedCsv { columns, rows });
    }

    if rows.is_empty() {
        return Ok(ParsedCsv {
            columns: vec![],
            rows,
        });
    }
    let header = rows.remove(0);
    let columns = header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if h.trim().is_empty() {
                format!("column_{i}")
            } else {
                h.trim().to_string()
            }
        })
        .collect();
    Ok(ParsedCsv { columns, rows })
}
