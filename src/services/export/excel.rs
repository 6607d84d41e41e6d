use crate::services::database::CellValue;

/// Minimal HTML table document that Excel opens when saved as `.xls`.
pub fn to_excel_html_table(columns: &[String], rows: &[Vec<CellValue>], sheet_name: &str) -> String {
    let header_row = format!(
        "<tr>{}</tr>",
        columns
            .iter()
            .map(|c| format!("<th>{}</th>", escape_html(c)))
            .collect::<String>()
    );
    let body_rows = rows
        .iter()
        .map(|row| {
            format!(
                "<tr>{}</tr>",
                row.iter()
                    .map(|cell| format!("<td>{}</td>", escape_html(&cell.render(""))))
                    .collect::<String>()
            )
        })
        .collect::<String>();

    format!(
        r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8" />
    <meta name="generator" content="querygrid" />
    <title>{title}</title>
    <style>
      table {{ border-collapse: collapse; }}
      th, td {{ border: 1px solid #ddd; padding: 4px 6px; }}
      th {{ background: #f5f5f5; font-weight: 600; }}
    </style>
  </head>
  <body>
    <table>
      <thead>{header_row}</thead>
      <tbody>{body_rows}</tbody>
    </table>
  </body>
</html>"#,
        title = escape_html(sheet_name),
    )
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_html_escaped() {
        let html = to_excel_html_table(
            &["col".into()],
            &[vec![CellValue::Text("<b>&\"x\"</b>".into())]],
            "Results",
        );
        assert!(html.contains("<td>&lt;b&gt;&amp;&quot;x&quot;&lt;/b&gt;</td>"));
        assert!(html.contains("<title>Results</title>"));
        assert!(html.contains("charset=\"utf-8\""));
    }

    #[test]
    fn null_cells_render_empty() {
        let html = to_excel_html_table(&["col".into()], &[vec![CellValue::Null]], "S");
        assert!(html.contains("<td></td>"));
    }
}
