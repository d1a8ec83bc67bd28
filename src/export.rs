use crate::db::CellValue;
use crate::model::QueryResultsView;
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Table,
    Csv,
    Json,
}

pub fn render(view: &QueryResultsView, format: ExportFormat) -> String {
    match format {
        ExportFormat::Table => to_table(view),
        ExportFormat::Csv => to_csv(view),
        ExportFormat::Json => to_json(view),
    }
}

pub fn to_csv(view: &QueryResultsView) -> String {
    let mut output = String::new();

    let headers: Vec<String> = view.columns.iter().map(|c| csv_escape(c)).collect();
    output.push_str(&headers.join(","));
    output.push('\n');

    for row in &view.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| csv_escape(&cell_to_csv(cell)))
            .collect();
        output.push_str(&cells.join(","));
        output.push('\n');
    }

    output
}

/// One JSON object per row, keyed by attribute display name.
pub fn to_json(view: &QueryResultsView) -> String {
    let mut rows_json: Vec<serde_json::Value> = Vec::new();

    for row in &view.rows {
        let mut obj = serde_json::Map::new();
        for (name, cell) in view.columns.iter().zip(row) {
            obj.insert(name.clone(), cell_to_json(cell));
        }
        rows_json.push(serde_json::Value::Object(obj));
    }

    serde_json::to_string_pretty(&rows_json).unwrap_or_else(|_| "[]".to_string())
}

/// Column-aligned plain text with a row count footer.
pub fn to_table(view: &QueryResultsView) -> String {
    let mut widths: Vec<usize> = view.columns.iter().map(|c| c.width()).collect();
    for row in &view.rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.display_width());
            }
        }
    }

    let mut output = String::new();
    let header: Vec<String> = view
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, &width)| pad(name, width))
        .collect();
    output.push_str(header.join(" | ").trim_end());
    output.push('\n');

    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    output.push_str(&rule.join("-+-"));
    output.push('\n');

    for row in &view.rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| pad(&cell.display(), width))
            .collect();
        output.push_str(cells.join(" | ").trim_end());
        output.push('\n');
    }

    let count = view.row_count();
    output.push_str(&format!("({} row{})\n", count, if count == 1 { "" } else { "s" }));
    output
}

fn pad(s: &str, width: usize) -> String {
    let fill = width.saturating_sub(s.width());
    format!("{}{}", s, " ".repeat(fill))
}

fn cell_to_csv(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        other => other.display(),
    }
}

fn cell_to_json(cell: &CellValue) -> serde_json::Value {
    match cell {
        CellValue::Null => serde_json::Value::Null,
        CellValue::Bool(b) => serde_json::Value::Bool(*b),
        CellValue::Int16(i) => serde_json::json!(*i),
        CellValue::Int32(i) => serde_json::json!(*i),
        CellValue::Int64(i) => serde_json::json!(*i),
        CellValue::Float32(f) => serde_json::json!(*f),
        CellValue::Float64(f) => serde_json::json!(*f),
        CellValue::Json(j) => j.clone(),
        other => serde_json::Value::String(other.display()),
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_view() -> QueryResultsView {
        QueryResultsView {
            entity: String::from("Customer"),
            columns: vec!["Name".into(), "City".into(), "Active".into()],
            rows: vec![
                vec![
                    CellValue::Text("Ada".into()),
                    CellValue::Text("Springfield, IL".into()),
                    CellValue::Bool(true),
                ],
                vec![
                    CellValue::Text("Bø".into()),
                    CellValue::Text("Oslo".into()),
                    CellValue::Null,
                ],
            ],
        }
    }

    #[test]
    fn test_csv_export() {
        let csv = to_csv(&make_view());
        assert!(csv.starts_with("Name,City,Active\n"));
        assert!(csv.contains("Ada,\"Springfield, IL\",true\n"));
        assert!(csv.contains("Bø,Oslo,\n"));
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(csv_escape("hello"), "hello");
        assert_eq!(csv_escape("hello,world"), "\"hello,world\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_json_export() {
        let json = to_json(&make_view());
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["Name"], "Ada");
        assert_eq!(parsed[0]["Active"], true);
        assert!(parsed[1]["Active"].is_null());
    }

    #[test]
    fn test_table_export() {
        let table = to_table(&make_view());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Name | City            | Active");
        assert_eq!(lines[1], "-----+-----------------+-------");
        assert_eq!(lines[2], "Ada  | Springfield, IL | true");
        assert_eq!(lines[3], "Bø   | Oslo            | NULL");
        assert_eq!(lines[4], "(2 rows)");
    }

    #[test]
    fn test_empty_table() {
        let view = QueryResultsView {
            entity: String::from("Order"),
            columns: vec!["Number".into()],
            rows: vec![],
        };
        assert_eq!(to_table(&view), "Number\n------\n(0 rows)\n");
        assert_eq!(render(&view, ExportFormat::Json), "[]");
    }
}
