//! Spreadsheet extraction (XLSX / XLS / ODS)

use std::io::Cursor;

use calamine::Reader;

use super::{ExtractedDocument, ExtractedTable};

pub(super) fn extract(bytes: &[u8]) -> ExtractedDocument {
    let mut doc = ExtractedDocument::new("sheet");

    let mut workbook = match calamine::open_workbook_auto_from_rs(Cursor::new(bytes)) {
        Ok(wb) => wb,
        Err(e) => return ExtractedDocument::degraded("sheet", format!("Failed to open workbook: {e}")),
    };

    let names: Vec<String> = workbook.sheet_names();
    if names.is_empty() {
        doc.warn("Workbook contains no sheets");
        return doc;
    }
    doc.set_meta("sheet_count", names.len());

    let mut lines: Vec<String> = Vec::new();
    for name in &names {
        let range = match workbook.worksheet_range(name) {
            Ok(r) => r,
            Err(e) => {
                doc.warn(format!("Failed to read sheet '{name}': {e}"));
                continue;
            }
        };

        lines.push(format!("Sheet: {name}"));

        let mut table_rows: Vec<Vec<String>> = Vec::new();
        for row in range.rows() {
            let mut cells: Vec<String> = row.iter().map(cell_to_string).collect();
            while cells.last().is_some_and(|c| c.trim().is_empty()) {
                cells.pop();
            }
            if cells.is_empty() {
                continue;
            }
            lines.push(cells.join("\t"));
            table_rows.push(cells);
        }

        if table_rows.is_empty() {
            continue;
        }
        let rows = table_rows.len();
        let cols = table_rows.iter().map(Vec::len).max().unwrap_or(0);
        doc.tables.push(ExtractedTable {
            name: name.clone(),
            rows,
            cols,
            csv: rows_to_csv(&table_rows),
        });

        // Blank line between sheets in the linear text
        lines.push(String::new());
    }

    doc.text = lines.join("\n").trim_end().to_string();
    if doc.text.is_empty() {
        doc.warn("Workbook contains no cell data");
    }
    doc
}

fn rows_to_csv(rows: &[Vec<String>]) -> String {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        let _ = writer.write_record(row);
    }
    writer
        .into_inner()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

fn cell_to_string(cell: &calamine::DataType) -> String {
    use calamine::DataType as D;
    match cell {
        D::Empty => String::new(),
        D::String(s) => s.replace("\r\n", " ").replace(['\r', '\n'], " "),
        D::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        D::Int(i) => i.to_string(),
        D::Bool(b) => {
            if *b {
                "TRUE".into()
            } else {
                "FALSE".into()
            }
        }
        D::Error(e) => format!("#ERR:{e:?}"),
        other => format!("{other}"),
    }
}
