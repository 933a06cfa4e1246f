//! DOCX extraction: unzip, walk word/document.xml, keep paragraphs,
//! heading levels, and tables.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{ExtractedDocument, ExtractedTable};

fn local_name(qualified: &[u8]) -> &[u8] {
    match qualified.iter().position(|&b| b == b':') {
        Some(i) => &qualified[i + 1..],
        None => qualified,
    }
}

fn attr_val(e: &BytesStart<'_>, key_local: &[u8]) -> Option<String> {
    for attr in e.attributes().with_checks(false).flatten() {
        if local_name(attr.key.as_ref()) == key_local {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

fn heading_level_from_style(e: &BytesStart<'_>) -> Option<u8> {
    let val = attr_val(e, b"val")?;
    let lower = val.to_ascii_lowercase();
    let rest = lower.strip_prefix("heading")?;
    let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
    digits.parse::<u8>().ok().map(|n| n.clamp(1, 6))
}

#[derive(Default)]
struct DocxWalker {
    lines: Vec<String>,
    tables: Vec<ExtractedTable>,
    // paragraph state
    in_paragraph: bool,
    in_text_run: bool,
    paragraph: String,
    heading_level: Option<u8>,
    // table state
    table_depth: u32,
    table_rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

impl DocxWalker {
    fn on_start(&mut self, e: &BytesStart<'_>) {
        match local_name(e.name().as_ref()) {
            b"p" => {
                self.in_paragraph = true;
                self.paragraph.clear();
                self.heading_level = None;
            }
            b"t" => self.in_text_run = true,
            b"tbl" => {
                // Nested tables are flattened into the outer one
                self.table_depth += 1;
            }
            b"tr" if self.table_depth > 0 => self.row.clear(),
            b"tc" if self.table_depth > 0 => self.cell.clear(),
            b"pStyle" => {
                if let Some(level) = heading_level_from_style(e) {
                    self.heading_level = Some(level);
                }
            }
            b"outlineLvl" => {
                if let Some(n) = attr_val(e, b"val").and_then(|v| v.parse::<u8>().ok()) {
                    self.heading_level = Some(n.saturating_add(1).min(6));
                }
            }
            b"br" => self.push_char('\n'),
            b"tab" => self.push_char('\t'),
            _ => {}
        }
    }

    fn on_empty(&mut self, e: &BytesStart<'_>) {
        match local_name(e.name().as_ref()) {
            b"br" => self.push_char('\n'),
            b"tab" => self.push_char('\t'),
            b"pStyle" => {
                if let Some(level) = heading_level_from_style(e) {
                    self.heading_level = Some(level);
                }
            }
            b"outlineLvl" => {
                if let Some(n) = attr_val(e, b"val").and_then(|v| v.parse::<u8>().ok()) {
                    self.heading_level = Some(n.saturating_add(1).min(6));
                }
            }
            _ => {}
        }
    }

    fn on_end(&mut self, name: &[u8]) {
        match name {
            b"t" => self.in_text_run = false,
            b"p" => {
                if self.in_paragraph {
                    self.flush_paragraph();
                }
                self.in_paragraph = false;
            }
            b"tc" if self.table_depth > 0 => {
                let cell = std::mem::take(&mut self.cell);
                self.row.push(cell.split_whitespace().collect::<Vec<_>>().join(" "));
            }
            b"tr" if self.table_depth > 0 => {
                let row = std::mem::take(&mut self.row);
                if row.iter().any(|c| !c.is_empty()) {
                    self.table_rows.push(row);
                }
            }
            b"tbl" => {
                self.table_depth = self.table_depth.saturating_sub(1);
                if self.table_depth == 0 {
                    self.flush_table();
                }
            }
            _ => {}
        }
    }

    fn on_text(&mut self, text: &str) {
        if self.in_text_run {
            self.push_str(text);
        }
    }

    fn push_char(&mut self, c: char) {
        if self.table_depth > 0 {
            self.cell.push(c);
        } else if self.in_paragraph {
            self.paragraph.push(c);
        }
    }

    fn push_str(&mut self, s: &str) {
        if self.table_depth > 0 {
            self.cell.push_str(s);
        } else if self.in_paragraph {
            self.paragraph.push_str(s);
        }
    }

    fn flush_paragraph(&mut self) {
        let text = self.paragraph.trim();
        if text.is_empty() {
            return;
        }
        match self.heading_level {
            Some(level) => {
                let marker = "#".repeat(level as usize);
                self.lines.push(format!("{marker} {text}"));
            }
            None => self.lines.push(text.to_string()),
        }
        self.lines.push(String::new());
    }

    fn flush_table(&mut self) {
        let rows = std::mem::take(&mut self.table_rows);
        if rows.is_empty() {
            return;
        }
        for row in &rows {
            self.lines.push(row.join("\t"));
        }
        self.lines.push(String::new());

        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        for row in &rows {
            let _ = writer.write_record(row);
        }
        let csv = writer
            .into_inner()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default();
        self.tables.push(ExtractedTable {
            name: format!("table_{}", self.tables.len() + 1),
            rows: rows.len(),
            cols,
            csv,
        });
    }
}

pub(super) fn extract(bytes: &[u8]) -> ExtractedDocument {
    let mut archive = match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(z) => z,
        Err(e) => return ExtractedDocument::degraded("docx", format!("Not a valid DOCX archive: {e}")),
    };

    let mut document_xml = String::new();
    match archive.by_name("word/document.xml") {
        Ok(mut entry) => {
            if let Err(e) = entry.read_to_string(&mut document_xml) {
                return ExtractedDocument::degraded("docx", format!("Failed to read word/document.xml: {e}"));
            }
        }
        Err(_) => {
            return ExtractedDocument::degraded("docx", "Archive has no word/document.xml".to_string());
        }
    }

    let mut doc = ExtractedDocument::new("docx");
    let mut walker = DocxWalker::default();

    let mut reader = Reader::from_str(&document_xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => walker.on_start(&e),
            Ok(Event::Empty(e)) => walker.on_empty(&e),
            Ok(Event::End(e)) => walker.on_end(local_name(e.name().as_ref())),
            Ok(Event::Text(t)) => {
                if let Ok(cow) = t.unescape() {
                    walker.on_text(&cow);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                doc.warn(format!("Stopped at malformed XML: {e}"));
                break;
            }
            _ => {}
        }
    }

    doc.text = walker.lines.join("\n").trim_end().to_string();
    doc.tables = walker.tables;
    if doc.text.is_empty() && doc.tables.is_empty() {
        doc.warn("Document body is empty");
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_docx(document_xml: &str) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default();
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(document_xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn headings_become_markdown_markers() {
        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
          <w:body>
            <w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Scope</w:t></w:r></w:p>
            <w:p><w:r><w:t>Body text.</w:t></w:r></w:p>
          </w:body>
        </w:document>"#;
        let doc = extract(&make_docx(xml));
        assert!(doc.text.contains("## Scope"));
        assert!(doc.text.contains("Body text."));
    }

    #[test]
    fn tables_are_captured_and_linearized() {
        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
          <w:body>
            <w:tbl>
              <w:tr><w:tc><w:p><w:r><w:t>Name</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Qty</w:t></w:r></w:p></w:tc></w:tr>
              <w:tr><w:tc><w:p><w:r><w:t>Widget</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>3</w:t></w:r></w:p></w:tc></w:tr>
            </w:tbl>
          </w:body>
        </w:document>"#;
        let doc = extract(&make_docx(xml));
        assert_eq!(doc.tables.len(), 1);
        assert_eq!(doc.tables[0].rows, 2);
        assert_eq!(doc.tables[0].cols, 2);
        assert!(doc.text.contains("Name\tQty"));
    }

    #[test]
    fn non_zip_bytes_degrade_with_warning() {
        let doc = extract(b"plain text, not a zip");
        assert!(!doc.warnings.is_empty());
        assert!(doc.text.is_empty());
    }
}
