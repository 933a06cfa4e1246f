//! Format-dispatched text extraction
//!
//! `extract` converts raw uploaded bytes into plain text, extracted tables,
//! and metadata. Dispatch is by file extension; each format extractor is
//! best-effort and reports problems as in-band warnings rather than errors,
//! so downstream stages can proceed with degraded output.

mod docx;
mod pdf;
mod sheet;
mod tabular;
mod text;

use serde::{Deserialize, Serialize};

/// One extracted table, independent of the linear text stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// Table name (sheet name, or file stem for CSV)
    pub name: String,
    /// Row count
    pub rows: usize,
    /// Column count (widest row)
    pub cols: usize,
    /// CSV representation of the table body
    pub csv: String,
}

/// Result of extracting one uploaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Linear plain text
    pub text: String,
    /// Tables pulled out of the document (csv/xlsx/docx)
    pub tables: Vec<ExtractedTable>,
    /// Format-specific metadata (page count, sheet names, detected encoding)
    pub meta: serde_json::Map<String, serde_json::Value>,
    /// Which extractor produced this
    pub extractor: String,
    /// Non-fatal diagnostics collected along the way
    pub warnings: Vec<String>,
}

impl ExtractedDocument {
    pub(crate) fn new(extractor: &str) -> Self {
        Self {
            text: String::new(),
            tables: Vec::new(),
            meta: serde_json::Map::new(),
            extractor: extractor.to_string(),
            warnings: Vec::new(),
        }
    }

    /// Degraded result: empty text plus one warning explaining why
    pub(crate) fn degraded(extractor: &str, warning: impl Into<String>) -> Self {
        let mut doc = Self::new(extractor);
        doc.warnings.push(warning.into());
        doc
    }

    pub(crate) fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub(crate) fn set_meta(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.meta.insert(key.to_string(), value.into());
    }
}

/// Extract text, tables, and metadata from raw uploaded bytes
///
/// Never fails on malformed input for supported formats: internal extraction
/// failure yields empty text plus a warning. Unknown extensions fall back to
/// best-effort text decoding with a warning.
pub fn extract(bytes: &[u8], filename: &str) -> ExtractedDocument {
    let ext = filename
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let mut doc = match ext.as_str() {
        "pdf" => pdf::extract(bytes),
        "docx" => docx::extract(bytes),
        "csv" => tabular::extract(bytes, filename),
        "xlsx" | "xls" | "ods" => sheet::extract(bytes),
        "txt" | "md" | "text" | "log" => text::extract(bytes),
        other => {
            let mut doc = text::extract(bytes);
            doc.warn(format!(
                "Unknown extension '{other}', decoded as plain text"
            ));
            doc
        }
    };

    doc.set_meta("original_filename", filename);
    tracing::debug!(
        filename,
        extractor = %doc.extractor,
        text_len = doc.text.len(),
        tables = doc.tables.len(),
        warnings = doc.warnings.len(),
        "Extracted document"
    );
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_falls_back_to_text_with_warning() {
        let doc = extract(b"hello world", "archive.xyz");
        assert_eq!(doc.text, "hello world");
        assert!(doc.warnings.iter().any(|w| w.contains("xyz")));
    }

    #[test]
    fn malformed_pdf_degrades_instead_of_failing() {
        let doc = extract(b"not a pdf at all", "broken.pdf");
        assert!(doc.text.is_empty());
        assert!(!doc.warnings.is_empty());
    }

    #[test]
    fn csv_produces_table_and_text() {
        let doc = extract(b"name,qty\nwidget,3\ngadget,5\n", "inventory.csv");
        assert_eq!(doc.tables.len(), 1);
        assert_eq!(doc.tables[0].rows, 3);
        assert_eq!(doc.tables[0].cols, 2);
        assert!(doc.text.contains("widget"));
    }

    #[test]
    fn filename_recorded_in_meta() {
        let doc = extract(b"x", "notes.txt");
        assert_eq!(
            doc.meta.get("original_filename").and_then(|v| v.as_str()),
            Some("notes.txt")
        );
    }
}
