//! PDF extraction via lopdf, page by page so one bad page cannot
//! sink the whole document.

use lopdf::Document;

use super::ExtractedDocument;

pub(super) fn extract(bytes: &[u8]) -> ExtractedDocument {
    let pdf = match Document::load_mem(bytes) {
        Ok(d) => d,
        Err(e) => return ExtractedDocument::degraded("pdf", format!("Failed to parse PDF: {e}")),
    };

    let mut doc = ExtractedDocument::new("pdf");
    let pages = pdf.get_pages();
    doc.set_meta("page_count", pages.len());

    let mut page_texts: Vec<String> = Vec::with_capacity(pages.len());
    for page_num in pages.keys() {
        match pdf.extract_text(&[*page_num]) {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    page_texts.push(trimmed.to_string());
                }
            }
            Err(e) => doc.warn(format!("Failed to extract text from page {page_num}: {e}")),
        }
    }

    doc.text = page_texts.join("\n\n");
    if doc.text.is_empty() {
        doc.warn("No extractable text (possibly a scanned or image-only PDF)");
    }
    doc
}
