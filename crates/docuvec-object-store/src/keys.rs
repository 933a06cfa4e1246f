//! Content-addressed key layout. Every object belonging to a document
//! lives under its id so a single prefix delete removes everything.

use uuid::Uuid;

/// Original uploaded bytes: `{document_id}/source/{filename}`.
pub fn source_key(document_id: Uuid, filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{document_id}/source/{safe}")
}

/// Canonical extracted+normalized JSON: `{document_id}/canonical.json`.
pub fn canonical_key(document_id: Uuid) -> String {
    format!("{document_id}/canonical.json")
}

/// Per-model vector artifact written by the embed stage:
/// `{document_id}/vectors/{alias}.json`.
pub fn vector_artifact_key(document_id: Uuid, model_alias: &str) -> String {
    format!("{document_id}/vectors/{model_alias}.json")
}

/// Prefix covering every object for a document.
pub fn document_prefix(document_id: Uuid) -> String {
    format!("{document_id}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_key_sanitizes_filenames() {
        let id = Uuid::nil();
        let key = source_key(id, "q3 report (final).pdf");
        assert_eq!(
            key,
            "00000000-0000-0000-0000-000000000000/source/q3_report__final_.pdf"
        );
    }

    #[test]
    fn document_keys_share_the_document_prefix() {
        let id = Uuid::new_v4();
        let prefix = document_prefix(id);
        assert!(canonical_key(id).starts_with(&prefix));
        assert!(vector_artifact_key(id, "minilm").starts_with(&prefix));
        assert!(source_key(id, "a.txt").starts_with(&prefix));
    }
}
