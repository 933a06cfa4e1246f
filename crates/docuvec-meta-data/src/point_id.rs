//! Deterministic vector point ID generation

use uuid::{Uuid, uuid};

/// Namespace UUID for docuvec point IDs (randomly generated once)
const DOCUVEC_NAMESPACE: Uuid = uuid!("6c1f4b0e-2d8a-4e57-b1c9-8f3a5d2e7b91");

/// Generate a deterministic point ID for one chunk in one embedding
/// space. Stable for a given (document, chunk index, model, generation),
/// so a retried Index stage upserts the same points instead of
/// duplicating them.
#[must_use]
pub fn generate_point_id(
    document_id: Uuid,
    chunk_idx: i32,
    model_alias: &str,
    generation: i64,
) -> Uuid {
    let data = format!("{document_id}:{chunk_idx}:{model_alias}:{generation}");
    Uuid::new_v5(&DOCUVEC_NAMESPACE, data.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_id() {
        let doc = Uuid::new_v4();
        assert_eq!(
            generate_point_id(doc, 0, "minilm", 1),
            generate_point_id(doc, 0, "minilm", 1)
        );
    }

    #[test]
    fn any_component_changes_the_id() {
        let doc = Uuid::new_v4();
        let base = generate_point_id(doc, 0, "minilm", 1);
        assert_ne!(base, generate_point_id(doc, 1, "minilm", 1));
        assert_ne!(base, generate_point_id(doc, 0, "bge-large", 1));
        assert_ne!(base, generate_point_id(doc, 0, "minilm", 2));
        assert_ne!(base, generate_point_id(Uuid::new_v4(), 0, "minilm", 1));
    }
}
