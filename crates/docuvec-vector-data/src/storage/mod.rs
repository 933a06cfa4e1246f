pub mod mock;
pub mod qdrant;
pub mod traits;

pub use self::mock::MockStorage;
pub use self::qdrant::QdrantStorage;
pub use self::traits::{ChunkPoint, VectorSearchResult, VectorStorage};

/// Collection name for one embedding space: `{model_alias}_{dim}`.
/// Two models that happen to share a dimension still get separate
/// collections because the alias is part of the name.
#[must_use]
pub fn collection_name(model_alias: &str, dim: usize) -> String {
    format!("{model_alias}_{dim}")
}

#[cfg(test)]
mod tests {
    use super::collection_name;

    #[test]
    fn collection_name_combines_alias_and_dim() {
        assert_eq!(collection_name("minilm", 384), "minilm_384");
        assert_eq!(collection_name("bge-large", 1024), "bge-large_1024");
    }
}
