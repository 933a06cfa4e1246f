use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation ID type for tracking operations across service boundaries
///
/// Uses UUID v4 for guaranteed uniqueness across distributed systems. Every
/// pipeline task envelope, dispatcher request, and storage call carries one so
/// a document's journey can be stitched together from logs of independent
/// workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new correlation ID using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Uuid::try_parse(id).map_or_else(|_| Self(Uuid::new_v4()), Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_uuid_and_falls_back_on_garbage() {
        let id = CorrelationId::from("b2f7b0ae-3c89-4b2f-9d70-111111111111");
        assert_eq!(id.to_string(), "b2f7b0ae-3c89-4b2f-9d70-111111111111");

        let fallback = CorrelationId::from("not-a-uuid");
        assert_ne!(fallback.to_string(), "not-a-uuid");
    }
}
