//! Pipeline stage implementations
//!
//! Each stage asserts its precondition document status before acting.
//! A precondition miss is either a stale duplicate delivery (the
//! document already moved past the stage - acked as a no-op) or an
//! in-flight/out-of-order condition (retried with backoff).

mod chunk;
mod delete;
mod embed;
mod index;
mod normalize;

pub use chunk::ChunkStage;
pub use delete::DeleteStage;
pub use embed::EmbedStage;
pub use index::IndexStage;
pub use normalize::NormalizeStage;

use docuvec_meta_data::DocumentStatus;

use crate::error::StageError;

/// How far along the pipeline a status is. Side states (error, archived,
/// deleting) rank past every stage so stale tasks against them no-op.
const fn progress_rank(status: DocumentStatus) -> u8 {
    match status {
        DocumentStatus::Uploaded => 0,
        DocumentStatus::Normalizing => 1,
        DocumentStatus::Chunking => 2,
        DocumentStatus::Embedding => 3,
        DocumentStatus::Indexing => 4,
        DocumentStatus::Ready => 5,
        DocumentStatus::Error | DocumentStatus::Archived | DocumentStatus::Deleting => 6,
    }
}

/// Resolution of a failed precondition check
pub(crate) enum PreconditionMiss {
    /// The document already moved past this stage; ack the task quietly
    Stale,
    /// The document is not there yet (or another claim is in flight)
    Retry(StageError),
}

pub(crate) fn classify_miss(
    expected: DocumentStatus,
    actual: Option<DocumentStatus>,
) -> PreconditionMiss {
    match actual {
        None => PreconditionMiss::Retry(StageError::Retryable(
            "document not visible yet".to_string(),
        )),
        Some(status) if progress_rank(status) > progress_rank(expected) => PreconditionMiss::Stale,
        Some(status) => PreconditionMiss::Retry(StageError::Retryable(format!(
            "document in state '{status}', expected '{expected}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_states_are_stale_earlier_states_retry() {
        assert!(matches!(
            classify_miss(DocumentStatus::Chunking, Some(DocumentStatus::Ready)),
            PreconditionMiss::Stale
        ));
        assert!(matches!(
            classify_miss(DocumentStatus::Uploaded, Some(DocumentStatus::Error)),
            PreconditionMiss::Stale
        ));
        assert!(matches!(
            classify_miss(DocumentStatus::Embedding, Some(DocumentStatus::Chunking)),
            PreconditionMiss::Retry(_)
        ));
        assert!(matches!(
            classify_miss(DocumentStatus::Uploaded, None),
            PreconditionMiss::Retry(_)
        ));
    }
}
