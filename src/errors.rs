//! Error taxonomy for the indexing and retrieval core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding store has not completed initialization.
    #[error("Embedding store is not initialized")]
    NotInitialized,

    /// The embedding backend rejected or failed a batch.
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// A search produced nothing above the similarity threshold.
    #[error("No relevant documents found")]
    NoRelevantDocuments,

    /// The generation backend is unreachable or has no model loaded.
    #[error("Generation backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Assembled context cannot fit the model window even after
    /// summarization.
    #[error("Context exceeds the model window")]
    ContextWindowExceeded,

    /// Blank input where content was required.
    #[error("Content is empty")]
    EmptyContent,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RagError {
    /// Wrap any displayable error as an internal failure.
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    /// Whether retrying after conditions change can succeed. A
    /// document that failed on one of these stays eligible for
    /// re-processing.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RagError::NotInitialized | RagError::EmbeddingFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_wraps_display() {
        let err = RagError::internal(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk gone",
        ));
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn retriable_classification() {
        assert!(RagError::NotInitialized.is_retriable());
        assert!(RagError::EmbeddingFailed("timeout".into()).is_retriable());
        assert!(!RagError::NoRelevantDocuments.is_retriable());
        assert!(!RagError::ContextWindowExceeded.is_retriable());
    }
}
