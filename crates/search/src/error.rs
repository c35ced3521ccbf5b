use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("No relevant context found for the query")]
    EmptyRetrieval,

    #[error("Request exceeded the {deadline_ms} ms deadline")]
    Timeout { deadline_ms: u64 },

    #[error("{component} is unavailable: {reason}")]
    ModelUnavailable {
        component: &'static str,
        reason: String,
    },

    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("Empty query")]
    EmptyQuery,

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] reelqa_vector_store::VectorStoreError),

    #[error("Corpus error: {0}")]
    CorpusError(#[from] reelqa_corpus::CorpusError),
}

impl SearchError {
    pub(crate) fn unavailable(component: &'static str, reason: &anyhow::Error) -> Self {
        Self::ModelUnavailable {
            component,
            reason: format!("{reason:#}"),
        }
    }

    /// Stable wire code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyRetrieval => "EMPTY_RETRIEVAL",
            Self::Timeout { .. } => "TIMEOUT",
            Self::ModelUnavailable { .. } => "MODEL_UNAVAILABLE",
            Self::Generation(_) => "GENERATION_FAILED",
            Self::EmptyQuery => "INVALID_REQUEST",
            Self::VectorStoreError(_) | Self::CorpusError(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(SearchError::EmptyRetrieval.code(), "EMPTY_RETRIEVAL");
        assert_eq!(SearchError::Timeout { deadline_ms: 10 }.code(), "TIMEOUT");
        assert_eq!(SearchError::EmptyQuery.code(), "INVALID_REQUEST");
        assert_eq!(
            SearchError::unavailable("judge", &anyhow::anyhow!("missing file")).code(),
            "MODEL_UNAVAILABLE"
        );
        assert_eq!(
            SearchError::CorpusError(reelqa_corpus::CorpusError::Other("x".into())).code(),
            "INTERNAL"
        );
    }
}
