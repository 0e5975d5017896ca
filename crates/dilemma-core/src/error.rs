//! Error taxonomy for match orchestration.

use dilemma_llm::CompletionError;
use dilemma_state::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid pairing: {0}")]
    InvalidPairing(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("completion for {model} failed in round {round}: {source}")]
    Completion {
        model: String,
        round: u32,
        #[source]
        source: CompletionError,
    },

    /// Fatal backend error; match status is `aborted`
    #[error("match {match_id} aborted in round {round}: {reason}")]
    Aborted {
        match_id: String,
        round: u32,
        reason: String,
    },

    /// Retries exhausted under the strict policy, or a write failed; match status is `failed`
    #[error("match {match_id} failed in round {round}: {reason}")]
    Failed {
        match_id: String,
        round: u32,
        reason: String,
    },
}

impl EngineError {
    /// Id of the match this error terminated, if one was created.
    pub fn match_id(&self) -> Option<&str> {
        match self {
            EngineError::Aborted { match_id, .. } | EngineError::Failed { match_id, .. } => {
                Some(match_id)
            }
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = EngineError::Aborted {
            match_id: "m-1".into(),
            round: 5,
            reason: "authentication failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "match m-1 aborted in round 5: authentication failed"
        );
        assert_eq!(err.match_id(), Some("m-1"));
    }

    #[test]
    fn storage_errors_convert() {
        let err: EngineError = StorageError::MatchNotFound { id: "x".into() }.into();
        assert!(matches!(err, EngineError::Storage(_)));
        assert_eq!(err.match_id(), None);
    }
}
