//! Error types for dilemma-state

use thiserror::Error;

/// Errors that can occur while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by [`crate::ArenaStore`] operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("model not found: {id}")]
    ModelNotFound { id: String },

    #[error("match not found: {id}")]
    MatchNotFound { id: String },

    /// Match status only moves forward; writes against a terminal match are rejected.
    #[error("match {match_id} is {status}, expected {expected}")]
    InvalidMatchState {
        match_id: String,
        status: String,
        expected: String,
    },

    /// Round numbers are 1-based and gap-free within a match.
    #[error("round out of order for match {match_id}: expected {expected}, got {got}")]
    RoundOutOfOrder {
        match_id: String,
        expected: u32,
        got: u32,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_match_state_mentions_both_statuses() {
        let err = StorageError::InvalidMatchState {
            match_id: "m-1".to_string(),
            status: "completed".to_string(),
            expected: "in_progress".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("completed"));
        assert!(msg.contains("in_progress"));
    }

    #[test]
    fn round_out_of_order_display() {
        let err = StorageError::RoundOutOfOrder {
            match_id: "m-1".to_string(),
            expected: 3,
            got: 5,
        };
        assert_eq!(
            err.to_string(),
            "round out of order for match m-1: expected 3, got 5"
        );
    }
}
