//! Dilemma-State: SurrealDB Backend for Dilemma Arena
//!
//! This crate provides the persistence layer for the Iterated Prisoner's
//! Dilemma arena. It owns the typed records the rest of the workspace speaks
//! (models, matches, rounds) and the `ArenaStore` port they flow through.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Append-only round history, forward-only match status, rebuildable
//! model aggregates.
//!
//! ## Key Components
//!
//! - `ArenaStore`: async persistence port consumed by the match engine
//! - `SurrealArenaStore`: SurrealDB implementation (memory, local, cloud)
//! - `MemoryArenaStore`: in-memory fake for tests

mod connection;
mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use connection::CloudConfig;
pub use error::{StateError, StorageError};
pub use schema::{MatchRow, ModelRow, RoundRow};
pub use storage_traits::{
    ArenaStore, MatchId, MatchRecord, MatchStatus, ModelId, ModelRecord, ModelStats, Move,
    NewRound, ParticipantRound, RoundRecord, Side, StorageResult,
};
pub use surreal_store::SurrealArenaStore;

/// Result type for dilemma-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
