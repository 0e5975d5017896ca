//! SurrealDB schema migrations and initialization
//!
//! This module provides initialization functions to set up all tables
//! with the uniqueness constraints the arena relies on.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all arena tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Dilemma Arena SurrealDB schema");

    init_models_table(db).await?;
    init_matches_table(db).await?;
    init_rounds_table(db).await?;

    info!("Dilemma Arena schema initialization complete");
    Ok(())
}

/// Initialize `models` table
///
/// Schema:
/// ```text
/// TABLE models {
///   model_id:     STRING (unique)
///   name:         STRING (unique)
///   wins:         INT
///   losses:       INT
///   total_score:  INT
///   created_at:   DATETIME
/// }
/// ```
///
/// `wins + losses` equals the number of completed matches the model played;
/// rebuildable from `matches` at any time.
async fn init_models_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing models table");

    let sql = r#"
        DEFINE TABLE models AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX idx_model_id ON TABLE models COLUMNS model_id UNIQUE;
        DEFINE INDEX idx_model_name ON TABLE models COLUMNS name UNIQUE;
    "#;

    db.query(sql).await?;
    info!("✓ models table initialized");
    Ok(())
}

/// Initialize `matches` table
///
/// Schema:
/// ```text
/// TABLE matches {
///   match_id:             STRING (unique)
///   model_a_id:           STRING (indexed)
///   model_b_id:           STRING (indexed)
///   model_a_final_score:  INT?
///   model_b_final_score:  INT?
///   winner_id:            STRING? (NONE = tie or unfinished)
///   status:               STRING (in_progress | completed | failed | aborted)
///   created_at:           DATETIME
/// }
/// ```
///
/// Status transitions in_progress → completed | failed | aborted are enforced
/// by the conditional UPDATE in the store.
async fn init_matches_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing matches table");

    let sql = r#"
        DEFINE TABLE matches AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX idx_match_id ON TABLE matches COLUMNS match_id UNIQUE;
        DEFINE INDEX idx_match_status ON TABLE matches COLUMNS status;
        DEFINE INDEX idx_match_model_a ON TABLE matches COLUMNS model_a_id;
        DEFINE INDEX idx_match_model_b ON TABLE matches COLUMNS model_b_id;
        DEFINE INDEX idx_match_created_at ON TABLE matches COLUMNS created_at;
    "#;

    db.query(sql).await?;
    info!("✓ matches table initialized");
    Ok(())
}

/// Initialize `rounds` table
///
/// Schema:
/// ```text
/// TABLE rounds {
///   round_id:           STRING (unique)
///   match_id:           STRING (foreign key to matches.match_id)
///   round_number:       INT (1-indexed, gap-free)
///   model_a_move:       STRING (COOPERATE | DEFECT)
///   model_b_move:       STRING (COOPERATE | DEFECT)
///   model_a_reasoning:  STRING
///   model_b_reasoning:  STRING
///   model_a_score:      INT
///   model_b_score:      INT
///   created_at:         DATETIME
/// }
/// ```
///
/// Rounds are immutable once written.
async fn init_rounds_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing rounds table");

    let sql = r#"
        DEFINE TABLE rounds AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        -- (match_id, round_number) is the backstop against duplicate rounds
        DEFINE INDEX idx_round_match_number ON TABLE rounds COLUMNS match_id, round_number UNIQUE;
        DEFINE INDEX idx_round_id ON TABLE rounds COLUMNS round_id UNIQUE;
        DEFINE INDEX idx_round_match ON TABLE rounds COLUMNS match_id;
    "#;

    db.query(sql).await?;
    info!("✓ rounds table initialized");
    Ok(())
}
