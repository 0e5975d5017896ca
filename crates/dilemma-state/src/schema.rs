//! Row definitions for Dilemma Arena SurrealDB tables
//!
//! Tables:
//! - models: LLM backend identities and their cached aggregates
//! - matches: one row per contest, status moves forward only
//! - rounds: append-only round log, unique on (match_id, round_number)
//!
//! Rows never leave this crate's backend untyped: `into_*` converts them to
//! the records in `storage_traits` at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{
    MatchId, MatchRecord, MatchStatus, ModelId, ModelRecord, Move, RoundRecord, StorageResult,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Model row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Model UUID
    pub model_id: String,
    /// Backend model identifier (unique)
    pub name: String,
    pub wins: u64,
    pub losses: u64,
    pub total_score: u64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ModelRow {
    pub fn from_record(record: &ModelRecord) -> Self {
        ModelRow {
            id: None,
            model_id: record.id.0.clone(),
            name: record.name.clone(),
            wins: u64::from(record.wins),
            losses: u64::from(record.losses),
            total_score: record.total_score,
            created_at: record.created_at,
        }
    }

    pub fn into_record(self) -> ModelRecord {
        ModelRecord {
            id: ModelId(self.model_id),
            name: self.name,
            wins: self.wins as u32,
            losses: self.losses as u32,
            total_score: self.total_score,
            created_at: self.created_at,
        }
    }
}

/// Match row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Match UUID
    pub match_id: String,
    pub model_a_id: String,
    pub model_b_id: String,
    #[serde(default)]
    pub model_a_final_score: Option<u64>,
    #[serde(default)]
    pub model_b_final_score: Option<u64>,
    #[serde(default)]
    pub winner_id: Option<String>,
    /// "in_progress" | "completed" | "failed" | "aborted"
    pub status: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl MatchRow {
    pub fn from_record(record: &MatchRecord) -> Self {
        MatchRow {
            id: None,
            match_id: record.id.0.clone(),
            model_a_id: record.model_a_id.0.clone(),
            model_b_id: record.model_b_id.0.clone(),
            model_a_final_score: record.model_a_final_score.map(u64::from),
            model_b_final_score: record.model_b_final_score.map(u64::from),
            winner_id: record.winner_id.as_ref().map(|w| w.0.clone()),
            status: record.status.as_str().to_string(),
            created_at: record.created_at,
        }
    }

    pub fn into_record(self) -> StorageResult<MatchRecord> {
        let status: MatchStatus = self.status.parse()?;
        Ok(MatchRecord {
            id: MatchId(self.match_id),
            created_at: self.created_at,
            model_a_id: ModelId(self.model_a_id),
            model_b_id: ModelId(self.model_b_id),
            model_a_final_score: self.model_a_final_score.map(|s| s as u32),
            model_b_final_score: self.model_b_final_score.map(|s| s as u32),
            winner_id: self.winner_id.map(ModelId),
            status,
        })
    }
}

/// Round row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Round UUID
    pub round_id: String,
    pub match_id: String,
    /// 1-indexed, gap-free within a match
    pub round_number: u64,
    pub model_a_move: String,
    pub model_b_move: String,
    pub model_a_reasoning: String,
    pub model_b_reasoning: String,
    pub model_a_score: u64,
    pub model_b_score: u64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl RoundRow {
    pub fn from_record(record: &RoundRecord) -> Self {
        RoundRow {
            id: None,
            round_id: record.id.clone(),
            match_id: record.match_id.0.clone(),
            round_number: u64::from(record.round_number),
            model_a_move: record.model_a_move.as_str().to_string(),
            model_b_move: record.model_b_move.as_str().to_string(),
            model_a_reasoning: record.model_a_reasoning.clone(),
            model_b_reasoning: record.model_b_reasoning.clone(),
            model_a_score: u64::from(record.model_a_score),
            model_b_score: u64::from(record.model_b_score),
            created_at: record.created_at,
        }
    }

    pub fn into_record(self) -> StorageResult<RoundRecord> {
        let model_a_move: Move = self.model_a_move.parse()?;
        let model_b_move: Move = self.model_b_move.parse()?;
        Ok(RoundRecord {
            id: self.round_id,
            match_id: MatchId(self.match_id),
            round_number: self.round_number as u32,
            model_a_move,
            model_b_move,
            model_a_reasoning: self.model_a_reasoning,
            model_b_reasoning: self.model_b_reasoning,
            model_a_score: self.model_a_score as u32,
            model_b_score: self.model_b_score as u32,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_traits::NewRound;

    #[test]
    fn match_row_serializes_status_as_snake_case() {
        let record = MatchRecord::new(ModelId::new(), ModelId::new());
        let row = MatchRow::from_record(&record);
        let json = serde_json::to_string(&row).expect("Failed to serialize");
        assert!(json.contains("\"status\":\"in_progress\""));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn round_row_converts_back_to_record() {
        let record = RoundRecord::from_new(NewRound {
            match_id: MatchId::new(),
            round_number: 7,
            model_a_move: Move::Defect,
            model_b_move: Move::Cooperate,
            model_a_reasoning: "they trusted me".to_string(),
            model_b_reasoning: "building trust".to_string(),
            model_a_score: 5,
            model_b_score: 0,
        });
        let back = RoundRow::from_record(&record).into_record().unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn match_row_with_unknown_status_is_rejected() {
        let mut row = MatchRow::from_record(&MatchRecord::new(ModelId::new(), ModelId::new()));
        row.status = "paused".to_string();
        assert!(row.into_record().is_err());
    }
}
