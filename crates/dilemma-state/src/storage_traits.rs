//! Storage trait and typed records for Dilemma Arena
//!
//! The match engine, the metrics aggregator and the tournament scheduler only
//! ever speak these types. Backends map their own row shapes into them at the
//! boundary (see `schema` for the SurrealDB rows).
//!
//! - `ModelRecord`: one LLM backend identity plus its cached aggregates
//! - `MatchRecord`: one contest between two models
//! - `RoundRecord`: one immutable simultaneous-move step of a match
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a model
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(pub String);

impl ModelId {
    /// Generate a new random ModelId
    pub fn new() -> Self {
        ModelId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a match
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId(pub String);

impl MatchId {
    /// Generate a new random MatchId
    pub fn new() -> Self {
        MatchId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Moves, sides, statuses
// ---------------------------------------------------------------------------

/// A per-round decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Move {
    Cooperate,
    Defect,
}

impl Move {
    pub const ALL: [Move; 2] = [Move::Cooperate, Move::Defect];

    pub fn as_str(self) -> &'static str {
        match self {
            Move::Cooperate => "COOPERATE",
            Move::Defect => "DEFECT",
        }
    }

    pub fn is_cooperate(self) -> bool {
        self == Move::Cooperate
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Move {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COOPERATE" => Ok(Move::Cooperate),
            "DEFECT" => Ok(Move::Defect),
            other => Err(StorageError::InvalidRecord(format!("unknown move: {other}"))),
        }
    }
}

/// Which seat a model occupied in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

/// Lifecycle of a match.
///
/// Transitions only forward: `InProgress → Completed | Failed | Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    InProgress,
    Completed,
    Failed,
    Aborted,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::InProgress => "in_progress",
            MatchStatus::Completed => "completed",
            MatchStatus::Failed => "failed",
            MatchStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != MatchStatus::InProgress
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(MatchStatus::InProgress),
            "completed" => Ok(MatchStatus::Completed),
            "failed" => Ok(MatchStatus::Failed),
            "aborted" => Ok(MatchStatus::Aborted),
            other => Err(StorageError::InvalidRecord(format!(
                "unknown match status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Aggregate win/loss/score counters for a model.
///
/// A cache over match history: ties count as a loss for both sides, and the
/// whole thing can be rebuilt from completed matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    pub wins: u32,
    pub losses: u32,
    pub total_score: u64,
}

impl ModelStats {
    pub fn games_played(&self) -> u32 {
        self.wins + self.losses
    }

    /// Average final score per completed match (0 when no games).
    pub fn average_score(&self) -> f64 {
        match self.games_played() {
            0 => 0.0,
            games => self.total_score as f64 / games as f64,
        }
    }

    /// Fold one completed match into the counters.
    pub fn record(&mut self, score: u32, won: bool) {
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.total_score += u64::from(score);
    }
}

/// Identity of one LLM backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: ModelId,
    /// Backend model identifier, e.g. `anthropic/claude-sonnet-4`
    pub name: String,
    pub wins: u32,
    pub losses: u32,
    pub total_score: u64,
    pub created_at: DateTime<Utc>,
}

impl ModelRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ModelId::new(),
            name: name.into(),
            wins: 0,
            losses: 0,
            total_score: 0,
            created_at: Utc::now(),
        }
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            wins: self.wins,
            losses: self.losses,
            total_score: self.total_score,
        }
    }

    pub fn set_stats(&mut self, stats: ModelStats) {
        self.wins = stats.wins;
        self.losses = stats.losses;
        self.total_score = stats.total_score;
    }
}

/// One contest between two models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub created_at: DateTime<Utc>,
    pub model_a_id: ModelId,
    pub model_b_id: ModelId,
    /// Unset until the match leaves `InProgress`; partial for failed/aborted matches
    pub model_a_final_score: Option<u32>,
    pub model_b_final_score: Option<u32>,
    /// `None` on a completed match means a tie
    pub winner_id: Option<ModelId>,
    pub status: MatchStatus,
}

impl MatchRecord {
    pub fn new(model_a_id: ModelId, model_b_id: ModelId) -> Self {
        Self {
            id: MatchId::new(),
            created_at: Utc::now(),
            model_a_id,
            model_b_id,
            model_a_final_score: None,
            model_b_final_score: None,
            winner_id: None,
            status: MatchStatus::InProgress,
        }
    }

    /// Side played by `model`, if it took part in this match.
    pub fn side_of(&self, model: &ModelId) -> Option<Side> {
        if &self.model_a_id == model {
            Some(Side::A)
        } else if &self.model_b_id == model {
            Some(Side::B)
        } else {
            None
        }
    }

    /// True when the two models played each other here, in either seat.
    pub fn is_between(&self, x: &ModelId, y: &ModelId) -> bool {
        (&self.model_a_id == x && &self.model_b_id == y)
            || (&self.model_a_id == y && &self.model_b_id == x)
    }
}

/// Input for appending a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRound {
    pub match_id: MatchId,
    /// 1-based, gap-free within the match
    pub round_number: u32,
    pub model_a_move: Move,
    pub model_b_move: Move,
    pub model_a_reasoning: String,
    pub model_b_reasoning: String,
    pub model_a_score: u32,
    pub model_b_score: u32,
}

/// One persisted round. Never updated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub id: String,
    pub match_id: MatchId,
    pub round_number: u32,
    pub model_a_move: Move,
    pub model_b_move: Move,
    pub model_a_reasoning: String,
    pub model_b_reasoning: String,
    pub model_a_score: u32,
    pub model_b_score: u32,
    pub created_at: DateTime<Utc>,
}

impl RoundRecord {
    pub fn from_new(round: NewRound) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            match_id: round.match_id,
            round_number: round.round_number,
            model_a_move: round.model_a_move,
            model_b_move: round.model_b_move,
            model_a_reasoning: round.model_a_reasoning,
            model_b_reasoning: round.model_b_reasoning,
            model_a_score: round.model_a_score,
            model_b_score: round.model_b_score,
            created_at: Utc::now(),
        }
    }
}

/// A round seen from one participant's seat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRound {
    pub side: Side,
    pub round: RoundRecord,
}

impl ParticipantRound {
    pub fn my_move(&self) -> Move {
        match self.side {
            Side::A => self.round.model_a_move,
            Side::B => self.round.model_b_move,
        }
    }

    pub fn opponent_move(&self) -> Move {
        match self.side {
            Side::A => self.round.model_b_move,
            Side::B => self.round.model_a_move,
        }
    }

    pub fn my_score(&self) -> u32 {
        match self.side {
            Side::A => self.round.model_a_score,
            Side::B => self.round.model_b_score,
        }
    }
}

// ---------------------------------------------------------------------------
// ArenaStore — persistence port
// ---------------------------------------------------------------------------

/// Persistence port for the arena.
///
/// Guarantees:
/// - Model names are unique; `upsert_model` is idempotent per name.
/// - Rounds are append-only and numbered `1..=k` without gaps.
/// - Match status transitions: InProgress → Completed | Failed | Aborted (terminal).
/// - Rounds can only be appended while the match is InProgress.
#[async_trait]
pub trait ArenaStore: Send + Sync {
    /// Resolve a model by name, creating it with zeroed aggregates if absent.
    async fn upsert_model(&self, name: &str) -> StorageResult<ModelRecord>;

    /// Retrieve a model by ID. Returns `StorageError::ModelNotFound` if absent.
    async fn get_model(&self, id: &ModelId) -> StorageResult<ModelRecord>;

    /// Look a model up by its unique name.
    async fn find_model(&self, name: &str) -> StorageResult<Option<ModelRecord>>;

    /// All models, ordered by name.
    async fn list_models(&self) -> StorageResult<Vec<ModelRecord>>;

    /// Overwrite a model's aggregates (reconciliation path).
    async fn set_model_stats(&self, id: &ModelId, stats: ModelStats) -> StorageResult<()>;

    /// Atomically fold one completed match into a model's aggregates.
    async fn record_outcome(&self, id: &ModelId, score: u32, won: bool) -> StorageResult<()>;

    /// Insert a new match in `InProgress` with unset scores.
    async fn create_match(
        &self,
        model_a_id: &ModelId,
        model_b_id: &ModelId,
    ) -> StorageResult<MatchRecord>;

    /// Append the next round of an in-progress match.
    async fn append_round(&self, round: NewRound) -> StorageResult<RoundRecord>;

    /// Mark a match completed with final scores and winner (`None` = tie).
    async fn complete_match(
        &self,
        match_id: &MatchId,
        model_a_score: u32,
        model_b_score: u32,
        winner_id: Option<&ModelId>,
    ) -> StorageResult<MatchRecord>;

    /// Move a match to `Failed` or `Aborted`, keeping partial scores.
    async fn terminate_match(
        &self,
        match_id: &MatchId,
        status: MatchStatus,
        model_a_score: u32,
        model_b_score: u32,
    ) -> StorageResult<MatchRecord>;

    /// Retrieve a match by ID. Returns `StorageError::MatchNotFound` if absent.
    async fn get_match(&self, id: &MatchId) -> StorageResult<MatchRecord>;

    /// List matches, newest first, optionally filtered by status.
    async fn list_matches(&self, status: Option<MatchStatus>) -> StorageResult<Vec<MatchRecord>>;

    /// All rounds of a match in ascending round order.
    async fn get_rounds(&self, match_id: &MatchId) -> StorageResult<Vec<RoundRecord>>;

    /// Completed matches between two models, in either seat order.
    async fn count_completed_between(&self, x: &ModelId, y: &ModelId) -> StorageResult<u32>;

    /// Rounds of completed matches the model took part in, tagged with its side.
    async fn rounds_for_model(&self, id: &ModelId) -> StorageResult<Vec<ParticipantRound>>;
}

/// Validate that `round` is the next round for a match whose last persisted
/// round number is `last`.
pub fn check_round_order(
    match_id: &MatchId,
    last: Option<u32>,
    round: &NewRound,
) -> StorageResult<()> {
    let expected = last.unwrap_or(0) + 1;
    if round.round_number != expected {
        return Err(StorageError::RoundOutOfOrder {
            match_id: match_id.0.clone(),
            expected,
            got: round.round_number,
        });
    }
    Ok(())
}

/// Guard a write that requires the match to still be in progress.
pub fn check_in_progress(record: &MatchRecord) -> StorageResult<()> {
    if record.status != MatchStatus::InProgress {
        return Err(StorageError::InvalidMatchState {
            match_id: record.id.0.clone(),
            status: record.status.to_string(),
            expected: MatchStatus::InProgress.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_round_trips_through_str() {
        for mv in Move::ALL {
            assert_eq!(mv.as_str().parse::<Move>().unwrap(), mv);
        }
        assert_eq!("cooperate".parse::<Move>().unwrap(), Move::Cooperate);
        assert!("SHRUG".parse::<Move>().is_err());
    }

    #[test]
    fn move_serializes_uppercase() {
        let json = serde_json::to_string(&Move::Defect).unwrap();
        assert_eq!(json, "\"DEFECT\"");
    }

    #[test]
    fn status_terminality() {
        assert!(!MatchStatus::InProgress.is_terminal());
        assert!(MatchStatus::Completed.is_terminal());
        assert!(MatchStatus::Failed.is_terminal());
        assert!(MatchStatus::Aborted.is_terminal());
        assert_eq!("aborted".parse::<MatchStatus>().unwrap(), MatchStatus::Aborted);
    }

    #[test]
    fn stats_record_counts_tie_as_loss() {
        let mut stats = ModelStats::default();
        stats.record(45, true);
        stats.record(30, false);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.total_score, 75);
        assert!((stats.average_score() - 37.5).abs() < f64::EPSILON);
    }

    #[test]
    fn side_of_and_is_between() {
        let a = ModelId::new();
        let b = ModelId::new();
        let m = MatchRecord::new(a.clone(), b.clone());
        assert_eq!(m.side_of(&a), Some(Side::A));
        assert_eq!(m.side_of(&b), Some(Side::B));
        assert_eq!(m.side_of(&ModelId::new()), None);
        assert!(m.is_between(&b, &a));
    }

    #[test]
    fn round_order_rejects_gaps() {
        let mid = MatchId::new();
        let round = NewRound {
            match_id: mid.clone(),
            round_number: 3,
            model_a_move: Move::Cooperate,
            model_b_move: Move::Cooperate,
            model_a_reasoning: String::new(),
            model_b_reasoning: String::new(),
            model_a_score: 3,
            model_b_score: 3,
        };
        assert!(check_round_order(&mid, Some(2), &round).is_ok());
        assert!(matches!(
            check_round_order(&mid, Some(1), &round),
            Err(StorageError::RoundOutOfOrder { expected: 2, got: 3, .. })
        ));
    }

    #[test]
    fn participant_round_perspective() {
        let round = RoundRecord::from_new(NewRound {
            match_id: MatchId::new(),
            round_number: 1,
            model_a_move: Move::Cooperate,
            model_b_move: Move::Defect,
            model_a_reasoning: "a".to_string(),
            model_b_reasoning: "b".to_string(),
            model_a_score: 0,
            model_b_score: 5,
        });
        let as_b = ParticipantRound {
            side: Side::B,
            round,
        };
        assert_eq!(as_b.my_move(), Move::Defect);
        assert_eq!(as_b.opponent_move(), Move::Cooperate);
        assert_eq!(as_b.my_score(), 5);
    }
}
