//! In-memory fake for the storage trait (testing only)
//!
//! Provides `MemoryArenaStore`, which satisfies the `ArenaStore` contract
//! without any external dependencies, plus hooks to inject write failures
//! for exercising the engine's persistence-failure paths.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Inner {
    models: HashMap<ModelId, ModelRecord>,
    matches: HashMap<MatchId, MatchRecord>,
    rounds: HashMap<MatchId, Vec<RoundRecord>>,
    fail_appends_from: Option<u32>,
    fail_outcomes_for: Vec<ModelId>,
    fail_terminations: bool,
}

/// In-memory arena store backed by `HashMap`s behind a single mutex.
#[derive(Debug, Default)]
pub struct MemoryArenaStore {
    inner: Mutex<Inner>,
}

impl MemoryArenaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `append_round` with `round_number >= round` fail with a
    /// backend error.
    pub fn fail_appends_from(&self, round: u32) {
        self.inner.lock().unwrap().fail_appends_from = Some(round);
    }

    /// Make `record_outcome` fail for `id`.
    pub fn fail_outcomes_for(&self, id: &ModelId) {
        self.inner.lock().unwrap().fail_outcomes_for.push(id.clone());
    }

    /// Make every `terminate_match` fail with a backend error.
    pub fn fail_terminations(&self) {
        self.inner.lock().unwrap().fail_terminations = true;
    }

    /// Seed a match directly (tests for reconciliation and metrics).
    pub fn insert_match(&self, record: MatchRecord) {
        self.inner
            .lock()
            .unwrap()
            .matches
            .insert(record.id.clone(), record);
    }

    /// Seed a round directly, bypassing the ordering checks.
    pub fn insert_round(&self, record: RoundRecord) {
        self.inner
            .lock()
            .unwrap()
            .rounds
            .entry(record.match_id.clone())
            .or_default()
            .push(record);
    }
}

fn finish(
    inner: &mut Inner,
    match_id: &MatchId,
    status: MatchStatus,
    model_a_score: u32,
    model_b_score: u32,
    winner_id: Option<&ModelId>,
) -> StorageResult<MatchRecord> {
    let record = inner
        .matches
        .get_mut(match_id)
        .ok_or_else(|| StorageError::MatchNotFound {
            id: match_id.0.clone(),
        })?;
    check_in_progress(record)?;
    record.status = status;
    record.model_a_final_score = Some(model_a_score);
    record.model_b_final_score = Some(model_b_score);
    record.winner_id = winner_id.cloned();
    Ok(record.clone())
}

#[async_trait]
impl ArenaStore for MemoryArenaStore {
    async fn upsert_model(&self, name: &str) -> StorageResult<ModelRecord> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.models.values().find(|m| m.name == name) {
            return Ok(existing.clone());
        }
        let record = ModelRecord::new(name);
        inner.models.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_model(&self, id: &ModelId) -> StorageResult<ModelRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .models
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::ModelNotFound { id: id.0.clone() })
    }

    async fn find_model(&self, name: &str) -> StorageResult<Option<ModelRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.models.values().find(|m| m.name == name).cloned())
    }

    async fn list_models(&self) -> StorageResult<Vec<ModelRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut models: Vec<ModelRecord> = inner.models.values().cloned().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    async fn set_model_stats(&self, id: &ModelId, stats: ModelStats) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let model = inner
            .models
            .get_mut(id)
            .ok_or_else(|| StorageError::ModelNotFound { id: id.0.clone() })?;
        model.set_stats(stats);
        Ok(())
    }

    async fn record_outcome(&self, id: &ModelId, score: u32, won: bool) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_outcomes_for.contains(id) {
            return Err(StorageError::Backend(format!(
                "injected outcome failure for model {id}"
            )));
        }
        let model = inner
            .models
            .get_mut(id)
            .ok_or_else(|| StorageError::ModelNotFound { id: id.0.clone() })?;
        let mut stats = model.stats();
        stats.record(score, won);
        model.set_stats(stats);
        Ok(())
    }

    async fn create_match(
        &self,
        model_a_id: &ModelId,
        model_b_id: &ModelId,
    ) -> StorageResult<MatchRecord> {
        let mut inner = self.inner.lock().unwrap();
        for id in [model_a_id, model_b_id] {
            if !inner.models.contains_key(id) {
                return Err(StorageError::ModelNotFound { id: id.0.clone() });
            }
        }
        let record = MatchRecord::new(model_a_id.clone(), model_b_id.clone());
        inner.matches.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn append_round(&self, round: NewRound) -> StorageResult<RoundRecord> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(from) = inner.fail_appends_from {
            if round.round_number >= from {
                return Err(StorageError::Backend(format!(
                    "injected append failure at round {}",
                    round.round_number
                )));
            }
        }
        let record = inner
            .matches
            .get(&round.match_id)
            .ok_or_else(|| StorageError::MatchNotFound {
                id: round.match_id.0.clone(),
            })?;
        check_in_progress(record)?;

        let last = inner
            .rounds
            .get(&round.match_id)
            .and_then(|rs| rs.iter().map(|r| r.round_number).max());
        check_round_order(&round.match_id, last, &round)?;

        let stored = RoundRecord::from_new(round);
        inner
            .rounds
            .entry(stored.match_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn complete_match(
        &self,
        match_id: &MatchId,
        model_a_score: u32,
        model_b_score: u32,
        winner_id: Option<&ModelId>,
    ) -> StorageResult<MatchRecord> {
        let mut inner = self.inner.lock().unwrap();
        finish(
            &mut inner,
            match_id,
            MatchStatus::Completed,
            model_a_score,
            model_b_score,
            winner_id,
        )
    }

    async fn terminate_match(
        &self,
        match_id: &MatchId,
        status: MatchStatus,
        model_a_score: u32,
        model_b_score: u32,
    ) -> StorageResult<MatchRecord> {
        if !matches!(status, MatchStatus::Failed | MatchStatus::Aborted) {
            return Err(StorageError::InvalidRecord(format!(
                "terminate_match requires failed or aborted, got {status}"
            )));
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_terminations {
            return Err(StorageError::Backend(format!(
                "injected terminate failure for match {match_id}"
            )));
        }
        finish(
            &mut inner,
            match_id,
            status,
            model_a_score,
            model_b_score,
            None,
        )
    }

    async fn get_match(&self, id: &MatchId) -> StorageResult<MatchRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .matches
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::MatchNotFound { id: id.0.clone() })
    }

    async fn list_matches(&self, status: Option<MatchStatus>) -> StorageResult<Vec<MatchRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut matches: Vec<MatchRecord> = inner
            .matches
            .values()
            .filter(|m| status.map(|s| m.status == s).unwrap_or(true))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn get_rounds(&self, match_id: &MatchId) -> StorageResult<Vec<RoundRecord>> {
        let inner = self.inner.lock().unwrap();
        if !inner.matches.contains_key(match_id) {
            return Err(StorageError::MatchNotFound {
                id: match_id.0.clone(),
            });
        }
        let mut rounds = inner.rounds.get(match_id).cloned().unwrap_or_default();
        rounds.sort_by_key(|r| r.round_number);
        Ok(rounds)
    }

    async fn count_completed_between(&self, x: &ModelId, y: &ModelId) -> StorageResult<u32> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .matches
            .values()
            .filter(|m| m.status == MatchStatus::Completed && m.is_between(x, y))
            .count();
        Ok(count as u32)
    }

    async fn rounds_for_model(&self, id: &ModelId) -> StorageResult<Vec<ParticipantRound>> {
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::new();
        for record in inner.matches.values() {
            if record.status != MatchStatus::Completed {
                continue;
            }
            let Some(side) = record.side_of(id) else {
                continue;
            };
            if let Some(rounds) = inner.rounds.get(&record.id) {
                out.extend(rounds.iter().cloned().map(|round| ParticipantRound { side, round }));
            }
        }
        Ok(out)
    }
}
