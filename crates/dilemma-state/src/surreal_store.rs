//! SurrealDB-backed ArenaStore implementation
//!
//! Uses `schema::{ModelRow, MatchRow, RoundRow}` for persistence, converting
//! to/from `storage_traits` types at the boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::connection;
use crate::error::StorageError;
use crate::schema::{MatchRow, ModelRow, RoundRow};
use crate::storage_traits::{
    check_in_progress, check_round_order, ArenaStore, MatchId, MatchRecord, MatchStatus, ModelId,
    ModelRecord, ModelStats, NewRound, ParticipantRound, RoundRecord, StorageResult,
};

/// SurrealDB-backed implementation of [`ArenaStore`].
pub struct SurrealArenaStore {
    db: Surreal<Any>,
}

#[derive(Debug, Deserialize)]
struct RoundNumberRow {
    round_number: u64,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: u64,
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

impl SurrealArenaStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `dilemma/arena`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = connection::connect_url("mem://").await?;
        info!("SurrealArenaStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect to an explicit SurrealDB URL (`mem://`, `surrealkv://path`, `ws://host`).
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let db = connection::connect_url(url).await?;
        info!("SurrealArenaStore connected ({})", url);
        Ok(Self { db })
    }

    /// Connect to SurrealDB Cloud.
    pub async fn cloud(config: &connection::CloudConfig) -> crate::Result<Self> {
        let db = connection::connect_cloud(config).await?;
        info!("SurrealArenaStore connected (cloud)");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Cloud credentials win, then `SURREALDB_URL`, then local persistence.
    #[instrument(skip_all)]
    pub async fn from_env() -> crate::Result<Self> {
        let db = connection::connect_from_env().await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_model(&self, id: &ModelId) -> StorageResult<ModelRow> {
        let id_owned = id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM models WHERE model_id = $id")
            .bind(("id", id_owned))
            .await
            .map_err(backend)?;

        let rows: Vec<ModelRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::ModelNotFound { id: id.0.clone() })
    }

    async fn fetch_match(&self, mid: &MatchId) -> StorageResult<MatchRow> {
        let mid_owned = mid.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM matches WHERE match_id = $mid")
            .bind(("mid", mid_owned))
            .await
            .map_err(backend)?;

        let rows: Vec<MatchRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::MatchNotFound { id: mid.0.clone() })
    }

    async fn last_round_number(&self, mid: &MatchId) -> StorageResult<Option<u32>> {
        let mid_owned = mid.0.clone();
        let mut res = self
            .db
            .query(
                "SELECT round_number FROM rounds WHERE match_id = $mid \
                 ORDER BY round_number DESC LIMIT 1",
            )
            .bind(("mid", mid_owned))
            .await
            .map_err(backend)?;

        let rows: Vec<RoundNumberRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(|r| r.round_number as u32))
    }

    /// Move an in-progress match to `status`. The `status = 'in_progress'`
    /// guard makes the transition a compare-and-set.
    async fn finish(
        &self,
        mid: &MatchId,
        status: MatchStatus,
        model_a_score: u32,
        model_b_score: u32,
        winner_id: Option<&ModelId>,
    ) -> StorageResult<MatchRecord> {
        let current = self.fetch_match(mid).await?.into_record()?;
        check_in_progress(&current)?;

        let mut res = self
            .db
            .query(
                "UPDATE matches SET status = $status, \
                 model_a_final_score = $a, model_b_final_score = $b, winner_id = $winner \
                 WHERE match_id = $mid AND status = 'in_progress' RETURN AFTER",
            )
            .bind(("status", status.as_str().to_string()))
            .bind(("a", u64::from(model_a_score)))
            .bind(("b", u64::from(model_b_score)))
            .bind(("winner", winner_id.map(|w| w.0.clone())))
            .bind(("mid", mid.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<MatchRow> = res.take(0).map_err(backend)?;
        match rows.into_iter().next() {
            Some(row) => row.into_record(),
            // Lost a race with another writer between the read and the update
            None => {
                let latest = self.fetch_match(mid).await?;
                Err(StorageError::InvalidMatchState {
                    match_id: mid.0.clone(),
                    status: latest.status,
                    expected: MatchStatus::InProgress.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl ArenaStore for SurrealArenaStore {
    #[instrument(skip(self), fields(model = %name))]
    async fn upsert_model(&self, name: &str) -> StorageResult<ModelRecord> {
        if let Some(existing) = self.find_model(name).await? {
            return Ok(existing);
        }

        let record = ModelRecord::new(name);
        debug!(model = %name, model_id = %record.id, "registering model");

        let created: StorageResult<Option<ModelRow>> = self
            .db
            .create("models")
            .content(ModelRow::from_record(&record))
            .await
            .map_err(backend);

        match created {
            Ok(_) => Ok(record),
            // Unique index on name: a concurrent writer registered it first
            Err(err) => match self.find_model(name).await? {
                Some(existing) => Ok(existing),
                None => Err(err),
            },
        }
    }

    async fn get_model(&self, id: &ModelId) -> StorageResult<ModelRecord> {
        Ok(self.fetch_model(id).await?.into_record())
    }

    async fn find_model(&self, name: &str) -> StorageResult<Option<ModelRecord>> {
        let name_owned = name.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM models WHERE name = $name")
            .bind(("name", name_owned))
            .await
            .map_err(backend)?;

        let rows: Vec<ModelRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(ModelRow::into_record))
    }

    async fn list_models(&self) -> StorageResult<Vec<ModelRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM models ORDER BY name ASC")
            .await
            .map_err(backend)?;

        let rows: Vec<ModelRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(ModelRow::into_record).collect())
    }

    #[instrument(skip(self, stats), fields(model_id = %id))]
    async fn set_model_stats(&self, id: &ModelId, stats: ModelStats) -> StorageResult<()> {
        let mut res = self
            .db
            .query(
                "UPDATE models SET wins = $wins, losses = $losses, total_score = $total \
                 WHERE model_id = $id RETURN AFTER",
            )
            .bind(("wins", u64::from(stats.wins)))
            .bind(("losses", u64::from(stats.losses)))
            .bind(("total", stats.total_score))
            .bind(("id", id.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<ModelRow> = res.take(0).map_err(backend)?;
        if rows.is_empty() {
            return Err(StorageError::ModelNotFound { id: id.0.clone() });
        }
        Ok(())
    }

    #[instrument(skip(self, id), fields(model_id = %id))]
    async fn record_outcome(&self, id: &ModelId, score: u32, won: bool) -> StorageResult<()> {
        let (wins, losses) = if won { (1u64, 0u64) } else { (0, 1) };
        let mut res = self
            .db
            .query(
                "UPDATE models SET wins += $wins, losses += $losses, total_score += $score \
                 WHERE model_id = $id RETURN AFTER",
            )
            .bind(("wins", wins))
            .bind(("losses", losses))
            .bind(("score", u64::from(score)))
            .bind(("id", id.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<ModelRow> = res.take(0).map_err(backend)?;
        if rows.is_empty() {
            return Err(StorageError::ModelNotFound { id: id.0.clone() });
        }
        Ok(())
    }

    #[instrument(skip_all, fields(model_a_id = %model_a_id, model_b_id = %model_b_id))]
    async fn create_match(
        &self,
        model_a_id: &ModelId,
        model_b_id: &ModelId,
    ) -> StorageResult<MatchRecord> {
        self.fetch_model(model_a_id).await?;
        self.fetch_model(model_b_id).await?;

        let record = MatchRecord::new(model_a_id.clone(), model_b_id.clone());
        debug!(match_id = %record.id, "creating match");

        let _created: Option<MatchRow> = self
            .db
            .create("matches")
            .content(MatchRow::from_record(&record))
            .await
            .map_err(backend)?;

        Ok(record)
    }

    #[instrument(skip(self, round), fields(match_id = %round.match_id, round = round.round_number))]
    async fn append_round(&self, round: NewRound) -> StorageResult<RoundRecord> {
        let current = self.fetch_match(&round.match_id).await?.into_record()?;
        check_in_progress(&current)?;

        let last = self.last_round_number(&round.match_id).await?;
        check_round_order(&round.match_id, last, &round)?;

        let stored = RoundRecord::from_new(round);
        let _created: Option<RoundRow> = self
            .db
            .create("rounds")
            .content(RoundRow::from_record(&stored))
            .await
            .map_err(backend)?;

        Ok(stored)
    }

    #[instrument(skip(self, match_id, winner_id), fields(match_id = %match_id))]
    async fn complete_match(
        &self,
        match_id: &MatchId,
        model_a_score: u32,
        model_b_score: u32,
        winner_id: Option<&ModelId>,
    ) -> StorageResult<MatchRecord> {
        self.finish(
            match_id,
            MatchStatus::Completed,
            model_a_score,
            model_b_score,
            winner_id,
        )
        .await
    }

    #[instrument(skip_all, fields(match_id = %match_id, status = %status))]
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
        self.finish(match_id, status, model_a_score, model_b_score, None)
            .await
    }

    async fn get_match(&self, id: &MatchId) -> StorageResult<MatchRecord> {
        self.fetch_match(id).await?.into_record()
    }

    async fn list_matches(&self, status: Option<MatchStatus>) -> StorageResult<Vec<MatchRecord>> {
        let rows: Vec<MatchRow> = if let Some(status) = status {
            let mut res = self
                .db
                .query("SELECT * FROM matches WHERE status = $status ORDER BY created_at DESC")
                .bind(("status", status.as_str().to_string()))
                .await
                .map_err(backend)?;
            res.take(0).map_err(backend)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM matches ORDER BY created_at DESC")
                .await
                .map_err(backend)?;
            res.take(0).map_err(backend)?
        };

        rows.into_iter().map(MatchRow::into_record).collect()
    }

    async fn get_rounds(&self, match_id: &MatchId) -> StorageResult<Vec<RoundRecord>> {
        // Verify match exists
        self.fetch_match(match_id).await?;

        let mut res = self
            .db
            .query("SELECT * FROM rounds WHERE match_id = $mid ORDER BY round_number ASC")
            .bind(("mid", match_id.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<RoundRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(RoundRow::into_record).collect()
    }

    async fn count_completed_between(&self, x: &ModelId, y: &ModelId) -> StorageResult<u32> {
        let mut res = self
            .db
            .query(
                "SELECT count() AS count FROM matches WHERE status = 'completed' AND \
                 ((model_a_id = $x AND model_b_id = $y) OR (model_a_id = $y AND model_b_id = $x)) \
                 GROUP ALL",
            )
            .bind(("x", x.0.clone()))
            .bind(("y", y.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<CountRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(|r| r.count as u32).unwrap_or(0))
    }

    #[instrument(skip_all, fields(model_id = %id))]
    async fn rounds_for_model(&self, id: &ModelId) -> StorageResult<Vec<ParticipantRound>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM matches WHERE status = 'completed' AND \
                 (model_a_id = $id OR model_b_id = $id)",
            )
            .bind(("id", id.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<MatchRow> = res.take(0).map_err(backend)?;
        let mut sides = HashMap::new();
        for row in rows {
            let record = row.into_record()?;
            if let Some(side) = record.side_of(id) {
                sides.insert(record.id.0.clone(), side);
            }
        }
        if sides.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = sides.keys().cloned().collect();
        let mut res = self
            .db
            .query(
                "SELECT * FROM rounds WHERE match_id INSIDE $ids \
                 ORDER BY match_id ASC, round_number ASC",
            )
            .bind(("ids", ids))
            .await
            .map_err(backend)?;

        let rows: Vec<RoundRow> = res.take(0).map_err(backend)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let round = row.into_record()?;
            if let Some(side) = sides.get(&round.match_id.0) {
                out.push(ParticipantRound { side: *side, round });
            }
        }
        Ok(out)
    }
}
