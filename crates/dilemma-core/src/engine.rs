//! Match orchestration.
//!
//! A match walks `Created → Round(1) → … → Round(N) → Completed`, or leaves
//! early to `Aborted` (fatal backend error) or `Failed` (retry exhaustion
//! under the default strict policy, or a persistence error). Completion calls
//! are made one at a time, A then B, with pacing gaps in between; nothing
//! runs in parallel.
//!
//! Rounds already written are never rolled back. Model aggregates are only
//! touched once a match has completed.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dilemma_llm::{
    build_prompt, parse_response, parse_response_with, CompletionClient, CompletionError,
    HistoryEntry, ParsedResponse, Sleeper, TokioSleeper,
};
use dilemma_state::{
    ArenaStore, MatchId, MatchRecord, MatchStatus, ModelId, ModelRecord, Move, NewRound,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};

use crate::error::{EngineError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::pacing::PacingPolicy;
use crate::payoff::payoff;

/// Rounds per match in tournament and single-match play
pub const DEFAULT_TOTAL_ROUNDS: u32 = 20;

/// What to do with a non-fatal completion error that survived the retry budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the match
    #[default]
    Strict,
    /// Degrade to an empty reply; the parser picks a random move
    Absorb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub total_rounds: u32,
    pub pacing: PacingPolicy,
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            pacing: PacingPolicy::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_total_rounds(mut self, rounds: u32) -> Self {
        self.total_rounds = rounds.max(1);
        self
    }

    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Result of a match that reached `Completed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub model_a: String,
    pub model_b: String,
    pub model_a_score: u32,
    pub model_b_score: u32,
    /// `None` on a tie
    pub winner_id: Option<ModelId>,
    pub rounds_played: u32,
}

/// Anything that can play one match between two named models.
#[async_trait]
pub trait MatchRunner: Send + Sync {
    async fn run_match(&self, model_a: &str, model_b: &str) -> Result<MatchSummary>;
}

/// Per-side running state, as seen by that side only.
#[derive(Default)]
struct SideState {
    total: u32,
    history: Vec<HistoryEntry>,
}

impl SideState {
    fn record(&mut self, round: u32, own: Move, opponent: Move, own_score: u32, opponent_score: u32) {
        self.total += own_score;
        self.history.push(HistoryEntry {
            round,
            my_move: own,
            opponent_move: opponent,
            my_score: own_score,
            opponent_score,
        });
    }
}

/// A completion reply, or the terminal status the failure calls for.
enum Reply {
    Text(String),
    Degraded(CompletionError),
    Terminate(MatchStatus, EngineError),
}

/// Drives matches against a store and a completion client.
pub struct MatchEngine {
    store: Arc<dyn ArenaStore>,
    client: CompletionClient,
    sleeper: Arc<dyn Sleeper>,
    config: EngineConfig,
    rng: Option<Mutex<StdRng>>,
}

impl MatchEngine {
    pub fn new(store: Arc<dyn ArenaStore>, client: CompletionClient) -> Self {
        MatchEngine {
            store,
            client,
            sleeper: Arc::new(TokioSleeper),
            config: EngineConfig::default(),
            rng: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Seed the parser's random fallback (reproducible runs and tests).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Some(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ArenaStore> {
        &self.store
    }

    fn parse(&self, text: &str) -> ParsedResponse {
        match self.rng.as_ref().map(|rng| rng.lock()) {
            Some(Ok(mut rng)) => parse_response_with(text, &mut *rng),
            _ => parse_response(text),
        }
    }

    async fn ask(&self, model: &str, round: u32, history: &[HistoryEntry]) -> Reply {
        let prompt = build_prompt(history, round, self.config.total_rounds);
        match self.client.complete(model, &prompt).await {
            Ok(text) => Reply::Text(text),
            Err(source) if source.is_fatal() => Reply::Terminate(
                MatchStatus::Aborted,
                EngineError::Completion {
                    model: model.to_string(),
                    round,
                    source,
                },
            ),
            Err(source) => match self.config.failure_policy {
                FailurePolicy::Absorb => Reply::Degraded(source),
                FailurePolicy::Strict => Reply::Terminate(
                    MatchStatus::Failed,
                    EngineError::Completion {
                        model: model.to_string(),
                        round,
                        source,
                    },
                ),
            },
        }
    }

    /// Turn a reply into a decision, or hand back the terminal cause.
    fn decide(
        &self,
        match_id: &MatchId,
        model: &str,
        round: u32,
        reply: Reply,
    ) -> std::result::Result<ParsedResponse, (MatchStatus, EngineError)> {
        match reply {
            Reply::Text(text) => {
                let parsed = self.parse(&text);
                debug!(model, round, mv = %parsed.mv, source = ?parsed.source, "parsed decision");
                Ok(parsed)
            }
            Reply::Degraded(err) => {
                obs::emit_call_degraded(match_id.as_str(), model, round, &err);
                METRICS.inc_degraded_calls();
                let mut parsed = self.parse("");
                parsed.rationale = format!("Completion failed ({err}); move chosen at random");
                Ok(parsed)
            }
            Reply::Terminate(status, err) => Err((status, err)),
        }
    }

    /// Persist a terminal status with partial scores and build the error.
    async fn terminate(
        &self,
        record: &MatchRecord,
        status: MatchStatus,
        round: u32,
        a: &SideState,
        b: &SideState,
        cause: EngineError,
    ) -> EngineError {
        let match_id = record.id.as_str().to_string();
        if let Err(e) = self
            .store
            .terminate_match(&record.id, status, a.total, b.total)
            .await
        {
            // The row stays in_progress; `stats verify` lists it as stale.
            obs::emit_terminate_failed(&match_id, status.as_str(), &e);
        }

        let reason = cause.to_string();
        METRICS.inc_matches_terminated();
        obs::emit_match_terminated(&match_id, status.as_str(), a.history.len() as u32, &reason);

        match status {
            MatchStatus::Aborted => EngineError::Aborted {
                match_id,
                round,
                reason,
            },
            _ => EngineError::Failed {
                match_id,
                round,
                reason,
            },
        }
    }

    async fn play(
        &self,
        record: MatchRecord,
        model_a: ModelRecord,
        model_b: ModelRecord,
    ) -> Result<MatchSummary> {
        let total_rounds = self.config.total_rounds;
        let pacing = self.config.pacing;
        let mut a = SideState::default();
        let mut b = SideState::default();

        obs::emit_match_started(record.id.as_str(), &model_a.name, &model_b.name, total_rounds);

        for round in 1..=total_rounds {
            let reply_a = self.ask(&model_a.name, round, &a.history).await;
            let decision_a = match self.decide(&record.id, &model_a.name, round, reply_a) {
                Ok(parsed) => parsed,
                Err((status, cause)) => {
                    return Err(self.terminate(&record, status, round, &a, &b, cause).await)
                }
            };

            self.sleeper.sleep(pacing.between_calls).await;

            let reply_b = self.ask(&model_b.name, round, &b.history).await;
            let decision_b = match self.decide(&record.id, &model_b.name, round, reply_b) {
                Ok(parsed) => parsed,
                Err((status, cause)) => {
                    return Err(self.terminate(&record, status, round, &a, &b, cause).await)
                }
            };

            let (score_a, score_b) = payoff(decision_a.mv, decision_b.mv);
            let new_round = NewRound {
                match_id: record.id.clone(),
                round_number: round,
                model_a_move: decision_a.mv,
                model_b_move: decision_b.mv,
                model_a_reasoning: decision_a.rationale,
                model_b_reasoning: decision_b.rationale,
                model_a_score: score_a,
                model_b_score: score_b,
            };
            if let Err(e) = self.store.append_round(new_round).await {
                let cause = EngineError::Storage(e);
                return Err(self
                    .terminate(&record, MatchStatus::Failed, round, &a, &b, cause)
                    .await);
            }

            a.record(round, decision_a.mv, decision_b.mv, score_a, score_b);
            b.record(round, decision_b.mv, decision_a.mv, score_b, score_a);
            METRICS.inc_rounds_played();
            obs::emit_round_played(
                record.id.as_str(),
                round,
                decision_a.mv.as_str(),
                decision_b.mv.as_str(),
                a.total,
                b.total,
            );

            if round < total_rounds {
                self.sleeper.sleep(pacing.between_rounds).await;
            }
        }

        let winner = match a.total.cmp(&b.total) {
            Ordering::Greater => Some(model_a.id.clone()),
            Ordering::Less => Some(model_b.id.clone()),
            Ordering::Equal => None,
        };

        if let Err(e) = self
            .store
            .complete_match(&record.id, a.total, b.total, winner.as_ref())
            .await
        {
            let cause = EngineError::Storage(e);
            return Err(self
                .terminate(&record, MatchStatus::Failed, total_rounds, &a, &b, cause)
                .await);
        }

        // Ties count as a loss for both sides.
        let a_won = winner.as_ref() == Some(&model_a.id);
        let b_won = winner.as_ref() == Some(&model_b.id);
        // The match is completed either way; a lost update is repaired by
        // `stats recalculate`.
        for (model, score, won) in [(&model_a, a.total, a_won), (&model_b, b.total, b_won)] {
            if let Err(e) = self.store.record_outcome(&model.id, score, won).await {
                METRICS.inc_stats_update_failures();
                obs::emit_stats_update_failed(record.id.as_str(), &model.name, &e);
            }
        }

        METRICS.inc_matches_completed();
        let winner_name = if a_won {
            Some(model_a.name.as_str())
        } else if b_won {
            Some(model_b.name.as_str())
        } else {
            None
        };
        obs::emit_match_finished(record.id.as_str(), a.total, b.total, winner_name);

        Ok(MatchSummary {
            match_id: record.id,
            model_a: model_a.name,
            model_b: model_b.name,
            model_a_score: a.total,
            model_b_score: b.total,
            winner_id: winner,
            rounds_played: total_rounds,
        })
    }
}

/// Reject pairings that can never form a valid match.
pub fn validate_pairing(model_a: &str, model_b: &str) -> Result<()> {
    let (a, b) = (model_a.trim(), model_b.trim());
    if a.is_empty() || b.is_empty() {
        return Err(EngineError::InvalidPairing(
            "model names must not be empty".to_string(),
        ));
    }
    if a == b {
        return Err(EngineError::InvalidPairing(format!(
            "a model cannot play itself: {a}"
        )));
    }
    Ok(())
}

#[async_trait]
impl MatchRunner for MatchEngine {
    /// Play one full match and return its summary.
    ///
    /// Errors before the match row exists (`InvalidPairing`, `Storage`) leave
    /// nothing behind; later errors leave a failed or aborted match.
    async fn run_match(&self, model_a: &str, model_b: &str) -> Result<MatchSummary> {
        validate_pairing(model_a, model_b)?;

        let model_a = self.store.upsert_model(model_a.trim()).await?;
        let model_b = self.store.upsert_model(model_b.trim()).await?;
        let record = self.store.create_match(&model_a.id, &model_b.id).await?;

        let span = obs::match_span(record.id.as_str());
        self.play(record, model_a, model_b).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_validation() {
        assert!(validate_pairing("a/one", "b/two").is_ok());
        assert!(matches!(
            validate_pairing("", "b"),
            Err(EngineError::InvalidPairing(_))
        ));
        assert!(matches!(
            validate_pairing("same", " same "),
            Err(EngineError::InvalidPairing(_))
        ));
    }

    #[test]
    fn config_builders() {
        let config = EngineConfig::default()
            .with_total_rounds(0)
            .with_pacing(PacingPolicy::none())
            .with_failure_policy(FailurePolicy::Absorb);
        assert_eq!(config.total_rounds, 1);
        assert_eq!(config.failure_policy, FailurePolicy::Absorb);
        assert_eq!(EngineConfig::default().total_rounds, 20);
        assert_eq!(FailurePolicy::default(), FailurePolicy::Strict);
    }

    #[test]
    fn side_state_tracks_own_view() {
        let mut side = SideState::default();
        side.record(1, Move::Defect, Move::Cooperate, 5, 0);
        side.record(2, Move::Defect, Move::Defect, 1, 1);
        assert_eq!(side.total, 6);
        assert_eq!(side.history[0].opponent_move, Move::Cooperate);
        assert_eq!(side.history[1].round, 2);
    }
}
