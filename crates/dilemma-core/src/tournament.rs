//! Round-robin tournament scheduling.
//!
//! Every unordered pair of the roster plays until it has `games_per_pair`
//! completed matches. Games run strictly one after another with a cooldown
//! in between; a failed game is logged and the schedule moves on. Because
//! progress is always recounted from the store, a re-run resumes where the
//! last one stopped.

use std::sync::Arc;

use dilemma_llm::{Sleeper, TokioSleeper};
use dilemma_state::ArenaStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::MatchRunner;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;
use crate::pacing::PacingPolicy;

pub const DEFAULT_ROSTER: [&str; 4] = [
    "anthropic/claude-sonnet-4",
    "openai/gpt-5",
    "x-ai/grok-4",
    "google/gemini-2.5-pro",
];

pub const DEFAULT_GAMES_PER_PAIR: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentConfig {
    pub roster: Vec<String>,
    /// Completed matches each pair should reach
    pub games_per_pair: u32,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        TournamentConfig {
            roster: DEFAULT_ROSTER.iter().map(|m| m.to_string()).collect(),
            games_per_pair: DEFAULT_GAMES_PER_PAIR,
        }
    }
}

impl TournamentConfig {
    pub fn with_roster(mut self, roster: Vec<String>) -> Self {
        self.roster = roster;
        self
    }

    pub fn with_games_per_pair(mut self, games: u32) -> Self {
        self.games_per_pair = games;
        self
    }
}

/// All unordered pairs `(roster[i], roster[j])` with `i < j`, in roster order.
pub fn model_pairs(roster: &[String]) -> Vec<(String, String)> {
    roster
        .iter()
        .enumerate()
        .flat_map(|(i, a)| roster[i + 1..].iter().map(move |b| (a.clone(), b.clone())))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairProgress {
    pub model_a: String,
    pub model_b: String,
    pub completed: u32,
    pub needed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentProgress {
    pub games_per_pair: u32,
    pub pairs: Vec<PairProgress>,
}

impl TournamentProgress {
    pub fn total_completed(&self) -> u32 {
        self.pairs.iter().map(|p| p.completed).sum()
    }

    pub fn total_needed(&self) -> u32 {
        self.pairs.iter().map(|p| p.needed).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.total_needed() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentReport {
    pub dry_run: bool,
    /// Progress before any game was played
    pub before: TournamentProgress,
    /// Progress recounted after the run; equals `before` on a dry run
    pub after: TournamentProgress,
    pub games_played: u32,
    pub games_failed: u32,
}

async fn completed_between(store: &dyn ArenaStore, model_a: &str, model_b: &str) -> Result<u32> {
    let a = store.find_model(model_a).await?;
    let b = store.find_model(model_b).await?;
    match (a, b) {
        (Some(a), Some(b)) => Ok(store.count_completed_between(&a.id, &b.id).await?),
        _ => Ok(0),
    }
}

/// Count completed matches per roster pair against `games_per_pair`.
///
/// Models that were never stored count as zero games. Needs no backend.
pub async fn tournament_progress(
    store: &dyn ArenaStore,
    config: &TournamentConfig,
) -> Result<TournamentProgress> {
    let target = config.games_per_pair;
    let mut pairs = Vec::new();
    for (model_a, model_b) in model_pairs(&config.roster) {
        let completed = completed_between(store, &model_a, &model_b).await?;
        obs::emit_pair_progress(&model_a, &model_b, completed, target);
        pairs.push(PairProgress {
            needed: target.saturating_sub(completed),
            model_a,
            model_b,
            completed,
        });
    }

    let progress = TournamentProgress {
        games_per_pair: target,
        pairs,
    };
    info!(
        event = "tournament.progress",
        completed = progress.total_completed(),
        needed = progress.total_needed(),
    );
    Ok(progress)
}

pub struct TournamentScheduler {
    store: Arc<dyn ArenaStore>,
    runner: Arc<dyn MatchRunner>,
    sleeper: Arc<dyn Sleeper>,
    config: TournamentConfig,
    pacing: PacingPolicy,
}

impl TournamentScheduler {
    pub fn new(store: Arc<dyn ArenaStore>, runner: Arc<dyn MatchRunner>) -> Self {
        TournamentScheduler {
            store,
            runner,
            sleeper: Arc::new(TokioSleeper),
            config: TournamentConfig::default(),
            pacing: PacingPolicy::default(),
        }
    }

    pub fn with_config(mut self, config: TournamentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    /// Count completed matches per pair against the target.
    pub async fn check_progress(&self) -> Result<TournamentProgress> {
        tournament_progress(self.store.as_ref(), &self.config).await
    }

    /// Play every missing game, or with `dry_run` only report what would run.
    pub async fn run(&self, dry_run: bool) -> Result<TournamentReport> {
        let before = self.check_progress().await?;
        if dry_run || before.is_complete() {
            if before.is_complete() {
                info!(event = "tournament.complete", "nothing left to play");
            }
            return Ok(TournamentReport {
                dry_run,
                after: before.clone(),
                before,
                games_played: 0,
                games_failed: 0,
            });
        }

        let schedule: Vec<(&str, &str)> = before
            .pairs
            .iter()
            .flat_map(|p| {
                (0..p.needed).map(move |_| (p.model_a.as_str(), p.model_b.as_str()))
            })
            .collect();
        let total = schedule.len();
        info!(event = "tournament.started", games = total);

        let (mut played, mut failed) = (0u32, 0u32);
        for (i, (model_a, model_b)) in schedule.into_iter().enumerate() {
            info!(game = i + 1, of = total, model_a, model_b, "starting game");
            match self.runner.run_match(model_a, model_b).await {
                Ok(summary) => {
                    played += 1;
                    info!(
                        match_id = %summary.match_id,
                        score_a = summary.model_a_score,
                        score_b = summary.model_b_score,
                        "game completed"
                    );
                }
                Err(e) => {
                    failed += 1;
                    warn!(game = i + 1, model_a, model_b, error = %e, "game failed, continuing");
                }
            }

            if i + 1 < total {
                self.sleeper.sleep(self.pacing.between_matches).await;
            }
        }

        METRICS.flush();
        let after = self.check_progress().await?;
        Ok(TournamentReport {
            dry_run,
            before,
            after,
            games_played: played,
            games_failed: failed,
        })
    }

    /// Continue an interrupted tournament from the store's current counts.
    pub async fn resume(&self) -> Result<TournamentReport> {
        self.run(false).await
    }
}
