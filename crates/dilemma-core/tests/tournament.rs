//! Tournament scheduling against a fake match runner.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dilemma_core::{
    EngineError, MatchRunner, MatchSummary, PacingPolicy, TournamentConfig, TournamentScheduler,
};
use dilemma_llm::RecordingSleeper;
use dilemma_state::fakes::MemoryArenaStore;
use dilemma_state::{ArenaStore, MatchStatus};

/// Completes every match 30–20 for side A, except the call numbers in `fail_on`.
struct FakeRunner {
    store: Arc<MemoryArenaStore>,
    calls: Mutex<Vec<(String, String)>>,
    fail_on: HashSet<usize>,
}

impl FakeRunner {
    fn new(store: Arc<MemoryArenaStore>) -> Self {
        FakeRunner {
            store,
            calls: Mutex::new(Vec::new()),
            fail_on: HashSet::new(),
        }
    }

    fn failing_on(mut self, calls: &[usize]) -> Self {
        self.fail_on = calls.iter().copied().collect();
        self
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MatchRunner for FakeRunner {
    async fn run_match(&self, model_a: &str, model_b: &str) -> dilemma_core::Result<MatchSummary> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((model_a.to_string(), model_b.to_string()));
            calls.len()
        };

        let a = self.store.upsert_model(model_a).await?;
        let b = self.store.upsert_model(model_b).await?;
        let record = self.store.create_match(&a.id, &b.id).await?;

        if self.fail_on.contains(&call) {
            self.store
                .terminate_match(&record.id, MatchStatus::Aborted, 0, 0)
                .await?;
            return Err(EngineError::Aborted {
                match_id: record.id.to_string(),
                round: 1,
                reason: "authentication failed".into(),
            });
        }

        self.store
            .complete_match(&record.id, 30, 20, Some(&a.id))
            .await?;
        Ok(MatchSummary {
            match_id: record.id,
            model_a: model_a.to_string(),
            model_b: model_b.to_string(),
            model_a_score: 30,
            model_b_score: 20,
            winner_id: Some(a.id),
            rounds_played: 20,
        })
    }
}

fn roster(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn scheduler(
    store: &Arc<MemoryArenaStore>,
    runner: &Arc<FakeRunner>,
    sleeper: &Arc<RecordingSleeper>,
    config: TournamentConfig,
) -> TournamentScheduler {
    TournamentScheduler::new(store.clone(), runner.clone())
        .with_config(config)
        .with_pacing(PacingPolicy::default())
        .with_sleeper(sleeper.clone())
}

#[tokio::test]
async fn fresh_store_needs_every_game() {
    let store = Arc::new(MemoryArenaStore::new());
    let runner = Arc::new(FakeRunner::new(store.clone()));
    let sleeper = Arc::new(RecordingSleeper::new());

    let progress = scheduler(&store, &runner, &sleeper, TournamentConfig::default())
        .check_progress()
        .await
        .unwrap();
    assert_eq!(progress.pairs.len(), 6);
    assert_eq!(progress.total_completed(), 0);
    assert_eq!(progress.total_needed(), 60);
    assert!(progress.pairs.iter().all(|p| p.needed == 10));
}

#[tokio::test]
async fn dry_run_plays_nothing() {
    let store = Arc::new(MemoryArenaStore::new());
    let runner = Arc::new(FakeRunner::new(store.clone()));
    let sleeper = Arc::new(RecordingSleeper::new());
    let config = TournamentConfig::default()
        .with_roster(roster(&["a", "b", "c"]))
        .with_games_per_pair(2);

    let report = scheduler(&store, &runner, &sleeper, config)
        .run(true)
        .await
        .unwrap();
    assert!(report.dry_run);
    assert_eq!(report.before.total_needed(), 6);
    assert_eq!(report.after, report.before);
    assert_eq!(report.games_played, 0);
    assert!(runner.calls().is_empty());
    assert!(sleeper.calls().is_empty());
}

#[tokio::test]
async fn live_run_fills_every_pair_with_cooldowns() {
    let store = Arc::new(MemoryArenaStore::new());
    let runner = Arc::new(FakeRunner::new(store.clone()));
    let sleeper = Arc::new(RecordingSleeper::new());
    let config = TournamentConfig::default()
        .with_roster(roster(&["a", "b", "c"]))
        .with_games_per_pair(2);

    let report = scheduler(&store, &runner, &sleeper, config)
        .run(false)
        .await
        .unwrap();
    assert_eq!(report.games_played, 6);
    assert_eq!(report.games_failed, 0);
    assert!(report.after.is_complete());
    assert_eq!(report.after.total_completed(), 6);

    let calls = runner.calls();
    let expected = [("a", "b"), ("a", "b"), ("a", "c"), ("a", "c"), ("b", "c"), ("b", "c")];
    assert_eq!(calls.len(), expected.len());
    for (got, want) in calls.iter().zip(expected) {
        assert_eq!((got.0.as_str(), got.1.as_str()), want);
    }

    // Cooldown between games, none after the last
    assert_eq!(sleeper.calls(), vec![Duration::from_secs(120); 5]);
}

#[tokio::test]
async fn failed_games_are_skipped_and_resume_finishes() {
    let store = Arc::new(MemoryArenaStore::new());
    let runner = Arc::new(FakeRunner::new(store.clone()).failing_on(&[2]));
    let sleeper = Arc::new(RecordingSleeper::new());
    let config = TournamentConfig::default()
        .with_roster(roster(&["a", "b"]))
        .with_games_per_pair(3);
    let tournament = scheduler(&store, &runner, &sleeper, config);

    let report = tournament.run(false).await.unwrap();
    assert_eq!(report.games_played, 2);
    assert_eq!(report.games_failed, 1);
    assert_eq!(report.after.pairs[0].completed, 2);
    assert_eq!(report.after.pairs[0].needed, 1);
    assert_eq!(store.list_matches(Some(MatchStatus::Aborted)).await.unwrap().len(), 1);

    let resumed = tournament.resume().await.unwrap();
    assert_eq!(resumed.games_played, 1);
    assert!(resumed.after.is_complete());
    assert_eq!(runner.calls().len(), 4);
}

#[tokio::test]
async fn reverse_seat_matches_count_toward_the_pair() {
    let store = Arc::new(MemoryArenaStore::new());
    let runner = Arc::new(FakeRunner::new(store.clone()));
    let sleeper = Arc::new(RecordingSleeper::new());

    runner.run_match("b", "a").await.unwrap();

    let config = TournamentConfig::default()
        .with_roster(roster(&["a", "b"]))
        .with_games_per_pair(1);
    let report = scheduler(&store, &runner, &sleeper, config)
        .run(false)
        .await
        .unwrap();
    assert!(report.before.is_complete());
    assert_eq!(report.games_played, 0);
    assert_eq!(runner.calls().len(), 1);
}
