//! Structured lifecycle events for matches and tournaments.

use std::sync::Arc;

use dilemma_core::obs::{
    emit_call_degraded, emit_match_finished, emit_match_started, emit_match_terminated,
    emit_pair_progress, emit_round_played, emit_stats_update_failed, emit_terminate_failed,
    match_span,
};
use dilemma_core::{EngineConfig, MatchEngine, MatchRunner, PacingPolicy};
use dilemma_llm::{BackoffPolicy, CompletionClient, RecordingSleeper, ScriptedBackend};
use dilemma_state::fakes::MemoryArenaStore;
use dilemma_state::ArenaStore;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn match_started_carries_both_models() {
    emit_match_started("m-1", "openai/gpt-5", "x-ai/grok-4", 20);
    assert!(logs_contain("match.started"));
    assert!(logs_contain("openai/gpt-5"));
}

#[traced_test]
#[test]
fn round_played_carries_moves_and_totals() {
    emit_round_played("m-2", 3, "COOPERATE", "DEFECT", 6, 11);
    assert!(logs_contain("round.played"));
    assert!(logs_contain("model_b_total=11"));
}

#[traced_test]
#[test]
fn tie_is_reported_as_tie() {
    emit_match_finished("m-3", 30, 30, None);
    assert!(logs_contain("winner=\"tie\"") || logs_contain("winner=tie"));
}

#[traced_test]
#[test]
fn terminations_and_degradations_warn() {
    emit_match_terminated("m-4", "aborted", 4, &"authentication failed");
    emit_call_degraded("m-4", "x-ai/grok-4", 2, &"request timed out");
    assert!(logs_contain("WARN"));
    assert!(logs_contain("match.terminated"));
    assert!(logs_contain("call.degraded"));
}

#[traced_test]
#[test]
fn lost_store_writes_are_errors() {
    emit_terminate_failed("m-5", "failed", &"connection reset");
    emit_stats_update_failed("m-6", "openai/gpt-5", &"connection reset");
    assert!(logs_contain("ERROR"));
    assert!(logs_contain("match.terminate_failed"));
    assert!(logs_contain("stats.update_failed"));
}

#[traced_test]
#[tokio::test]
async fn engine_reports_lost_outcome_update() {
    let store = Arc::new(MemoryArenaStore::new());
    let model_b = store.upsert_model("b").await.unwrap();
    store.fail_outcomes_for(&model_b.id);

    let backend = Arc::new(ScriptedBackend::new());
    backend.always("a", "Keep it friendly.\nMOVE: COOPERATE");
    backend.always("b", "Keep it friendly.\nMOVE: COOPERATE");
    let client = CompletionClient::new(backend)
        .with_policy(BackoffPolicy::immediate(1))
        .with_sleeper(Arc::new(RecordingSleeper::new()));
    let engine = MatchEngine::new(store, client)
        .with_config(
            EngineConfig::default()
                .with_total_rounds(1)
                .with_pacing(PacingPolicy::none()),
        )
        .with_sleeper(Arc::new(RecordingSleeper::new()));

    engine.run_match("a", "b").await.unwrap();
    assert!(logs_contain("stats.update_failed"));
    assert!(logs_contain("match.finished"));
}

#[traced_test]
#[test]
fn pair_progress_event() {
    emit_pair_progress("a", "b", 7, 10);
    assert!(logs_contain("tournament.pair_progress"));
}

#[traced_test]
#[test]
fn match_span_can_be_entered() {
    let span = match_span("m-span");
    let _guard = span.enter();
    tracing::info!("inside");
    assert!(logs_contain("m-span"));
}

#[traced_test]
#[tokio::test]
async fn engine_emits_full_lifecycle() {
    let store = Arc::new(MemoryArenaStore::new());
    let backend = Arc::new(ScriptedBackend::new());
    backend.always("a", "Keep it friendly.\nMOVE: COOPERATE");
    backend.always("b", "Keep it friendly.\nMOVE: COOPERATE");

    let client = CompletionClient::new(backend)
        .with_policy(BackoffPolicy::immediate(1))
        .with_sleeper(Arc::new(RecordingSleeper::new()));
    let engine = MatchEngine::new(store, client)
        .with_config(
            EngineConfig::default()
                .with_total_rounds(2)
                .with_pacing(PacingPolicy::none()),
        )
        .with_sleeper(Arc::new(RecordingSleeper::new()));

    let summary = engine.run_match("a", "b").await.unwrap();
    assert!(logs_contain("match.started"));
    assert!(logs_contain("round.played"));
    assert!(logs_contain("match.finished"));
    assert!(logs_contain(summary.match_id.as_str()));
}
