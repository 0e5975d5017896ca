//! Structured lifecycle events for matches and tournaments.
//!
//! Every emission carries a stable `event = "..."` field so log pipelines can
//! filter on it. [`match_span`] ties everything logged during a match to its id.

use tracing::{error, info, warn};

/// Span tying every log line of one match to its id.
///
/// Attach it to the match future with `tracing::Instrument` rather than
/// entering it, so it stays correct across `.await` points.
pub fn match_span(match_id: &str) -> tracing::Span {
    tracing::info_span!("dilemma.match", match_id = %match_id)
}

pub fn emit_match_started(match_id: &str, model_a: &str, model_b: &str, total_rounds: u32) {
    info!(
        event = "match.started",
        match_id = %match_id,
        model_a = %model_a,
        model_b = %model_b,
        total_rounds = total_rounds,
    );
}

pub fn emit_round_played(
    match_id: &str,
    round: u32,
    model_a_move: &str,
    model_b_move: &str,
    model_a_total: u32,
    model_b_total: u32,
) {
    info!(
        event = "round.played",
        match_id = %match_id,
        round = round,
        model_a_move = %model_a_move,
        model_b_move = %model_b_move,
        model_a_total = model_a_total,
        model_b_total = model_b_total,
    );
}

/// A completion error was absorbed into an empty reply (warn level).
pub fn emit_call_degraded(match_id: &str, model: &str, round: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "call.degraded",
        match_id = %match_id,
        model = %model,
        round = round,
        error = %error,
    );
}

/// `winner` is `None` for a tie.
pub fn emit_match_finished(match_id: &str, model_a_score: u32, model_b_score: u32, winner: Option<&str>) {
    info!(
        event = "match.finished",
        match_id = %match_id,
        model_a_score = model_a_score,
        model_b_score = model_b_score,
        winner = winner.unwrap_or("tie"),
    );
}

/// Match ended failed or aborted (warn level).
pub fn emit_match_terminated(match_id: &str, status: &str, rounds_played: u32, reason: &dyn std::fmt::Display) {
    warn!(
        event = "match.terminated",
        match_id = %match_id,
        status = %status,
        rounds_played = rounds_played,
        reason = %reason,
    );
}

/// The terminal status could not be written; the match row is left
/// `in_progress` (error level).
pub fn emit_terminate_failed(match_id: &str, status: &str, error: &dyn std::fmt::Display) {
    error!(
        event = "match.terminate_failed",
        match_id = %match_id,
        status = %status,
        error = %error,
    );
}

/// A completed match whose aggregate update failed for one model (error level).
pub fn emit_stats_update_failed(match_id: &str, model: &str, error: &dyn std::fmt::Display) {
    error!(
        event = "stats.update_failed",
        match_id = %match_id,
        model = %model,
        error = %error,
    );
}

pub fn emit_pair_progress(model_a: &str, model_b: &str, completed: u32, target: u32) {
    info!(
        event = "tournament.pair_progress",
        model_a = %model_a,
        model_b = %model_b,
        completed = completed,
        target = target,
    );
}
