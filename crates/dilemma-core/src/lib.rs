//! Dilemma Core Library
//!
//! Match orchestration, payoff scoring, behavioral metrics and tournament
//! scheduling for the Iterated Prisoner's Dilemma arena.

pub mod behavior;
pub mod engine;
pub mod error;
pub mod leaderboard;
pub mod metrics;
pub mod obs;
pub mod pacing;
pub mod payoff;
pub mod reconcile;
pub mod telemetry;
pub mod tournament;

pub use behavior::{compute_metrics, Archetype, BehavioralMetrics};

pub use engine::{
    validate_pairing, EngineConfig, FailurePolicy, MatchEngine, MatchRunner, MatchSummary,
    DEFAULT_TOTAL_ROUNDS,
};

pub use error::{EngineError, Result};

pub use leaderboard::{build_leaderboard, load_leaderboard, LeaderboardEntry};

pub use pacing::PacingPolicy;

pub use payoff::payoff;

pub use reconcile::{
    expected_stats, recalculate_stats, unfinished_matches, verify_stats, RecalculationReport,
    StatsCheck,
};

pub use tournament::{
    model_pairs, tournament_progress, PairProgress, TournamentConfig, TournamentProgress, TournamentReport,
    TournamentScheduler, DEFAULT_GAMES_PER_PAIR, DEFAULT_ROSTER,
};
