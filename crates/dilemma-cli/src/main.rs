//! Dilemma Arena - Iterated Prisoner's Dilemma between LLMs
//!
//! The `dilemma` command plays matches between remote language models,
//! schedules round-robin tournaments and reports on how each model behaves.
//!
//! ## Commands
//!
//! - `play`: Run one match between two models
//! - `tournament`: Check, preview, run or resume the round-robin tournament
//! - `stats`: Verify or rebuild cached model aggregates
//! - `leaderboard`: Rank models with their behavioral profile
//! - `show` / `matches`: Inspect stored matches
//! - `key-info`: Show the completion key's budget and rate limit

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use dilemma_core::telemetry::{default_level, init_tracing};
use dilemma_core::{
    load_leaderboard, recalculate_stats, tournament_progress, unfinished_matches,
    validate_pairing, verify_stats,
    EngineConfig, FailurePolicy, LeaderboardEntry, MatchEngine, MatchRunner, PacingPolicy,
    StatsCheck, TournamentConfig, TournamentProgress, TournamentReport, TournamentScheduler,
    DEFAULT_GAMES_PER_PAIR, DEFAULT_TOTAL_ROUNDS,
};
use dilemma_llm::{CompletionClient, OpenRouterBackend, RequestDefaults};
use dilemma_state::{
    ArenaStore, MatchId, MatchRecord, MatchStatus, ModelId, RoundRecord, SurrealArenaStore,
};

#[derive(Parser)]
#[command(name = "dilemma")]
#[command(author = "Dilemma Arena Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Iterated Prisoner's Dilemma arena for LLMs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one match between two models
    Play {
        /// Model in seat A (e.g. anthropic/claude-sonnet-4)
        model_a: String,

        /// Model in seat B
        model_b: String,

        /// Number of rounds
        #[arg(short, long, default_value_t = DEFAULT_TOTAL_ROUNDS)]
        rounds: u32,

        /// Guess a random move instead of failing the match when a call keeps failing
        #[arg(long)]
        absorb: bool,

        /// Skip the cooldowns between calls and rounds
        #[arg(long)]
        no_pacing: bool,
    },

    /// Round-robin tournament between a roster of models
    Tournament {
        #[command(subcommand)]
        action: TournamentAction,

        /// Completed matches each pair should reach
        #[arg(long, global = true, default_value_t = DEFAULT_GAMES_PER_PAIR)]
        games_per_pair: u32,

        /// Roster model (repeatable; defaults to the built-in roster)
        #[arg(long = "model", global = true)]
        models: Vec<String>,
    },

    /// Model aggregate maintenance
    Stats {
        #[command(subcommand)]
        action: StatsAction,
    },

    /// Rank models by average score with their behavioral archetype
    Leaderboard,

    /// Show a match and its rounds
    Show {
        /// Match ID
        match_id: String,
    },

    /// List matches, newest first
    Matches {
        /// Only matches with this status (in_progress, completed, failed, aborted)
        #[arg(long)]
        status: Option<String>,
    },

    /// Show the completion key's credit and rate limit
    KeyInfo,
}

#[derive(Subcommand)]
enum TournamentAction {
    /// Show completed and missing games per pair
    Check,
    /// Show which games a run would play
    DryRun,
    /// Play every missing game
    Run,
    /// Continue an interrupted tournament
    Resume,
}

#[derive(Subcommand)]
enum StatsAction {
    /// Compare cached aggregates against completed matches
    Verify,
    /// Rebuild cached aggregates from completed matches
    Recalculate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(cli.json, default_level(cli.verbose));
    let json = cli.json;

    match cli.command {
        Commands::Play {
            model_a,
            model_b,
            rounds,
            absorb,
            no_pacing,
        } => {
            validate_pairing(&model_a, &model_b)?;
            let store = connect_store().await?;
            let engine = MatchEngine::new(store, completion_client()?)
                .with_config(engine_config(rounds, absorb, no_pacing));
            cmd_play(&engine, &model_a, &model_b, json).await
        }
        Commands::Tournament {
            action,
            games_per_pair,
            models,
        } => {
            let config = tournament_config(games_per_pair, models);
            let store = connect_store().await?;
            match action {
                TournamentAction::Check => cmd_tournament_check(store.as_ref(), &config, json).await,
                TournamentAction::DryRun => {
                    cmd_tournament_dry_run(store.as_ref(), &config, json).await
                }
                TournamentAction::Run | TournamentAction::Resume => {
                    let engine = MatchEngine::new(store.clone(), completion_client()?);
                    let scheduler = TournamentScheduler::new(store, Arc::new(engine))
                        .with_config(config);
                    cmd_tournament_run(&scheduler, json).await
                }
            }
        }
        Commands::Stats { action } => {
            let store = connect_store().await?;
            match action {
                StatsAction::Verify => cmd_stats_verify(store.as_ref(), json).await,
                StatsAction::Recalculate => cmd_stats_recalculate(store.as_ref(), json).await,
            }
        }
        Commands::Leaderboard => cmd_leaderboard(connect_store().await?.as_ref(), json).await,
        Commands::Show { match_id } => {
            cmd_show(connect_store().await?.as_ref(), &match_id, json).await
        }
        Commands::Matches { status } => {
            cmd_matches(connect_store().await?.as_ref(), status.as_deref(), json).await
        }
        Commands::KeyInfo => cmd_key_info(json).await,
    }
}

async fn connect_store() -> Result<Arc<dyn ArenaStore>> {
    let store = SurrealArenaStore::from_env()
        .await
        .context("Failed to connect to arena database")?;
    Ok(Arc::new(store))
}

fn completion_client() -> Result<CompletionClient> {
    let backend = OpenRouterBackend::from_env().context("Completion backend is not configured")?;
    let defaults = RequestDefaults::from(backend.config());
    Ok(CompletionClient::new(Arc::new(backend)).with_defaults(defaults))
}

fn engine_config(rounds: u32, absorb: bool, no_pacing: bool) -> EngineConfig {
    let mut config = EngineConfig::default().with_total_rounds(rounds);
    if absorb {
        config = config.with_failure_policy(FailurePolicy::Absorb);
    }
    if no_pacing {
        config = config.with_pacing(PacingPolicy::none());
    }
    config
}

fn tournament_config(games_per_pair: u32, models: Vec<String>) -> TournamentConfig {
    let config = TournamentConfig::default().with_games_per_pair(games_per_pair);
    if models.is_empty() {
        config
    } else {
        config.with_roster(models)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Play one match and print its result
async fn cmd_play(engine: &MatchEngine, model_a: &str, model_b: &str, json: bool) -> Result<()> {
    info!(model_a, model_b, rounds = engine.config().total_rounds, "starting match");

    let summary = match engine.run_match(model_a, model_b).await {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(match_id) = e.match_id() {
                eprintln!("Match {} ended early; stored scores are partial.", match_id);
            }
            return Err(e).context("Match did not complete");
        }
    };

    if json {
        return print_json(&summary);
    }

    println!("Match {}", summary.match_id);
    println!(
        "  {} {} - {} {}",
        summary.model_a, summary.model_a_score, summary.model_b_score, summary.model_b
    );
    let winner = if summary.winner_id.is_none() {
        "tie (a loss for both)"
    } else if summary.model_a_score > summary.model_b_score {
        summary.model_a.as_str()
    } else {
        summary.model_b.as_str()
    };
    println!("  Winner: {}", winner);
    Ok(())
}

fn render_progress(progress: &TournamentProgress) -> String {
    let mut out = String::new();
    for p in &progress.pairs {
        out.push_str(&format!(
            "{} vs {}: {}/{} completed ({} needed)\n",
            p.model_a, p.model_b, p.completed, progress.games_per_pair, p.needed
        ));
    }
    out.push_str(&format!(
        "\nCompleted: {}  Needed: {}  Total when complete: {}\n",
        progress.total_completed(),
        progress.total_needed(),
        progress.total_completed() + progress.total_needed()
    ));
    out
}

/// Show completed and missing games per pair
async fn cmd_tournament_check(
    store: &dyn ArenaStore,
    config: &TournamentConfig,
    json: bool,
) -> Result<()> {
    let progress = tournament_progress(store, config).await?;
    if json {
        return print_json(&progress);
    }
    print!("{}", render_progress(&progress));
    Ok(())
}

/// List the games a live run would play, without a completion backend
async fn cmd_tournament_dry_run(
    store: &dyn ArenaStore,
    config: &TournamentConfig,
    json: bool,
) -> Result<()> {
    let progress = tournament_progress(store, config).await?;
    if json {
        return print_json(&progress);
    }
    if progress.is_complete() {
        println!("Tournament is already complete.");
        return Ok(());
    }
    println!("Games that would be played:");
    for p in progress.pairs.iter().filter(|p| p.needed > 0) {
        println!("  {} vs {}: {} games", p.model_a, p.model_b, p.needed);
    }
    Ok(())
}

fn render_report(report: &TournamentReport) -> String {
    format!(
        "Played {} games ({} failed).\n\n{}",
        report.games_played,
        report.games_failed,
        render_progress(&report.after)
    )
}

/// Play every missing game; safe to re-run after an interruption
async fn cmd_tournament_run(scheduler: &TournamentScheduler, json: bool) -> Result<()> {
    let config = scheduler.config();
    info!(
        models = %config.roster.join(", "),
        games_per_pair = config.games_per_pair,
        "running tournament"
    );
    let report = scheduler.resume().await?;
    if json {
        return print_json(&report);
    }
    print!("{}", render_report(&report));
    Ok(())
}

fn render_stats_checks(checks: &[StatsCheck]) -> String {
    let mut out = String::new();
    for c in checks {
        let mark = if c.is_consistent() { "ok   " } else { "DRIFT" };
        out.push_str(&format!(
            "{} {}: stored {}W/{}L/{} expected {}W/{}L/{}\n",
            mark,
            c.name,
            c.stored.wins,
            c.stored.losses,
            c.stored.total_score,
            c.expected.wins,
            c.expected.losses,
            c.expected.total_score
        ));
    }
    out
}

fn render_unfinished(matches: &[MatchRecord]) -> String {
    let mut out = format!(
        "{} match(es) still in_progress; unless a run is active they are stale \
         and not counted:\n",
        matches.len()
    );
    for m in matches {
        out.push_str(&format!(
            "  {}  started {}\n",
            m.id,
            m.created_at.format("%Y-%m-%d %H:%M")
        ));
    }
    out
}

#[derive(Serialize)]
struct VerifyOutput {
    checks: Vec<StatsCheck>,
    in_progress: Vec<MatchRecord>,
}

/// Compare cached aggregates against completed matches
async fn cmd_stats_verify(store: &dyn ArenaStore, json: bool) -> Result<()> {
    let checks = verify_stats(store).await?;
    let in_progress = unfinished_matches(store).await?;
    if json {
        return print_json(&VerifyOutput {
            checks,
            in_progress,
        });
    }
    if checks.is_empty() {
        println!("No models found.");
    } else {
        print!("{}", render_stats_checks(&checks));
    }
    if checks.iter().any(|c| !c.is_consistent()) {
        println!("\nAggregates have drifted; run `dilemma stats recalculate` to rebuild them.");
    }
    if !in_progress.is_empty() {
        print!("\n{}", render_unfinished(&in_progress));
    }
    Ok(())
}

/// Rebuild cached aggregates from completed matches
async fn cmd_stats_recalculate(store: &dyn ArenaStore, json: bool) -> Result<()> {
    let report = recalculate_stats(store).await?;
    if json {
        return print_json(&report);
    }
    print!("{}", render_stats_checks(&report.updated));
    println!(
        "Updated {}, unchanged {}, failed {}",
        report.updated.len(),
        report.unchanged,
        report.failed.len()
    );
    for (name, error) in &report.failed {
        warn!(model = %name, error = %error, "aggregate update failed");
    }
    Ok(())
}

fn render_leaderboard(entries: &[LeaderboardEntry]) -> String {
    let mut out = format!(
        "{:>3}  {:<28} {:>5} {:>7} {:>6} {:>6} {:>6}  {}\n",
        "#", "Model", "Games", "Avg", "Coop%", "Ret%", "Forg%", "Archetype"
    );
    for (i, e) in entries.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}  {:<28} {:>5} {:>7.1} {:>6.1} {:>6.1} {:>6.1}  {}\n",
            i + 1,
            e.model.name,
            e.games_played,
            e.average_score,
            e.metrics.cooperation_rate,
            e.metrics.retaliation_rate,
            e.metrics.forgiveness_rate,
            e.archetype
        ));
    }
    out
}

/// Rank models by average score per game
async fn cmd_leaderboard(store: &dyn ArenaStore, json: bool) -> Result<()> {
    let entries = load_leaderboard(store).await?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No models yet. Play a match first.");
        return Ok(());
    }
    print!("{}", render_leaderboard(&entries));
    Ok(())
}

async fn model_names(store: &dyn ArenaStore) -> Result<HashMap<ModelId, String>> {
    Ok(store
        .list_models()
        .await?
        .into_iter()
        .map(|m| (m.id, m.name))
        .collect())
}

fn score_text(score: Option<u32>) -> String {
    score.map_or_else(|| "-".to_string(), |s| s.to_string())
}

fn render_match(
    record: &MatchRecord,
    names: &HashMap<ModelId, String>,
    rounds: &[RoundRecord],
) -> String {
    let name = |id: &ModelId| names.get(id).cloned().unwrap_or_else(|| id.to_string());
    let (a, b) = (name(&record.model_a_id), name(&record.model_b_id));

    let mut out = format!(
        "Match {} ({})\n  {} {} - {} {}\n",
        record.id,
        record.status,
        a,
        score_text(record.model_a_final_score),
        score_text(record.model_b_final_score),
        b
    );
    match record.status {
        MatchStatus::Completed => {
            let winner = record
                .winner_id
                .as_ref()
                .map_or_else(|| "tie".to_string(), name);
            out.push_str(&format!("  Winner: {}\n", winner));
        }
        MatchStatus::InProgress => out.push_str("  Still in progress.\n"),
        MatchStatus::Failed | MatchStatus::Aborted => {
            out.push_str("  Ended early; scores are partial.\n")
        }
    }
    for r in rounds {
        out.push_str(&format!(
            "\nRound {}: {} {} (+{}) | {} {} (+{})\n",
            r.round_number, a, r.model_a_move, r.model_a_score, b, r.model_b_move, r.model_b_score
        ));
        out.push_str(&format!("  A: {}\n", r.model_a_reasoning));
        out.push_str(&format!("  B: {}\n", r.model_b_reasoning));
    }
    out
}

/// Show a match and its rounds
async fn cmd_show(store: &dyn ArenaStore, match_id: &str, json: bool) -> Result<()> {
    let id = MatchId(match_id.to_string());
    let record = store
        .get_match(&id)
        .await
        .with_context(|| format!("Match '{}' not found", match_id))?;
    let rounds = store.get_rounds(&id).await?;

    if json {
        return print_json(&serde_json::json!({ "match": record, "rounds": rounds }));
    }
    let names = model_names(store).await?;
    print!("{}", render_match(&record, &names, &rounds));
    Ok(())
}

/// List matches, newest first
async fn cmd_matches(store: &dyn ArenaStore, status: Option<&str>, json: bool) -> Result<()> {
    let status = status
        .map(|s| s.parse::<MatchStatus>())
        .transpose()
        .context("Invalid --status")?;
    let matches = store.list_matches(status).await?;
    if json {
        return print_json(&matches);
    }
    if matches.is_empty() {
        println!("No matches found.");
        return Ok(());
    }

    let names = model_names(store).await?;
    let name = |id: &ModelId| names.get(id).cloned().unwrap_or_else(|| id.to_string());
    for m in matches {
        println!(
            "{}  {}  {:<11} {} {} - {} {}",
            m.id,
            m.created_at.format("%Y-%m-%d %H:%M"),
            m.status.as_str(),
            name(&m.model_a_id),
            score_text(m.model_a_final_score),
            score_text(m.model_b_final_score),
            name(&m.model_b_id)
        );
    }
    Ok(())
}

/// Show the completion key's credit and rate limit
async fn cmd_key_info(json: bool) -> Result<()> {
    let backend = OpenRouterBackend::from_env().context("Completion backend is not configured")?;
    let key = backend.key_info().await.context("Failed to fetch key info")?;

    let pacing = PacingPolicy::default();
    let min_spacing = key.rate_limit.as_ref().and_then(|r| r.min_spacing());
    if let Some(spacing) = min_spacing {
        if pacing.is_tighter_than(spacing) {
            warn!(
                pacing_ms = pacing.min_call_spacing().as_millis() as u64,
                required_ms = spacing.as_millis() as u64,
                "default pacing is tighter than the key's rate limit"
            );
        }
    }

    if json {
        return print_json(&key);
    }
    println!("Label:     {}", key.label);
    println!("Free tier: {}", key.is_free_tier);
    println!("Usage:     {:.4}", key.usage);
    match (key.limit, key.remaining()) {
        (Some(limit), Some(remaining)) => {
            println!("Limit:     {:.4} ({:.4} remaining)", limit, remaining)
        }
        _ => println!("Limit:     unlimited"),
    }
    if let Some(rate) = &key.rate_limit {
        println!("Rate:      {} requests per {}", rate.requests, rate.interval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use dilemma_llm::{BackoffPolicy, RecordingSleeper, ScriptedBackend};

    const A: &str = "openai/gpt-5";
    const B: &str = "google/gemini-2.5-pro";

    async fn played_store() -> (Arc<dyn ArenaStore>, MatchId) {
        let store: Arc<dyn ArenaStore> = Arc::new(SurrealArenaStore::in_memory().await.unwrap());
        let backend = Arc::new(ScriptedBackend::new());
        backend.always(A, "Start friendly.\nMOVE: COOPERATE");
        backend.always(B, "Take the points.\nMOVE: DEFECT");
        let client = CompletionClient::new(backend)
            .with_policy(BackoffPolicy::immediate(1))
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        let engine = MatchEngine::new(store.clone(), client)
            .with_config(engine_config(3, false, true))
            .with_sleeper(Arc::new(RecordingSleeper::new()));

        cmd_play(&engine, A, B, false).await.unwrap();
        let matches = store.list_matches(None).await.unwrap();
        (store, matches[0].id.clone())
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_play_flags() {
        let cli = Cli::try_parse_from([
            "dilemma", "play", A, B, "--rounds", "5", "--absorb", "--no-pacing",
        ])
        .unwrap();
        match cli.command {
            Commands::Play {
                rounds,
                absorb,
                no_pacing,
                ..
            } => {
                assert_eq!(rounds, 5);
                assert!(absorb && no_pacing);
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn tournament_options_follow_the_action() {
        let cli = Cli::try_parse_from([
            "dilemma",
            "--json",
            "tournament",
            "check",
            "--games-per-pair",
            "3",
            "--model",
            "a",
            "--model",
            "b",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Tournament {
                action: TournamentAction::Check,
                games_per_pair,
                models,
            } => {
                let config = tournament_config(games_per_pair, models);
                assert_eq!(config.games_per_pair, 3);
                assert_eq!(config.roster, ["a", "b"]);
            }
            _ => panic!("expected tournament check"),
        }
        assert_eq!(tournament_config(10, Vec::new()).roster.len(), 4);
    }

    #[test]
    fn engine_config_flags() {
        let config = engine_config(7, true, true);
        assert_eq!(config.total_rounds, 7);
        assert_eq!(config.failure_policy, FailurePolicy::Absorb);
        assert_eq!(config.pacing, PacingPolicy::none());

        let config = engine_config(DEFAULT_TOTAL_ROUNDS, false, false);
        assert_eq!(config.failure_policy, FailurePolicy::Strict);
        assert_eq!(config.pacing, PacingPolicy::default());
    }

    #[test]
    fn play_rejects_bad_pairings_up_front() {
        assert!(validate_pairing(A, A).is_err());
        assert!(validate_pairing("", B).is_err());
    }

    #[tokio::test]
    async fn inspection_commands_run_against_a_played_match() {
        let (store, match_id) = played_store().await;

        cmd_show(store.as_ref(), match_id.as_str(), false).await.unwrap();
        cmd_show(store.as_ref(), match_id.as_str(), true).await.unwrap();
        cmd_matches(store.as_ref(), Some("completed"), false)
            .await
            .unwrap();
        cmd_leaderboard(store.as_ref(), false).await.unwrap();
        cmd_stats_verify(store.as_ref(), false).await.unwrap();
        cmd_stats_recalculate(store.as_ref(), true).await.unwrap();

        let checks = verify_stats(store.as_ref()).await.unwrap();
        assert!(checks.iter().all(|c| c.is_consistent()));
    }

    #[tokio::test]
    async fn verify_lists_matches_left_in_progress() {
        let (store, _) = played_store().await;
        let a = store.find_model(A).await.unwrap().unwrap();
        let b = store.find_model(B).await.unwrap().unwrap();
        let stuck = store.create_match(&a.id, &b.id).await.unwrap();

        let unfinished = unfinished_matches(store.as_ref()).await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, stuck.id);

        let text = render_unfinished(&unfinished);
        assert!(text.starts_with("1 match(es) still in_progress"));
        assert!(text.contains(stuck.id.as_str()));

        cmd_stats_verify(store.as_ref(), false).await.unwrap();
        cmd_stats_verify(store.as_ref(), true).await.unwrap();
        cmd_matches(store.as_ref(), Some("in_progress"), false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn show_renders_rounds_and_winner() {
        let (store, match_id) = played_store().await;
        let record = store.get_match(&match_id).await.unwrap();
        let rounds = store.get_rounds(&match_id).await.unwrap();
        let names = model_names(store.as_ref()).await.unwrap();

        let text = render_match(&record, &names, &rounds);
        assert!(text.contains("(completed)"));
        assert!(text.contains(&format!("{} 0 - 15 {}", A, B)));
        assert!(text.contains(&format!("Winner: {}", B)));
        assert!(text.contains("Round 3:"));
        assert!(!text.contains("MOVE:"));
    }

    #[tokio::test]
    async fn unknown_match_and_status_are_errors() {
        let store = SurrealArenaStore::in_memory().await.unwrap();
        assert!(cmd_show(&store, "missing", false).await.is_err());
        assert!(cmd_matches(&store, Some("paused"), false).await.is_err());
    }

    #[tokio::test]
    async fn check_reports_played_games() {
        let (store, _) = played_store().await;
        let config = TournamentConfig::default().with_roster(vec![A.to_string(), B.to_string()]);
        let progress = tournament_progress(store.as_ref(), &config).await.unwrap();
        assert_eq!(progress.pairs[0].completed, 1);

        let text = render_progress(&progress);
        assert!(text.contains("1/10 completed (9 needed)"));
        cmd_tournament_dry_run(store.as_ref(), &config, false)
            .await
            .unwrap();
    }

    #[test]
    fn leaderboard_table_has_header_and_rows() {
        let entries = dilemma_core::build_leaderboard(
            vec![dilemma_state::ModelRecord::new(A)],
            &HashMap::new(),
        );
        let text = render_leaderboard(&entries);
        assert!(text.lines().next().unwrap().contains("Archetype"));
        assert!(text.contains(A));
    }
}
