//! Model aggregate reconciliation.
//!
//! Aggregates on `ModelRecord` are a cache over completed matches. These
//! helpers recompute them from match history, compare, and repair.

use std::collections::HashMap;

use dilemma_state::{
    ArenaStore, MatchRecord, MatchStatus, ModelId, ModelRecord, ModelStats, StorageResult,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Stored vs recomputed aggregates for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsCheck {
    pub model_id: ModelId,
    pub name: String,
    pub stored: ModelStats,
    pub expected: ModelStats,
}

impl StatsCheck {
    pub fn is_consistent(&self) -> bool {
        self.stored == self.expected
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculationReport {
    /// Models whose aggregates were rewritten and changed
    pub updated: Vec<StatsCheck>,
    /// Models that already matched their history
    pub unchanged: usize,
    /// Models whose write failed, with the error message
    pub failed: Vec<(String, String)>,
}

/// Recompute aggregates the way finalization would: a tie is a loss for both.
///
/// Matches that are not completed are ignored. Matches referencing a model
/// outside `models` are skipped with a warning.
pub fn expected_stats(
    models: &[ModelRecord],
    matches: &[MatchRecord],
) -> HashMap<ModelId, ModelStats> {
    let mut stats: HashMap<ModelId, ModelStats> = models
        .iter()
        .map(|m| (m.id.clone(), ModelStats::default()))
        .collect();

    for m in matches.iter().filter(|m| m.status == MatchStatus::Completed) {
        if !stats.contains_key(&m.model_a_id) || !stats.contains_key(&m.model_b_id) {
            warn!(match_id = %m.id, "skipping match that references an unknown model");
            continue;
        }
        let a_won = m.winner_id.as_ref() == Some(&m.model_a_id);
        let b_won = m.winner_id.as_ref() == Some(&m.model_b_id);
        if let Some(a) = stats.get_mut(&m.model_a_id) {
            a.record(m.model_a_final_score.unwrap_or(0), a_won);
        }
        if let Some(b) = stats.get_mut(&m.model_b_id) {
            b.record(m.model_b_final_score.unwrap_or(0), b_won);
        }
    }
    stats
}

async fn checks(store: &dyn ArenaStore) -> StorageResult<Vec<StatsCheck>> {
    let models = store.list_models().await?;
    let matches = store.list_matches(Some(MatchStatus::Completed)).await?;
    let mut expected = expected_stats(&models, &matches);

    Ok(models
        .into_iter()
        .map(|m| StatsCheck {
            expected: expected.remove(&m.id).unwrap_or_default(),
            stored: m.stats(),
            model_id: m.id,
            name: m.name,
        })
        .collect())
}

/// Compare every model's stored aggregates against its match history.
pub async fn verify_stats(store: &dyn ArenaStore) -> StorageResult<Vec<StatsCheck>> {
    let checks = checks(store).await?;
    let drifted = checks.iter().filter(|c| !c.is_consistent()).count();
    info!(
        event = "stats.verified",
        models = checks.len(),
        drifted = drifted,
    );
    Ok(checks)
}

/// Matches still marked `in_progress`.
///
/// Outside a running match these are stale: the terminal status write was
/// lost, so they never count toward aggregates and need a look by hand.
pub async fn unfinished_matches(store: &dyn ArenaStore) -> StorageResult<Vec<MatchRecord>> {
    let matches = store.list_matches(Some(MatchStatus::InProgress)).await?;
    if !matches.is_empty() {
        warn!(
            event = "stats.unfinished_matches",
            count = matches.len(),
            "matches left in_progress"
        );
    }
    Ok(matches)
}

/// Overwrite every model's aggregates with the recomputed values.
///
/// A failed write is logged and reported; the remaining models are still
/// processed.
pub async fn recalculate_stats(store: &dyn ArenaStore) -> StorageResult<RecalculationReport> {
    let mut report = RecalculationReport::default();

    for check in checks(store).await? {
        match store.set_model_stats(&check.model_id, check.expected).await {
            Ok(()) if check.is_consistent() => report.unchanged += 1,
            Ok(()) => {
                info!(
                    event = "stats.recalculated",
                    model = %check.name,
                    old_wins = check.stored.wins,
                    old_losses = check.stored.losses,
                    old_total = check.stored.total_score,
                    wins = check.expected.wins,
                    losses = check.expected.losses,
                    total = check.expected.total_score,
                );
                report.updated.push(check);
            }
            Err(e) => {
                warn!(model = %check.name, error = %e, "failed to update model stats");
                report.failed.push((check.name, e.to_string()));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(a: &ModelRecord, b: &ModelRecord, sa: u32, sb: u32) -> MatchRecord {
        let mut m = MatchRecord::new(a.id.clone(), b.id.clone());
        m.status = MatchStatus::Completed;
        m.model_a_final_score = Some(sa);
        m.model_b_final_score = Some(sb);
        m.winner_id = match sa.cmp(&sb) {
            std::cmp::Ordering::Greater => Some(a.id.clone()),
            std::cmp::Ordering::Less => Some(b.id.clone()),
            std::cmp::Ordering::Equal => None,
        };
        m
    }

    #[test]
    fn tie_is_a_loss_for_both() {
        let x = ModelRecord::new("x");
        let y = ModelRecord::new("y");
        let stats = expected_stats(&[x.clone(), y.clone()], &[completed(&x, &y, 30, 30)]);
        assert_eq!(stats[&x.id], ModelStats { wins: 0, losses: 1, total_score: 30 });
        assert_eq!(stats[&y.id], ModelStats { wins: 0, losses: 1, total_score: 30 });
    }

    #[test]
    fn ignores_incomplete_and_unknown() {
        let x = ModelRecord::new("x");
        let y = ModelRecord::new("y");
        let ghost = ModelRecord::new("ghost");

        let mut aborted = completed(&x, &y, 9, 4);
        aborted.status = MatchStatus::Aborted;
        let matches = [completed(&x, &y, 15, 0), aborted, completed(&x, &ghost, 60, 0)];

        let stats = expected_stats(&[x.clone(), y.clone()], &matches);
        assert_eq!(stats[&x.id], ModelStats { wins: 1, losses: 0, total_score: 15 });
        assert_eq!(stats[&y.id], ModelStats { wins: 0, losses: 1, total_score: 0 });
        assert!(!stats.contains_key(&ghost.id));
    }
}
