//! Ranked view over models and their behavioral profiles.

use std::cmp::Ordering;
use std::collections::HashMap;

use dilemma_state::{ArenaStore, ModelId, ModelRecord, ParticipantRound, StorageResult};
use serde::{Deserialize, Serialize};

use crate::behavior::{compute_metrics, Archetype, BehavioralMetrics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub model: ModelRecord,
    pub games_played: u32,
    pub average_score: f64,
    pub metrics: BehavioralMetrics,
    pub archetype: Archetype,
}

/// Rank models by average score per game, best first; ties broken by name.
pub fn build_leaderboard(
    models: Vec<ModelRecord>,
    rounds_by_model: &HashMap<ModelId, Vec<ParticipantRound>>,
) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = models
        .into_iter()
        .map(|model| {
            let metrics = rounds_by_model
                .get(&model.id)
                .map(|rounds| compute_metrics(rounds))
                .unwrap_or_default();
            let stats = model.stats();
            LeaderboardEntry {
                games_played: stats.games_played(),
                average_score: stats.average_score(),
                archetype: Archetype::classify(&metrics),
                metrics,
                model,
            }
        })
        .collect();

    entries.sort_by(|x, y| {
        y.average_score
            .partial_cmp(&x.average_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| x.model.name.cmp(&y.model.name))
    });
    entries
}

/// Load every model and its rounds from the store and rank them.
pub async fn load_leaderboard(store: &dyn ArenaStore) -> StorageResult<Vec<LeaderboardEntry>> {
    let models = store.list_models().await?;
    let mut rounds_by_model = HashMap::with_capacity(models.len());
    for model in &models {
        let rounds = store.rounds_for_model(&model.id).await?;
        rounds_by_model.insert(model.id.clone(), rounds);
    }
    Ok(build_leaderboard(models, &rounds_by_model))
}
