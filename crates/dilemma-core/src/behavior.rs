//! Behavioral metrics and archetype classification.
//!
//! Everything here is a pure derivation over a model's completed-match
//! rounds; recomputing from the same rounds always yields the same result.

use std::collections::BTreeMap;
use std::fmt;

use dilemma_state::{MatchId, Move, ParticipantRound};
use serde::{Deserialize, Serialize};

use crate::payoff::TEMPTATION;

/// Per-model behavioral profile. Rates are percentages in `[0, 100]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralMetrics {
    pub cooperation_rate: f64,
    pub betrayal_rate: f64,
    pub first_move_instinct: Option<Move>,
    pub first_move_cooperation_rate: f64,

    pub retaliation_rate: f64,
    pub forgiveness_rate: f64,
    pub synergy_score: f64,
    pub tyrant_index: f64,

    pub total_rounds: u32,
    pub total_cooperations: u32,
    pub total_defections: u32,
    pub mutual_cooperations: u32,
    /// Cooperated while the opponent defected
    pub sucker_outcomes: u32,
    /// Defected while the opponent cooperated
    pub tyrant_outcomes: u32,
    pub mutual_defections: u32,
}

fn percent(part: u32, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Compute a model's metrics from the rounds it played, each tagged with its side.
///
/// Rounds are grouped by match and walked in round order; retaliation and
/// forgiveness only look back within the same match.
pub fn compute_metrics(rounds: &[ParticipantRound]) -> BehavioralMetrics {
    let mut by_match: BTreeMap<&MatchId, Vec<&ParticipantRound>> = BTreeMap::new();
    for r in rounds {
        by_match.entry(&r.round.match_id).or_default().push(r);
    }

    let mut m = BehavioralMetrics::default();
    let mut first_moves = 0u32;
    let mut first_move_cooperations = 0u32;
    let mut retaliation_chances = 0u32;
    let mut retaliations = 0u32;
    let mut forgiveness_chances = 0u32;
    let mut forgivals = 0u32;
    let mut total_points = 0u64;

    for match_rounds in by_match.values_mut() {
        match_rounds.sort_by_key(|r| r.round.round_number);

        for (i, r) in match_rounds.iter().enumerate() {
            let (mine, theirs) = (r.my_move(), r.opponent_move());
            total_points += u64::from(r.my_score());

            match mine {
                Move::Cooperate => m.total_cooperations += 1,
                Move::Defect => m.total_defections += 1,
            }

            if r.round.round_number == 1 {
                first_moves += 1;
                if mine.is_cooperate() {
                    first_move_cooperations += 1;
                }
            }

            match (mine, theirs) {
                (Move::Cooperate, Move::Cooperate) => m.mutual_cooperations += 1,
                (Move::Cooperate, Move::Defect) => m.sucker_outcomes += 1,
                (Move::Defect, Move::Cooperate) => m.tyrant_outcomes += 1,
                (Move::Defect, Move::Defect) => m.mutual_defections += 1,
            }

            let Some(prev) = i.checked_sub(1).map(|p| match_rounds[p]) else {
                continue;
            };
            if prev.opponent_move() == Move::Defect {
                retaliation_chances += 1;
                if mine == Move::Defect {
                    retaliations += 1;
                }
                if prev.my_move() == Move::Defect {
                    forgiveness_chances += 1;
                    if mine.is_cooperate() {
                        forgivals += 1;
                    }
                }
            }
        }
    }

    m.total_rounds = m.total_cooperations + m.total_defections;
    let total = u64::from(m.total_rounds);
    m.cooperation_rate = percent(m.total_cooperations, total);
    m.betrayal_rate = percent(m.total_defections, total);
    m.synergy_score = percent(m.mutual_cooperations, total);
    m.first_move_cooperation_rate = percent(first_move_cooperations, u64::from(first_moves));
    m.retaliation_rate = percent(retaliations, u64::from(retaliation_chances));
    m.forgiveness_rate = percent(forgivals, u64::from(forgiveness_chances));
    m.tyrant_index = percent(m.tyrant_outcomes * TEMPTATION, total_points);

    if first_moves > 0 {
        m.first_move_instinct = Some(if first_move_cooperations * 2 > first_moves {
            Move::Cooperate
        } else {
            Move::Defect
        });
    }
    m
}

/// Personality label derived from a metrics profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Archetype {
    Pacifist,
    Diplomat,
    Ruthless,
    Guardian,
    Strategist,
    Isolationist,
    Chaotic,
    Naive,
    Unknown,
}

impl Archetype {
    /// First matching threshold rule wins.
    pub fn classify(m: &BehavioralMetrics) -> Self {
        let coop = m.cooperation_rate;
        let ret = m.retaliation_rate;
        let forg = m.forgiveness_rate;

        if coop > 70.0 && ret < 30.0 && forg > 60.0 {
            Archetype::Pacifist
        } else if coop > 60.0 && ret > 70.0 && forg > 50.0 {
            Archetype::Diplomat
        } else if coop < 30.0 && m.tyrant_index > 40.0 {
            Archetype::Ruthless
        } else if coop > 50.0 && ret > 50.0 && forg < 30.0 {
            Archetype::Guardian
        } else if coop > 30.0 && coop < 60.0 && ret > 60.0 && forg < 40.0 {
            Archetype::Strategist
        } else if coop < 40.0 && ret < 50.0 {
            Archetype::Isolationist
        } else if coop > 40.0 && coop < 70.0 {
            Archetype::Chaotic
        } else if coop > 60.0 && ret < 40.0 && forg < 40.0 {
            Archetype::Naive
        } else {
            Archetype::Unknown
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Archetype::Pacifist => "Pacifist",
            Archetype::Diplomat => "Diplomat",
            Archetype::Ruthless => "Ruthless",
            Archetype::Guardian => "Guardian",
            Archetype::Strategist => "Strategist",
            Archetype::Isolationist => "Isolationist",
            Archetype::Chaotic => "Chaotic",
            Archetype::Naive => "Naive",
            Archetype::Unknown => "Unknown",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Archetype::Pacifist => "Seeks peace, rarely retaliates, quick to forgive",
            Archetype::Diplomat => "Cooperative but firm; punishes betrayal, then forgives",
            Archetype::Ruthless => "Exploits cooperative opponents for personal gain",
            Archetype::Guardian => "Cooperative but holds grudges, slow to trust again",
            Archetype::Strategist => "Calculated; punishes betrayal consistently",
            Archetype::Isolationist => "Prefers safe defection over cooperation risks",
            Archetype::Chaotic => "Unpredictable, inconsistent patterns",
            Archetype::Naive => "Overly trusting, does not learn from betrayal",
            Archetype::Unknown => "Behavioral patterns are still emerging",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
