//! Iterated Prisoner's Dilemma payoff matrix.
//!
//! Temptation 5, reward 3, punishment 1, sucker 0. T > R > P > S and
//! 2R > T + S must hold; the tyrant index assumes `TEMPTATION` exactly.

use dilemma_state::Move;

pub const TEMPTATION: u32 = 5;
pub const REWARD: u32 = 3;
pub const PUNISHMENT: u32 = 1;
pub const SUCKER: u32 = 0;

/// Scores `(self, opponent)` for one round.
pub fn payoff(own: Move, opponent: Move) -> (u32, u32) {
    match (own, opponent) {
        (Move::Cooperate, Move::Cooperate) => (REWARD, REWARD),
        (Move::Cooperate, Move::Defect) => (SUCKER, TEMPTATION),
        (Move::Defect, Move::Cooperate) => (TEMPTATION, SUCKER),
        (Move::Defect, Move::Defect) => (PUNISHMENT, PUNISHMENT),
    }
}
