//! Round prompt construction
//!
//! Pure: the prompt is rebuilt every round from one agent's own history.
//! The opponent is never named, only referred to as [`OPPONENT_LABEL`].

use std::fmt::Write as _;

use dilemma_state::Move;
use serde::{Deserialize, Serialize};

/// Anonymized label the prompt uses for the other agent
pub const OPPONENT_LABEL: &str = "Rival";

/// One past round from a single agent's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub round: u32,
    pub my_move: Move,
    pub opponent_move: Move,
    pub my_score: u32,
    pub opponent_score: u32,
}

/// Running totals `(mine, opponent's)` over a history
pub fn running_totals(history: &[HistoryEntry]) -> (u32, u32) {
    history.iter().fold((0, 0), |(mine, theirs), h| {
        (mine + h.my_score, theirs + h.opponent_score)
    })
}

/// Build the prompt for `current_round` of `total_rounds`.
pub fn build_prompt(history: &[HistoryEntry], current_round: u32, total_rounds: u32) -> String {
    let (my_total, opponent_total) = running_totals(history);
    let label = OPPONENT_LABEL.to_lowercase();

    let mut history_text = String::new();
    if history.is_empty() {
        history_text.push_str("No previous rounds.");
    } else {
        for (i, h) in history.iter().enumerate() {
            if i > 0 {
                history_text.push('\n');
            }
            let _ = write!(
                history_text,
                "Round {}: you played {}, {} played {}, you scored {}, they scored {}",
                h.round, h.my_move, label, h.opponent_move, h.my_score, h.opponent_score
            );
        }
    }

    format!(
        "PRISONER'S DILEMMA TOURNAMENT

You are an AI model competing against an anonymous {OPPONENT_LABEL} in a {total_rounds}-round Prisoner's Dilemma game.

RULES:
Each round, you and your {label} simultaneously choose COOPERATE or DEFECT.

PAYOFF MATRIX:
- Both COOPERATE: you 3 pts, {label} 3 pts (mutual benefit)
- You COOPERATE, {label} DEFECTS: you 0 pts, {label} 5 pts (you get exploited)
- You DEFECT, {label} COOPERATES: you 5 pts, {label} 0 pts (you exploit them)
- Both DEFECT: you 1 pt, {label} 1 pt (mutual punishment)

CURRENT STATUS:
- Round: {current_round} of {total_rounds}
- Your total score: {my_total}
- {OPPONENT_LABEL} total score: {opponent_total}

GAME HISTORY:
{history_text}

YOUR STRATEGIC ANALYSIS:
1. What patterns do you see in your {label}'s behavior?
2. What game theory strategy should you employ? (tit-for-tat, always cooperate, always defect, pavlov, ...)
3. How many rounds remain? Should you change course near the end?
4. Are you winning, losing, or tied? How does this affect your strategy?

IMPORTANT:
After your analysis, you MUST end your response with EXACTLY one of these lines:
MOVE: COOPERATE
MOVE: DEFECT"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(round: u32, my_move: Move, opponent_move: Move, mine: u32, theirs: u32) -> HistoryEntry {
        HistoryEntry {
            round,
            my_move,
            opponent_move,
            my_score: mine,
            opponent_score: theirs,
        }
    }

    #[test]
    fn first_round_prompt_has_no_history() {
        let prompt = build_prompt(&[], 1, 20);
        assert!(prompt.contains("Round: 1 of 20"));
        assert!(prompt.contains("No previous rounds."));
        assert!(prompt.contains("Your total score: 0"));
    }

    #[test]
    fn history_lines_and_totals() {
        let history = vec![
            entry(1, Move::Cooperate, Move::Defect, 0, 5),
            entry(2, Move::Defect, Move::Defect, 1, 1),
        ];
        let prompt = build_prompt(&history, 3, 20);
        assert!(prompt.contains(
            "Round 1: you played COOPERATE, rival played DEFECT, you scored 0, they scored 5"
        ));
        assert!(prompt.contains(
            "Round 2: you played DEFECT, rival played DEFECT, you scored 1, they scored 1"
        ));
        assert!(prompt.contains("Your total score: 1"));
        assert!(prompt.contains("Rival total score: 6"));
        assert!(prompt.contains("Round: 3 of 20"));
    }

    #[test]
    fn prompt_ends_with_move_directive() {
        let prompt = build_prompt(&[], 1, 5);
        assert!(prompt.ends_with("MOVE: COOPERATE\nMOVE: DEFECT"));
        assert!(prompt.contains("5-round"));
    }
}
