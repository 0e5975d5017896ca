//! Free-form completion text → move decision
//!
//! Total: every input, including the empty string, yields exactly one move.
//! Stages run from most to least precise and the first one that decides wins:
//!
//! 1. empty text → random move
//! 2. `MOVE: COOPERATE|DEFECT` directive
//! 3. decision phrases ("my choice", "I will", "final decision", ...)
//! 4. a bare `COOPERATE` / `DEFECT` word
//! 5. either word in the last five words
//! 6. cooperation vs defection keyword counts
//! 7. random move

use std::sync::OnceLock;

use dilemma_state::Move;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Rationale recorded when the backend returned nothing usable
pub const EMPTY_RESPONSE_RATIONALE: &str =
    "Backend returned an empty response; move chosen at random";

const COOPERATE_KEYWORDS: [&str; 6] = [
    "cooperat",
    "trust",
    "work together",
    "mutual",
    "benefit",
    "partner",
];
const DEFECT_KEYWORDS: [&str; 6] = [
    "defect",
    "betray",
    "exploit",
    "advantage",
    "selfish",
    "compete",
];
const TAIL_WORDS: usize = 5;

/// Which stage of the cascade produced the move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseSource {
    Empty,
    Directive,
    Phrase,
    BareWord,
    Tail,
    Keywords,
    Random,
}

impl ParseSource {
    /// True for the stages that guessed rather than read a decision.
    pub fn is_fallback(self) -> bool {
        !matches!(self, ParseSource::Directive)
    }
}

/// A parsed decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub mv: Move,
    pub rationale: String,
    pub source: ParseSource,
}

fn directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)MOVE:\s*(COOPERATE|DEFECT)").expect("valid regex"))
}

fn phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:MY CHOICE|MY DECISION|I CHOOSE|I WILL|FINAL DECISION).*?(COOPERATE|DEFECT)",
        )
        .expect("valid regex")
    })
}

fn bare_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(COOPERATE|DEFECT)\b").expect("valid regex"))
}

fn captured_move(re: &Regex, text: &str) -> Option<Move> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn tail_move(text: &str) -> Option<Move> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(TAIL_WORDS);
    let tail = words[start..].join(" ").to_uppercase();
    if tail.contains("COOPERATE") {
        Some(Move::Cooperate)
    } else if tail.contains("DEFECT") {
        Some(Move::Defect)
    } else {
        None
    }
}

fn keyword_move(text: &str) -> Option<Move> {
    let lower = text.to_lowercase();
    let present = |words: &[&str]| words.iter().filter(|w| lower.contains(*w)).count();
    let cooperate = present(&COOPERATE_KEYWORDS);
    let defect = present(&DEFECT_KEYWORDS);
    match cooperate.cmp(&defect) {
        std::cmp::Ordering::Greater => Some(Move::Cooperate),
        std::cmp::Ordering::Less => Some(Move::Defect),
        std::cmp::Ordering::Equal => None,
    }
}

fn random_move<R: Rng + ?Sized>(rng: &mut R) -> Move {
    if rng.gen_bool(0.5) {
        Move::Cooperate
    } else {
        Move::Defect
    }
}

/// Parse with the thread-local RNG.
pub fn parse_response(text: &str) -> ParsedResponse {
    parse_response_with(text, &mut rand::thread_rng())
}

/// Parse, drawing any random fallback from `rng`.
pub fn parse_response_with<R: Rng + ?Sized>(text: &str, rng: &mut R) -> ParsedResponse {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ParsedResponse {
            mv: random_move(rng),
            rationale: EMPTY_RESPONSE_RATIONALE.to_string(),
            source: ParseSource::Empty,
        };
    }

    if let Some(caps) = directive_re().captures(text) {
        if let (Some(whole), Some(mv)) = (caps.get(0), caps.get(1)) {
            if let Ok(mv) = mv.as_str().parse::<Move>() {
                let mut rationale = String::with_capacity(text.len());
                rationale.push_str(&text[..whole.start()]);
                rationale.push_str(&text[whole.end()..]);
                return ParsedResponse {
                    mv,
                    rationale: rationale.trim().to_string(),
                    source: ParseSource::Directive,
                };
            }
        }
    }

    let decided = |mv: Move, source: ParseSource| ParsedResponse {
        mv,
        rationale: trimmed.to_string(),
        source,
    };

    if let Some(mv) = captured_move(phrase_re(), text) {
        return decided(mv, ParseSource::Phrase);
    }
    if let Some(mv) = captured_move(bare_word_re(), text) {
        return decided(mv, ParseSource::BareWord);
    }
    if let Some(mv) = tail_move(text) {
        return decided(mv, ParseSource::Tail);
    }
    if let Some(mv) = keyword_move(text) {
        return decided(mv, ParseSource::Keywords);
    }

    decided(random_move(rng), ParseSource::Random)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn parse(text: &str) -> ParsedResponse {
        parse_response_with(text, &mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn directive_wins_over_surrounding_text() {
        let text = "They defected twice, so trust is gone.\nI will not betray them though.\nMOVE: COOPERATE";
        let parsed = parse(text);
        assert_eq!(parsed.mv, Move::Cooperate);
        assert_eq!(parsed.source, ParseSource::Directive);
        assert_eq!(
            parsed.rationale,
            "They defected twice, so trust is gone.\nI will not betray them though."
        );
    }

    #[test]
    fn directive_is_case_and_space_tolerant() {
        let parsed = parse("thinking...\nmove:defect");
        assert_eq!(parsed.mv, Move::Defect);
        assert_eq!(parsed.source, ParseSource::Directive);
        assert_eq!(parsed.rationale, "thinking...");

        let parsed = parse("Move:    Cooperate");
        assert_eq!(parsed.mv, Move::Cooperate);
        assert_eq!(parsed.rationale, "");
    }

    #[test]
    fn directive_parsing_is_deterministic_across_rngs() {
        let text = "Analysis of the rival suggests tit-for-tat. MOVE: DEFECT";
        for seed in 0..20 {
            let parsed = parse_response_with(text, &mut StdRng::seed_from_u64(seed));
            assert_eq!(parsed.mv, Move::Defect);
        }
    }

    #[test]
    fn decision_phrase_fallback() {
        let parsed = parse("After weighing it all, my final decision is to defect this time.");
        assert_eq!(parsed.mv, Move::Defect);
        assert_eq!(parsed.source, ParseSource::Phrase);

        let parsed = parse("I will cooperate, then reassess.");
        assert_eq!(parsed.mv, Move::Cooperate);
        assert_eq!(parsed.source, ParseSource::Phrase);
    }

    #[test]
    fn bare_word_fallback_takes_first_occurrence() {
        let parsed = parse("Cooperate seems right, even if they might defect.");
        assert_eq!(parsed.mv, Move::Cooperate);
        assert_eq!(parsed.source, ParseSource::BareWord);
        assert_eq!(
            parsed.rationale,
            "Cooperate seems right, even if they might defect."
        );
    }

    #[test]
    fn tail_fallback_catches_inflected_words() {
        let parsed = parse("Long reasoning here about history. Final answer: DEFECTING");
        assert_eq!(parsed.mv, Move::Defect);
        assert_eq!(parsed.source, ParseSource::Tail);
    }

    #[test]
    fn keyword_fallback_counts_presence() {
        let parsed = parse("Building mutual trust with a partner pays off.");
        assert_eq!(parsed.mv, Move::Cooperate);
        assert_eq!(parsed.source, ParseSource::Keywords);

        let parsed = parse("Time to exploit their naivety for a selfish advantage.");
        assert_eq!(parsed.mv, Move::Defect);
        assert_eq!(parsed.source, ParseSource::Keywords);
    }

    #[test]
    fn undecidable_text_falls_back_to_random() {
        let parsed = parse("Hmm. Hard to say.");
        assert_eq!(parsed.source, ParseSource::Random);
        assert_eq!(parsed.rationale, "Hmm. Hard to say.");
        assert!(Move::ALL.contains(&parsed.mv));
    }

    #[test]
    fn empty_and_whitespace_are_random_with_note() {
        for text in ["", "   ", "\n\t"] {
            let parsed = parse(text);
            assert_eq!(parsed.source, ParseSource::Empty);
            assert_eq!(parsed.rationale, EMPTY_RESPONSE_RATIONALE);
        }
    }

    #[test]
    fn empty_response_split_is_unbiased() {
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 10_000;
        let cooperations = (0..trials)
            .filter(|_| parse_response_with("", &mut rng).mv == Move::Cooperate)
            .count();
        let share = cooperations as f64 / trials as f64;
        assert!(
            (0.45..=0.55).contains(&share),
            "cooperation share {share} outside 45-55%"
        );
    }

    #[test]
    fn parser_is_total_over_odd_inputs() {
        let inputs = [
            "MOVE:",
            "MOVE: MAYBE",
            "🤖🤖🤖",
            "cooperatedefect",
            "DEFECT DEFECT COOPERATE",
            "a\nb\nc\nd\ne\nf",
        ];
        let mut rng = StdRng::seed_from_u64(1);
        for text in inputs {
            let parsed = parse_response_with(text, &mut rng);
            assert!(Move::ALL.contains(&parsed.mv), "no move for {text:?}");
        }
    }
}
