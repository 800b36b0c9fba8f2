use crate::constants::{INPUT_BUDGET_SAFETY_MARGIN, MIN_INPUT_BUDGET_TOKENS};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a document is split across model calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Chunk only when the token estimate exceeds the input budget.
    #[default]
    Auto,
    /// Force a single call regardless of size.
    Single,
    /// Force chunked processing regardless of size.
    Chunked,
}

impl FromStr for SplitStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SplitStrategy::Auto),
            "single" => Ok(SplitStrategy::Single),
            "chunked" => Ok(SplitStrategy::Chunked),
            _ => Err(()),
        }
    }
}

/// Heuristic token estimate for mixed CJK/Latin markdown.
///
/// CJK characters count 1:1, whitespace-delimited alphanumeric words count
/// 1.3 tokens each, remaining symbol characters 0.2 each. Only consistency
/// matters here: the estimate drives a conservative chunk boundary, it does
/// not need to match any real tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    let mut cjk_chars = 0usize;
    let mut words = 0usize;
    let mut symbols = 0usize;
    let mut in_word = false;

    for ch in text.chars() {
        if is_cjk(ch) {
            cjk_chars += 1;
            in_word = false;
        } else if ch.is_alphanumeric() {
            if !in_word {
                words += 1;
                in_word = true;
            }
        } else {
            if !ch.is_whitespace() {
                symbols += 1;
            }
            in_word = false;
        }
    }

    let estimate = cjk_chars as f64 + words as f64 * 1.3 + symbols as f64 * 0.2;
    (estimate.round() as usize).max(1)
}

/// Tokens of input a single call may carry once the output reservation and
/// the safety margin are subtracted from the context window.
pub fn input_budget(context_window_tokens: usize, reserve_output_tokens: usize) -> usize {
    context_window_tokens
        .saturating_sub(reserve_output_tokens)
        .saturating_sub(INPUT_BUDGET_SAFETY_MARGIN)
        .max(MIN_INPUT_BUDGET_TOKENS)
}

/// Decides whether a document gets chunked under the given strategy.
pub fn needs_chunking(estimated_tokens: usize, strategy: SplitStrategy, budget: usize) -> bool {
    match strategy {
        SplitStrategy::Single => false,
        SplitStrategy::Chunked => true,
        SplitStrategy::Auto => estimated_tokens > budget,
    }
}

/// Rough check used as a fallback when classification did not report a
/// language: treats text whose non-whitespace characters are predominantly
/// ASCII letters as English.
pub fn looks_english(text: &str) -> bool {
    let mut ascii_letters = 0usize;
    let mut cjk_chars = 0usize;
    for ch in text.chars() {
        if ch.is_ascii_alphabetic() {
            ascii_letters += 1;
        } else if is_cjk(ch) {
            cjk_chars += 1;
        }
    }
    ascii_letters > cjk_chars * 2 && ascii_letters > 0
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x3040..=0x30FF      // hiragana, katakana
        | 0x3400..=0x4DBF    // CJK extension A
        | 0x4E00..=0x9FFF    // CJK unified
        | 0xAC00..=0xD7AF    // hangul syllables
        | 0xF900..=0xFAFF    // CJK compatibility
        | 0xFF00..=0xFFEF    // fullwidth forms
        | 0x20000..=0x2A6DF  // CJK extension B
    )
}
