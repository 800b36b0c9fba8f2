use super::splitter::FenceState;
use crate::constants::{OVERLAP_MIN_MATCH_CHARS, OVERLAP_SEARCH_WINDOW_CHARS};

/// Joins a continuation (or next-chunk) output onto the accumulated text,
/// removing the duplicated overlap the model was seeded with.
///
/// Finds the longest suffix of `existing` that is also a prefix of `new`,
/// searching at most the last 600 characters and accepting matches of at
/// least 40 characters. The minimum scales down for accumulators shorter
/// than the window, so the very first continuation round still dedups.
/// When nothing matches, the parts are joined with a blank line.
pub fn merge_with_overlap(existing: &str, new: &str) -> String {
    if existing.is_empty() {
        return new.to_string();
    }
    if new.is_empty() {
        return existing.to_string();
    }

    let existing_chars = existing.chars().count();
    let min_match = OVERLAP_MIN_MATCH_CHARS.min((existing_chars / 4).max(1));

    // byte offsets of the last `OVERLAP_SEARCH_WINDOW_CHARS` char boundaries
    let boundaries: Vec<usize> = existing
        .char_indices()
        .map(|(i, _)| i)
        .rev()
        .take(OVERLAP_SEARCH_WINDOW_CHARS)
        .collect();

    for &start in boundaries.iter().rev() {
        let suffix = &existing[start..];
        if suffix.chars().count() < min_match {
            break;
        }
        if new.starts_with(suffix) {
            let mut merged = String::with_capacity(existing.len() + new.len() - suffix.len());
            merged.push_str(existing);
            merged.push_str(&new[suffix.len()..]);
            return merged;
        }
    }

    format!("{}\n\n{}", existing, new)
}

/// Last-resort structural repair of assembled model output so partial or
/// truncated markdown still renders: whitespace normalization, closing an
/// unterminated fence, and separating table runs from trailing prose.
pub fn finalize_markdown(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut fence = FenceState::default();
    let mut blank_run = 0usize;

    for line in text.lines() {
        let next_fence = fence.feed(line);
        let inside_fence = fence != FenceState::Closed || next_fence != FenceState::Closed;
        fence = next_fence;

        if inside_fence {
            blank_run = 0;
            out.push(line.to_string());
            continue;
        }

        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run == 1 {
                out.push(String::new());
            }
            continue;
        }
        blank_run = 0;

        // a table run immediately followed by prose breaks most renderers
        if !trimmed.starts_with('|') {
            if let Some(prev) = out.last() {
                if prev.starts_with('|') {
                    out.push(String::new());
                }
            }
        }
        out.push(trimmed.to_string());
    }

    if let Some(marker) = fence.closing_marker() {
        out.push(marker.to_string());
    }

    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
