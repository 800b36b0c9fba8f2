use super::tokens::estimate_tokens;

/// Tracks open/closed state of ``` and ~~~ fences while scanning lines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FenceState {
    #[default]
    Closed,
    Backtick,
    Tilde,
}

impl FenceState {
    /// Feeds one line and returns the state after it.
    pub(crate) fn feed(self, line: &str) -> Self {
        let trimmed = line.trim_start();
        match self {
            FenceState::Closed => {
                if trimmed.starts_with("```") {
                    FenceState::Backtick
                } else if trimmed.starts_with("~~~") {
                    FenceState::Tilde
                } else {
                    FenceState::Closed
                }
            }
            FenceState::Backtick => {
                if trimmed.starts_with("```") {
                    FenceState::Closed
                } else {
                    self
                }
            }
            FenceState::Tilde => {
                if trimmed.starts_with("~~~") {
                    FenceState::Closed
                } else {
                    self
                }
            }
        }
    }

    pub(crate) fn closing_marker(self) -> Option<&'static str> {
        match self {
            FenceState::Closed => None,
            FenceState::Backtick => Some("```"),
            FenceState::Tilde => Some("~~~"),
        }
    }
}

/// Splits markdown into paragraph-level blocks on blank lines. A blank line
/// inside an open fenced code block does not end the block.
pub fn build_blocks(markdown: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut fence = FenceState::default();

    for line in markdown.lines() {
        if line.trim().is_empty() && fence == FenceState::Closed {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        fence = fence.feed(line);
        current.push(line);
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

/// Splits a single block that alone exceeds the chunk budget, with
/// format-aware rules so every piece stays independently valid markdown.
pub fn split_large_block(block: &str, chunk_size_tokens: usize) -> Vec<String> {
    let lines: Vec<&str> = block.lines().collect();

    if let Some(fenced) = split_fenced_block(&lines, chunk_size_tokens) {
        return fenced;
    }
    if let Some(table) = split_table_block(&lines, chunk_size_tokens) {
        return table;
    }
    split_by_lines(&lines, chunk_size_tokens, &[])
}

/// Fenced code block: split by interior lines, re-wrapping each piece with
/// the original opening fence (keeps the language tag) and a closing marker.
fn split_fenced_block(lines: &[&str], chunk_size_tokens: usize) -> Option<Vec<String>> {
    let first = lines.first()?;
    let state = FenceState::default().feed(first);
    let closing = state.closing_marker()?;

    let last_closes = lines.len() > 1 && state.feed(lines[lines.len() - 1]) == FenceState::Closed;
    let interior = if last_closes {
        &lines[1..lines.len() - 1]
    } else {
        &lines[1..]
    };

    let mut pieces = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = estimate_tokens(first);

    for line in interior {
        let line_tokens = estimate_tokens(line);
        if !current.is_empty() && current_tokens + line_tokens > chunk_size_tokens {
            pieces.push(wrap_fence(first, &current, closing));
            current.clear();
            current_tokens = estimate_tokens(first);
        }
        current.push(line);
        current_tokens += line_tokens;
    }
    if !current.is_empty() || pieces.is_empty() {
        pieces.push(wrap_fence(first, &current, closing));
    }
    Some(pieces)
}

fn wrap_fence(opening: &str, body: &[&str], closing: &str) -> String {
    let mut piece = String::from(opening);
    for line in body {
        piece.push('\n');
        piece.push_str(line);
    }
    piece.push('\n');
    piece.push_str(closing);
    piece
}

/// Markdown table: split by rows, repeating the header and separator on
/// every piece.
fn split_table_block(lines: &[&str], chunk_size_tokens: usize) -> Option<Vec<String>> {
    if lines.len() < 2
        || !lines[0].trim_start().starts_with('|')
        || !is_table_separator(lines[1])
    {
        return None;
    }
    let header = [lines[0], lines[1]];
    Some(split_by_lines(&lines[2..], chunk_size_tokens, &header))
}

fn is_table_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Plain split by raw lines, optionally repeating a per-piece prefix
/// (table header rows) at the top of every piece.
fn split_by_lines(lines: &[&str], chunk_size_tokens: usize, prefix: &[&str]) -> Vec<String> {
    let prefix_tokens: usize = prefix.iter().map(|l| estimate_tokens(l)).sum();
    let mut pieces = Vec::new();
    let mut current: Vec<&str> = prefix.to_vec();
    let mut current_tokens = prefix_tokens;

    for line in lines {
        let line_tokens = estimate_tokens(line);
        if current.len() > prefix.len() && current_tokens + line_tokens > chunk_size_tokens {
            pieces.push(current.join("\n"));
            current = prefix.to_vec();
            current_tokens = prefix_tokens;
        }
        current.push(line);
        current_tokens += line_tokens;
    }
    if current.len() > prefix.len() || pieces.is_empty() {
        pieces.push(current.join("\n"));
    }
    pieces
}

/// Packs blocks into chunks of at most `chunk_size_tokens`, carrying the
/// closing blocks of each chunk forward as an overlap seed of at most
/// `overlap_tokens` so the model keeps cross-chunk context. The merge step
/// deduplicates the seed later.
pub fn chunk_markdown(content: &str, chunk_size_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let mut blocks = Vec::new();
    for block in build_blocks(content) {
        if estimate_tokens(&block) > chunk_size_tokens {
            blocks.extend(split_large_block(&block, chunk_size_tokens));
        } else {
            blocks.push(block);
        }
    }

    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;
    let mut seed_len = 0usize;

    for block in blocks {
        let block_tokens = estimate_tokens(&block);
        if current.len() > seed_len && current_tokens + block_tokens > chunk_size_tokens {
            chunks.push(current.join("\n\n"));

            let mut seed: Vec<String> = Vec::new();
            let mut seed_tokens = 0usize;
            for prev in current.iter().rev() {
                let prev_tokens = estimate_tokens(prev);
                if seed_tokens + prev_tokens > overlap_tokens {
                    break;
                }
                seed.insert(0, prev.clone());
                seed_tokens += prev_tokens;
            }
            seed_len = seed.len();
            current = seed;
            current_tokens = seed_tokens;
        }
        current.push(block);
        current_tokens += block_tokens;
    }
    if current.len() > seed_len || chunks.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    chunks
}
