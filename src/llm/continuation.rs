use crate::chunking::merge_with_overlap;
use crate::constants::{CONTINUATION_INSTRUCTION, CONTINUATION_TAIL_CHARS};
use crate::errors::StageError;
use crate::llm::{ChatCompletion, FinishReason};
use tracing::debug;

/// Usage of one model call, recorded per continuation round.
#[derive(Debug, Clone)]
pub struct RoundUsage {
    pub model: String,
    pub round: i32,
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub latency_ms: i64,
}

/// Fully assembled output for one chunk, plus the per-round usage trail.
#[derive(Debug)]
pub struct ChunkCompletion {
    pub text: String,
    pub usage: Vec<RoundUsage>,
}

/// Drives one chunk through the model, issuing continuation rounds while
/// the model reports truncated output and merging each round into the
/// accumulator without duplicating the overlap.
///
/// # Errors
///
/// * Data (not retryable) when the first round returns empty output.
/// * External (retryable) when output is still truncated after
///   `max_continue_rounds` continuation rounds.
pub async fn complete_chunk(
    client: &dyn ChatCompletion,
    system_prompt: &str,
    chunk_text: &str,
    max_continue_rounds: usize,
) -> Result<ChunkCompletion, StageError> {
    let mut usage = Vec::new();

    let first = client.complete(system_prompt, chunk_text).await?;
    usage.push(RoundUsage {
        model: client.model_name().to_string(),
        round: 0,
        prompt_tokens: first.prompt_tokens,
        completion_tokens: first.completion_tokens,
        latency_ms: first.latency_ms,
    });

    if first.content.trim().is_empty() {
        return Err(StageError::data("model returned empty output"));
    }

    let mut accumulated = first.content;
    let mut finish_reason = first.finish_reason;
    let mut round = 0usize;

    while finish_reason == FinishReason::Length {
        if round >= max_continue_rounds {
            return Err(StageError::external(format!(
                "output still truncated after {} continuation round(s)",
                max_continue_rounds
            )));
        }
        round += 1;

        let tail = char_tail(&accumulated, CONTINUATION_TAIL_CHARS);
        let continuation_prompt = format!("{}\n\n{}", CONTINUATION_INSTRUCTION, tail);
        debug!("continuation round {} ({} chars so far)", round, accumulated.len());

        let next = client.complete(system_prompt, &continuation_prompt).await?;
        usage.push(RoundUsage {
            model: client.model_name().to_string(),
            round: round as i32,
            prompt_tokens: next.prompt_tokens,
            completion_tokens: next.completion_tokens,
            latency_ms: next.latency_ms,
        });

        if next.content.trim().is_empty() {
            // the model had nothing left to add; take what we have
            break;
        }

        accumulated = merge_with_overlap(&accumulated, &next.content);
        finish_reason = next.finish_reason;
    }

    Ok(ChunkCompletion {
        text: accumulated,
        usage,
    })
}

/// The last `max_chars` characters of `text`, on a char boundary.
fn char_tail(text: &str, max_chars: usize) -> &str {
    match text.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedChat;

    #[tokio::test]
    async fn single_round_returns_content() {
        let chat = ScriptedChat::new(vec![ScriptedChat::reply(
            "cleaned text",
            FinishReason::Stop,
        )]);
        let result = complete_chunk(&chat, "system", "chunk", 3).await.unwrap();
        assert_eq!(result.text, "cleaned text");
        assert_eq!(result.usage.len(), 1);
        assert_eq!(result.usage[0].round, 0);
    }

    #[tokio::test]
    async fn truncated_output_is_continued_and_merged() {
        let part_one = "The committee assembled early in the morning and began reviewing the";
        let part_two = "began reviewing the agenda items one by one until every point was settled.";
        let chat = ScriptedChat::new(vec![
            ScriptedChat::reply(part_one, FinishReason::Length),
            ScriptedChat::reply(part_two, FinishReason::Stop),
        ]);

        let result = complete_chunk(&chat, "system", "chunk", 3).await.unwrap();
        assert_eq!(
            result.text,
            "The committee assembled early in the morning and began reviewing the agenda items one by one until every point was settled."
        );
        assert_eq!(result.usage.len(), 2);

        // the continuation prompt embeds the tail of the accumulator
        let calls = chat.calls.lock().unwrap();
        assert!(calls[1].1.contains("reviewing the"));
    }

    #[tokio::test]
    async fn exhausted_rounds_fail_retryably() {
        let chat = ScriptedChat::new(vec![
            ScriptedChat::reply("part one of a very long answer that keeps", FinishReason::Length),
            ScriptedChat::reply("answer that keeps going and going without", FinishReason::Length),
        ]);
        let err = complete_chunk(&chat, "system", "chunk", 1).await.unwrap_err();
        assert!(err.retryable());
        assert!(err.message.contains("truncated"));
    }

    #[tokio::test]
    async fn empty_first_round_is_a_data_error() {
        let chat = ScriptedChat::new(vec![ScriptedChat::reply("  \n", FinishReason::Stop)]);
        let err = complete_chunk(&chat, "system", "chunk", 3).await.unwrap_err();
        assert!(!err.retryable());
    }

    #[tokio::test]
    async fn empty_continuation_round_ends_the_loop() {
        let chat = ScriptedChat::new(vec![
            ScriptedChat::reply("all the model had to say", FinishReason::Length),
            ScriptedChat::reply("", FinishReason::Stop),
        ]);
        let result = complete_chunk(&chat, "system", "chunk", 3).await.unwrap();
        assert_eq!(result.text, "all the model had to say");
    }
}
