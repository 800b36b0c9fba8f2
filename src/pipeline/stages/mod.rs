mod classification;
mod cleaning;
mod embedding;
mod generic_content;
mod translation;
mod validation;

pub(crate) use classification::run_classification;
pub(crate) use cleaning::run_cleaning;
pub(crate) use embedding::run_embedding;
pub(crate) use generic_content::run_generic_content;
pub(crate) use translation::run_translation;
pub(crate) use validation::run_validation;

use crate::chunking::{
    chunk_markdown, estimate_tokens, finalize_markdown, input_budget, merge_with_overlap,
    needs_chunking,
};
use crate::config::{AppConfig, ModelProfile};
use crate::core::{ChunkCheckpoint, EventKind};
use crate::db::{Article, ArticleRepository, Database, Task, TaskRepository, UsageLog};
use crate::errors::StageError;
use crate::llm::{complete_chunk, LlmFactory, RoundUsage};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything a stage routine needs, borrowed for the duration of one task.
pub(crate) struct StageContext<'a> {
    pub db: &'a Database,
    pub config: &'a AppConfig,
    pub llm: &'a dyn LlmFactory,
}

impl StageContext<'_> {
    /// Loads the article a task operates on; a task without a subject is
    /// malformed.
    pub(crate) fn load_article(&self, task: &Task) -> Result<Article, StageError> {
        let article_id = task
            .subject_id
            .as_deref()
            .ok_or_else(|| StageError::data("task has no subject article"))?;
        let mut conn = self.db.get_conn();
        let mut repo = ArticleRepository::new(&mut conn);
        Ok(repo.get_article(article_id)?)
    }

    /// The cleaned markdown a downstream stage consumes.
    pub(crate) fn cleaned_input(&self, task: &Task) -> Result<(Article, String), StageError> {
        let article = self.load_article(task)?;
        let cleaned = article
            .cleaned_md
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| StageError::data("article has no cleaned content yet"))?;
        Ok((article, cleaned))
    }

    pub(crate) fn record_usage(&self, task_id: &str, rounds: &[RoundUsage]) -> Result<(), StageError> {
        let mut conn = self.db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);
        for round in rounds {
            repo.insert_usage(&UsageLog {
                id: Uuid::new_v4().to_string(),
                task_id: task_id.to_string(),
                model: round.model.clone(),
                round: round.round,
                prompt_tokens: round.prompt_tokens,
                completion_tokens: round.completion_tokens,
                latency_ms: round.latency_ms,
                created_at: Utc::now().naive_utc(),
            })?;
        }
        Ok(())
    }
}

/// Runs a whole-document markdown transform (cleaning, translation) under
/// the task's split strategy, resuming from the persisted checkpoint when
/// the task was reclaimed mid-document.
pub(crate) async fn transform_document(
    ctx: &StageContext<'_>,
    task: &Task,
    source: &str,
    system_prompt: &str,
    profile: &ModelProfile,
) -> Result<String, StageError> {
    let payload = task.payload()?;
    let strategy = payload
        .checkpoint
        .map(|c| c.strategy)
        .or(payload.strategy)
        .unwrap_or_default();
    let estimated = estimate_tokens(source);
    let budget = input_budget(profile.context_window_tokens, profile.reserve_output_tokens);
    let chat = ctx.llm.chat(profile)?;

    if !needs_chunking(estimated, strategy, budget) {
        let done = complete_chunk(
            chat.as_ref(),
            system_prompt,
            source,
            profile.max_continue_rounds,
        )
        .await?;
        ctx.record_usage(&task.id, &done.usage)?;
        return Ok(finalize_markdown(&done.text));
    }

    let chunk_tokens = profile.chunk_size_tokens.min(budget);
    let chunks = chunk_markdown(source, chunk_tokens, profile.chunk_overlap_tokens);

    // resume only when the checkpoint still matches this chunking run
    let (mut cursor, mut accumulated) = match payload.checkpoint {
        Some(cp) if cp.strategy == strategy && cp.cursor <= chunks.len() => {
            let draft = {
                let mut conn = ctx.db.get_conn();
                let mut repo = TaskRepository::new(&mut conn);
                repo.get_draft(&task.id)?
            };
            match draft {
                Some(d) => {
                    info!(
                        "task {} resuming at chunk {}/{}",
                        task.id,
                        cp.cursor,
                        chunks.len()
                    );
                    (cp.cursor, d.content)
                }
                None => (0, String::new()),
            }
        }
        _ => (0, String::new()),
    };

    if cursor == 0 {
        let mut conn = ctx.db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);
        repo.append_event(
            &task.id,
            EventKind::ChunkingPlan,
            None,
            None,
            None,
            None,
            Some(json!({
                "strategy": strategy,
                "chunks": chunks.len(),
                "estimated_tokens": estimated,
                "chunk_tokens": chunk_tokens,
            })),
        )?;
    }

    while cursor < chunks.len() {
        debug!("task {} chunk {}/{}", task.id, cursor + 1, chunks.len());
        let done = complete_chunk(
            chat.as_ref(),
            system_prompt,
            &chunks[cursor],
            profile.max_continue_rounds,
        )
        .await?;
        ctx.record_usage(&task.id, &done.usage)?;

        accumulated = if accumulated.is_empty() {
            done.text
        } else {
            merge_with_overlap(&accumulated, &done.text)
        };
        cursor += 1;

        let mut checkpointed = payload.clone();
        checkpointed.strategy = Some(strategy);
        checkpointed.checkpoint = Some(ChunkCheckpoint { strategy, cursor });
        let mut conn = ctx.db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);
        repo.upsert_draft(&task.id, &accumulated)?;
        repo.update_payload(&task.id, &checkpointed.canonical_json()?)?;
    }

    {
        let mut conn = ctx.db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);
        repo.delete_draft(&task.id)?;
    }
    Ok(finalize_markdown(&accumulated))
}

/// Keeps the leading lines of `text` that fit within `budget_tokens`.
pub(crate) fn truncate_to_budget(text: &str, budget_tokens: usize) -> String {
    if estimate_tokens(text) <= budget_tokens {
        return text.to_string();
    }
    let mut kept = String::new();
    let mut used = 0usize;
    for line in text.lines() {
        let line_tokens = estimate_tokens(line);
        if !kept.is_empty() && used + line_tokens > budget_tokens {
            break;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
        used += line_tokens;
    }
    kept
}
