use super::{transform_document, StageContext};
use crate::core::TaskKind;
use crate::db::{ArticleRepository, Task};
use crate::errors::StageError;
use tracing::info;

/// Cleans the raw scraped markdown of an article, chunking the document when
/// it exceeds the model's input budget, and stores the finalized result as
/// `cleaned_md`.
pub(crate) async fn run_cleaning(ctx: &StageContext<'_>, task: &Task) -> Result<(), StageError> {
    let article = ctx.load_article(task)?;
    if article.content_md.trim().is_empty() {
        return Err(StageError::data("article has no content to clean"));
    }

    let payload = task.payload()?;
    let profile = ctx.config.resolve_model(payload.model.as_deref())?;
    let prompt = ctx
        .config
        .resolve_prompt(TaskKind::Cleaning, None, payload.category.as_deref());

    let cleaned = transform_document(ctx, task, &article.content_md, &prompt, profile).await?;
    if cleaned.trim().is_empty() {
        return Err(StageError::data("cleaning produced empty output"));
    }

    let mut conn = ctx.db.get_conn();
    let mut repo = ArticleRepository::new(&mut conn);
    repo.set_cleaned(&article.id, &cleaned)?;
    info!(
        "article {} cleaned ({} -> {} chars)",
        article.id,
        article.content_md.chars().count(),
        cleaned.chars().count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::SplitStrategy;
    use crate::config::{AppConfig, ModelProfile, WorkerConfig};
    use crate::core::{TaskPayload, TaskStatus};
    use crate::db::{Article, Database, TaskRepository};
    use crate::llm::testing::{ScriptedChat, ScriptedFactory};
    use crate::llm::FinishReason;
    use crate::queue::TaskQueue;
    use chrono::Utc;

    fn insert_article(db: &Database, id: &str, content: &str) {
        let now = Utc::now().naive_utc();
        let mut conn = db.get_conn();
        let mut repo = ArticleRepository::new(&mut conn);
        repo.insert_article(&Article {
            id: id.to_string(),
            title: "t".to_string(),
            content_md: content.to_string(),
            cleaned_md: None,
            language: None,
            category: None,
            summary: None,
            summary_status: "pending".to_string(),
            outline: None,
            outline_status: "pending".to_string(),
            key_points: None,
            key_points_status: "pending".to_string(),
            quotes: None,
            quotes_status: "pending".to_string(),
            translation_md: None,
            translation_status: "pending".to_string(),
            embedding: None,
            status: "processing".to_string(),
            last_error: None,
            created_at: now,
            updated_at: now,
        })
        .unwrap();
    }

    fn small_chunk_config() -> AppConfig {
        AppConfig {
            models: vec![ModelProfile {
                name: "default".to_string(),
                model: "test-model".to_string(),
                base_url: None,
                api_key_env: None,
                enabled: true,
                context_window_tokens: 8192,
                reserve_output_tokens: 2048,
                chunk_size_tokens: 20,
                chunk_overlap_tokens: 8,
                max_continue_rounds: 3,
                request_timeout_secs: 120,
            }],
            ..AppConfig::default()
        }
    }

    fn claimed_task(db: &Database, payload: &TaskPayload) -> Task {
        let queue = TaskQueue::new(db.clone(), WorkerConfig::default());
        queue
            .enqueue(TaskKind::Cleaning, Some("a1"), None, payload)
            .unwrap();
        queue.claim("w1").unwrap().unwrap()
    }

    #[tokio::test]
    async fn empty_source_is_a_data_error() {
        let db = Database::new_test();
        insert_article(&db, "a1", "   \n  ");
        let factory = ScriptedFactory::new(ScriptedChat::new(vec![]));
        let config = small_chunk_config();
        let ctx = StageContext {
            db: &db,
            config: &config,
            llm: &factory,
        };
        let task = claimed_task(&db, &TaskPayload::default());
        let err = run_cleaning(&ctx, &task).await.unwrap_err();
        assert!(!err.retryable());
    }

    #[tokio::test]
    async fn forced_chunking_checkpoints_every_chunk() {
        let db = Database::new_test();
        insert_article(
            &db,
            "a1",
            "First paragraph about one topic with enough words to count.\n\n\
             Second paragraph about another topic with enough words to count.\n\n\
             Third paragraph about a final topic with enough words to count.",
        );
        let chat = ScriptedChat::new(vec![
            ScriptedChat::reply("First cleaned paragraph of output text.", FinishReason::Stop),
            ScriptedChat::reply("Second cleaned paragraph of output text.", FinishReason::Stop),
            ScriptedChat::reply("Third cleaned paragraph of output text.", FinishReason::Stop),
        ]);
        let factory = ScriptedFactory::new(chat);
        let config = small_chunk_config();
        let ctx = StageContext {
            db: &db,
            config: &config,
            llm: &factory,
        };
        let payload = TaskPayload {
            strategy: Some(SplitStrategy::Chunked),
            ..TaskPayload::default()
        };
        let task = claimed_task(&db, &payload);

        run_cleaning(&ctx, &task).await.unwrap();

        let mut conn = db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);
        // the draft is cleared once the stage finishes
        assert!(repo.get_draft(&task.id).unwrap().is_none());
        // the final checkpoint points one past the last chunk
        let updated = repo.get_task(&task.id).unwrap();
        let checkpoint = updated.payload().unwrap().checkpoint.unwrap();
        assert!(checkpoint.cursor >= 1);
        // a chunking plan event was appended once
        let plans: Vec<_> = repo
            .events_for_task(&task.id)
            .unwrap()
            .into_iter()
            .filter(|e| e.event_kind == "chunking_plan")
            .collect();
        assert_eq!(plans.len(), 1);
        // usage was recorded for every model call
        assert!(!repo.usage_for_task(&task.id).unwrap().is_empty());
        drop(conn);

        let mut conn = db.get_conn();
        let mut articles = ArticleRepository::new(&mut conn);
        let article = articles.get_article("a1").unwrap();
        let cleaned = article.cleaned_md.unwrap();
        assert!(cleaned.contains("First cleaned paragraph"));
        assert!(cleaned.contains("Third cleaned paragraph"));
    }

    #[tokio::test]
    async fn resumes_from_checkpoint_instead_of_restarting() {
        let db = Database::new_test();
        insert_article(
            &db,
            "a1",
            "First paragraph about one topic with enough words to count.\n\n\
             Second paragraph about another topic with enough words to count.\n\n\
             Third paragraph about a final topic with enough words to count.",
        );
        let payload = TaskPayload {
            strategy: Some(SplitStrategy::Chunked),
            ..TaskPayload::default()
        };
        let task = claimed_task(&db, &payload);

        // simulate a previous worker that finished the first chunk and died
        {
            let mut conn = db.get_conn();
            let mut repo = TaskRepository::new(&mut conn);
            let mut checkpointed = payload.clone();
            checkpointed.checkpoint = Some(crate::core::ChunkCheckpoint {
                strategy: SplitStrategy::Chunked,
                cursor: 1,
            });
            repo.update_payload(&task.id, &checkpointed.canonical_json().unwrap())
                .unwrap();
            repo.upsert_draft(&task.id, "First cleaned paragraph of output text.")
                .unwrap();
        }
        let task = {
            let mut conn = db.get_conn();
            let mut repo = TaskRepository::new(&mut conn);
            repo.get_task(&task.id).unwrap()
        };
        assert_eq!(task.status().unwrap(), TaskStatus::Processing);

        // only the remaining chunks are sent to the model
        let chat = ScriptedChat::new(vec![
            ScriptedChat::reply("Second cleaned paragraph of output text.", FinishReason::Stop),
            ScriptedChat::reply("Third cleaned paragraph of output text.", FinishReason::Stop),
        ]);
        let factory = ScriptedFactory::new(chat);
        let config = small_chunk_config();
        let ctx = StageContext {
            db: &db,
            config: &config,
            llm: &factory,
        };
        run_cleaning(&ctx, &task).await.unwrap();

        let calls = factory.chat.calls.lock().unwrap();
        assert!(calls.len() <= 2, "resumed run must skip completed chunks");
        for (_, user_text) in calls.iter() {
            assert!(!user_text.contains("First paragraph about one topic"));
        }
        drop(calls);

        let mut conn = db.get_conn();
        let mut articles = ArticleRepository::new(&mut conn);
        let cleaned = articles.get_article("a1").unwrap().cleaned_md.unwrap();
        assert!(cleaned.contains("First cleaned paragraph"));
        assert!(cleaned.contains("Third cleaned paragraph"));
    }
}
