use super::{truncate_to_budget, StageContext};
use crate::chunking::input_budget;
use crate::core::TaskKind;
use crate::db::{ArticleRepository, Task};
use crate::errors::StageError;
use crate::llm::complete_chunk;
use tracing::info;

/// Generates one content field (summary, outline, key points or quotes) from
/// the cleaned article and stores it in the column pair selected by the
/// task's content kind.
pub(crate) async fn run_generic_content(
    ctx: &StageContext<'_>,
    task: &Task,
) -> Result<(), StageError> {
    let content_kind = task
        .content_kind()
        .ok_or_else(|| StageError::data("generic content task has no content kind"))?;
    let (article, cleaned) = ctx.cleaned_input(task)?;
    let payload = task.payload()?;
    let profile = ctx.config.resolve_model(payload.model.as_deref())?;

    let category = payload
        .category
        .as_deref()
        .or(article.category.as_deref());
    let prompt = ctx
        .config
        .resolve_prompt(TaskKind::GenericContent, Some(content_kind), category);

    let budget = input_budget(profile.context_window_tokens, profile.reserve_output_tokens);
    let input = truncate_to_budget(&cleaned, budget);

    let chat = ctx.llm.chat(profile)?;
    let done = complete_chunk(chat.as_ref(), &prompt, &input, profile.max_continue_rounds).await?;
    ctx.record_usage(&task.id, &done.usage)?;

    let text = done.text.trim();
    let mut conn = ctx.db.get_conn();
    let mut repo = ArticleRepository::new(&mut conn);
    repo.set_generated(&article.id, content_kind, text)?;
    info!(
        "article {} {} generated ({} chars)",
        article.id,
        content_kind,
        text.chars().count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, WorkerConfig};
    use crate::core::{ContentKind, TaskPayload};
    use crate::db::{Article, Database};
    use crate::llm::testing::{ScriptedChat, ScriptedFactory};
    use crate::llm::FinishReason;
    use crate::queue::TaskQueue;
    use chrono::Utc;

    fn setup(content_kind: ContentKind) -> (Database, Task) {
        let db = Database::new_test();
        let now = Utc::now().naive_utc();
        {
            let mut conn = db.get_conn();
            let mut repo = ArticleRepository::new(&mut conn);
            repo.insert_article(&Article {
                id: "a1".to_string(),
                title: "t".to_string(),
                content_md: "# T\n\nBody.".to_string(),
                cleaned_md: Some("# T\n\nBody.".to_string()),
                language: Some("en".to_string()),
                category: Some("science".to_string()),
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
        let queue = TaskQueue::new(db.clone(), WorkerConfig::default());
        queue
            .enqueue(
                TaskKind::GenericContent,
                Some("a1"),
                Some(content_kind),
                &TaskPayload::default(),
            )
            .unwrap();
        let task = queue.claim("w1").unwrap().unwrap();
        (db, task)
    }

    async fn run_with(db: &Database, task: &Task, reply: &str) -> Result<(), StageError> {
        let factory =
            ScriptedFactory::new(ScriptedChat::new(vec![ScriptedChat::reply(
                reply,
                FinishReason::Stop,
            )]));
        let config = AppConfig {
            models: vec![crate::config::ModelProfile {
                name: "default".to_string(),
                model: "test-model".to_string(),
                base_url: None,
                api_key_env: None,
                enabled: true,
                context_window_tokens: 8192,
                reserve_output_tokens: 2048,
                chunk_size_tokens: 3000,
                chunk_overlap_tokens: 200,
                max_continue_rounds: 3,
                request_timeout_secs: 120,
            }],
            ..AppConfig::default()
        };
        let ctx = StageContext {
            db,
            config: &config,
            llm: &factory,
        };
        run_generic_content(&ctx, task).await
    }

    #[tokio::test]
    async fn summary_lands_in_the_summary_column() {
        let (db, task) = setup(ContentKind::Summary);
        run_with(&db, &task, "A short summary.").await.unwrap();

        let mut conn = db.get_conn();
        let mut repo = ArticleRepository::new(&mut conn);
        let article = repo.get_article("a1").unwrap();
        assert_eq!(article.summary.as_deref(), Some("A short summary."));
        assert_eq!(article.summary_status, "completed");
        assert_eq!(article.outline_status, "pending");
    }

    #[tokio::test]
    async fn outline_lands_in_the_outline_column() {
        let (db, task) = setup(ContentKind::Outline);
        run_with(&db, &task, "- point one\n- point two").await.unwrap();

        let mut conn = db.get_conn();
        let mut repo = ArticleRepository::new(&mut conn);
        let article = repo.get_article("a1").unwrap();
        assert_eq!(article.outline.as_deref(), Some("- point one\n- point two"));
        assert_eq!(article.outline_status, "completed");
        assert!(article.summary.is_none());
    }

    #[tokio::test]
    async fn missing_content_kind_is_a_data_error() {
        let (db, mut task) = setup(ContentKind::Summary);
        task.content_kind = None;
        let err = run_with(&db, &task, "anything").await.unwrap_err();
        assert!(!err.retryable());
    }
}
