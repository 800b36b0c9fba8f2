use super::{transform_document, StageContext};
use crate::core::TaskKind;
use crate::db::{ArticleRepository, Task};
use crate::errors::StageError;
use tracing::info;

/// Translates the cleaned markdown into the configured target language,
/// chunking large documents the same way cleaning does, and stores the
/// finalized result as `translation_md`.
pub(crate) async fn run_translation(ctx: &StageContext<'_>, task: &Task) -> Result<(), StageError> {
    let (article, cleaned) = ctx.cleaned_input(task)?;
    let payload = task.payload()?;
    let profile = ctx.config.resolve_model(payload.model.as_deref())?;

    let template = ctx
        .config
        .resolve_prompt(TaskKind::Translation, None, payload.category.as_deref());
    let prompt = template.replace("{language}", &ctx.config.pipeline.target_language);

    let translated = transform_document(ctx, task, &cleaned, &prompt, profile).await?;
    if translated.trim().is_empty() {
        return Err(StageError::data("translation produced empty output"));
    }

    let mut conn = ctx.db.get_conn();
    let mut repo = ArticleRepository::new(&mut conn);
    repo.set_translation(&article.id, &translated)?;
    info!(
        "article {} translated into {}",
        article.id, ctx.config.pipeline.target_language
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ModelProfile, WorkerConfig};
    use crate::core::TaskPayload;
    use crate::db::{Article, Database};
    use crate::llm::testing::{ScriptedChat, ScriptedFactory};
    use crate::llm::FinishReason;
    use crate::queue::TaskQueue;
    use chrono::Utc;

    fn setup() -> (Database, Task) {
        let db = Database::new_test();
        let now = Utc::now().naive_utc();
        {
            let mut conn = db.get_conn();
            let mut repo = ArticleRepository::new(&mut conn);
            repo.insert_article(&Article {
                id: "a1".to_string(),
                title: "t".to_string(),
                content_md: "# Title\n\nEnglish body.".to_string(),
                cleaned_md: Some("# Title\n\nEnglish body.".to_string()),
                language: Some("en".to_string()),
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
        let queue = TaskQueue::new(db.clone(), WorkerConfig::default());
        queue
            .enqueue(TaskKind::Translation, Some("a1"), None, &TaskPayload::default())
            .unwrap();
        let task = queue.claim("w1").unwrap().unwrap();
        (db, task)
    }

    #[tokio::test]
    async fn prompt_carries_the_target_language() {
        let (db, task) = setup();
        let factory = ScriptedFactory::new(ScriptedChat::new(vec![ScriptedChat::reply(
            "# 标题\n\n中文正文。",
            FinishReason::Stop,
        )]));
        let config = AppConfig {
            models: vec![ModelProfile {
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
            db: &db,
            config: &config,
            llm: &factory,
        };
        run_translation(&ctx, &task).await.unwrap();

        let calls = factory.chat.calls.lock().unwrap();
        assert!(calls[0].0.contains("Chinese"));
        assert!(!calls[0].0.contains("{language}"));
        drop(calls);

        let mut conn = db.get_conn();
        let mut repo = ArticleRepository::new(&mut conn);
        let article = repo.get_article("a1").unwrap();
        assert_eq!(article.translation_md.as_deref(), Some("# 标题\n\n中文正文。"));
        assert_eq!(article.translation_status, "completed");
    }
}
