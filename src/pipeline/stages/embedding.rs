use super::{truncate_to_budget, StageContext};
use crate::chunking::input_budget;
use crate::db::{ArticleRepository, Task};
use crate::errors::StageError;
use tracing::info;

/// Embeds the cleaned article text, front-truncated to the model budget,
/// and stores the vector as JSON on the article row.
pub(crate) async fn run_embedding(ctx: &StageContext<'_>, task: &Task) -> Result<(), StageError> {
    let (article, cleaned) = ctx.cleaned_input(task)?;
    let payload = task.payload()?;
    let profile = ctx.config.resolve_model(payload.model.as_deref())?;

    let budget = input_budget(profile.context_window_tokens, profile.reserve_output_tokens);
    let input = truncate_to_budget(&cleaned, budget);

    let embedder = ctx.llm.embedder(
        &ctx.config.pipeline.embedding_model,
        profile.base_url.as_deref(),
        profile.api_key_env.as_deref(),
    )?;
    let vector = embedder.embed_text(&input).await?;
    if vector.is_empty() {
        return Err(StageError::data("embedding endpoint returned an empty vector"));
    }

    let encoded = serde_json::to_string(&vector)
        .map_err(|e| StageError::data(format!("embedding vector failed to encode: {}", e)))?;
    let mut conn = ctx.db.get_conn();
    let mut repo = ArticleRepository::new(&mut conn);
    repo.set_embedding(&article.id, &encoded)?;
    info!("article {} embedded ({} dims)", article.id, vector.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ModelProfile, WorkerConfig};
    use crate::core::{TaskKind, TaskPayload};
    use crate::db::{Article, Database};
    use crate::llm::testing::{ScriptedChat, ScriptedFactory};
    use crate::queue::TaskQueue;
    use chrono::Utc;

    #[tokio::test]
    async fn stores_the_vector_as_json() {
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
        let queue = TaskQueue::new(db.clone(), WorkerConfig::default());
        queue
            .enqueue(TaskKind::Embedding, Some("a1"), None, &TaskPayload::default())
            .unwrap();
        let task = queue.claim("w1").unwrap().unwrap();

        let factory = ScriptedFactory::new(ScriptedChat::new(vec![]));
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
        run_embedding(&ctx, &task).await.unwrap();

        let mut conn = db.get_conn();
        let mut repo = ArticleRepository::new(&mut conn);
        let stored = repo.get_article("a1").unwrap().embedding.unwrap();
        let vector: Vec<f32> = serde_json::from_str(&stored).unwrap();
        assert_eq!(vector.len(), 3);
    }
}
