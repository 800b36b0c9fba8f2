use super::{truncate_to_budget, StageContext};
use crate::chunking::{input_budget, looks_english};
use crate::core::TaskKind;
use crate::db::{ArticleRepository, Task};
use crate::errors::StageError;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ClassificationReply {
    category: String,
    #[serde(default)]
    language: Option<String>,
}

/// Classifies the cleaned article in a single model call returning JSON
/// `{category, language}` and persists both fields. Malformed model output
/// is a data error; the same prompt will fail the same way again.
pub(crate) async fn run_classification(
    ctx: &StageContext<'_>,
    task: &Task,
) -> Result<(), StageError> {
    let (article, cleaned) = ctx.cleaned_input(task)?;
    let payload = task.payload()?;
    let profile = ctx.config.resolve_model(payload.model.as_deref())?;

    let base_prompt = ctx.config.resolve_prompt(TaskKind::Classification, None, None);
    let categories = ctx.config.pipeline.categories.join(", ");
    let prompt = format!("{}\nAllowed categories: {}", base_prompt, categories);

    let budget = input_budget(profile.context_window_tokens, profile.reserve_output_tokens);
    let input = truncate_to_budget(&cleaned, budget);

    let chat = ctx.llm.chat(profile)?;
    let outcome = chat.complete(&prompt, &input).await?;
    ctx.record_usage(
        &task.id,
        &[crate::llm::RoundUsage {
            model: chat.model_name().to_string(),
            round: 0,
            prompt_tokens: outcome.prompt_tokens,
            completion_tokens: outcome.completion_tokens,
            latency_ms: outcome.latency_ms,
        }],
    )?;

    let reply = parse_reply(&outcome.content)?;
    let category = normalize_category(&reply.category, &ctx.config.pipeline.categories);
    let language = reply
        .language
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| {
            if looks_english(&cleaned) {
                "en".to_string()
            } else {
                "unknown".to_string()
            }
        });

    let mut conn = ctx.db.get_conn();
    let mut repo = ArticleRepository::new(&mut conn);
    repo.set_classification(&article.id, &category, &language)?;
    info!("article {} classified as {} / {}", article.id, category, language);
    Ok(())
}

/// Pulls the JSON object out of the reply, tolerating prose or code fences
/// around it.
fn parse_reply(content: &str) -> Result<ClassificationReply, StageError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(StageError::data(format!(
            "classification reply carries no JSON object: {:.120}",
            content
        )));
    };
    if end < start {
        return Err(StageError::data("classification reply carries no JSON object"));
    }
    serde_json::from_str(&content[start..=end])
        .map_err(|e| StageError::data(format!("malformed classification JSON: {}", e)))
}

/// Unknown categories collapse onto `other` rather than failing the stage.
fn normalize_category(raw: &str, allowed: &[String]) -> String {
    let candidate = raw.trim().to_lowercase();
    if allowed.iter().any(|c| c == &candidate) {
        candidate
    } else {
        "other".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bare_json_reply() {
        let reply = parse_reply(r#"{"category": "science", "language": "en"}"#).unwrap();
        assert_eq!(reply.category, "science");
        assert_eq!(reply.language.as_deref(), Some("en"));
    }

    #[test]
    fn parses_a_fenced_json_reply() {
        let reply =
            parse_reply("```json\n{\"category\": \"business\", \"language\": \"de\"}\n```").unwrap();
        assert_eq!(reply.category, "business");
    }

    #[test]
    fn prose_without_json_is_a_data_error() {
        let err = parse_reply("I think this article is about science.").unwrap_err();
        assert!(!err.retryable());
    }

    #[test]
    fn malformed_json_is_a_data_error() {
        let err = parse_reply(r#"{"category": }"#).unwrap_err();
        assert!(!err.retryable());
    }

    #[test]
    fn unknown_category_collapses_to_other() {
        let allowed = vec!["science".to_string(), "other".to_string()];
        assert_eq!(normalize_category("Science", &allowed), "science");
        assert_eq!(normalize_category("astrology", &allowed), "other");
    }
}
