use super::StageContext;
use crate::constants::CLEANED_MIN_LENGTH_RATIO;
use crate::db::Task;
use crate::errors::StageError;
use tracing::debug;

/// Structural acceptance of the cleaning output: the cleaned markdown must
/// be non-empty, keep its code fences balanced, and not have collapsed below
/// a fraction of the source length. Failures are data errors; a model that
/// mangled the document once will mangle it again.
pub(crate) fn run_validation(ctx: &StageContext<'_>, task: &Task) -> Result<(), StageError> {
    let (article, cleaned) = ctx.cleaned_input(task)?;

    if !fences_balanced(&cleaned) {
        return Err(StageError::data("cleaned markdown has an unclosed code fence"));
    }

    let source_chars = article.content_md.chars().count();
    let cleaned_chars = cleaned.chars().count();
    let floor = (source_chars as f64 * CLEANED_MIN_LENGTH_RATIO) as usize;
    if cleaned_chars < floor {
        return Err(StageError::data(format!(
            "cleaned markdown collapsed to {} chars (source {}, floor {})",
            cleaned_chars, source_chars, floor
        )));
    }

    debug!(
        "article {} passed validation ({} of {} chars kept)",
        article.id, cleaned_chars, source_chars
    );
    Ok(())
}

/// Counts ``` and ~~~ fence lines; an odd count per marker family means an
/// unclosed block.
fn fences_balanced(markdown: &str) -> bool {
    let mut backticks = 0usize;
    let mut tildes = 0usize;
    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            backticks += 1;
        } else if trimmed.starts_with("~~~") {
            tildes += 1;
        }
    }
    backticks % 2 == 0 && tildes % 2 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::config::WorkerConfig;
    use crate::core::{TaskKind, TaskPayload};
    use crate::db::{Article, ArticleRepository, Database};
    use crate::llm::testing::{ScriptedChat, ScriptedFactory};
    use crate::queue::TaskQueue;
    use chrono::Utc;

    fn setup(content: &str, cleaned: Option<&str>) -> (Database, Task) {
        let db = Database::new_test();
        let now = Utc::now().naive_utc();
        {
            let mut conn = db.get_conn();
            let mut repo = ArticleRepository::new(&mut conn);
            repo.insert_article(&Article {
                id: "a1".to_string(),
                title: "t".to_string(),
                content_md: content.to_string(),
                cleaned_md: cleaned.map(String::from),
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
            .enqueue(TaskKind::Validation, Some("a1"), None, &TaskPayload::default())
            .unwrap();
        let task = queue.claim("w1").unwrap().unwrap();
        (db, task)
    }

    fn run(db: &Database, task: &Task) -> Result<(), StageError> {
        let factory = ScriptedFactory::new(ScriptedChat::new(vec![]));
        let config = AppConfig::default();
        let ctx = StageContext {
            db,
            config: &config,
            llm: &factory,
        };
        run_validation(&ctx, task)
    }

    #[test]
    fn accepts_intact_cleaned_markdown() {
        let source = "# Title\n\nA body with some words.\n\n```rust\nfn main() {}\n```\n";
        let (db, task) = setup(source, Some(source));
        assert!(run(&db, &task).is_ok());
    }

    #[test]
    fn rejects_missing_cleaned_content() {
        let (db, task) = setup("# Title\n\nBody.", None);
        let err = run(&db, &task).unwrap_err();
        assert!(!err.retryable());
    }

    #[test]
    fn rejects_unclosed_fence() {
        let (db, task) = setup(
            "# Title\n\nBody text that is long enough.",
            Some("# Title\n\n```rust\nfn main() {}\n"),
        );
        let err = run(&db, &task).unwrap_err();
        assert!(err.message.contains("fence"));
    }

    #[test]
    fn rejects_collapsed_output() {
        let source = "word ".repeat(500);
        let (db, task) = setup(&source, Some("ok"));
        let err = run(&db, &task).unwrap_err();
        assert!(err.message.contains("collapsed"));
    }
}
