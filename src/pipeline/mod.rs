mod stages;

use crate::config::AppConfig;
use crate::core::{ContentKind, TaskKind, TaskPayload};
use crate::db::{ArticleRepository, Database, Task};
use crate::errors::{Error, StageError};
use crate::llm::LlmFactory;
use crate::queue::TaskQueue;
use std::sync::Arc;
use tracing::{info, warn};

use stages::StageContext;

/// A per-content/translation status that no longer changes.
fn is_terminal(status: &str) -> bool {
    matches!(status, "completed" | "failed" | "skipped")
}

/// Drives one claimed task through its stage routine and sequences the
/// follow-up stages:
///
/// ```text
/// cleaning        -> validation
/// validation      -> classification
/// classification  -> generic_content(summary) [+ translation if English]
/// generic_content -> terminal per content kind
/// translation     -> terminal
/// embedding       -> terminal
/// ```
pub struct Pipeline {
    db: Database,
    queue: TaskQueue,
    config: Arc<AppConfig>,
    llm: Arc<dyn LlmFactory>,
}

impl Pipeline {
    pub fn new(
        db: Database,
        queue: TaskQueue,
        config: Arc<AppConfig>,
        llm: Arc<dyn LlmFactory>,
    ) -> Self {
        Pipeline {
            db,
            queue,
            config,
            llm,
        }
    }

    /// Runs the stage routine for a claimed task. The caller owns the lease
    /// and reports the result back through the queue.
    pub async fn execute(&self, task: &Task) -> Result<(), StageError> {
        let ctx = StageContext {
            db: &self.db,
            config: self.config.as_ref(),
            llm: self.llm.as_ref(),
        };
        let kind = task.kind().map_err(|e| StageError::data(e.to_string()))?;
        info!("running {} for task {}", kind, task.id);
        match kind {
            TaskKind::Cleaning => stages::run_cleaning(&ctx, task).await,
            TaskKind::Validation => stages::run_validation(&ctx, task),
            TaskKind::Classification => stages::run_classification(&ctx, task).await,
            TaskKind::GenericContent => stages::run_generic_content(&ctx, task).await,
            TaskKind::Translation => stages::run_translation(&ctx, task).await,
            TaskKind::Embedding => stages::run_embedding(&ctx, task).await,
        }
    }

    /// Enqueues the follow-up stages of a task that just completed.
    pub fn enqueue_followups(&self, task: &Task) -> Result<(), Error> {
        let subject = task.subject_id.as_deref();
        let payload = carried_payload(task)?;

        match task.kind()? {
            TaskKind::Cleaning => {
                self.queue
                    .enqueue(TaskKind::Validation, subject, None, &payload)?;
            }
            TaskKind::Validation => {
                self.queue
                    .enqueue(TaskKind::Classification, subject, None, &payload)?;
            }
            TaskKind::Classification => {
                let Some(article_id) = subject else {
                    return Ok(());
                };
                let (category, language) = {
                    let mut conn = self.db.get_conn();
                    let mut repo = ArticleRepository::new(&mut conn);
                    let article = repo.get_article(article_id)?;
                    (article.category, article.language)
                };

                let mut next = payload;
                next.category = category;
                self.queue.enqueue(
                    TaskKind::GenericContent,
                    subject,
                    Some(ContentKind::Summary),
                    &next,
                )?;

                if language.as_deref() == Some("en") {
                    self.queue
                        .enqueue(TaskKind::Translation, subject, None, &next)?;
                } else {
                    let mut conn = self.db.get_conn();
                    let mut repo = ArticleRepository::new(&mut conn);
                    repo.set_translation_status(article_id, "skipped")?;
                    drop(conn);
                    self.check_article_completion(article_id)?;
                }
            }
            TaskKind::GenericContent | TaskKind::Translation => {
                if let Some(article_id) = subject {
                    self.check_article_completion(article_id)?;
                }
            }
            TaskKind::Embedding => {}
        }
        Ok(())
    }

    /// Records a terminally failed task on its article, marks the affected
    /// content status, and re-runs the completion check.
    pub fn record_terminal_failure(&self, task: &Task, message: &str) -> Result<(), Error> {
        let Some(article_id) = task.subject_id.as_deref() else {
            return Ok(());
        };
        let kind = task.kind()?;
        warn!("task {} ({}) failed terminally: {}", task.id, kind, message);

        {
            let mut conn = self.db.get_conn();
            let mut repo = ArticleRepository::new(&mut conn);
            repo.record_error(article_id, message)?;
            match kind {
                // losing an early stage leaves nothing downstream to wait for
                TaskKind::Cleaning | TaskKind::Validation | TaskKind::Classification => {
                    repo.set_status(article_id, "failed")?;
                    return Ok(());
                }
                TaskKind::GenericContent => {
                    let content = task.content_kind().unwrap_or(ContentKind::Summary);
                    repo.set_content_status(article_id, content, "failed")?;
                }
                TaskKind::Translation => {
                    repo.set_translation_status(article_id, "failed")?;
                }
                TaskKind::Embedding => return Ok(()),
            }
        }
        self.check_article_completion(article_id)
    }

    /// Marks the article `completed` once the summary and the translation
    /// are each terminal. A failed summary fails the article; a failed
    /// translation alone does not.
    fn check_article_completion(&self, article_id: &str) -> Result<(), Error> {
        let mut conn = self.db.get_conn();
        let mut repo = ArticleRepository::new(&mut conn);
        let article = repo.get_article(article_id)?;

        if !is_terminal(&article.summary_status) || !is_terminal(&article.translation_status) {
            return Ok(());
        }
        let new_status = if article.summary_status == "completed" {
            "completed"
        } else {
            "failed"
        };
        if article.status != new_status {
            info!("article {} is {}", article_id, new_status);
            repo.set_status(article_id, new_status)?;
        }
        Ok(())
    }
}

/// The payload a follow-up stage inherits: resume state stripped, stage
/// parameters kept.
fn carried_payload(task: &Task) -> Result<TaskPayload, Error> {
    let mut payload = task.payload()?;
    payload.strategy = None;
    payload.checkpoint = None;
    Ok(payload)
}
