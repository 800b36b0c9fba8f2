use crate::config::AppConfig;
use crate::db::Database;
use crate::errors::Error;
use crate::llm::LlmFactory;
use crate::pipeline::Pipeline;
use crate::queue::{recover_stale_locks, FinishOutcome, TaskQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

/// Polling worker: claims one task at a time, runs its stage routine, and
/// reports back through the queue. Any number of these may run across
/// processes; the queue's conditional updates are the only coordination.
pub struct Worker {
    db: Database,
    config: Arc<AppConfig>,
    queue: TaskQueue,
    pipeline: Pipeline,
    worker_id: String,
}

impl Worker {
    pub fn new(db: Database, config: Arc<AppConfig>, llm: Arc<dyn LlmFactory>) -> Self {
        let queue = TaskQueue::new(db.clone(), config.worker.clone());
        let pipeline = Pipeline::new(db.clone(), queue.clone(), config.clone(), llm);
        let worker_id = config.worker.worker_id();
        Worker {
            db,
            config,
            queue,
            pipeline,
            worker_id,
        }
    }

    /// Runs the poll loop until the process is stopped.
    pub async fn run(&self) {
        let poll = Duration::from_secs(self.config.worker.poll_interval_secs);
        let sweep_every = Duration::from_secs(self.config.worker.sweep_interval_secs);
        info!(
            "worker {} polling every {:?}, sweeping every {:?}",
            self.worker_id, poll, sweep_every
        );

        let mut next_sweep = Instant::now();
        loop {
            if Instant::now() >= next_sweep {
                match recover_stale_locks(&self.db, &self.config.worker) {
                    Ok(report) if report.requeued + report.failed > 0 => {
                        info!(
                            "stale sweep: {} requeued, {} failed",
                            report.requeued, report.failed
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!("stale sweep failed: {}", e),
                }
                next_sweep = Instant::now() + sweep_every;
            }

            match self.process_one().await {
                Ok(true) => {}
                Ok(false) => sleep(poll).await,
                Err(e) => {
                    error!("worker loop error: {}", e);
                    sleep(poll).await;
                }
            }
        }
    }

    /// Claims and runs one task. Returns false when nothing was eligible.
    pub async fn process_one(&self) -> Result<bool, Error> {
        let Some(task) = self.queue.claim(&self.worker_id)? else {
            return Ok(false);
        };

        let result = self.pipeline.execute(&task).await;
        if let Err(e) = &result {
            warn!("task {} attempt {} failed: {}", task.id, task.attempts, e);
        }

        let outcome = self
            .queue
            .finish(&task, &self.worker_id, result.as_ref().map(|_| ()))?;
        match outcome {
            FinishOutcome::Completed => self.pipeline.enqueue_followups(&task)?,
            FinishOutcome::FailedPermanently => {
                let message = result
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown failure".to_string());
                self.pipeline.record_terminal_failure(&task, &message)?;
            }
            FinishOutcome::RetryScheduled => {}
            FinishOutcome::LostLease => {
                warn!("task {} lease was reclaimed mid-run", task.id);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelProfile;
    use crate::core::{TaskKind, TaskPayload};
    use crate::db::{Article, ArticleRepository, TaskRepository};
    use crate::llm::testing::{ScriptedChat, ScriptedFactory};
    use crate::llm::FinishReason;
    use chrono::Utc;

    fn test_config() -> AppConfig {
        AppConfig {
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
        }
    }

    fn insert_article(db: &Database, id: &str) {
        let now = Utc::now().naive_utc();
        let mut conn = db.get_conn();
        let mut repo = ArticleRepository::new(&mut conn);
        repo.insert_article(&Article {
            id: id.to_string(),
            title: "t".to_string(),
            content_md: "# T\n\nSome body text to clean.".to_string(),
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

    #[tokio::test]
    async fn empty_queue_reports_idle() {
        let db = Database::new_test();
        let chat = ScriptedChat::new(vec![]);
        let worker = Worker::new(
            db,
            Arc::new(test_config()),
            Arc::new(ScriptedFactory::new(chat)),
        );
        assert!(!worker.process_one().await.unwrap());
    }

    #[tokio::test]
    async fn completed_task_enqueues_the_next_stage() {
        let db = Database::new_test();
        insert_article(&db, "a1");
        let chat = ScriptedChat::new(vec![ScriptedChat::reply(
            "# T\n\nSome body text to clean.",
            FinishReason::Stop,
        )]);
        let worker = Worker::new(
            db.clone(),
            Arc::new(test_config()),
            Arc::new(ScriptedFactory::new(chat)),
        );

        worker
            .queue
            .enqueue(TaskKind::Cleaning, Some("a1"), None, &TaskPayload::default())
            .unwrap();
        assert!(worker.process_one().await.unwrap());

        // a validation task for the same article is now pending
        let next = worker.queue.claim("probe").unwrap().unwrap();
        assert_eq!(next.task_kind, "validation");
        assert_eq!(next.subject_id.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn terminal_failure_is_recorded_on_the_article() {
        let db = Database::new_test();
        insert_article(&db, "a1");
        // empty output from the model is a terminal data error
        let chat = ScriptedChat::new(vec![ScriptedChat::reply("", FinishReason::Stop)]);
        let worker = Worker::new(
            db.clone(),
            Arc::new(test_config()),
            Arc::new(ScriptedFactory::new(chat)),
        );

        let task_id = worker
            .queue
            .enqueue(TaskKind::Cleaning, Some("a1"), None, &TaskPayload::default())
            .unwrap();
        assert!(worker.process_one().await.unwrap());

        let mut conn = db.get_conn();
        let mut tasks = TaskRepository::new(&mut conn);
        assert_eq!(tasks.get_task(&task_id).unwrap().status, "failed");
        drop(conn);

        let mut conn = db.get_conn();
        let mut articles = ArticleRepository::new(&mut conn);
        let article = articles.get_article("a1").unwrap();
        assert_eq!(article.status, "failed");
        assert!(article.last_error.is_some());
    }
}
