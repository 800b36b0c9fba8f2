use crate::core::{task_fingerprint, EventKind, TaskStatus};
use crate::db::{Database, Task, TaskEvent, TaskRepository, UsageLog};
use crate::errors::Error;
use chrono::Utc;
use serde_json::json;
use tracing::info;

/// Per-task result of a bulk admin operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    /// The task was retried or cancelled.
    Applied,
    /// An equivalent active task already exists; nothing was changed.
    SkippedDuplicate { active_task_id: String },
    /// The task's current status does not admit the operation.
    SkippedStatus { status: String },
}

/// Payload overrides applied when a task is manually retried.
#[derive(Debug, Clone, Default)]
pub struct RetryOverrides {
    /// Model profile name to use for the retry.
    pub model: Option<String>,
    /// Prompt profile name to use for the retry.
    pub prompt: Option<String>,
}

/// A task with its full audit trail, for inspection.
#[derive(Debug)]
pub struct TaskTimeline {
    pub task: Task,
    pub events: Vec<TaskEvent>,
    pub usage: Vec<UsageLog>,
}

/// Manual queue operations: selective retry and cancel, plus timeline
/// inspection. These run against the same conditional updates as the
/// worker, so they are safe while workers are polling.
pub struct QueueAdmin<'d> {
    db: &'d Database,
}

impl<'d> QueueAdmin<'d> {
    pub fn new(db: &'d Database) -> Self {
        QueueAdmin { db }
    }

    /// Reactivates selected `failed` or `cancelled` tasks for exactly one
    /// more attempt, optionally switching the model or prompt profile for
    /// the retry. The resume checkpoint and partial draft are discarded so
    /// the retry starts clean, and the refreshed fingerprint is checked
    /// against other active tasks first; a duplicate skips the retry and
    /// leaves an audit event saying so.
    pub fn retry_selected(
        &self,
        task_ids: &[String],
        overrides: &RetryOverrides,
    ) -> Result<Vec<(String, AdminOutcome)>, Error> {
        let now = Utc::now().naive_utc();
        let mut conn = self.db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);

        let mut outcomes = Vec::with_capacity(task_ids.len());
        for task_id in task_ids {
            let task = repo.get_task(task_id)?;
            let status = task.status()?;
            if !status.can_transition_to(TaskStatus::Pending)
                || status == TaskStatus::Processing
            {
                outcomes.push((
                    task_id.clone(),
                    AdminOutcome::SkippedStatus {
                        status: task.status.clone(),
                    },
                ));
                continue;
            }

            let mut payload = task.payload()?;
            payload.checkpoint = None;
            if let Some(model) = &overrides.model {
                payload.model = Some(model.clone());
            }
            if let Some(prompt) = &overrides.prompt {
                payload.prompt = Some(prompt.clone());
            }
            let fingerprint =
                task_fingerprint(task.kind()?, task.subject_id.as_deref(), task.content_kind(), &payload)?;

            if let Some(active) = repo.find_active_by_fingerprint(&fingerprint, Some(task_id))? {
                repo.append_event(
                    task_id,
                    EventKind::RetrySkippedDuplicate,
                    Some(status),
                    None,
                    Some("an equivalent task is already active"),
                    None,
                    Some(json!({ "active_task_id": active.id })),
                )?;
                outcomes.push((
                    task_id.clone(),
                    AdminOutcome::SkippedDuplicate {
                        active_task_id: active.id,
                    },
                ));
                continue;
            }

            let updated = repo.reactivate_for_retry(
                task_id,
                status,
                &payload.canonical_json()?,
                &fingerprint,
                now,
            )?;
            if updated == 0 {
                // status moved under us; report what we see now
                let current = repo.get_task(task_id)?;
                outcomes.push((
                    task_id.clone(),
                    AdminOutcome::SkippedStatus {
                        status: current.status,
                    },
                ));
                continue;
            }
            repo.delete_draft(task_id)?;
            repo.append_event(
                task_id,
                EventKind::RetryScheduled,
                Some(status),
                Some(TaskStatus::Pending),
                Some("manually retried"),
                None,
                Some(json!({
                    "model_override": overrides.model,
                    "prompt_override": overrides.prompt,
                })),
            )?;
            info!("task {} reactivated for manual retry", task_id);
            outcomes.push((task_id.clone(), AdminOutcome::Applied));
        }
        Ok(outcomes)
    }

    /// Cancels selected tasks. Only `pending` tasks are cancellable; a task
    /// already held by a worker runs to its own conclusion.
    pub fn cancel_selected(
        &self,
        task_ids: &[String],
    ) -> Result<Vec<(String, AdminOutcome)>, Error> {
        let now = Utc::now().naive_utc();
        let mut conn = self.db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);

        let mut outcomes = Vec::with_capacity(task_ids.len());
        for task_id in task_ids {
            let task = repo.get_task(task_id)?;
            let updated = repo.cancel_pending(task_id, now)?;
            if updated == 0 {
                outcomes.push((
                    task_id.clone(),
                    AdminOutcome::SkippedStatus {
                        status: task.status.clone(),
                    },
                ));
                continue;
            }
            repo.append_event(
                task_id,
                EventKind::Cancelled,
                Some(TaskStatus::Pending),
                Some(TaskStatus::Cancelled),
                Some("manually cancelled"),
                None,
                None,
            )?;
            info!("task {} cancelled", task_id);
            outcomes.push((task_id.clone(), AdminOutcome::Applied));
        }
        Ok(outcomes)
    }

    /// A task with its events (oldest first) and model-call usage.
    pub fn timeline(&self, task_id: &str) -> Result<TaskTimeline, Error> {
        let mut conn = self.db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);
        Ok(TaskTimeline {
            task: repo.get_task(task_id)?,
            events: repo.events_for_task(task_id)?,
            usage: repo.usage_for_task(task_id)?,
        })
    }
}
