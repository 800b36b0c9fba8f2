use crate::config::WorkerConfig;
use crate::constants::{RETRY_BACKOFF_CAP_SECS, RETRY_BACKOFF_STEP_SECS};
use crate::core::{
    ensure_transition, task_fingerprint, ContentKind, EventKind, TaskKind, TaskPayload, TaskStatus,
};
use crate::db::{Database, Task, TaskRepository};
use crate::errors::{Error, StageError};
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

/// How a `finish` call resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishOutcome {
    /// Task completed; the next stage may be enqueued.
    Completed,
    /// Retryable failure, requeued with backoff.
    RetryScheduled,
    /// Terminal failure.
    FailedPermanently,
    /// The lease was reclaimed before the worker finished; nothing was
    /// written. Expected under stale-lock recovery, not an error.
    LostLease,
}

/// Durable task queue with lease-based claims. The database's row-level
/// conditional updates are the only concurrency primitive; workers may be
/// separate processes.
#[derive(Clone)]
pub struct TaskQueue {
    db: Database,
    config: WorkerConfig,
}

impl TaskQueue {
    /// Creates a queue bound to the given database and worker settings.
    pub fn new(db: Database, config: WorkerConfig) -> Self {
        TaskQueue { db, config }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Enqueues a task, deduplicating against active tasks with the same
    /// content fingerprint. Idempotent under identical parameters: when an
    /// equivalent `pending`/`processing` task exists its id is returned
    /// unchanged, with no new row and no event.
    pub fn enqueue(
        &self,
        kind: TaskKind,
        subject_id: Option<&str>,
        content_kind: Option<ContentKind>,
        payload: &TaskPayload,
    ) -> Result<String, Error> {
        let fingerprint = task_fingerprint(kind, subject_id, content_kind, payload)?;
        let mut conn = self.db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);

        if let Some(existing) = repo.find_active_by_fingerprint(&fingerprint, None)? {
            debug!(
                "enqueue of {} deduplicated against active task {}",
                kind, existing.id
            );
            return Ok(existing.id);
        }

        let now = Utc::now().naive_utc();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            task_kind: kind.as_str().to_string(),
            content_kind: content_kind.map(|c| c.as_str().to_string()),
            subject_id: subject_id.map(|s| s.to_string()),
            status: TaskStatus::Pending.as_str().to_string(),
            payload: payload.canonical_json()?,
            fingerprint,
            attempts: 0,
            max_attempts: self.config.max_attempts,
            run_at: now,
            locked_at: None,
            locked_by: None,
            last_error: None,
            last_error_kind: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        };
        repo.insert_task(&task)?;
        repo.append_event(
            &task.id,
            EventKind::Enqueued,
            None,
            Some(TaskStatus::Pending),
            None,
            None,
            Some(json!({
                "task_kind": kind.as_str(),
                "subject_id": subject_id,
                "content_kind": content_kind.map(|c| c.as_str()),
            })),
        )?;
        info!("enqueued {} task {} for {:?}", kind, task.id, subject_id);
        Ok(task.id)
    }

    /// Claims the oldest eligible task for this worker, or returns `None`
    /// when nothing is eligible or another worker won the race. Losing a
    /// race is the expected, non-exceptional path under concurrency.
    pub fn claim(&self, worker_id: &str) -> Result<Option<Task>, Error> {
        let now = Utc::now().naive_utc();
        let stale_before = now - Duration::seconds(self.config.lease_timeout_secs);
        let mut conn = self.db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);

        let Some(candidate) = repo.claim_candidate(now, stale_before)? else {
            return Ok(None);
        };
        ensure_transition(candidate.status()?, TaskStatus::Processing)?;

        let updated = repo.try_claim(&candidate.id, worker_id, now, stale_before)?;
        if updated == 0 {
            debug!("lost claim race on task {}", candidate.id);
            return Ok(None);
        }

        repo.append_event(
            &candidate.id,
            EventKind::Claimed,
            Some(TaskStatus::Pending),
            Some(TaskStatus::Processing),
            Some(worker_id),
            None,
            None,
        )?;
        let claimed = repo.get_task(&candidate.id)?;
        debug!(
            "worker {} claimed task {} (attempt {}/{})",
            worker_id, claimed.id, claimed.attempts, claimed.max_attempts
        );
        Ok(Some(claimed))
    }

    /// Finishes a held task. On failure the decision between retry and
    /// terminal failure is made here, from `(retryable, attempts,
    /// max_attempts)` alone; stage code never schedules retries itself.
    ///
    /// The underlying update is conditioned on the caller still holding
    /// the lease; when stale-lock recovery reclaimed the task in the
    /// meantime the call is a silent no-op reported as `LostLease`.
    pub fn finish(
        &self,
        task: &Task,
        worker_id: &str,
        result: Result<(), &StageError>,
    ) -> Result<FinishOutcome, Error> {
        let now = Utc::now().naive_utc();
        let mut conn = self.db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);

        match result {
            Ok(()) => {
                ensure_transition(task.status()?, TaskStatus::Completed)?;
                let updated = repo.finish_completed(&task.id, worker_id, now)?;
                if updated == 0 {
                    return Ok(FinishOutcome::LostLease);
                }
                repo.append_event(
                    &task.id,
                    EventKind::Completed,
                    Some(TaskStatus::Processing),
                    Some(TaskStatus::Completed),
                    None,
                    None,
                    None,
                )?;
                Ok(FinishOutcome::Completed)
            }
            Err(error) => {
                let terminal = !error.retryable() || task.attempts >= task.max_attempts;
                if terminal {
                    ensure_transition(task.status()?, TaskStatus::Failed)?;
                    let updated = repo.finish_failed(
                        &task.id,
                        worker_id,
                        now,
                        &error.message,
                        error.kind.as_str(),
                    )?;
                    if updated == 0 {
                        return Ok(FinishOutcome::LostLease);
                    }
                    repo.append_event(
                        &task.id,
                        EventKind::Failed,
                        Some(TaskStatus::Processing),
                        Some(TaskStatus::Failed),
                        Some(&error.message),
                        Some(error.kind.as_str()),
                        None,
                    )?;
                    Ok(FinishOutcome::FailedPermanently)
                } else {
                    ensure_transition(task.status()?, TaskStatus::Pending)?;
                    let delay = retry_delay_secs(task.attempts);
                    let next_run_at = now + Duration::seconds(delay);
                    let updated = repo.finish_requeued(
                        &task.id,
                        worker_id,
                        now,
                        next_run_at,
                        &error.message,
                        error.kind.as_str(),
                    )?;
                    if updated == 0 {
                        return Ok(FinishOutcome::LostLease);
                    }
                    repo.append_event(
                        &task.id,
                        EventKind::RetryScheduled,
                        Some(TaskStatus::Processing),
                        Some(TaskStatus::Pending),
                        Some(&error.message),
                        Some(error.kind.as_str()),
                        Some(json!({
                            "delay_secs": delay,
                            "attempts": task.attempts,
                            "max_attempts": task.max_attempts,
                        })),
                    )?;
                    Ok(FinishOutcome::RetryScheduled)
                }
            }
        }
    }
}

/// Linear backoff, capped: `min(60 * attempts, 300)` seconds.
pub fn retry_delay_secs(attempts: i32) -> i64 {
    (RETRY_BACKOFF_STEP_SECS * attempts as i64).min(RETRY_BACKOFF_CAP_SECS)
}
