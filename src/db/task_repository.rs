use crate::core::{EventKind, TaskStatus};
use crate::db::models::{Task, TaskDraft, TaskEvent, UsageLog};
use crate::errors::Error;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

/// Repository for task, event, draft and usage rows. Every mutation that
/// participates in the lease protocol is a conditional update returning the
/// affected-row count; zero rows means the caller lost the race, which is
/// the expected, non-exceptional path under concurrency.
pub struct TaskRepository<'a> {
    /// Database connection
    pub conn: &'a mut SqliteConnection,
}

impl<'a> TaskRepository<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        TaskRepository { conn }
    }

    /// Inserts a new task row.
    pub fn insert_task(&mut self, task: &Task) -> Result<(), Error> {
        use crate::schema::tasks;

        diesel::insert_into(tasks::table)
            .values(task)
            .execute(self.conn)?;
        Ok(())
    }

    /// Retrieves a single task by id.
    pub fn get_task(&mut self, task_id: &str) -> Result<Task, Error> {
        use crate::schema::tasks::dsl::*;

        tasks
            .filter(id.eq(task_id))
            .first::<Task>(self.conn)
            .optional()?
            .ok_or_else(|| Error::UnknownTask(task_id.to_string()))
    }

    /// Finds an active (`pending`/`processing`) task carrying the given
    /// dedup fingerprint, excluding `exclude_id` when provided (so a task
    /// being retried does not dedup against itself).
    pub fn find_active_by_fingerprint(
        &mut self,
        the_fingerprint: &str,
        exclude_id: Option<&str>,
    ) -> Result<Option<Task>, Error> {
        use crate::schema::tasks::dsl::*;

        let mut query = tasks
            .filter(fingerprint.eq(the_fingerprint))
            .filter(status.eq_any([
                TaskStatus::Pending.as_str(),
                TaskStatus::Processing.as_str(),
            ]))
            .into_boxed();
        if let Some(excluded) = exclude_id {
            query = query.filter(id.ne(excluded));
        }

        Ok(query.first::<Task>(self.conn).optional()?)
    }

    /// Selects the oldest claim candidate: pending, due, and not held by a
    /// live lease. Ordered by `(run_at, created_at)` so backoff-delayed
    /// retries sort behind fresher work.
    pub fn claim_candidate(
        &mut self,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<Option<Task>, Error> {
        use crate::schema::tasks::dsl::*;

        let candidate = tasks
            .filter(status.eq(TaskStatus::Pending.as_str()))
            .filter(run_at.le(now))
            .filter(locked_at.is_null().or(locked_at.lt(stale_before)))
            .order((run_at.asc(), created_at.asc()))
            .first::<Task>(self.conn)
            .optional()?;
        Ok(candidate)
    }

    /// Atomically takes the lease on a candidate, re-checking the full
    /// eligibility predicate. Returns the number of rows affected; zero
    /// means another worker won the row.
    pub fn try_claim(
        &mut self,
        task_id: &str,
        worker_id: &str,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<usize, Error> {
        use crate::schema::tasks::dsl::*;

        let updated = diesel::update(
            tasks
                .filter(id.eq(task_id))
                .filter(status.eq(TaskStatus::Pending.as_str()))
                .filter(run_at.le(now))
                .filter(locked_at.is_null().or(locked_at.lt(stale_before))),
        )
        .set((
            status.eq(TaskStatus::Processing.as_str()),
            attempts.eq(attempts + 1),
            locked_at.eq(now),
            locked_by.eq(worker_id),
            updated_at.eq(now),
        ))
        .execute(self.conn)?;
        Ok(updated)
    }

    /// Marks a held task completed. Conditioned on the caller still holding
    /// the lease.
    pub fn finish_completed(
        &mut self,
        task_id: &str,
        worker_id: &str,
        now: NaiveDateTime,
    ) -> Result<usize, Error> {
        use crate::schema::tasks::dsl::*;

        let updated = diesel::update(
            tasks
                .filter(id.eq(task_id))
                .filter(status.eq(TaskStatus::Processing.as_str()))
                .filter(locked_by.eq(worker_id)),
        )
        .set((
            status.eq(TaskStatus::Completed.as_str()),
            locked_at.eq(None::<NaiveDateTime>),
            locked_by.eq(None::<String>),
            last_error.eq(None::<String>),
            last_error_kind.eq(None::<String>),
            finished_at.eq(now),
            updated_at.eq(now),
        ))
        .execute(self.conn)?;
        Ok(updated)
    }

    /// Marks a held task terminally failed.
    pub fn finish_failed(
        &mut self,
        task_id: &str,
        worker_id: &str,
        now: NaiveDateTime,
        error: &str,
        error_class: &str,
    ) -> Result<usize, Error> {
        use crate::schema::tasks::dsl::*;

        let updated = diesel::update(
            tasks
                .filter(id.eq(task_id))
                .filter(status.eq(TaskStatus::Processing.as_str()))
                .filter(locked_by.eq(worker_id)),
        )
        .set((
            status.eq(TaskStatus::Failed.as_str()),
            locked_at.eq(None::<NaiveDateTime>),
            locked_by.eq(None::<String>),
            last_error.eq(error),
            last_error_kind.eq(error_class),
            finished_at.eq(now),
            updated_at.eq(now),
        ))
        .execute(self.conn)?;
        Ok(updated)
    }

    /// Returns a held task to `pending` with a scheduled retry time.
    pub fn finish_requeued(
        &mut self,
        task_id: &str,
        worker_id: &str,
        now: NaiveDateTime,
        next_run_at: NaiveDateTime,
        error: &str,
        error_class: &str,
    ) -> Result<usize, Error> {
        use crate::schema::tasks::dsl::*;

        let updated = diesel::update(
            tasks
                .filter(id.eq(task_id))
                .filter(status.eq(TaskStatus::Processing.as_str()))
                .filter(locked_by.eq(worker_id)),
        )
        .set((
            status.eq(TaskStatus::Pending.as_str()),
            run_at.eq(next_run_at),
            locked_at.eq(None::<NaiveDateTime>),
            locked_by.eq(None::<String>),
            last_error.eq(error),
            last_error_kind.eq(error_class),
            updated_at.eq(now),
        ))
        .execute(self.conn)?;
        Ok(updated)
    }

    /// All `processing` tasks whose lease started before `stale_before`.
    pub fn stale_processing(&mut self, stale_before: NaiveDateTime) -> Result<Vec<Task>, Error> {
        use crate::schema::tasks::dsl::*;

        let found = tasks
            .filter(status.eq(TaskStatus::Processing.as_str()))
            .filter(locked_at.lt(stale_before))
            .load::<Task>(self.conn)?;
        Ok(found)
    }

    /// Force-fails a stale `processing` task that exhausted its attempts.
    pub fn force_fail_stale(
        &mut self,
        task_id: &str,
        stale_before: NaiveDateTime,
        now: NaiveDateTime,
        error: &str,
    ) -> Result<usize, Error> {
        use crate::schema::tasks::dsl::*;

        let updated = diesel::update(
            tasks
                .filter(id.eq(task_id))
                .filter(status.eq(TaskStatus::Processing.as_str()))
                .filter(locked_at.lt(stale_before)),
        )
        .set((
            status.eq(TaskStatus::Failed.as_str()),
            locked_at.eq(None::<NaiveDateTime>),
            locked_by.eq(None::<String>),
            last_error.eq(error),
            last_error_kind.eq("timeout"),
            finished_at.eq(now),
            updated_at.eq(now),
        ))
        .execute(self.conn)?;
        Ok(updated)
    }

    /// Requeues a stale `processing` task for another attempt.
    pub fn requeue_stale(
        &mut self,
        task_id: &str,
        stale_before: NaiveDateTime,
        now: NaiveDateTime,
        error: &str,
    ) -> Result<usize, Error> {
        use crate::schema::tasks::dsl::*;

        let updated = diesel::update(
            tasks
                .filter(id.eq(task_id))
                .filter(status.eq(TaskStatus::Processing.as_str()))
                .filter(locked_at.lt(stale_before)),
        )
        .set((
            status.eq(TaskStatus::Pending.as_str()),
            run_at.eq(now),
            locked_at.eq(None::<NaiveDateTime>),
            locked_by.eq(None::<String>),
            last_error.eq(error),
            last_error_kind.eq("timeout"),
            updated_at.eq(now),
        ))
        .execute(self.conn)?;
        Ok(updated)
    }

    /// Reactivates a task for a manual retry: attempts reset, a single
    /// attempt granted, error and lock fields cleared. Conditioned on the
    /// status the caller validated against the transition table.
    pub fn reactivate_for_retry(
        &mut self,
        task_id: &str,
        expected_status: TaskStatus,
        new_payload: &str,
        new_fingerprint: &str,
        now: NaiveDateTime,
    ) -> Result<usize, Error> {
        use crate::schema::tasks::dsl::*;

        let updated = diesel::update(
            tasks
                .filter(id.eq(task_id))
                .filter(status.eq(expected_status.as_str())),
        )
        .set((
            status.eq(TaskStatus::Pending.as_str()),
            payload.eq(new_payload),
            fingerprint.eq(new_fingerprint),
            attempts.eq(0),
            max_attempts.eq(1),
            run_at.eq(now),
            locked_at.eq(None::<NaiveDateTime>),
            locked_by.eq(None::<String>),
            last_error.eq(None::<String>),
            last_error_kind.eq(None::<String>),
            finished_at.eq(None::<NaiveDateTime>),
            updated_at.eq(now),
        ))
        .execute(self.conn)?;
        Ok(updated)
    }

    /// Cancels a task that is still `pending`.
    pub fn cancel_pending(&mut self, task_id: &str, now: NaiveDateTime) -> Result<usize, Error> {
        use crate::schema::tasks::dsl::*;

        let updated = diesel::update(
            tasks
                .filter(id.eq(task_id))
                .filter(status.eq(TaskStatus::Pending.as_str())),
        )
        .set((
            status.eq(TaskStatus::Cancelled.as_str()),
            finished_at.eq(now),
            updated_at.eq(now),
        ))
        .execute(self.conn)?;
        Ok(updated)
    }

    /// Persists the checkpointed payload of a task mid-execution.
    pub fn update_payload(&mut self, task_id: &str, new_payload: &str) -> Result<(), Error> {
        use crate::schema::tasks::dsl::*;
        let now = Utc::now().naive_utc();

        diesel::update(tasks.filter(id.eq(task_id)))
            .set((payload.eq(new_payload), updated_at.eq(now)))
            .execute(self.conn)?;
        Ok(())
    }

    /// Appends one audit event to a task's timeline.
    pub fn append_event(
        &mut self,
        task_id: &str,
        kind: EventKind,
        from_status: Option<TaskStatus>,
        to_status: Option<TaskStatus>,
        message: Option<&str>,
        error_kind: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> Result<(), Error> {
        use crate::schema::task_events;

        let event = TaskEvent {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            event_kind: kind.as_str().to_string(),
            from_status: from_status.map(|s| s.as_str().to_string()),
            to_status: to_status.map(|s| s.as_str().to_string()),
            message: message.map(|m| m.to_string()),
            error_kind: error_kind.map(|k| k.to_string()),
            details: details.map(|d| d.to_string()),
            created_at: Utc::now().naive_utc(),
        };

        diesel::insert_into(task_events::table)
            .values(&event)
            .execute(self.conn)?;
        Ok(())
    }

    /// A task's timeline, oldest first. Insertion id breaks ties within the
    /// same second.
    pub fn events_for_task(&mut self, the_task_id: &str) -> Result<Vec<TaskEvent>, Error> {
        use crate::schema::task_events::dsl::*;

        let found = task_events
            .filter(task_id.eq(the_task_id))
            .order((created_at.asc(), id.asc()))
            .load::<TaskEvent>(self.conn)?;
        Ok(found)
    }

    /// Records the usage of one model call.
    pub fn insert_usage(&mut self, usage: &UsageLog) -> Result<(), Error> {
        use crate::schema::usage_logs;

        diesel::insert_into(usage_logs::table)
            .values(usage)
            .execute(self.conn)?;
        Ok(())
    }

    pub fn usage_for_task(&mut self, the_task_id: &str) -> Result<Vec<UsageLog>, Error> {
        use crate::schema::usage_logs::dsl::*;

        let found = usage_logs
            .filter(task_id.eq(the_task_id))
            .order(created_at.asc())
            .load::<UsageLog>(self.conn)?;
        Ok(found)
    }

    /// Saves the accumulated partial output of a chunked stage.
    pub fn upsert_draft(&mut self, the_task_id: &str, draft_content: &str) -> Result<(), Error> {
        use crate::schema::task_drafts::dsl::*;
        let now = Utc::now().naive_utc();

        diesel::insert_into(task_drafts)
            .values(&TaskDraft {
                task_id: the_task_id.to_string(),
                content: draft_content.to_string(),
                updated_at: now,
            })
            .on_conflict(task_id)
            .do_update()
            .set((content.eq(draft_content), updated_at.eq(now)))
            .execute(self.conn)?;
        Ok(())
    }

    pub fn get_draft(&mut self, the_task_id: &str) -> Result<Option<TaskDraft>, Error> {
        use crate::schema::task_drafts::dsl::*;

        Ok(task_drafts
            .filter(task_id.eq(the_task_id))
            .first::<TaskDraft>(self.conn)
            .optional()?)
    }

    pub fn delete_draft(&mut self, the_task_id: &str) -> Result<(), Error> {
        use crate::schema::task_drafts::dsl::*;

        diesel::delete(task_drafts.filter(task_id.eq(the_task_id))).execute(self.conn)?;
        Ok(())
    }
}
