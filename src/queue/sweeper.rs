use crate::config::WorkerConfig;
use crate::core::EventKind;
use crate::core::TaskStatus;
use crate::db::{Database, TaskRepository};
use crate::errors::Error;
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::warn;

/// What one sweep did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requeued: usize,
    pub failed: usize,
}

/// Recovers tasks whose worker died mid-lease: any `processing` row whose
/// `locked_at` is older than the lease TTL is either requeued for another
/// attempt or force-failed when the attempt budget is spent. Safe to run
/// from every worker concurrently; the conditional updates make the sweep
/// idempotent.
pub fn recover_stale_locks(db: &Database, config: &WorkerConfig) -> Result<SweepReport, Error> {
    let now = Utc::now().naive_utc();
    let stale_before = now - Duration::seconds(config.lease_timeout_secs);
    let mut conn = db.get_conn();
    let mut repo = TaskRepository::new(&mut conn);

    let mut report = SweepReport::default();
    for task in repo.stale_processing(stale_before)? {
        let holder = task.locked_by.as_deref().unwrap_or("unknown");
        let message = format!("lease expired while held by worker '{}'", holder);

        if task.attempts >= task.max_attempts {
            let updated = repo.force_fail_stale(&task.id, stale_before, now, &message)?;
            if updated == 0 {
                continue;
            }
            warn!("stale task {} force-failed after {} attempts", task.id, task.attempts);
            repo.append_event(
                &task.id,
                EventKind::StaleLockFailed,
                Some(TaskStatus::Processing),
                Some(TaskStatus::Failed),
                Some(&message),
                Some("timeout"),
                Some(json!({ "attempts": task.attempts, "max_attempts": task.max_attempts })),
            )?;
            report.failed += 1;
        } else {
            let updated = repo.requeue_stale(&task.id, stale_before, now, &message)?;
            if updated == 0 {
                continue;
            }
            warn!("stale task {} requeued (attempt {}/{})", task.id, task.attempts, task.max_attempts);
            repo.append_event(
                &task.id,
                EventKind::StaleLockRequeued,
                Some(TaskStatus::Processing),
                Some(TaskStatus::Pending),
                Some(&message),
                Some("timeout"),
                Some(json!({ "attempts": task.attempts, "max_attempts": task.max_attempts })),
            )?;
            report.requeued += 1;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TaskKind, TaskPayload};
    use crate::queue::TaskQueue;
    use diesel::prelude::*;

    fn backdate_lock(db: &Database, task_id: &str, secs: i64) {
        use crate::schema::tasks::dsl::*;
        let past = Utc::now().naive_utc() - Duration::seconds(secs);
        let mut conn = db.get_conn();
        diesel::update(tasks.filter(id.eq(task_id)))
            .set(locked_at.eq(past))
            .execute(&mut conn)
            .unwrap();
    }

    #[test]
    fn fresh_leases_are_left_alone() {
        let db = Database::new_test();
        let q = TaskQueue::new(db.clone(), WorkerConfig::default());
        q.enqueue(TaskKind::Cleaning, Some("a1"), None, &TaskPayload::default())
            .unwrap();
        q.claim("w1").unwrap().unwrap();

        let report = recover_stale_locks(&db, &WorkerConfig::default()).unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn expired_lease_is_requeued_with_timeout_error() {
        let db = Database::new_test();
        let q = TaskQueue::new(db.clone(), WorkerConfig::default());
        q.enqueue(TaskKind::Cleaning, Some("a1"), None, &TaskPayload::default())
            .unwrap();
        let claimed = q.claim("w1").unwrap().unwrap();
        backdate_lock(&db, &claimed.id, 700);

        let report = recover_stale_locks(&db, &WorkerConfig::default()).unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(report.failed, 0);

        let mut conn = db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);
        let task = repo.get_task(&claimed.id).unwrap();
        assert_eq!(task.status, "pending");
        assert!(task.locked_by.is_none());
        assert_eq!(task.last_error_kind.as_deref(), Some("timeout"));
        let events = repo.events_for_task(&claimed.id).unwrap();
        assert_eq!(events.last().unwrap().event_kind, "stale_lock_requeued");
    }

    #[test]
    fn expired_lease_with_spent_budget_is_failed() {
        let db = Database::new_test();
        let config = WorkerConfig {
            max_attempts: 1,
            ..WorkerConfig::default()
        };
        let q = TaskQueue::new(db.clone(), config.clone());
        q.enqueue(TaskKind::Cleaning, Some("a1"), None, &TaskPayload::default())
            .unwrap();
        let claimed = q.claim("w1").unwrap().unwrap();
        backdate_lock(&db, &claimed.id, 700);

        let report = recover_stale_locks(&db, &config).unwrap();
        assert_eq!(report.failed, 1);

        let mut conn = db.get_conn();
        let mut repo = TaskRepository::new(&mut conn);
        let task = repo.get_task(&claimed.id).unwrap();
        assert_eq!(task.status, "failed");
        assert_eq!(task.last_error_kind.as_deref(), Some("timeout"));
        assert!(task.finished_at.is_some());
        let events = repo.events_for_task(&claimed.id).unwrap();
        assert_eq!(events.last().unwrap().event_kind, "stale_lock_failed");
    }

    #[test]
    fn requeued_task_can_be_claimed_again() {
        let db = Database::new_test();
        let q = TaskQueue::new(db.clone(), WorkerConfig::default());
        q.enqueue(TaskKind::Cleaning, Some("a1"), None, &TaskPayload::default())
            .unwrap();
        let claimed = q.claim("w1").unwrap().unwrap();
        backdate_lock(&db, &claimed.id, 700);
        recover_stale_locks(&db, &WorkerConfig::default()).unwrap();

        let reclaimed = q.claim("w2").unwrap().unwrap();
        assert_eq!(reclaimed.id, claimed.id);
        assert_eq!(reclaimed.attempts, 2);
        assert_eq!(reclaimed.locked_by.as_deref(), Some("w2"));
    }
}
