use std::fmt;

/// Kinds of append-only audit events recorded on a task's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Enqueued,
    Claimed,
    Completed,
    Failed,
    RetryScheduled,
    RetrySkippedDuplicate,
    Cancelled,
    StaleLockRequeued,
    StaleLockFailed,
    ChunkingPlan,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Enqueued => "enqueued",
            EventKind::Claimed => "claimed",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
            EventKind::RetryScheduled => "retry_scheduled",
            EventKind::RetrySkippedDuplicate => "retry_skipped_duplicate",
            EventKind::Cancelled => "cancelled",
            EventKind::StaleLockRequeued => "stale_lock_requeued",
            EventKind::StaleLockFailed => "stale_lock_failed",
            EventKind::ChunkingPlan => "chunking_plan",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
