use crate::errors::Error;
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for a worker, eligible once `run_at` passes.
    Pending,
    /// Leased by a worker.
    Processing,
    /// Finished successfully; terminal.
    Completed,
    /// Failed permanently; a manual retry can revive it.
    Failed,
    /// Cancelled before it was claimed; a manual retry can revive it.
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// The explicit transition table. Anything not listed is illegal and
    /// must never be applied, silently or otherwise.
    pub fn allowed_transitions(self) -> &'static [TaskStatus] {
        match self {
            TaskStatus::Pending => &[TaskStatus::Processing, TaskStatus::Cancelled],
            TaskStatus::Processing => {
                &[TaskStatus::Pending, TaskStatus::Completed, TaskStatus::Failed]
            }
            TaskStatus::Failed => &[TaskStatus::Pending],
            TaskStatus::Cancelled => &[TaskStatus::Pending],
            TaskStatus::Completed => &[],
        }
    }

    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// Validates a status transition, returning an error for anything outside
/// the transition table. Both the queue machinery and operator actions go
/// through this before mutating a row.
pub fn ensure_transition(from: TaskStatus, to: TaskStatus) -> Result<(), Error> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_pass() {
        assert!(ensure_transition(TaskStatus::Pending, TaskStatus::Processing).is_ok());
        assert!(ensure_transition(TaskStatus::Pending, TaskStatus::Cancelled).is_ok());
        assert!(ensure_transition(TaskStatus::Processing, TaskStatus::Pending).is_ok());
        assert!(ensure_transition(TaskStatus::Processing, TaskStatus::Completed).is_ok());
        assert!(ensure_transition(TaskStatus::Processing, TaskStatus::Failed).is_ok());
        assert!(ensure_transition(TaskStatus::Failed, TaskStatus::Pending).is_ok());
        assert!(ensure_transition(TaskStatus::Cancelled, TaskStatus::Pending).is_ok());
    }

    #[test]
    fn completed_is_terminal() {
        assert!(ensure_transition(TaskStatus::Completed, TaskStatus::Failed).is_err());
        assert!(ensure_transition(TaskStatus::Completed, TaskStatus::Pending).is_err());
        assert!(ensure_transition(TaskStatus::Completed, TaskStatus::Processing).is_err());
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        assert!(ensure_transition(TaskStatus::Pending, TaskStatus::Completed).is_err());
    }

    #[test]
    fn round_trips_through_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
        }
    }
}
