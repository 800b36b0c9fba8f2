use crate::core::{ContentKind, TaskKind, TaskPayload, TaskStatus};
use crate::errors::Error;
use crate::schema::{articles, task_drafts, task_events, tasks, usage_logs};
use chrono::NaiveDateTime;
use diesel::{AsChangeset, Identifiable, Insertable, Queryable};
use serde::{Deserialize, Serialize};

/// A task row: one unit of deferred pipeline work.
#[derive(
    Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, AsChangeset, Insertable,
)]
#[diesel(table_name = tasks)]
pub struct Task {
    /// Unique identifier (uuid v4)
    pub id: String,
    /// Stage routine this task runs
    pub task_kind: String,
    /// Optional generated-content sub-kind
    pub content_kind: Option<String>,
    /// Optional article being processed
    pub subject_id: Option<String>,
    /// Current lifecycle status
    pub status: String,
    /// Canonical JSON stage parameters
    pub payload: String,
    /// Dedup fingerprint over kind, subject, content kind and payload
    pub fingerprint: String,
    /// Claims so far
    pub attempts: i32,
    /// Automatic retry budget
    pub max_attempts: i32,
    /// Earliest eligible claim time
    pub run_at: NaiveDateTime,
    /// Lease start, null when unleased
    pub locked_at: Option<NaiveDateTime>,
    /// Lease holder, null when unleased
    pub locked_by: Option<String>,
    /// Most recent failure message
    pub last_error: Option<String>,
    /// Classification of the most recent failure
    pub last_error_kind: Option<String>,
    /// Timestamp when the task was created
    pub created_at: NaiveDateTime,
    /// Timestamp when the task was last updated
    pub updated_at: NaiveDateTime,
    /// Timestamp of terminal completion or failure
    pub finished_at: Option<NaiveDateTime>,
}

impl Task {
    pub fn status(&self) -> Result<TaskStatus, Error> {
        self.status
            .parse()
            .map_err(|_| Error::UnknownTask(format!("task {} has status '{}'", self.id, self.status)))
    }

    pub fn kind(&self) -> Result<TaskKind, Error> {
        self.task_kind
            .parse()
            .map_err(|_| Error::UnknownTask(format!("task {} has kind '{}'", self.id, self.task_kind)))
    }

    pub fn content_kind(&self) -> Option<ContentKind> {
        self.content_kind.as_deref().and_then(|c| c.parse().ok())
    }

    pub fn payload(&self) -> Result<TaskPayload, Error> {
        TaskPayload::from_json(&self.payload)
    }
}

/// Append-only audit record of one queue/pipeline transition.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = task_events)]
pub struct TaskEvent {
    pub id: String,
    /// Task this event belongs to
    pub task_id: String,
    /// e.g. enqueued, claimed, retry_scheduled, completed
    pub event_kind: String,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub message: Option<String>,
    /// Error classification, when the event records a failure
    pub error_kind: Option<String>,
    /// Structured JSON details
    pub details: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Resumable partial output of a chunked stage, one row per task.
#[derive(Debug, Clone, Queryable, Identifiable, AsChangeset, Insertable)]
#[diesel(table_name = task_drafts, primary_key(task_id))]
pub struct TaskDraft {
    pub task_id: String,
    pub content: String,
    pub updated_at: NaiveDateTime,
}

/// One row per model call: token usage and latency.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = usage_logs)]
pub struct UsageLog {
    pub id: String,
    pub task_id: String,
    pub model: String,
    /// Continuation round within the call, 0-based
    pub round: i32,
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub latency_ms: i64,
    pub created_at: NaiveDateTime,
}

/// The pipeline-facing slice of an article record.
#[derive(
    Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, AsChangeset, Insertable,
)]
#[diesel(table_name = articles)]
pub struct Article {
    pub id: String,
    pub title: String,
    /// Raw ingested markdown
    pub content_md: String,
    /// Cleaned markdown produced by the cleaning stage
    pub cleaned_md: Option<String>,
    /// ISO 639-1 code reported by classification
    pub language: Option<String>,
    pub category: Option<String>,
    pub summary: Option<String>,
    pub summary_status: String,
    pub outline: Option<String>,
    pub outline_status: String,
    pub key_points: Option<String>,
    pub key_points_status: String,
    pub quotes: Option<String>,
    pub quotes_status: String,
    pub translation_md: Option<String>,
    /// pending | completed | failed | skipped
    pub translation_status: String,
    /// JSON-encoded embedding vector
    pub embedding: Option<String>,
    /// processing | completed | failed
    pub status: String,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Article {
    /// The generated text column for a content kind (explicit mapping, one
    /// arm per kind).
    pub fn generated_field(&self, kind: ContentKind) -> Option<&str> {
        match kind {
            ContentKind::Summary => self.summary.as_deref(),
            ContentKind::Outline => self.outline.as_deref(),
            ContentKind::KeyPoints => self.key_points.as_deref(),
            ContentKind::Quotes => self.quotes.as_deref(),
        }
    }

    /// The status column for a content kind.
    pub fn content_status(&self, kind: ContentKind) -> &str {
        match kind {
            ContentKind::Summary => &self.summary_status,
            ContentKind::Outline => &self.outline_status,
            ContentKind::KeyPoints => &self.key_points_status,
            ContentKind::Quotes => &self.quotes_status,
        }
    }
}
