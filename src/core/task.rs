use crate::chunking::SplitStrategy;
use crate::errors::Error;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Which stage routine a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Cleaning,
    Validation,
    Classification,
    GenericContent,
    Translation,
    Embedding,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Cleaning => "cleaning",
            TaskKind::Validation => "validation",
            TaskKind::Classification => "classification",
            TaskKind::GenericContent => "generic_content",
            TaskKind::Translation => "translation",
            TaskKind::Embedding => "embedding",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cleaning" => Ok(TaskKind::Cleaning),
            "validation" => Ok(TaskKind::Validation),
            "classification" => Ok(TaskKind::Classification),
            "generic_content" => Ok(TaskKind::GenericContent),
            "translation" => Ok(TaskKind::Translation),
            "embedding" => Ok(TaskKind::Embedding),
            _ => Err(()),
        }
    }
}

/// Which generated article field a `generic_content` task fills. Each kind
/// maps to a fixed column pair on the article row; there is no dynamic
/// field dispatch anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Summary,
    Outline,
    KeyPoints,
    Quotes,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Summary => "summary",
            ContentKind::Outline => "outline",
            ContentKind::KeyPoints => "key_points",
            ContentKind::Quotes => "quotes",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(ContentKind::Summary),
            "outline" => Ok(ContentKind::Outline),
            "key_points" => Ok(ContentKind::KeyPoints),
            "quotes" => Ok(ContentKind::Quotes),
            _ => Err(()),
        }
    }
}

/// Resumable position of a chunked stage, written to the payload after
/// every chunk. `cursor` is the index of the next chunk to process; the
/// partial output lives in the task's draft row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCheckpoint {
    pub strategy: SplitStrategy,
    pub cursor: usize,
}

/// Stage parameters carried by a task row as canonical JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Category hint passed between stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Model profile override by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt profile override by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Requested split strategy; volatile, excluded from the fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SplitStrategy>,
    /// Resume position; volatile, excluded from the fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<ChunkCheckpoint>,
}

impl TaskPayload {
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialization with sorted keys, stable under caller key order.
    pub fn canonical_json(&self) -> Result<String, Error> {
        // serde_json's default map is a BTreeMap, so a Value round-trip
        // yields sorted keys
        let value = serde_json::to_value(self)?;
        Ok(value.to_string())
    }

    /// The payload as it participates in the dedup key: resume state
    /// stripped, keys sorted. A checkpoint written mid-run must not change
    /// the task's identity.
    fn dedup_json(&self) -> Result<String, Error> {
        let mut stable = self.clone();
        stable.strategy = None;
        stable.checkpoint = None;
        stable.canonical_json()
    }
}

/// Content fingerprint of `(kind, subject, content_kind, payload)` used to
/// suppress duplicate active tasks.
pub fn task_fingerprint(
    kind: TaskKind,
    subject_id: Option<&str>,
    content_kind: Option<ContentKind>,
    payload: &TaskPayload,
) -> Result<String, Error> {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(subject_id.unwrap_or("").as_bytes());
    hasher.update(b"\n");
    hasher.update(content_kind.map(|c| c.as_str()).unwrap_or("").as_bytes());
    hasher.update(b"\n");
    hasher.update(payload.dedup_json()?.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_under_key_order() {
        // same logical payload arriving with different JSON key order
        let a = TaskPayload::from_json(r#"{"category":"tech","model":"fast"}"#).unwrap();
        let b = TaskPayload::from_json(r#"{"model":"fast","category":"tech"}"#).unwrap();
        let fa = task_fingerprint(TaskKind::Cleaning, Some("a1"), None, &a).unwrap();
        let fb = task_fingerprint(TaskKind::Cleaning, Some("a1"), None, &b).unwrap();
        assert_eq!(fa, fb);
    }

    #[test]
    fn fingerprint_ignores_resume_state() {
        let plain = TaskPayload::default();
        let mut resumed = TaskPayload::default();
        resumed.strategy = Some(SplitStrategy::Chunked);
        resumed.checkpoint = Some(ChunkCheckpoint {
            strategy: SplitStrategy::Chunked,
            cursor: 3,
        });
        let fa = task_fingerprint(TaskKind::Translation, Some("a1"), None, &plain).unwrap();
        let fb = task_fingerprint(TaskKind::Translation, Some("a1"), None, &resumed).unwrap();
        assert_eq!(fa, fb);
    }

    #[test]
    fn fingerprint_separates_subjects_and_kinds() {
        let p = TaskPayload::default();
        let a = task_fingerprint(TaskKind::Cleaning, Some("a1"), None, &p).unwrap();
        let b = task_fingerprint(TaskKind::Cleaning, Some("a2"), None, &p).unwrap();
        let c = task_fingerprint(TaskKind::Validation, Some("a1"), None, &p).unwrap();
        let d = task_fingerprint(
            TaskKind::GenericContent,
            Some("a1"),
            Some(ContentKind::Summary),
            &p,
        )
        .unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
