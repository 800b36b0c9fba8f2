mod parser;
use crate::constants::{self, DEFAULT_MAX_ATTEMPTS};
use crate::core::{ContentKind, TaskKind};
use crate::errors::StageError;
use serde::{Deserialize, Serialize};

pub use parser::load_app_config;

/// Top-level application configuration, loaded from YAML.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// Database location
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Worker/poll settings
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Named model connection profiles
    #[serde(default)]
    pub models: Vec<ModelProfile>,
    /// Prompt template overrides
    #[serde(default)]
    pub prompts: Vec<PromptProfile>,
    /// Pipeline-wide settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: default_db_path(),
        }
    }
}

/// Settings for the polling worker. Passed explicitly into the queue and
/// worker constructors; there are no process-wide mutable singletons.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Identifier recorded in `locked_by`; defaults to `host-pid`
    #[serde(default)]
    pub worker_id: Option<String>,
    /// Seconds to sleep when the queue is empty
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Lease TTL. Must exceed the worst-case model-call latency times the
    /// continuation rounds, or legitimate chunked work gets reclaimed.
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_secs: i64,
    /// How often the stale-lock sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Automatic retry budget for newly enqueued tasks
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            worker_id: None,
            poll_interval_secs: default_poll_interval(),
            lease_timeout_secs: default_lease_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl WorkerConfig {
    pub fn worker_id(&self) -> String {
        self.worker_id.clone().unwrap_or_else(|| {
            let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
            format!("{}-{}", host, std::process::id())
        })
    }
}

/// One model connection profile with its token budgets.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelProfile {
    /// Name tasks reference in payload overrides
    pub name: String,
    /// Model identifier sent to the API
    pub model: String,
    /// OpenAI-compatible endpoint base; defaults to the OpenAI API
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key; unauthenticated when unset
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_context_window")]
    pub context_window_tokens: usize,
    #[serde(default = "default_reserve_output")]
    pub reserve_output_tokens: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size_tokens: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap_tokens: usize,
    /// Extra calls allowed per chunk when the model truncates output
    #[serde(default = "default_continue_rounds")]
    pub max_continue_rounds: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// A prompt template override, matched by task kind and optionally narrowed
/// by content kind and category.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PromptProfile {
    /// Task kind this template applies to
    pub task: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub template: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Language translations are produced in
    #[serde(default = "default_target_language")]
    pub target_language: String,
    /// Categories offered to the classification stage
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    /// Embedding model identifier
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            target_language: default_target_language(),
            categories: default_categories(),
            embedding_model: default_embedding_model(),
        }
    }
}

impl AppConfig {
    /// Resolves the model profile for a task: an explicit payload override
    /// must name an enabled profile, otherwise the first enabled profile
    /// wins. No enabled profile at all is a Config error.
    pub fn resolve_model(&self, override_name: Option<&str>) -> Result<&ModelProfile, StageError> {
        match override_name {
            Some(name) => self
                .models
                .iter()
                .find(|m| m.name == name && m.enabled)
                .ok_or_else(|| {
                    StageError::config(format!("no enabled model profile named '{}'", name))
                }),
            None => self
                .models
                .iter()
                .find(|m| m.enabled)
                .ok_or_else(|| StageError::config("no enabled model profile configured")),
        }
    }

    /// Resolves the prompt template for a stage, from the most specific
    /// enabled override down to the built-in defaults.
    pub fn resolve_prompt(
        &self,
        kind: TaskKind,
        content: Option<ContentKind>,
        category: Option<&str>,
    ) -> String {
        let kind_str = kind.as_str();
        let content_str = content.map(|c| c.as_str());

        let matching = |want_content: bool, want_category: bool| {
            self.prompts.iter().find(|p| {
                p.enabled
                    && p.task == kind_str
                    && if want_content {
                        p.content.as_deref() == content_str
                    } else {
                        p.content.is_none()
                    }
                    && if want_category {
                        p.category.as_deref() == category && category.is_some()
                    } else {
                        p.category.is_none()
                    }
            })
        };

        for (want_content, want_category) in [(true, true), (true, false), (false, false)] {
            if let Some(profile) = matching(want_content, want_category) {
                return profile.template.clone();
            }
        }
        default_prompt(kind, content).to_string()
    }
}

/// Built-in prompt templates, used when no override is configured.
fn default_prompt(kind: TaskKind, content: Option<ContentKind>) -> &'static str {
    match kind {
        TaskKind::Cleaning => constants::CLEANING_SYSTEM_PROMPT,
        TaskKind::Classification => constants::CLASSIFICATION_SYSTEM_PROMPT,
        TaskKind::Translation => constants::TRANSLATION_SYSTEM_PROMPT,
        TaskKind::GenericContent => match content {
            Some(ContentKind::Outline) => constants::OUTLINE_SYSTEM_PROMPT,
            Some(ContentKind::KeyPoints) => constants::KEY_POINTS_SYSTEM_PROMPT,
            Some(ContentKind::Quotes) => constants::QUOTES_SYSTEM_PROMPT,
            _ => constants::SUMMARY_SYSTEM_PROMPT,
        },
        // validation and embedding run no chat prompt
        TaskKind::Validation | TaskKind::Embedding => "",
    }
}

fn default_db_path() -> String {
    "newsmill.db".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_lease_timeout() -> i64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_max_attempts() -> i32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_true() -> bool {
    true
}

fn default_context_window() -> usize {
    8192
}

fn default_reserve_output() -> usize {
    2048
}

fn default_chunk_size() -> usize {
    3000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_continue_rounds() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    120
}

fn default_target_language() -> String {
    "Chinese".to_string()
}

fn default_categories() -> Vec<String> {
    ["technology", "business", "science", "culture", "other"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
