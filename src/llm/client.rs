use crate::config::ModelProfile;
use crate::errors::StageError;
use crate::llm::Embedder;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Why the model stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of output
    Stop,
    /// Output hit the token limit; a continuation round is needed
    Length,
    /// Anything else the provider reports
    Other,
}

impl FinishReason {
    pub fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("length") => FinishReason::Length,
            Some("stop") | None => FinishReason::Stop,
            Some(_) => FinishReason::Other,
        }
    }
}

/// Result of one bounded model call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub finish_reason: FinishReason,
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub latency_ms: i64,
}

/// One bounded chat completion against a configured model. Stage routines
/// depend only on this trait; the provider behind it is interchangeable.
#[async_trait]
pub trait ChatCompletion: Debug + Send + Sync {
    async fn complete(&self, system_prompt: &str, user_text: &str)
        -> Result<ChatOutcome, StageError>;

    /// Model identifier recorded in usage logs.
    fn model_name(&self) -> &str;
}

/// Builds chat clients and embedders from resolved config profiles. The
/// pipeline goes through this seam so tests can substitute scripted doubles
/// for the network adapters.
pub trait LlmFactory: Send + Sync {
    fn chat(&self, profile: &ModelProfile) -> Result<Arc<dyn ChatCompletion>, StageError>;

    fn embedder(
        &self,
        model: &str,
        base_url: Option<&str>,
        api_key_env: Option<&str>,
    ) -> Result<Arc<dyn Embedder>, StageError>;
}
