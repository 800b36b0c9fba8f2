pub mod openai;

use crate::config::ModelProfile;
use crate::errors::StageError;
use crate::llm::{ChatCompletion, Embedder, LlmFactory, OpenAiEmbedder};
use std::sync::Arc;

pub use openai::OpenAiChatProvider;

/// Production factory: every profile talks to an OpenAI-compatible endpoint.
#[derive(Debug, Default)]
pub struct OpenAiFactory;

impl LlmFactory for OpenAiFactory {
    fn chat(&self, profile: &ModelProfile) -> Result<Arc<dyn ChatCompletion>, StageError> {
        Ok(Arc::new(OpenAiChatProvider::from_profile(profile)?))
    }

    fn embedder(
        &self,
        model: &str,
        base_url: Option<&str>,
        api_key_env: Option<&str>,
    ) -> Result<Arc<dyn Embedder>, StageError> {
        Ok(Arc::new(OpenAiEmbedder::new(model, base_url, api_key_env)?))
    }
}
