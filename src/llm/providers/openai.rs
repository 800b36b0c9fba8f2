use crate::config::ModelProfile;
use crate::errors::StageError;
use crate::llm::{ChatCompletion, ChatOutcome, FinishReason};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat provider for any OpenAI-compatible completions endpoint.
#[derive(Debug)]
pub struct OpenAiChatProvider {
    client: Client,
    /// API key, absent for unauthenticated local endpoints
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_output_tokens: usize,
}

impl OpenAiChatProvider {
    /// Builds a provider from a model profile.
    ///
    /// # Errors
    ///
    /// Returns a Config error when the profile names an API key environment
    /// variable that is not set.
    pub fn from_profile(profile: &ModelProfile) -> Result<Self, StageError> {
        let api_key = match &profile.api_key_env {
            Some(env_name) => Some(std::env::var(env_name).map_err(|_| {
                StageError::config(format!("environment variable '{}' not set", env_name))
            })?),
            None => None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(profile.request_timeout_secs))
            .build()
            .map_err(|e| StageError::external(format!("failed to build HTTP client: {}", e)))?;

        Ok(OpenAiChatProvider {
            client,
            api_key,
            base_url: profile
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: profile.model.clone(),
            max_output_tokens: profile.reserve_output_tokens,
        })
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChatProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<ChatOutcome, StageError> {
        let request_body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_text},
            ],
            "max_tokens": self.max_output_tokens,
            "temperature": 0.2,
        });

        let started = Instant::now();
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StageError::timeout(format!("chat completion timed out: {}", e))
            } else {
                StageError::external(format!("chat completion request failed: {}", e))
            }
        })?;
        let latency_ms = started.elapsed().as_millis() as i64;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(StageError::external(format!(
                "chat completion returned {}: {}",
                status, text
            )));
        }

        let json_resp: serde_json::Value = res
            .json()
            .await
            .map_err(|e| StageError::external(format!("invalid completion response: {}", e)))?;

        let content = json_resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| StageError::data("no content in completion response"))?
            .to_string();
        let finish_reason =
            FinishReason::from_api(json_resp["choices"][0]["finish_reason"].as_str());
        let prompt_tokens = json_resp["usage"]["prompt_tokens"].as_i64().unwrap_or(0) as i32;
        let completion_tokens = json_resp["usage"]["completion_tokens"].as_i64().unwrap_or(0) as i32;

        Ok(ChatOutcome {
            content,
            finish_reason,
            prompt_tokens,
            completion_tokens,
            latency_ms,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
