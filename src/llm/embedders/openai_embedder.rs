use super::Embedder;
use crate::errors::StageError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedder for any OpenAI-compatible embeddings endpoint.
#[derive(Debug)]
pub struct OpenAiEmbedder {
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiEmbedder {
    /// Creates an embedder for the given model.
    ///
    /// # Errors
    ///
    /// Returns a Config error when `api_key_env` names an environment
    /// variable that is not set.
    pub fn new(
        model: &str,
        base_url: Option<&str>,
        api_key_env: Option<&str>,
    ) -> Result<Self, StageError> {
        let api_key = match api_key_env {
            Some(env_name) => Some(std::env::var(env_name).map_err(|_| {
                StageError::config(format!("environment variable '{}' not set", env_name))
            })?),
            None => None,
        };
        Ok(OpenAiEmbedder {
            api_key,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, StageError> {
        let client = Client::new();
        let body = json!({
            "input": text,
            "model": self.model,
        });

        let mut request = client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StageError::timeout(format!("embedding call timed out: {}", e))
            } else {
                StageError::external(format!("embedding request failed: {}", e))
            }
        })?;

        if !res.status().is_success() {
            let status = res.status();
            let txt = res.text().await.unwrap_or_default();
            return Err(StageError::external(format!(
                "embedding endpoint returned {}: {}",
                status, txt
            )));
        }

        let json_resp: serde_json::Value = res
            .json()
            .await
            .map_err(|e| StageError::external(format!("invalid embedding response: {}", e)))?;
        let arr = json_resp["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| StageError::data("no embedding in response"))?;
        let embedding: Vec<f32> = arr
            .iter()
            .filter_map(|x| x.as_f64())
            .map(|x| x as f32)
            .collect();
        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
