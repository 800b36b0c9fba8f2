pub mod openai_embedder;

use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

pub use openai_embedder::OpenAiEmbedder;

/// Text embedding behind the same interchangeable-provider seam as chat.
#[async_trait]
pub trait Embedder: Debug + Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, StageError>;

    fn model_name(&self) -> &str;
}
