//! Ollama client for embeddings and completion. Wraps ollama-rs with a simple API.

use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use thiserror::Error;

use crate::config::Config;
use crate::embed::{EmbedError, Embedder};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_COMPLETION_MODEL: &str = "llama3.2";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Thin wrapper around Ollama for embedding and completion.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
    completion_model: String,
}

impl OllamaClient {
    /// Create from URL string, e.g. http://localhost:11434.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        let inner = Ollama::try_new(url).map_err(OllamaError::ParseUrl)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
        })
    }

    /// Create from the endpoint and model names in `config`.
    pub fn from_config(config: &Config) -> Result<Self, OllamaError> {
        Ok(Self::from_url(&config.ollama_url)?
            .with_embed_model(&config.embed_model)
            .with_completion_model(&config.completion_model))
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    /// Set the model used by [`OllamaClient::complete`].
    pub fn with_completion_model(mut self, model: impl Into<String>) -> Self {
        self.completion_model = model.into();
        self
    }

    /// Send a prompt to the completion model and return its full response text.
    pub async fn complete(&self, prompt: &str) -> Result<String, OllamaError> {
        let req = GenerationRequest::new(self.completion_model.clone(), prompt.to_string());
        let res = self.inner.generate(req).await.map_err(OllamaError::Request)?;
        Ok(res.response.trim().to_string())
    }
}

impl Embedder for OllamaClient {
    fn model(&self) -> &str {
        &self.embed_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Single(text.to_string()),
        );
        let res = self
            .inner
            .generate_embeddings(req)
            .await
            .map_err(OllamaError::Request)?;
        res.embeddings.into_iter().next().ok_or(EmbedError::Empty)
    }

    /// One request for all of `texts`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );
        let res = self
            .inner
            .generate_embeddings(req)
            .await
            .map_err(OllamaError::Request)?;
        Ok(res.embeddings)
    }
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
}
