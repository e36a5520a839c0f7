//! The embedding boundary: anything that maps text to a fixed-length vector.
//!
//! The index and retriever only see this trait, so tests run against a
//! deterministic fake instead of a live model.

use std::future::Future;

use crate::ollama::OllamaError;

pub trait Embedder: Send + Sync {
    /// Name of the embedding model; recorded in saved indexes.
    fn model(&self) -> &str;

    /// Embed a single string. Dimensionality must be stable for a given model.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, EmbedError>> + Send;

    /// Embed several strings, one vector per input in input order. Defaults to
    /// calling [`Embedder::embed`] for each.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, EmbedError>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed(text).await?);
            }
            Ok(vectors)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error(transparent)]
    Ollama(#[from] OllamaError),
    #[error("embedder returned no vector")]
    Empty,
    #[error("embedder returned {actual} vector(s) for {expected} input(s)")]
    Count { expected: usize, actual: usize },
    #[error("embedding failed: {0}")]
    Other(String),
}

#[cfg(test)]
pub(crate) mod fake {
    //! Bag-of-words embedder: each lowercase word hashes into one of `dim` buckets.

    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::*;

    pub struct HashEmbedder {
        pub dim: usize,
    }

    impl HashEmbedder {
        pub fn vector(&self, text: &str) -> Vec<f32> {
            let mut v = vec![0.0; self.dim];
            for word in text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                let mut h = DefaultHasher::new();
                word.to_lowercase().hash(&mut h);
                v[(h.finish() % self.dim as u64) as usize] += 1.0;
            }
            v
        }
    }

    impl Embedder for HashEmbedder {
        fn model(&self) -> &str {
            "hash-bow"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(self.vector(text))
        }
    }

    /// Batch calls return one vector fewer than asked for.
    pub struct ShortBatchEmbedder {
        pub inner: HashEmbedder,
    }

    impl Embedder for ShortBatchEmbedder {
        fn model(&self) -> &str {
            self.inner.model()
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let mut vectors = self.inner.embed_batch(texts).await?;
            vectors.pop();
            Ok(vectors)
        }
    }

    /// Fails for any text containing `poison`.
    pub struct FlakyEmbedder {
        pub inner: HashEmbedder,
    }

    impl Embedder for FlakyEmbedder {
        fn model(&self) -> &str {
            self.inner.model()
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            if text.contains("poison") {
                return Err(EmbedError::Other("model refused input".into()));
            }
            self.inner.embed(text).await
        }
    }
}
