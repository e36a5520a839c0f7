//! In-memory vector index over segment embeddings. Supports add and cosine similarity search.
//!
//! Segments and their vectors live in two parallel tables addressed by the same
//! position, which is also how they are laid out on disk (see [`crate::persist`]).

use crate::chunks::Segment;

/// A search hit: the matched segment, its cosine similarity to the query, and
/// its position in the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit<'a> {
    pub segment: &'a Segment,
    pub score: f32,
    pub position: usize,
}

/// Vector index. Holds segments and their raw embeddings; the first `add`
/// fixes the dimensionality for the lifetime of the index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    segments: Vec<Segment>,
    vectors: Vec<Vec<f32>>,
    /// Cached L2 norm of each vector.
    norms: Vec<f32>,
    dimension: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds an index from its two tables, checking they line up.
    pub fn from_parts(
        segments: Vec<Segment>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, VectorIndexError> {
        if segments.len() != vectors.len() {
            return Err(VectorIndexError::LengthMismatch {
                segments: segments.len(),
                vectors: vectors.len(),
            });
        }
        let mut index = Self::new();
        for (segment, vector) in segments.into_iter().zip(vectors) {
            index.add(segment, vector)?;
        }
        Ok(index)
    }

    /// Add a segment with its embedding. The vector is stored as given.
    pub fn add(&mut self, segment: Segment, vector: Vec<f32>) -> Result<(), VectorIndexError> {
        validate(&vector, self.dimension)?;
        self.push(segment, vector);
        Ok(())
    }

    /// Add several segments with their embeddings. Every vector is checked before
    /// any is added, so a rejected batch leaves the index unchanged.
    pub fn add_batch(
        &mut self,
        segments: Vec<Segment>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), VectorIndexError> {
        if segments.len() != vectors.len() {
            return Err(VectorIndexError::LengthMismatch {
                segments: segments.len(),
                vectors: vectors.len(),
            });
        }
        let expected = self.dimension.or_else(|| vectors.first().map(Vec::len));
        for vector in &vectors {
            validate(vector, expected)?;
        }
        for (segment, vector) in segments.into_iter().zip(vectors) {
            self.push(segment, vector);
        }
        Ok(())
    }

    /// Returns up to `k` segments most similar to `query`, best first. Equal
    /// scores keep insertion order. Never mutates the index.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit<'_>>, VectorIndexError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        validate(query, self.dimension)?;
        let q_norm = norm(query);
        let mut scored: Vec<SearchHit<'_>> = self
            .vectors
            .iter()
            .zip(&self.norms)
            .zip(&self.segments)
            .enumerate()
            .map(|(position, ((vector, &v_norm), segment))| SearchHit {
                segment,
                score: cosine(query, q_norm, vector, v_norm),
                position,
            })
            .collect();
        // sort_by is stable, so ties stay in insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    /// Dimensionality fixed by the first `add`, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Number of indexed segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn push(&mut self, segment: Segment, vector: Vec<f32>) {
        if self.dimension.is_none() {
            self.dimension = Some(vector.len());
        }
        self.norms.push(norm(&vector));
        self.segments.push(segment);
        self.vectors.push(vector);
    }
}

/// Non-empty, finite, and `expected` long when a dimension is already fixed.
fn validate(vector: &[f32], expected: Option<usize>) -> Result<(), VectorIndexError> {
    if vector.is_empty() {
        return Err(VectorIndexError::EmptyVector);
    }
    if let Some(expected) = expected.filter(|&e| e != vector.len()) {
        return Err(VectorIndexError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(VectorIndexError::NonFinite);
    }
    Ok(())
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity in [-1, 1]. A zero vector scores 0 against everything.
fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm <= 0.0 || b_norm <= 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VectorIndexError {
    #[error("embedding dimension mismatch: index has {expected}, got {actual} (was the embedding model changed? re-index the course)")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("empty embedding vector")]
    EmptyVector,
    #[error("embedding vector contains NaN or infinity")]
    NonFinite,
    #[error("{segments} segments but {vectors} vectors")]
    LengthMismatch { segments: usize, vectors: usize },
}
