//! Index pipeline: fetch → chunk → embed → vector index. Produces a [`CourseIndex`]
//! ready to hand to [`crate::persist::IndexStore::save`].
//!
//! A course is always indexed from scratch; there is no merging into an older index.

use chrono::{DateTime, Utc};

use crate::chunks::{chunk_item, Segment};
use crate::content::{ContentError, ContentSource};
use crate::embed::{EmbedError, Embedder};
use crate::store::{VectorIndex, VectorIndexError};

/// All segments of one course plus the vector index over them.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseIndex {
    pub course_id: String,
    /// Human-readable name or code ("IS 327: Systems Analysis"), for matching and prompts.
    pub course_name: Option<String>,
    /// Embedding model the vectors came from.
    pub embed_model: String,
    pub created_at: DateTime<Utc>,
    pub vectors: VectorIndex,
}

impl CourseIndex {
    pub fn new(course_id: impl Into<String>, embed_model: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            course_name: None,
            embed_model: embed_model.into(),
            created_at: Utc::now(),
            vectors: VectorIndex::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.course_name = Some(name.into());
        self
    }

    pub fn segments(&self) -> &[Segment] {
        self.vectors.segments()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// An item left out of the index, and why.
#[derive(Debug)]
pub struct SkippedItem {
    /// Source id, or a placeholder when the item could not even be read.
    pub source_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("fetch failed: {0}")]
    Fetch(ContentError),
    #[error("embedding failed: {0}")]
    Embed(EmbedError),
    #[error("rejected by index: {0}")]
    Index(VectorIndexError),
}

/// Summary of one indexing run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub items_indexed: usize,
    /// Items with no text; not an error.
    pub items_empty: usize,
    pub segments: usize,
    pub skipped: Vec<SkippedItem>,
}

/// Runs the full pipeline for one course. Per-item fetch or embedding failures are
/// recorded in the report and the item is left out; only a failure to list the
/// course at all is fatal.
pub async fn build_course_index<S, E>(
    course_id: &str,
    source: &S,
    embedder: &E,
    max_chars: usize,
) -> Result<(CourseIndex, IndexReport), IndexError>
where
    S: ContentSource + ?Sized,
    E: Embedder,
{
    let fetched = source.fetch(course_id)?;
    tracing::info!(course_id, items = fetched.len(), "fetched course content");

    let mut index = CourseIndex::new(course_id, embedder.model());
    let mut report = IndexReport::default();

    for (n, result) in fetched.into_iter().enumerate() {
        let item = match result {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(course_id, error = %e, "skipping unreadable item");
                report.skipped.push(SkippedItem {
                    source_id: format!("#{n}"),
                    reason: SkipReason::Fetch(e),
                });
                continue;
            }
        };

        let segments: Vec<Segment> = chunk_item(&item, max_chars).collect();
        if segments.is_empty() {
            report.items_empty += 1;
            continue;
        }

        let count = segments.len();
        let added = match embed_item(embedder, &segments).await {
            Ok(vectors) => index.vectors.add_batch(segments, vectors).map_err(SkipReason::Index),
            Err(e) => Err(SkipReason::Embed(e)),
        };
        if let Err(reason) = added {
            tracing::warn!(course_id, source_id = %item.source_id, %reason, "skipping item");
            report.skipped.push(SkippedItem {
                source_id: item.source_id,
                reason,
            });
            continue;
        }

        report.segments += count;
        report.items_indexed += 1;
    }

    tracing::info!(
        course_id,
        items = report.items_indexed,
        segments = report.segments,
        skipped = report.skipped.len(),
        "built course index"
    );
    Ok((index, report))
}

/// One vector per segment, in segment order.
async fn embed_item<E: Embedder>(
    embedder: &E,
    segments: &[Segment],
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;
    if vectors.len() != texts.len() {
        return Err(EmbedError::Count {
            expected: texts.len(),
            actual: vectors.len(),
        });
    }
    Ok(vectors)
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("content error: {0}")]
    Content(#[from] ContentError),
}
