//! Retrieval core for answering questions about course content.
//!
//! Indexing: [`ContentSource`] → [`chunk_item`] → [`Embedder`] → [`VectorIndex`] →
//! [`IndexStore`]. Querying: [`IndexStore::load`] → [`Retriever`] (similarity search
//! plus [`TimeFilter`]) → [`answer::prepare`] → language model.
//!
//! Config and indexes live in the app data directory (see [app_data]) unless the
//! config points elsewhere.

pub mod answer;
pub mod app_data;
pub mod chunks;
pub mod config;
pub mod content;
pub mod embed;
pub mod index;
pub mod ollama;
pub mod persist;
pub mod retriever;
pub mod store;
pub mod time_filter;

pub use app_data::app_data_dir;
pub use chunks::{chunk_item, Segment, Segments, DEFAULT_MAX_CHARS};
pub use config::{load_config, load_config_from, set_index_dir, Config, ConfigError};
pub use content::{section_hint, ContentItem, ContentSource, DirectorySource, SectionType};
pub use embed::{EmbedError, Embedder};
pub use index::{build_course_index, CourseIndex, IndexError, IndexReport};
pub use ollama::{OllamaClient, OllamaError};
pub use persist::{IndexStore, StoreError};
pub use retriever::{Outcome, Retrieval, RetrieveError, RetrievedSegment, Retriever};
pub use store::{SearchHit, VectorIndex, VectorIndexError};
pub use time_filter::{TimeFilter, TimeScope};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "coursequery-core ready"
}
