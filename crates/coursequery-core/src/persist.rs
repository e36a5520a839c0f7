//! Saves and loads course indexes, one JSON file per course under the index directory.
//!
//! File layout: header fields, then `segments` and `vectors` as parallel arrays, so
//! position `i` in one is position `i` in the other and in the loaded [`VectorIndex`].
//! Writes go to a temp file in the same directory and are renamed into place, so a
//! reader sees either the previous index or the new one, never a partial file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunks::Segment;
use crate::config::{Config, ConfigError};
use crate::index::CourseIndex;
use crate::store::{VectorIndex, VectorIndexError};

const FORMAT_VERSION: u32 = 1;
const INDEX_SUFFIX: &str = ".index.json";

#[derive(Serialize)]
struct IndexFileRef<'a> {
    format: u32,
    course_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    course_name: Option<&'a str>,
    embed_model: &'a str,
    created_at: DateTime<Utc>,
    dimension: Option<usize>,
    segments: &'a [Segment],
    vectors: &'a [Vec<f32>],
}

#[derive(Deserialize)]
struct IndexFile {
    format: u32,
    course_id: String,
    #[serde(default)]
    course_name: Option<String>,
    embed_model: String,
    created_at: DateTime<Utc>,
    dimension: Option<usize>,
    segments: Vec<Segment>,
    vectors: Vec<Vec<f32>>,
}

/// Just enough of an index file to match a course by name.
#[derive(Deserialize)]
struct IndexHeader {
    #[serde(default)]
    course_name: Option<String>,
}

/// Reads and writes [`CourseIndex`]es under one directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the configured (or default) index directory.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(config.index_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the index file for `course_id`.
    pub fn path_for(&self, course_id: &str) -> Result<PathBuf, StoreError> {
        validate_course_id(course_id)?;
        Ok(self.dir.join(format!("{course_id}{INDEX_SUFFIX}")))
    }

    pub fn exists(&self, course_id: &str) -> bool {
        self.path_for(course_id).map_or(false, |p| p.is_file())
    }

    /// Writes `index` for `course_id`, replacing any previous index wholesale.
    pub fn save(&self, course_id: &str, index: &CourseIndex) -> Result<PathBuf, StoreError> {
        let path = self.path_for(course_id)?;
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io(self.dir.clone(), e))?;

        let file = IndexFileRef {
            format: FORMAT_VERSION,
            course_id,
            course_name: index.course_name.as_deref(),
            embed_model: &index.embed_model,
            created_at: index.created_at,
            dimension: index.vectors.dimension(),
            segments: index.vectors.segments(),
            vectors: index.vectors.vectors(),
        };

        let tmp = self
            .dir
            .join(format!(".{course_id}{INDEX_SUFFIX}.tmp-{}", std::process::id()));
        if let Err(e) = write_json(&tmp, &file) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io(path.clone(), e)
        })?;
        tracing::info!(course_id, segments = index.vectors.len(), path = %path.display(), "saved course index");
        Ok(path)
    }

    /// Loads the index for `course_id`. [`StoreError::IndexNotFound`] when none was saved.
    pub fn load(&self, course_id: &str) -> Result<CourseIndex, StoreError> {
        let path = self.path_for(course_id)?;
        let f = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::IndexNotFound {
                    course_id: course_id.to_string(),
                })
            }
            Err(e) => return Err(StoreError::Io(path, e)),
        };
        let file: IndexFile = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| StoreError::Decode(path.clone(), e))?;

        if file.format != FORMAT_VERSION {
            return Err(StoreError::UnsupportedFormat(file.format));
        }
        let vectors = VectorIndex::from_parts(file.segments, file.vectors)?;
        if file.dimension.is_some() && vectors.dimension() != file.dimension {
            return Err(StoreError::Corrupt(VectorIndexError::DimensionMismatch {
                expected: file.dimension.unwrap_or_default(),
                actual: vectors.dimension().unwrap_or_default(),
            }));
        }
        tracing::debug!(course_id, segments = vectors.len(), "loaded course index");
        Ok(CourseIndex {
            course_id: file.course_id,
            course_name: file.course_name,
            embed_model: file.embed_model,
            created_at: file.created_at,
            vectors,
        })
    }

    /// Course ids that have a saved index, sorted.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(self.dir.clone(), e)),
        };
        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                let id = name.strip_suffix(INDEX_SUFFIX)?;
                validate_course_id(id).ok()?;
                Some(id.to_string())
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Resolves what the user typed (an id, a course code, part of a name) to a saved
    /// course id. An exact id wins; otherwise the query must be a substring of exactly
    /// one id or course name, compared case-insensitively with spaces ignored.
    pub fn find_course(&self, query: &str) -> Result<String, StoreError> {
        let ids = self.list()?;
        if ids.iter().any(|id| id == query) {
            return Ok(query.to_string());
        }
        let not_found = || StoreError::IndexNotFound {
            course_id: query.to_string(),
        };
        let needle = squash(query);
        if needle.is_empty() {
            return Err(not_found());
        }

        let mut matches = Vec::new();
        for id in ids {
            let name = match self.read_header(&id) {
                Ok(header) => header.course_name,
                Err(e) => {
                    tracing::warn!(course_id = %id, error = %e, "skipping unreadable index");
                    continue;
                }
            };
            let hit = squash(&id).contains(&needle)
                || name.is_some_and(|n| squash(&n).contains(&needle));
            if hit {
                matches.push(id);
            }
        }
        match matches.len() {
            0 => Err(not_found()),
            1 => Ok(matches.remove(0)),
            _ => Err(StoreError::AmbiguousCourse {
                query: query.to_string(),
                matches,
            }),
        }
    }

    fn read_header(&self, course_id: &str) -> Result<IndexHeader, StoreError> {
        let path = self.path_for(course_id)?;
        let f = File::open(&path).map_err(|e| StoreError::Io(path.clone(), e))?;
        serde_json::from_reader(BufReader::new(f)).map_err(|e| StoreError::Decode(path, e))
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<(), StoreError> {
    let io_err = |e| StoreError::Io(path.to_path_buf(), e);
    let f = File::create(path).map_err(io_err)?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer(&mut w, value).map_err(StoreError::Encode)?;
    w.flush().map_err(io_err)?;
    w.get_ref().sync_all().map_err(io_err)
}

/// Course ids become file names: ASCII letters, digits, `-`, `_`, `.`; no leading dot.
fn validate_course_id(course_id: &str) -> Result<(), StoreError> {
    let ok = !course_id.is_empty()
        && !course_id.starts_with('.')
        && course_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidCourseId(course_id.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Missing index for course {course_id}. Run `coursequery index --course {course_id} --content <DIR>` first.")]
    IndexNotFound { course_id: String },
    #[error("{query:?} matches several courses: {}", .matches.join(", "))]
    AmbiguousCourse { query: String, matches: Vec<String> },
    #[error("invalid course id: {0:?}")]
    InvalidCourseId(String),
    #[error("I/O error at {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("failed to encode index: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode index {0}: {1}")]
    Decode(PathBuf, serde_json::Error),
    #[error("unsupported index format version {0}; re-index the course")]
    UnsupportedFormat(u32),
    #[error("corrupt index: {0}")]
    Corrupt(#[from] VectorIndexError),
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::content::SectionType;

    fn seg(id: &str, index: usize, ts: Option<DateTime<Utc>>) -> Segment {
        Segment {
            source_id: id.to_string(),
            section: SectionType::Announcement,
            title: Some(format!("Title {id}")),
            timestamp: ts,
            index,
            text: format!("Body of {id} part {index}"),
        }
    }

    fn course_index(course_id: &str) -> CourseIndex {
        let mut vectors = VectorIndex::new();
        let ts = Utc.with_ymd_and_hms(2024, 2, 10, 14, 5, 9).unwrap();
        vectors.add(seg("a", 0, Some(ts)), vec![0.1, -0.25, 3.5e-7]).unwrap();
        vectors.add(seg("a", 1, Some(ts)), vec![1.0, 0.0, 0.333_333_34]).unwrap();
        vectors.add(seg("b", 0, None), vec![-2.5, 1e10, 0.0]).unwrap();
        CourseIndex {
            course_id: course_id.to_string(),
            course_name: None,
            embed_model: "nomic-embed-text".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 2, 11, 0, 0, 0).unwrap(),
            vectors,
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let index = course_index("52692");
        store.save("52692", &index).unwrap();

        let loaded = store.load("52692").unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.vectors.segments(), index.vectors.segments());
        assert_eq!(loaded.vectors.vectors(), index.vectors.vectors());
    }

    #[test]
    fn extreme_values_round_trip_and_non_finite_never_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let mut index = course_index("c1");
        index
            .vectors
            .add(seg("c", 0, None), vec![f32::MAX, f32::MIN_POSITIVE, -f32::EPSILON])
            .unwrap();
        assert_eq!(
            index.vectors.add(seg("d", 0, None), vec![f32::NAN, 0.0, f32::INFINITY]),
            Err(VectorIndexError::NonFinite)
        );
        store.save("c1", &index).unwrap();

        let loaded = store.load("c1").unwrap();
        assert_eq!(loaded.vectors.vectors(), index.vectors.vectors());
        assert_eq!(loaded.len(), 4);
    }

    #[test]
    fn missing_index_is_index_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("not-created-yet"));
        let err = store.load("52692").unwrap_err();
        assert!(matches!(err, StoreError::IndexNotFound { ref course_id } if course_id == "52692"));
        assert!(err.to_string().contains("Missing index"));
        assert!(!store.exists("52692"));
    }

    #[test]
    fn resave_overwrites_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        store.save("c1", &course_index("c1")).unwrap();

        let mut smaller = course_index("c1");
        smaller.vectors = VectorIndex::new();
        smaller.vectors.add(seg("z", 0, None), vec![1.0, 2.0]).unwrap();
        store.save("c1", &smaller).unwrap();

        assert_eq!(store.load("c1").unwrap(), smaller);
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, ["c1.index.json"]);
    }

    #[test]
    fn truncated_file_is_not_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let path = store.save("c1", &course_index("c1")).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(store.load("c1"), Err(StoreError::Decode(..))));
    }

    #[test]
    fn mismatched_tables_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let path = store.save("c1", &course_index("c1")).unwrap();
        let mut json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        json["vectors"][1] = serde_json::json!([1.0, 2.0]);
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();
        assert!(matches!(
            store.load("c1"),
            Err(StoreError::Corrupt(VectorIndexError::DimensionMismatch { expected: 3, actual: 2 }))
        ));
    }

    #[test]
    fn rejects_path_like_course_ids_and_lists_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        for bad in ["", "../etc", "a/b", ".hidden"] {
            assert!(matches!(store.path_for(bad), Err(StoreError::InvalidCourseId(_))));
        }
        store.save("b2", &course_index("b2")).unwrap();
        store.save("a1", &course_index("a1")).unwrap();
        assert_eq!(store.list().unwrap(), ["a1", "b2"]);
    }

    #[test]
    fn find_course_by_id_code_or_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        store
            .save("52692", &course_index("52692").with_name("IS 327: Systems Analysis"))
            .unwrap();
        store
            .save("52669", &course_index("52669").with_name("CS 101 Intro to Programming"))
            .unwrap();
        store.save("99", &course_index("99")).unwrap();

        assert_eq!(store.find_course("52692").unwrap(), "52692");
        assert_eq!(store.find_course("is327").unwrap(), "52692");
        assert_eq!(store.find_course("systems analysis").unwrap(), "52692");
        assert_eq!(store.find_course("Intro").unwrap(), "52669");
        assert_eq!(store.find_course("99").unwrap(), "99");
        assert!(matches!(
            store.find_course("526"),
            Err(StoreError::AmbiguousCourse { ref matches, .. }) if matches == &["52669", "52692"]
        ));
        assert!(matches!(store.find_course("biology"), Err(StoreError::IndexNotFound { .. })));
        assert!(matches!(store.find_course("  "), Err(StoreError::IndexNotFound { .. })));
        assert_eq!(store.load("52692").unwrap().course_name.as_deref(), Some("IS 327: Systems Analysis"));
    }
}
