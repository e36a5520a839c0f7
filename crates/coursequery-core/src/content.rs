//! Course content as fetched: one [`ContentItem`] per page, announcement, assignment or module entry.
//!
//! Fetching from the course-management system happens elsewhere. The core only
//! needs something that implements [`ContentSource`]; [`DirectorySource`] reads a
//! local export laid out as `<root>/<course_id>/<section>/<file>.md`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Which part of the course a piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Home,
    Syllabus,
    Announcement,
    Assignment,
    Module,
}

impl SectionType {
    pub const ALL: [SectionType; 5] = [
        SectionType::Home,
        SectionType::Syllabus,
        SectionType::Announcement,
        SectionType::Assignment,
        SectionType::Module,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionType::Home => "home",
            SectionType::Syllabus => "syllabus",
            SectionType::Announcement => "announcement",
            SectionType::Assignment => "assignment",
            SectionType::Module => "module",
        }
    }

    /// Tab label as shown in the course site.
    pub fn label(self) -> &'static str {
        match self {
            SectionType::Home => "Home",
            SectionType::Syllabus => "Syllabus",
            SectionType::Announcement => "Announcements",
            SectionType::Assignment => "Assignments",
            SectionType::Module => "Modules",
        }
    }

    /// Parses a tab label or directory name, case-insensitive, singular or plural.
    pub fn from_label(label: &str) -> Option<Self> {
        let l = label.trim().to_ascii_lowercase();
        let l = l.strip_suffix('s').unwrap_or(&l);
        match l {
            "home" | "front_page" | "frontpage" => Some(SectionType::Home),
            "syllabu" | "syllabus" => Some(SectionType::Syllabus),
            "announcement" => Some(SectionType::Announcement),
            "assignment" | "homework" => Some(SectionType::Assignment),
            "module" | "page" => Some(SectionType::Module),
            _ => None,
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SectionType {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionType::from_label(s).ok_or_else(|| ContentError::UnknownSection(s.to_string()))
    }
}

/// Detects a section named in a question ("last 2 assignments" -> Assignment).
/// Returns the first mention; `None` when no section word appears.
pub fn section_hint(question: &str) -> Option<SectionType> {
    question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .find_map(|w| match w.to_ascii_lowercase().as_str() {
            "syllabus" => Some(SectionType::Syllabus),
            "announcement" | "announcements" => Some(SectionType::Announcement),
            "assignment" | "assignments" | "homework" | "homeworks" => {
                Some(SectionType::Assignment)
            }
            "module" | "modules" => Some(SectionType::Module),
            _ => None,
        })
}

/// One fetched unit of course content. Immutable once fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub source_id: String,
    pub course_id: String,
    pub section: SectionType,
    pub title: Option<String>,
    pub text: String,
    /// Posted, created or due date, whichever the section carries.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Per-item fetch result. An `Err` here is recorded and the item skipped.
pub type FetchedItem = Result<ContentItem, ContentError>;

/// Anything that can list a course's content.
pub trait ContentSource {
    /// Returns every item for `course_id`. The outer error means the course
    /// could not be listed at all; inner errors are per item.
    fn fetch(&self, course_id: &str) -> Result<Vec<FetchedItem>, ContentError>;
}

impl ContentSource for Vec<ContentItem> {
    fn fetch(&self, course_id: &str) -> Result<Vec<FetchedItem>, ContentError> {
        Ok(self
            .iter()
            .filter(|item| item.course_id == course_id)
            .cloned()
            .map(Ok)
            .collect())
    }
}

/// Reads a local course export: `<root>/<course_id>/**/*.{md,txt}`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn course_dir(&self, course_id: &str) -> PathBuf {
        self.root.join(course_id)
    }
}

impl ContentSource for DirectorySource {
    fn fetch(&self, course_id: &str) -> Result<Vec<FetchedItem>, ContentError> {
        let dir = self.course_dir(course_id);
        if !dir.is_dir() {
            return Err(ContentError::CourseNotFound(dir));
        }
        let mut items = Vec::new();
        for entry in WalkDir::new(&dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    items.push(Err(ContentError::Walk(e.to_string())));
                    continue;
                }
            };
            let path = entry.path();
            if path.is_file() && is_content_file(path) {
                items.push(read_item(&dir, path, course_id));
            }
        }
        tracing::debug!(course_id, count = items.len(), "listed course export");
        Ok(items)
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn is_content_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("txt"))
}

/// Optional YAML header at the top of an exported file.
#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    id: Option<String>,
    section: Option<String>,
    title: Option<String>,
    date: Option<String>,
}

fn read_item(course_dir: &Path, path: &Path, course_id: &str) -> FetchedItem {
    let raw =
        std::fs::read_to_string(path).map_err(|e| ContentError::Read(path.to_path_buf(), e))?;
    let (front, body) = split_frontmatter(&raw);
    let front: FrontMatter = match front {
        Some(yaml) => serde_yaml::from_str(yaml)
            .map_err(|e| ContentError::FrontMatter(path.to_path_buf(), e))?,
        None => FrontMatter::default(),
    };

    let rel = path.strip_prefix(course_dir).unwrap_or(path);
    let section = match front.section.as_deref() {
        Some(s) => s.parse()?,
        None => section_from_path(rel).unwrap_or(SectionType::Home),
    };
    let timestamp = front.date.as_deref().map(parse_timestamp).transpose()?;
    let source_id = front
        .id
        .unwrap_or_else(|| rel.to_string_lossy().replace('\\', "/"));

    Ok(ContentItem {
        source_id,
        course_id: course_id.to_string(),
        section,
        title: front.title,
        text: body.to_string(),
        timestamp,
    })
}

fn section_from_path(rel: &Path) -> Option<SectionType> {
    let first = rel.components().next()?;
    // A file directly under the course dir has no section directory.
    if rel.components().count() < 2 {
        return None;
    }
    SectionType::from_label(first.as_os_str().to_str()?)
}

/// Splits optional YAML frontmatter (between a leading `---` and the next `---` line) from the body.
fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let s = content.trim_start();
    let Some(after_first) = s.strip_prefix("---") else {
        return (None, content);
    };
    match after_first.find("\n---") {
        Some(end) => {
            let yaml = &after_first[..end];
            let rest = &after_first[end + 4..];
            let body = rest.split_once('\n').map_or("", |(_, b)| b);
            (Some(yaml), body.trim_start_matches(['\r', '\n']))
        }
        None => (None, content),
    }
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (taken as midnight UTC).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ContentError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ContentError::BadTimestamp(s.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("no content export for course at {0}")]
    CourseNotFound(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid frontmatter in {0}: {1}")]
    FrontMatter(PathBuf, serde_yaml::Error),
    #[error("unknown section type: {0}")]
    UnknownSection(String),
    #[error("unrecognized date: {0} (expected RFC 3339 or YYYY-MM-DD)")]
    BadTimestamp(String),
}
