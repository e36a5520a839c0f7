//! Where coursequery stores its own data (config, per-course indexes).
//!
//! Course content comes from an export directory the user points at. We only
//! store app state here.

use std::path::PathBuf;

/// Subdirectory of the app data dir holding one index file per course.
pub const INDEX_SUBDIR: &str = "indexes";

/// Returns the directory where coursequery stores config and indexes.
/// On Linux: `~/.local/share/coursequery/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "CourseQuery", "coursequery")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Default location for persisted course indexes.
pub fn default_index_dir() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join(INDEX_SUBDIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_index_dir_is_under_app_data() {
        if let (Some(data), Some(index)) = (app_data_dir(), default_index_dir()) {
            assert!(index.starts_with(&data));
            assert!(index.ends_with(INDEX_SUBDIR));
        }
    }
}
