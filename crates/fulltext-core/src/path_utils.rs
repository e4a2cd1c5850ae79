//! Filesystem helpers shared by the crawler and the search coordinator.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Name of the per-directory file listing entries hidden from search results.
pub const HIDDEN_LIST_FILE: &str = ".hidden";

/// Canonicalize a path, resolving symlinks and producing an absolute path.
///
/// On Windows, uses `dunce::canonicalize` so indexed paths and result URLs
/// never carry the `\\?\` extended-length prefix that `std::fs::canonicalize`
/// produces. On other platforms, delegates directly to `std::fs::canonicalize`.
#[cfg(windows)]
pub fn canonicalize(path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    dunce::canonicalize(path)
}

#[cfg(not(windows))]
pub fn canonicalize(path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    std::fs::canonicalize(path)
}

/// Fixed-width (23 chars) sortable representation of a modification time:
/// UTC `YYYYmmddHHMMSS` plus nanoseconds.
pub fn format_stamp(time: SystemTime) -> String {
    let time: DateTime<Utc> = time.into();
    time.format("%Y%m%d%H%M%S%9f").to_string()
}

/// Current modification stamp of `path`, read from disk on every call.
pub fn modified_stamp(path: &Path) -> Option<String> {
    let metadata = std::fs::metadata(path).ok()?;
    metadata.modified().ok().map(format_stamp)
}

/// Filters results listed in `.hidden` files of the directories between the
/// search root and the result. Lists are read lazily, once per directory.
#[derive(Debug)]
pub struct HiddenFilter {
    root: PathBuf,
    lists: HashMap<PathBuf, HashSet<String>>,
}

impl HiddenFilter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lists: HashMap::new(),
        }
    }

    pub fn is_hidden(&mut self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        let mut dir = self.root.clone();
        for component in relative.components() {
            let name = component.as_os_str().to_string_lossy();
            if name.starts_with('.') || self.list_for(&dir).contains(name.as_ref()) {
                return true;
            }
            dir.push(component);
        }

        false
    }

    fn list_for(&mut self, dir: &Path) -> &HashSet<String> {
        self.lists
            .entry(dir.to_path_buf())
            .or_insert_with(|| read_hidden_list(dir))
    }
}

fn read_hidden_list(dir: &Path) -> HashSet<String> {
    std::fs::read_to_string(dir.join(HIDDEN_LIST_FILE))
        .map(|content| {
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
