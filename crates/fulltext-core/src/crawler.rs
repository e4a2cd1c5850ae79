//! Filesystem crawler feeding the index writer.
//!
//! The walk is sequential and pruned through the walker's entry filter, so
//! excluded directories are never descended into. The shared status flag is
//! consulted for every entry; once it leaves `Running` the crawl stops and
//! whatever was written so far stays in the writer's transaction.

use crate::config::CrawlRules;
use crate::error::Result;
use crate::extractor::TextExtractor;
use crate::index_store::IndexWriter;
use crate::path_utils::modified_stamp;
use crate::status::StatusFlag;
use ignore::{DirEntry, WalkBuilder};
use std::path::Path;
use std::sync::Arc;
use tracing::{Level, debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    /// Every file is added without looking at the existing index.
    Build,
    /// Files are added, updated or skipped depending on the stored stamp.
    Refresh,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub visited: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Crawler {
    rules: Arc<CrawlRules>,
    extractor: Arc<dyn TextExtractor>,
    status: StatusFlag,
    commit_every: usize,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("rules", &self.rules)
            .field("status", &self.status.get())
            .field("commit_every", &self.commit_every)
            .finish_non_exhaustive()
    }
}

fn entry_allowed(rules: &CrawlRules, status: &StatusFlag, entry: &DirEntry) -> bool {
    if !status.is_running() {
        return false;
    }
    // the root was validated before the walk started
    if entry.depth() == 0 {
        return true;
    }

    let Some(path) = entry.path().to_str() else {
        return false;
    };
    let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
    let hidden = entry
        .file_name()
        .to_str()
        .is_none_or(|name| rules.is_hidden_name(name));

    if hidden || rules.is_system_noise(path) || rules.exceeds_limits(path) {
        return false;
    }

    is_dir || rules.is_supported_file(entry.path())
}

impl Crawler {
    pub fn new(
        rules: Arc<CrawlRules>,
        extractor: Arc<dyn TextExtractor>,
        status: StatusFlag,
        commit_every: usize,
    ) -> Self {
        Self {
            rules,
            extractor,
            status,
            commit_every: commit_every.max(1),
        }
    }

    /// Walks `root` and writes every eligible file through `writer`.
    ///
    /// Per-file failures are logged and counted; only storage failures while
    /// committing a checkpoint abort the crawl.
    #[tracing::instrument(skip(self, writer), level = Level::DEBUG)]
    pub fn run(&self, root: &Path, mode: CrawlMode, writer: &mut IndexWriter<'_>) -> Result<CrawlStats> {
        let mut stats = CrawlStats::default();

        let root_allowed = root.is_dir() && root.to_str().is_some_and(|root| self.rules.allows_dir(root));
        if !root_allowed {
            debug!(root = ?root, "Crawl root is excluded or not a directory");
            return Ok(stats);
        }

        let rules = Arc::clone(&self.rules);
        let status = self.status.clone();
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .hidden(false)
            .parents(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .follow_links(false)
            .filter_entry(move |entry| entry_allowed(&rules, &status, entry))
            .build();

        for result in walker {
            if !self.status.is_running() {
                info!(root = ?root, "Crawl stopped");
                break;
            }

            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            stats.visited += 1;
            self.index_file(entry.path(), mode, writer, &mut stats);

            if writer.pending() >= self.commit_every {
                writer.checkpoint()?;
            }
        }

        info!(
            root = ?root,
            ?mode,
            visited = stats.visited,
            added = stats.added,
            updated = stats.updated,
            skipped = stats.skipped,
            failed = stats.failed,
            "Crawl finished"
        );

        Ok(stats)
    }

    fn index_file(&self, path: &Path, mode: CrawlMode, writer: &mut IndexWriter<'_>, stats: &mut CrawlStats) {
        let Some(modified) = modified_stamp(path) else {
            warn!(path = ?path, "Failed to read modification time");
            stats.failed += 1;
            return;
        };

        let stored = match mode {
            CrawlMode::Build => None,
            CrawlMode::Refresh => match writer.stored_modified(path) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(path = ?path, "Failed to look up stored document: {e}");
                    stats.failed += 1;
                    return;
                }
            },
        };

        if stored.as_deref() == Some(modified.as_str()) {
            stats.skipped += 1;
            return;
        }

        let contents = self.extractor.extract(path).unwrap_or_else(|e| {
            debug!(path = ?path, "Indexing without contents: {e}");
            String::new()
        });

        let written = match stored {
            Some(_) => writer.update(path, &modified, &contents),
            None => writer.add(path, &modified, &contents),
        };

        match (written, stored) {
            (Ok(()), Some(_)) => stats.updated += 1,
            (Ok(()), None) => stats.added += 1,
            (Err(e), _) => {
                warn!(path = ?path, "Failed to write document: {e}");
                stats.failed += 1;
            }
        }
    }
}
