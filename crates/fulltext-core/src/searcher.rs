//! Search coordinator.
//!
//! A [`FullTextSearcher`] drives exactly one request: it refreshes the index
//! for the target directory, runs the query, validates every hit against the
//! filesystem and streams accepted results into a shared result set. Callers
//! poll with [`FullTextSearcher::take_all`] and may register a channel to be
//! told when new results are available.

use crate::analyzer::normalize_keyword;
use crate::config::{CrawlRules, SearchConfig};
use crate::crawler::{CrawlMode, CrawlStats, Crawler};
use crate::error::{Error, Result};
use crate::extractor::{PlainTextExtractor, TextExtractor};
use crate::index_store::{IndexStore, QueryHit};
use crate::namespace::{Namespaces, ResultUrl};
use crate::path_utils::{HiddenFilter, modified_stamp};
use crate::query::parse_query;
use crate::status::{SearchStatus, StatusFlag};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEvent {
    /// The result set has entries that were not taken yet.
    ResultsAvailable,
    /// The request ended, either completed or stopped.
    Finished,
}

pub struct FullTextSearcher {
    store: IndexStore,
    rules: Arc<CrawlRules>,
    extractor: Arc<dyn TextExtractor>,
    namespaces: Namespaces,
    status: StatusFlag,
    results: Mutex<Vec<ResultUrl>>,
    notifier: Option<Sender<SearchEvent>>,
    enabled: bool,
    max_results: usize,
    emit_interval: Duration,
    commit_every: usize,
}

impl std::fmt::Debug for FullTextSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullTextSearcher")
            .field("store", &self.store)
            .field("status", &self.status.get())
            .field("results", &self.results.lock().len())
            .finish_non_exhaustive()
    }
}

impl FullTextSearcher {
    pub fn new(
        store: IndexStore,
        config: &SearchConfig,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            rules: Arc::new(config.crawl_rules()?),
            extractor,
            namespaces: Namespaces::from_config(&config.namespaces),
            status: StatusFlag::default(),
            results: Mutex::new(Vec::new()),
            notifier: None,
            enabled: config.enabled,
            max_results: config.max_results,
            emit_interval: config.emit_interval(),
            commit_every: config.commit_every,
        })
    }

    /// Opens the configured index and reads documents as plain text.
    pub fn open(config: &SearchConfig) -> Result<Self> {
        let store = IndexStore::open(&config.index_dir, config.map_size)?;
        let extractor = Arc::new(PlainTextExtractor::new(config.max_file_size));
        Self::new(store, config, extractor)
    }

    pub fn with_notifier(mut self, notifier: Sender<SearchEvent>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn status(&self) -> SearchStatus {
        self.status.get()
    }

    /// Requests the running operation to stop at its next checkpoint.
    pub fn stop(&self) {
        info!("Stop requested");
        self.status.stop();
    }

    pub fn has_results(&self) -> bool {
        !self.results.lock().is_empty()
    }

    /// Drains the result set, preserving insertion order.
    pub fn take_all(&self) -> Vec<ResultUrl> {
        std::mem::take(&mut *self.results.lock())
    }

    fn notify(&self, event: SearchEvent) {
        if let Some(notifier) = &self.notifier
            && notifier.send(event).is_err()
        {
            debug!(?event, "Notification receiver is gone");
        }
    }

    fn crawler(&self) -> Crawler {
        Crawler::new(
            Arc::clone(&self.rules),
            Arc::clone(&self.extractor),
            self.status.clone(),
            self.commit_every,
        )
    }

    /// Rebuilds the index from scratch for everything under `root`.
    pub fn create_index(&self, root: &str) -> Result<CrawlStats> {
        if !self.enabled {
            return Err(Error::FeatureDisabled);
        }
        if !self.status.try_start() {
            return Err(Error::AlreadyRunning);
        }

        let result = self.build(root);
        self.status.complete();

        match &result {
            Ok(stats) => info!(root, ?stats, "Index created"),
            Err(e) if e.is_rejection() => warn!(root, "Index build rejected: {e}"),
            Err(e) => error!(root, "Failed to create index: {e}"),
        }
        result
    }

    fn build(&self, root: &str) -> Result<CrawlStats> {
        let root = self.namespaces.resolve_str(root)?;
        let _building = self.store.begin_build()?;

        let started = Instant::now();
        let mut writer = self.store.open_for_write(true)?;
        let stats = self.crawler().run(&root, CrawlMode::Build, &mut writer)?;
        writer.commit()?;

        debug!(elapsed = ?started.elapsed(), "Index build committed");
        Ok(stats)
    }

    /// Builds the index only when it holds no documents yet.
    pub fn ensure_index(&self, root: &str) -> Result<Option<CrawlStats>> {
        if self.store.exists()? {
            debug!("Index already exists, skipping build");
            return Ok(None);
        }
        self.create_index(root).map(Some)
    }

    /// Runs one search request to completion on the calling thread.
    ///
    /// Rejections (feature disabled, index building, already used) leave the
    /// status untouched. Invalid targets and empty keywords complete the
    /// request with no results and return the error.
    pub fn search(&self, target: &str, keyword: &str) -> Result<()> {
        if !self.enabled {
            return Err(Error::FeatureDisabled);
        }
        if self.store.is_building() {
            return Err(Error::IndexBuilding);
        }
        if !self.status.try_start() {
            return Err(Error::AlreadyRunning);
        }

        let result = self.run_search(target, keyword);
        self.finish();
        result
    }

    /// Runs [`Self::search`] on a background thread.
    pub fn spawn_search(
        self: &Arc<Self>,
        target: impl Into<String>,
        keyword: impl Into<String>,
    ) -> JoinHandle<Result<()>> {
        let searcher = Arc::clone(self);
        let target = target.into();
        let keyword = keyword.into();
        std::thread::spawn(move || searcher.search(&target, &keyword))
    }

    fn finish(&self) {
        if self.status.complete() && self.has_results() {
            self.notify(SearchEvent::ResultsAvailable);
        }
        self.notify(SearchEvent::Finished);
    }

    fn run_search(&self, target: &str, keyword: &str) -> Result<()> {
        let root = self.namespaces.resolve_str(target)?;
        if normalize_keyword(keyword).is_empty() {
            return Err(Error::EmptyKeyword);
        }

        let started = Instant::now();
        info!(root = ?root, keyword, "Search started");

        match self.refresh(&root) {
            Ok(stats) => debug!(?stats, "Index refreshed"),
            Err(Error::WriterBusy) => {
                warn!(root = ?root, "Index writer busy, rejecting search");
                return Err(Error::WriterBusy);
            }
            Err(e) => error!(root = ?root, "Failed to refresh index: {e}"),
        }
        if !self.status.is_running() {
            info!(root = ?root, "Search stopped after refresh");
            return Ok(());
        }

        let hits = match self.query(&root, keyword) {
            Ok(hits) => hits,
            Err(e) => {
                error!(root = ?root, keyword, "Query failed: {e}");
                Vec::new()
            }
        };

        let total = hits.len();
        let tombstones = self.collect_results(&root, hits);
        self.delete_tombstones(&tombstones);

        info!(
            hits = total,
            removed = tombstones.len(),
            elapsed = ?started.elapsed(),
            "Search finished"
        );
        Ok(())
    }

    fn refresh(&self, root: &Path) -> Result<CrawlStats> {
        let mut writer = self.store.open_for_write(false)?;
        let stats = self.crawler().run(root, CrawlMode::Refresh, &mut writer)?;
        writer.commit()?;
        Ok(stats)
    }

    fn query(&self, root: &Path, keyword: &str) -> Result<Vec<QueryHit>> {
        let query = parse_query(keyword)?;
        self.store
            .open_for_read()
            .query(&query, Some(root), self.max_results)
    }

    /// Appends valid hits to the result set. Returns indexed paths whose
    /// files are gone.
    fn collect_results(&self, root: &Path, hits: Vec<QueryHit>) -> Vec<PathBuf> {
        let mut hidden = HiddenFilter::new(root);
        let mut tombstones = Vec::new();
        let mut last_emit = Instant::now();

        for hit in hits {
            if !self.status.is_running() {
                info!("Search stopped while collecting results");
                break;
            }

            if !hit.path.exists() {
                tombstones.push(hit.path);
                continue;
            }
            if modified_stamp(&hit.path).as_deref() != Some(hit.modified.as_str()) {
                debug!(path = ?hit.path, "Skipping stale hit");
                continue;
            }
            if hidden.is_hidden(&hit.path) {
                continue;
            }

            self.results.lock().push(self.namespaces.map(&hit.path));
            self.notify_throttled(&mut last_emit);
        }

        tombstones
    }

    /// Sends `ResultsAvailable` once per emit interval, and only while the
    /// result set still holds entries a consumer has not taken.
    fn notify_throttled(&self, last_emit: &mut Instant) {
        if last_emit.elapsed() >= self.emit_interval && self.has_results() {
            self.notify(SearchEvent::ResultsAvailable);
            *last_emit = Instant::now();
        }
    }

    fn delete_tombstones(&self, tombstones: &[PathBuf]) {
        if tombstones.is_empty() {
            return;
        }

        let deleted = self.store.open_for_write(false).and_then(|mut writer| {
            for path in tombstones {
                writer.delete(path)?;
            }
            writer.commit()
        });

        match deleted {
            Ok(count) => debug!(count, "Removed documents of deleted files"),
            Err(e) => warn!("Failed to remove documents of deleted files, will retry later: {e}"),
        }
    }
}
