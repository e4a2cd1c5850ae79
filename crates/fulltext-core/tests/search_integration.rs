use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use fulltext_core::{
    Error, FullTextSearcher, IndexStore, ResultUrl, SearchConfig, SearchEvent, SearchStatus,
};

struct Workspace {
    _tmp: TempDir,
    root: PathBuf,
    config: SearchConfig,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("docs");
        fs::create_dir_all(&root).unwrap();
        let root = root.canonicalize().unwrap();

        let mut config = SearchConfig::with_index_dir(tmp.path().join("index"));
        config.map_size = 64 * 1024 * 1024;

        Self {
            _tmp: tmp,
            root,
            config,
        }
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn root_str(&self) -> &str {
        self.root.to_str().unwrap()
    }

    /// A fresh searcher for one request.
    fn searcher(&self) -> FullTextSearcher {
        FullTextSearcher::open(&self.config).unwrap()
    }

    fn store(&self) -> IndexStore {
        IndexStore::open(&self.config.index_dir, self.config.map_size).unwrap()
    }

    fn create_index(&self) {
        self.searcher().create_index(self.root_str()).unwrap();
    }

    fn search(&self, keyword: &str) -> Vec<PathBuf> {
        let searcher = self.searcher();
        searcher.search(self.root_str(), keyword).unwrap();
        assert_eq!(searcher.status(), SearchStatus::Completed);
        searcher
            .take_all()
            .into_iter()
            .map(|url| match url {
                ResultUrl::Local(path) => path,
                other => panic!("unexpected namespace: {other}"),
            })
            .collect()
    }
}

/// A searcher whose extractor requests a stop on the first file it reads,
/// the way a user interrupting a long crawl would.
fn stop_on_first_extract(
    ws: &Workspace,
    notifier: Option<mpsc::Sender<SearchEvent>>,
) -> Arc<FullTextSearcher> {
    let slot: Arc<OnceLock<Weak<FullTextSearcher>>> = Arc::default();
    let extractor = {
        let slot = Arc::clone(&slot);
        move |path: &Path| -> fulltext_core::Result<String> {
            if let Some(searcher) = slot.get().and_then(Weak::upgrade) {
                searcher.stop();
            }
            Ok(fs::read_to_string(path).unwrap_or_default())
        }
    };

    let mut searcher = FullTextSearcher::new(ws.store(), &ws.config, Arc::new(extractor)).unwrap();
    if let Some(notifier) = notifier {
        searcher = searcher.with_notifier(notifier);
    }
    let searcher = Arc::new(searcher);
    slot.set(Arc::downgrade(&searcher)).unwrap();
    searcher
}

fn touch_later(path: &Path) {
    let later = SystemTime::now() + Duration::from_secs(60);
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(later)
        .unwrap();
}

#[test]
fn modify_then_search_reflects_new_contents() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", "hello world");
    let b = ws.write("b.pdf", "goodbye");
    ws.create_index();

    assert_eq!(ws.search("hello"), vec![a.clone()]);

    fs::write(&a, "goodbye").unwrap();
    touch_later(&a);

    assert!(ws.search("hello").is_empty());
    assert_eq!(ws.search("goodbye"), vec![a, b]);
}

#[test]
fn deleted_files_are_reconciled() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", "goodbye");
    let b = ws.write("b.pdf", "goodbye");
    ws.create_index();

    fs::remove_file(&b).unwrap();

    assert_eq!(ws.search("goodbye"), vec![a]);
    let store = ws.store();
    assert!(store.open_for_read().get(&b).unwrap().is_none());
    assert_eq!(store.open_for_read().document_count().unwrap(), 1);
}

#[test]
fn files_added_after_build_are_found() {
    let ws = Workspace::new();
    ws.write("old.txt", "existing");
    ws.create_index();

    let new = ws.write("nested/new.md", "fresh content");
    assert_eq!(ws.search("fresh"), vec![new]);
}

#[test]
fn create_index_is_idempotent() {
    let ws = Workspace::new();
    let paths = [
        ws.write("a.txt", "alpha"),
        ws.write("sub/b.md", "beta 测试"),
        ws.write("sub/deeper/c.txt", "gamma"),
    ];

    ws.create_index();
    let store = ws.store();
    let first: Vec<_> = paths
        .iter()
        .map(|p| store.open_for_read().get(p).unwrap().unwrap())
        .collect();

    ws.create_index();
    let second: Vec<_> = paths
        .iter()
        .map(|p| store.open_for_read().get(p).unwrap().unwrap())
        .collect();

    assert_eq!(first, second);
    assert_eq!(store.open_for_read().document_count().unwrap(), 3);
}

#[test]
fn ensure_index_builds_once() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");

    let stats = ws.searcher().ensure_index(ws.root_str()).unwrap();
    assert_eq!(stats.map(|s| s.added), Some(1));
    assert!(ws.searcher().ensure_index(ws.root_str()).unwrap().is_none());
}

#[test]
fn cjk_and_mixed_keywords() {
    let ws = Workspace::new();
    let report = ws.write("report.txt", "年度报告2023final版本");
    ws.write("other.txt", "告报 separated");
    ws.create_index();

    assert_eq!(ws.search("报告"), vec![report.clone()]);
    assert_eq!(ws.search("报告 2023"), vec![report.clone()]);
    assert_eq!(ws.search("FINAL"), vec![report]);
}

#[test]
fn search_is_scoped_to_target() {
    let ws = Workspace::new();
    let inside = ws.write("inner/a.txt", "shared");
    ws.write("outer/b.txt", "shared");
    ws.create_index();

    let searcher = ws.searcher();
    searcher
        .search(ws.root.join("inner").to_str().unwrap(), "shared")
        .unwrap();
    assert_eq!(searcher.take_all(), vec![ResultUrl::Local(inside)]);
}

#[test]
fn result_cap_limits_results() {
    let mut ws = Workspace::new();
    ws.config.max_results = 3;
    for i in 0..6 {
        ws.write(&format!("{i}.txt"), "common");
    }
    ws.create_index();

    assert_eq!(ws.search("common").len(), 3);
}

#[test]
fn throttled_notifications_end_with_finished() {
    let mut ws = Workspace::new();
    ws.config.emit_interval_ms = 60 * 60 * 1000;
    for i in 0..5 {
        ws.write(&format!("{i}.txt"), "needle");
    }
    ws.create_index();

    let (tx, rx) = mpsc::channel();
    let searcher = ws.searcher().with_notifier(tx);
    searcher.search(ws.root_str(), "needle").unwrap();
    drop(searcher);

    let events: Vec<_> = rx.iter().collect();
    assert_eq!(
        events,
        vec![SearchEvent::ResultsAvailable, SearchEvent::Finished]
    );
}

#[test]
fn unthrottled_notifications_follow_results() {
    let mut ws = Workspace::new();
    ws.config.emit_interval_ms = 0;
    for i in 0..3 {
        ws.write(&format!("{i}.txt"), "needle");
    }
    ws.create_index();

    let (tx, rx) = mpsc::channel();
    let searcher = ws.searcher().with_notifier(tx);
    searcher.search(ws.root_str(), "needle").unwrap();
    assert_eq!(searcher.take_all().len(), 3);
    drop(searcher);

    let events: Vec<_> = rx.iter().collect();
    let available = events
        .iter()
        .filter(|e| **e == SearchEvent::ResultsAvailable)
        .count();
    assert_eq!(available, 4);
    assert_eq!(events.last(), Some(&SearchEvent::Finished));
}

#[test]
fn no_results_sends_only_finished() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");
    ws.create_index();

    let (tx, rx) = mpsc::channel();
    let searcher = ws.searcher().with_notifier(tx);
    searcher.search(ws.root_str(), "missing").unwrap();
    drop(searcher);

    assert_eq!(rx.iter().collect::<Vec<_>>(), vec![SearchEvent::Finished]);
}

#[test]
fn second_request_on_same_searcher_is_rejected() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");

    let searcher = ws.searcher();
    searcher.search(ws.root_str(), "alpha").unwrap();
    assert!(matches!(
        searcher.search(ws.root_str(), "alpha"),
        Err(Error::AlreadyRunning)
    ));
    assert_eq!(searcher.status(), SearchStatus::Completed);
}

#[test]
fn stop_before_start_terminates_request() {
    let ws = Workspace::new();
    ws.write("a.txt", "alpha");

    let searcher = ws.searcher();
    searcher.stop();
    assert!(matches!(
        searcher.search(ws.root_str(), "alpha"),
        Err(Error::AlreadyRunning)
    ));
    assert_eq!(searcher.status(), SearchStatus::Terminated);
    assert!(!searcher.has_results());
}

#[test]
fn stop_during_build_keeps_written_documents() {
    let ws = Workspace::new();
    for i in 0..4 {
        ws.write(&format!("{i}.txt"), "needle");
    }

    let searcher = stop_on_first_extract(&ws, None);
    let stats = searcher.create_index(ws.root_str()).unwrap();

    assert_eq!(searcher.status(), SearchStatus::Terminated);
    assert_eq!(stats.added, 1);
    assert_eq!(ws.store().open_for_read().document_count().unwrap(), 1);
}

#[test]
fn stop_during_refresh_skips_query() {
    let ws = Workspace::new();
    ws.write("a.txt", "needle");
    ws.create_index();
    let b = ws.write("b.txt", "needle");

    let (tx, rx) = mpsc::channel();
    let searcher = stop_on_first_extract(&ws, Some(tx));
    searcher.search(ws.root_str(), "needle").unwrap();

    assert_eq!(searcher.status(), SearchStatus::Terminated);
    assert!(!searcher.has_results());
    drop(searcher);
    assert_eq!(rx.iter().collect::<Vec<_>>(), vec![SearchEvent::Finished]);

    // the refresh checkpoint before the stop is committed
    assert!(ws.store().open_for_read().get(&b).unwrap().is_some());
    assert_eq!(ws.search("needle").len(), 2);
}

#[test]
fn spawned_search_delivers_results() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", "background");

    let searcher = Arc::new(ws.searcher());
    let handle = searcher.spawn_search(ws.root_str(), "background");
    handle.join().unwrap().unwrap();

    assert_eq!(searcher.status(), SearchStatus::Completed);
    assert_eq!(searcher.take_all(), vec![ResultUrl::Local(a)]);
}

#[test]
fn wildcard_keywords_match_term_patterns() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", "reporting");
    let b = ws.write("b.txt", "importing");
    ws.create_index();

    assert_eq!(ws.search("report*"), vec![a.clone()]);
    assert_eq!(ws.search("*porting"), vec![a, b]);
}

#[test]
fn vault_results_use_vault_urls() {
    let mut ws = Workspace::new();
    ws.config.namespaces.vault_root = Some(ws.root.clone());
    ws.write("secret/plan.md", "vaulted");
    ws.create_index();

    let searcher = ws.searcher();
    searcher.search("dfmvault:///secret", "vaulted").unwrap();
    let urls: Vec<_> = searcher.take_all().iter().map(ToString::to_string).collect();
    assert_eq!(urls, vec!["dfmvault:///secret/plan.md"]);
}
