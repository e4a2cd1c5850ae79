//! Persistent inverted index on top of LMDB.
//!
//! Layout (named databases inside one environment):
//! - `documents`: doc key -> [`DocumentMeta`] (path + modified stamp)
//! - `contents`: doc key -> extracted text
//! - `postings`: `term 0x00 doc key` -> positions of the term in the document
//!
//! The doc key is the BLAKE3 digest of the path, so arbitrarily long paths fit
//! into LMDB's bounded key size while the path itself stays a stored field.
//!
//! LMDB readers work on MVCC snapshots and never block the writer. Writers are
//! serialized by LMDB itself, but a second writer here fails fast with
//! [`Error::WriterBusy`] instead of waiting on the environment mutex.

use crate::analyzer::index_terms;
use crate::db_healthcheck::DbHealthChecker;
use crate::error::{Error, Result};
use crate::query::{Clause, ParsedQuery};
use heed::types::{Bytes, DecodeIgnore, SerdeBincode, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{Level, debug, info};

pub type DocKey = [u8; 32];

const DOC_KEY_LEN: usize = 32;
const TERM_SEPARATOR: u8 = 0;

/// One environment per index directory per process. LMDB must not be opened
/// twice from the same process, and the writer guard has to be shared by
/// every handle pointing at the same files.
static OPEN_STORES: Lazy<Mutex<HashMap<PathBuf, Weak<StoreInner>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub path: String,
    pub modified: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub path: PathBuf,
    pub modified: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryHit {
    pub path: PathBuf,
    pub modified: String,
}

pub fn document_key(path: &Path) -> DocKey {
    *blake3::hash(path.as_os_str().as_encoded_bytes()).as_bytes()
}

fn posting_key(term: &str, key: &DocKey) -> Vec<u8> {
    let mut posting = Vec::with_capacity(term.len() + 1 + DOC_KEY_LEN);
    posting.extend_from_slice(term.as_bytes());
    posting.push(TERM_SEPARATOR);
    posting.extend_from_slice(key);
    posting
}

/// Splits a postings key back into its term bytes and document key.
fn split_posting_key(raw: &[u8]) -> Option<(&[u8], DocKey)> {
    let split = raw.len().checked_sub(DOC_KEY_LEN + 1)?;
    let (term, rest) = raw.split_at(split);
    let key = DocKey::try_from(&rest[1..]).ok()?;
    Some((term, key))
}

fn grouped_terms(contents: &str) -> BTreeMap<String, Vec<u32>> {
    let mut grouped: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for (term, position) in index_terms(contents) {
        grouped.entry(term).or_default().push(position);
    }
    grouped
}

struct StoreInner {
    dir: PathBuf,
    env: Env,
    documents: Database<Bytes, SerdeBincode<DocumentMeta>>,
    contents: Database<Bytes, Str>,
    postings: Database<Bytes, SerdeBincode<Vec<u32>>>,
    writer_open: AtomicBool,
    building: AtomicBool,
}

#[derive(Clone)]
pub struct IndexStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("dir", &self.inner.dir)
            .field("writer_open", &self.inner.writer_open.load(Ordering::Relaxed))
            .field("building", &self.inner.building.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl DbHealthChecker for IndexStore {
    fn get_env(&self) -> &Env {
        &self.inner.env
    }

    fn count_entries(&self) -> Result<Vec<(&'static str, u64)>> {
        let rtxn = self.inner.env.read_txn().map_err(Error::DbStartReadTxn)?;

        let documents = self.inner.documents.len(&rtxn).map_err(Error::DbRead)?;
        let contents = self.inner.contents.len(&rtxn).map_err(Error::DbRead)?;
        let postings = self.inner.postings.len(&rtxn).map_err(Error::DbRead)?;

        Ok(vec![
            ("documents", documents),
            ("contents", contents),
            ("postings", postings),
        ])
    }
}

impl IndexStore {
    /// Opens (creating if needed) the index stored in `dir`. Opening the same
    /// directory twice returns handles to the same environment.
    pub fn open(dir: &Path, map_size: usize) -> Result<Self> {
        fs::create_dir_all(dir).map_err(Error::CreateDir)?;
        let dir = dir.canonicalize().map_err(Error::CreateDir)?;

        let mut stores = OPEN_STORES.lock();
        if let Some(inner) = stores.get(&dir).and_then(Weak::upgrade) {
            return Ok(Self { inner });
        }

        let env = unsafe {
            let mut opts = EnvOpenOptions::new();
            opts.max_dbs(4);
            opts.map_size(map_size);
            opts.open(&dir).map_err(Error::EnvOpen)?
        };

        env.clear_stale_readers()
            .map_err(Error::DbClearStaleReaders)?;

        let mut wtxn = env.write_txn().map_err(Error::DbStartWriteTxn)?;
        let documents = env
            .create_database(&mut wtxn, Some("documents"))
            .map_err(Error::DbCreate)?;
        let contents = env
            .create_database(&mut wtxn, Some("contents"))
            .map_err(Error::DbCreate)?;
        let postings = env
            .create_database(&mut wtxn, Some("postings"))
            .map_err(Error::DbCreate)?;
        wtxn.commit().map_err(Error::DbCommit)?;

        info!("Index opened at {}", dir.display());

        let inner = Arc::new(StoreInner {
            dir: dir.clone(),
            env,
            documents,
            contents,
            postings,
            writer_open: AtomicBool::new(false),
            building: AtomicBool::new(false),
        });
        stores.retain(|_, store| store.strong_count() > 0);
        stores.insert(dir, Arc::downgrade(&inner));

        Ok(Self { inner })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Opens the single writer. `create` discards every document first.
    pub fn open_for_write(&self, create: bool) -> Result<IndexWriter<'_>> {
        if self
            .inner
            .writer_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(dir = ?self.inner.dir, "Index writer already open");
            return Err(Error::WriterBusy);
        }

        let txn = match self.inner.env.write_txn() {
            Ok(txn) => txn,
            Err(e) => {
                self.inner.writer_open.store(false, Ordering::Release);
                return Err(Error::DbStartWriteTxn(e));
            }
        };

        let mut writer = IndexWriter {
            inner: &self.inner,
            txn: Some(txn),
            pending: 0,
            written: 0,
        };

        if create {
            writer.clear()?;
        }

        Ok(writer)
    }

    pub fn open_for_read(&self) -> IndexReader<'_> {
        IndexReader { inner: &self.inner }
    }

    pub fn is_writer_open(&self) -> bool {
        self.inner.writer_open.load(Ordering::Acquire)
    }

    /// Whether the index holds at least one document.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.open_for_read().document_count()? > 0)
    }

    /// Marks the index as being rebuilt until the returned guard is dropped.
    pub fn begin_build(&self) -> Result<BuildGuard<'_>> {
        self.inner
            .building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::IndexBuilding)?;

        Ok(BuildGuard { inner: &self.inner })
    }

    pub fn is_building(&self) -> bool {
        self.inner.building.load(Ordering::Acquire)
    }
}

pub struct BuildGuard<'a> {
    inner: &'a StoreInner,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.inner.building.store(false, Ordering::Release);
    }
}

/// Exclusive write access to the index. Dropping the writer without
/// [`IndexWriter::commit`] aborts everything since the last checkpoint.
pub struct IndexWriter<'a> {
    inner: &'a StoreInner,
    txn: Option<RwTxn<'a>>,
    pending: usize,
    written: usize,
}

impl<'a> IndexWriter<'a> {
    fn parts(&mut self) -> Result<(&'a StoreInner, &mut RwTxn<'a>)> {
        let inner = self.inner;
        let txn = self.txn.as_mut().ok_or(Error::WriterClosed)?;
        Ok((inner, txn))
    }

    fn clear(&mut self) -> Result<()> {
        let (inner, txn) = self.parts()?;
        inner.documents.clear(txn).map_err(Error::DbWrite)?;
        inner.contents.clear(txn).map_err(Error::DbWrite)?;
        inner.postings.clear(txn).map_err(Error::DbWrite)?;
        info!(dir = ?inner.dir, "Index cleared for rebuild");
        Ok(())
    }

    /// Inserts a document without checking for an existing one.
    pub fn add(&mut self, path: &Path, modified: &str, contents: &str) -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?;
        let key = document_key(path);
        let (inner, txn) = self.parts()?;

        for (term, positions) in grouped_terms(contents) {
            inner
                .postings
                .put(txn, &posting_key(&term, &key), &positions)
                .map_err(Error::DbWrite)?;
        }

        inner
            .contents
            .put(txn, &key[..], contents)
            .map_err(Error::DbWrite)?;
        inner
            .documents
            .put(
                txn,
                &key[..],
                &DocumentMeta {
                    path: path_str.to_string(),
                    modified: modified.to_string(),
                },
            )
            .map_err(Error::DbWrite)?;

        self.pending += 1;
        self.written += 1;
        Ok(())
    }

    /// Replaces the document stored for `path`.
    pub fn update(&mut self, path: &Path, modified: &str, contents: &str) -> Result<()> {
        self.delete(path)?;
        self.add(path, modified, contents)
    }

    /// Removes the document stored for `path` and all of its postings.
    pub fn delete(&mut self, path: &Path) -> Result<bool> {
        let key = document_key(path);
        let (inner, txn) = self.parts()?;

        if inner
            .documents
            .get(txn, &key[..])
            .map_err(Error::DbRead)?
            .is_none()
        {
            return Ok(false);
        }

        let contents = inner
            .contents
            .get(txn, &key[..])
            .map_err(Error::DbRead)?
            .map(str::to_string)
            .unwrap_or_default();

        for term in grouped_terms(&contents).keys() {
            inner
                .postings
                .delete(txn, &posting_key(term, &key))
                .map_err(Error::DbWrite)?;
        }
        inner
            .contents
            .delete(txn, &key[..])
            .map_err(Error::DbWrite)?;
        inner
            .documents
            .delete(txn, &key[..])
            .map_err(Error::DbWrite)?;

        self.pending += 1;
        self.written += 1;
        Ok(true)
    }

    /// Stored modification stamp for `path`, seen through this transaction.
    pub fn stored_modified(&mut self, path: &Path) -> Result<Option<String>> {
        let key = document_key(path);
        let (inner, txn) = self.parts()?;
        let meta = inner.documents.get(txn, &key[..]).map_err(Error::DbRead)?;
        Ok(meta.map(|meta| meta.modified))
    }

    /// Writes since the last checkpoint.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Commits the work so far and continues in a fresh transaction.
    pub fn checkpoint(&mut self) -> Result<()> {
        if let Some(txn) = self.txn.take() {
            txn.commit().map_err(Error::DbCommit)?;
        }
        self.pending = 0;
        self.txn = Some(self.inner.env.write_txn().map_err(Error::DbStartWriteTxn)?);
        Ok(())
    }

    /// Commits and releases the writer. Returns the number of writes.
    pub fn commit(mut self) -> Result<usize> {
        if let Some(txn) = self.txn.take() {
            txn.commit().map_err(Error::DbCommit)?;
        }
        Ok(self.written)
    }
}

impl Drop for IndexWriter<'_> {
    fn drop(&mut self) {
        // abort before releasing so the next writer never waits on LMDB
        drop(self.txn.take());
        self.inner.writer_open.store(false, Ordering::Release);
    }
}

/// Read access to the last committed state of the index.
pub struct IndexReader<'a> {
    inner: &'a StoreInner,
}

impl IndexReader<'_> {
    pub fn document_count(&self) -> Result<u64> {
        let rtxn = self.inner.env.read_txn().map_err(Error::DbStartReadTxn)?;
        self.inner.documents.len(&rtxn).map_err(Error::DbRead)
    }

    pub fn get(&self, path: &Path) -> Result<Option<StoredDocument>> {
        let key = document_key(path);
        let rtxn = self.inner.env.read_txn().map_err(Error::DbStartReadTxn)?;

        let Some(meta) = self
            .inner
            .documents
            .get(&rtxn, &key[..])
            .map_err(Error::DbRead)?
        else {
            return Ok(None);
        };

        let contents = self
            .inner
            .contents
            .get(&rtxn, &key[..])
            .map_err(Error::DbRead)?
            .unwrap_or_default()
            .to_string();

        Ok(Some(StoredDocument {
            path: PathBuf::from(meta.path),
            modified: meta.modified,
            contents,
        }))
    }

    /// Documents matching every clause of `query` whose path lies under
    /// `path_prefix`, ordered by path. At most `limit` hits are returned.
    #[tracing::instrument(skip(self, query), level = Level::DEBUG)]
    pub fn query(
        &self,
        query: &ParsedQuery,
        path_prefix: Option<&Path>,
        limit: usize,
    ) -> Result<Vec<QueryHit>> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let rtxn = self.inner.env.read_txn().map_err(Error::DbStartReadTxn)?;

        let mut matched: Option<HashSet<DocKey>> = None;
        for clause in &query.clauses {
            let docs = self.clause_docs(&rtxn, clause)?;
            let next = match matched {
                Some(current) => current.intersection(&docs).copied().collect(),
                None => docs,
            };

            if next.is_empty() {
                return Ok(Vec::new());
            }
            matched = Some(next);
        }

        let mut hits = Vec::new();
        for key in matched.unwrap_or_default() {
            let Some(meta) = self
                .inner
                .documents
                .get(&rtxn, &key[..])
                .map_err(Error::DbRead)?
            else {
                continue;
            };

            let path = PathBuf::from(meta.path);
            if path_prefix.is_some_and(|prefix| !path.starts_with(prefix)) {
                continue;
            }

            hits.push(QueryHit {
                path,
                modified: meta.modified,
            });
        }

        hits.sort_unstable_by(|a, b| a.path.cmp(&b.path));
        if hits.len() > limit {
            debug!(
                total = hits.len(),
                limit, "Query matched more documents than the result cap"
            );
            hits.truncate(limit);
        }

        Ok(hits)
    }

    fn clause_docs(&self, txn: &RoTxn, clause: &Clause) -> Result<HashSet<DocKey>> {
        match clause {
            Clause::Term(term) => Ok(self.term_postings(txn, term)?.into_keys().collect()),
            Clause::Phrase(terms) => self.phrase_docs(txn, terms),
            Clause::Wildcard { prefix, matcher } => {
                // positions are irrelevant here, skip decoding them
                let postings = self.inner.postings.remap_data_type::<DecodeIgnore>();
                let mut docs = HashSet::new();
                let mut visit = |raw: &[u8]| {
                    if let Some((term, key)) = split_posting_key(raw)
                        && std::str::from_utf8(term).is_ok_and(|term| matcher.is_match(term))
                    {
                        docs.insert(key);
                    }
                };

                // LMDB rejects empty keys, a leading wildcard scans every term
                if prefix.is_empty() {
                    for item in postings.iter(txn).map_err(Error::DbRead)? {
                        let (raw, ()) = item.map_err(Error::DbRead)?;
                        visit(raw);
                    }
                } else {
                    for item in postings
                        .prefix_iter(txn, prefix.as_bytes())
                        .map_err(Error::DbRead)?
                    {
                        let (raw, ()) = item.map_err(Error::DbRead)?;
                        visit(raw);
                    }
                }
                Ok(docs)
            }
        }
    }

    fn term_postings(&self, txn: &RoTxn, term: &str) -> Result<HashMap<DocKey, Vec<u32>>> {
        let mut prefix = Vec::with_capacity(term.len() + 1);
        prefix.extend_from_slice(term.as_bytes());
        prefix.push(TERM_SEPARATOR);

        let mut postings = HashMap::new();
        for item in self
            .inner
            .postings
            .prefix_iter(txn, &prefix[..])
            .map_err(Error::DbRead)?
        {
            let (raw, positions) = item.map_err(Error::DbRead)?;
            if let Some((_, key)) = split_posting_key(raw) {
                postings.insert(key, positions);
            }
        }

        Ok(postings)
    }

    fn phrase_docs(&self, txn: &RoTxn, terms: &[String]) -> Result<HashSet<DocKey>> {
        let Some((first, rest)) = terms.split_first() else {
            return Ok(HashSet::new());
        };

        // candidate start positions per document
        let mut starts = self.term_postings(txn, first)?;
        for (offset, term) in rest.iter().enumerate() {
            let offset = offset as u32 + 1;
            let next = self.term_postings(txn, term)?;

            starts.retain(|key, positions| {
                let Some(next_positions) = next.get(key) else {
                    return false;
                };
                positions.retain(|start| next_positions.contains(&(start + offset)));
                !positions.is_empty()
            });

            if starts.is_empty() {
                break;
            }
        }

        Ok(starts.into_keys().collect())
    }
}
