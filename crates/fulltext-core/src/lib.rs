//! fulltext-core - local full-text indexing and search
//!
//! Crawls a directory tree, extracts text from supported documents and keeps
//! an inverted index in LMDB. Each search refreshes the part of the index
//! under its target before querying, so results reflect the filesystem at
//! search time without a background watcher.

pub mod analyzer;
pub mod config;
pub mod crawler;
mod db_healthcheck;
mod error;
pub mod extractor;
pub mod index_store;
pub mod log;
pub mod namespace;
pub mod path_utils;
pub mod query;
pub mod searcher;
pub mod status;

pub use config::{CrawlConfig, CrawlRules, NamespaceConfig, SearchConfig};
pub use crawler::{CrawlMode, CrawlStats};
pub use db_healthcheck::{DbHealth, DbHealthChecker};
pub use error::{Error, Result};
pub use extractor::{PlainTextExtractor, TextExtractor};
pub use index_store::{IndexReader, IndexStore, IndexWriter, QueryHit, StoredDocument};
pub use namespace::{Namespaces, ResultUrl, SearchTarget};
pub use searcher::{FullTextSearcher, SearchEvent};
pub use status::SearchStatus;
