//! Engine configuration.
//!
//! Every field has a default so an empty TOML file (or no file at all) gives
//! the stock behaviour. Crawl filters are compiled once into [`CrawlRules`].

use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound of documents materialized by a single query.
pub const MAX_RESULT_NUM: usize = 100_000;
/// Minimum gap between two "results available" notifications.
pub const EMIT_INTERVAL: Duration = Duration::from_millis(50);

const DEFAULT_EXCLUDED_PATTERN: &str = "^/(boot|dev|proc|sys|run|lib|usr|data/home).*$";
const DEFAULT_SUPPORTED_SUFFIXES: &[&str] = &[
    "rtf", "odt", "ods", "odp", "odg", "docx", "xlsx", "pptx", "ppsx", "md", "xls", "xlsb", "doc",
    "dot", "wps", "ppt", "pps", "txt", "pdf", "dps",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Feature gate consulted before any search is accepted.
    pub enabled: bool,
    pub index_dir: PathBuf,
    /// LMDB map size in bytes (virtual reservation, not disk usage).
    pub map_size: usize,
    pub max_results: usize,
    pub emit_interval_ms: u64,
    /// Commit the write transaction every N written documents while crawling.
    pub commit_every: usize,
    pub crawl: CrawlConfig,
    pub namespaces: NamespaceConfig,
    /// Files larger than this are indexed without contents.
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub excluded_pattern: String,
    pub excluded_allow_prefix: String,
    pub hidden_allow_prefix: String,
    pub max_path_len: usize,
    pub max_depth: usize,
    pub supported_suffixes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    pub vault_root: Option<PathBuf>,
    pub trash_files_root: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            index_dir: default_index_dir(),
            map_size: 1 << 30,
            max_results: MAX_RESULT_NUM,
            emit_interval_ms: EMIT_INTERVAL.as_millis() as u64,
            commit_every: 512,
            crawl: CrawlConfig::default(),
            namespaces: NamespaceConfig::default(),
            max_file_size: 32 * 1024 * 1024,
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            excluded_pattern: DEFAULT_EXCLUDED_PATTERN.to_string(),
            excluded_allow_prefix: "/run/user".to_string(),
            hidden_allow_prefix: ".local".to_string(),
            // FILENAME_MAX - 1 on Linux
            max_path_len: 4095,
            max_depth: 20,
            supported_suffixes: DEFAULT_SUPPORTED_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("fulltext-search")
        .join("index")
}

impl SearchConfig {
    /// Default configuration with the index stored under `index_dir`.
    pub fn with_index_dir(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms)
    }

    pub fn crawl_rules(&self) -> Result<CrawlRules> {
        CrawlRules::new(&self.crawl)
    }
}

/// Compiled crawl filters shared by the crawler's entry filter.
#[derive(Debug, Clone)]
pub struct CrawlRules {
    excluded: Regex,
    excluded_allow_prefix: String,
    hidden_allow_prefix: String,
    max_path_len: usize,
    max_depth: usize,
    supported_suffixes: Vec<String>,
}

impl CrawlRules {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        Ok(Self {
            excluded: Regex::new(&config.excluded_pattern)?,
            excluded_allow_prefix: config.excluded_allow_prefix.clone(),
            hidden_allow_prefix: config.hidden_allow_prefix.clone(),
            max_path_len: config.max_path_len,
            max_depth: config.max_depth,
            supported_suffixes: config
                .supported_suffixes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        })
    }

    /// System pseudo-filesystems and other locations never worth indexing.
    pub fn is_system_noise(&self, path: &str) -> bool {
        self.excluded.is_match(path)
            && (self.excluded_allow_prefix.is_empty()
                || !path.starts_with(&self.excluded_allow_prefix))
    }

    pub fn is_hidden_name(&self, name: &str) -> bool {
        name.starts_with('.')
            && (self.hidden_allow_prefix.is_empty() || !name.starts_with(&self.hidden_allow_prefix))
    }

    /// Cheap bounds against pathological trees.
    pub fn exceeds_limits(&self, path: &str) -> bool {
        path.len() > self.max_path_len || path.matches('/').count() > self.max_depth
    }

    /// Whether a directory (or the crawl root) may be entered at all.
    pub fn allows_dir(&self, path: &str) -> bool {
        !self.is_system_noise(path) && !self.exceeds_limits(path)
    }

    pub fn is_supported_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.supported_suffixes
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(ext))
            })
    }
}
