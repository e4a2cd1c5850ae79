use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Thread panicked")]
    ThreadPanic,
    #[error("Invalid search target {0}")]
    InvalidTarget(String),
    #[error("Invalid path {0}")]
    InvalidPath(PathBuf),
    #[error("Keyword is empty after normalization")]
    EmptyKeyword,
    #[error("Full-text search is disabled")]
    FeatureDisabled,

    #[error("Another operation is already running for this searcher")]
    AlreadyRunning,
    #[error("Index is being built, try again later")]
    IndexBuilding,
    #[error("Index writer is already open")]
    WriterBusy,
    #[error("Index writer has no active transaction")]
    WriterClosed,

    #[error("Failed to create directory: {0}")]
    CreateDir(#[from] std::io::Error),
    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Binary content in {0}")]
    BinaryContent(PathBuf),
    #[error("File {0} exceeds the extraction size limit")]
    FileTooLarge(PathBuf),

    #[error("Failed to open index env: {0}")]
    EnvOpen(#[source] heed::Error),
    #[error("Failed to create index database: {0}")]
    DbCreate(#[source] heed::Error),
    #[error("Failed to clear stale readers for index: {0}")]
    DbClearStaleReaders(#[source] heed::Error),
    #[error("Failed to start read transaction for index: {0}")]
    DbStartReadTxn(#[source] heed::Error),
    #[error("Failed to start write transaction for index: {0}")]
    DbStartWriteTxn(#[source] heed::Error),
    #[error("Failed to read from index: {0}")]
    DbRead(#[source] heed::Error),
    #[error("Failed to write to index: {0}")]
    DbWrite(#[source] heed::Error),
    #[error("Failed to commit write transaction to index: {0}")]
    DbCommit(#[source] heed::Error),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("Failed to parse config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

impl Error {
    /// Errors the caller should see as an immediate rejection of the request,
    /// as opposed to storage or I/O failures that are logged and contained.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning
                | Self::IndexBuilding
                | Self::WriterBusy
                | Self::FeatureDisabled
                | Self::InvalidTarget(_)
                | Self::EmptyKeyword
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
