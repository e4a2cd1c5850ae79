//! Mapping between caller-facing URLs and the canonical local paths stored in
//! the index.

use crate::config::NamespaceConfig;
use crate::error::{Error, Result};
use crate::path_utils::canonicalize;
use std::fmt;
use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file";
const TRASH_SCHEME: &str = "trash";
const VAULT_SCHEME: &str = "dfmvault";

/// A search result in the caller's addressing scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultUrl {
    /// Path relative to the vault root.
    Vault(PathBuf),
    /// Path relative to the trash files directory.
    Trash(PathBuf),
    Local(PathBuf),
}

/// Percent-encodes every component, keeping the separators.
fn encode_path(path: &Path) -> String {
    path.to_string_lossy()
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

impl fmt::Display for ResultUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vault(rel) => write!(f, "{VAULT_SCHEME}:///{}", encode_path(rel)),
            Self::Trash(rel) => write!(f, "{TRASH_SCHEME}:///{}", encode_path(rel)),
            Self::Local(path) => write!(f, "{FILE_SCHEME}://{}", encode_path(path)),
        }
    }
}

/// An incoming search target before it is resolved to a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    Local(PathBuf),
    Trash(PathBuf),
    Vault(PathBuf),
}

impl SearchTarget {
    /// Parses `file://`, `trash://` and `dfmvault://` URLs or a bare absolute
    /// path. Every other scheme names a virtual location and is rejected.
    /// URL paths are percent-decoded, bare paths are taken as they are.
    pub fn parse(target: &str) -> Result<Self> {
        let invalid = || Error::InvalidTarget(target.to_string());

        let Some((scheme, rest)) = target.split_once("://") else {
            return if Path::new(target).is_absolute() {
                Ok(Self::Local(PathBuf::from(target)))
            } else {
                Err(invalid())
            };
        };

        if !matches!(scheme, FILE_SCHEME | TRASH_SCHEME | VAULT_SCHEME) {
            return Err(invalid());
        }
        let rest = urlencoding::decode(rest).map_err(|_| invalid())?;

        let relative = PathBuf::from(rest.trim_start_matches('/'));
        match scheme {
            FILE_SCHEME if rest.starts_with('/') => Ok(Self::Local(PathBuf::from(rest.as_ref()))),
            TRASH_SCHEME => Ok(Self::Trash(relative)),
            VAULT_SCHEME => Ok(Self::Vault(relative)),
            _ => Err(invalid()),
        }
    }
}

/// Knows where the vault and trash namespaces live on disk.
#[derive(Debug, Clone, Default)]
pub struct Namespaces {
    vault_root: Option<PathBuf>,
    trash_files_root: Option<PathBuf>,
}

impl Namespaces {
    pub fn new(vault_root: Option<PathBuf>, trash_files_root: Option<PathBuf>) -> Self {
        // canonical roots so prefix checks agree with indexed paths
        let canonical = |root: PathBuf| canonicalize(&root).unwrap_or(root);
        Self {
            vault_root: vault_root.map(canonical),
            trash_files_root: trash_files_root.map(canonical),
        }
    }

    /// Trash defaults to the XDG location under the user's data directory.
    pub fn from_config(config: &NamespaceConfig) -> Self {
        let trash = config
            .trash_files_root
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("Trash").join("files")));
        Self::new(config.vault_root.clone(), trash)
    }

    /// Canonical local directory backing `target`.
    pub fn resolve(&self, target: &SearchTarget) -> Result<PathBuf> {
        let (path, original) = match target {
            SearchTarget::Local(path) => (Some(path.clone()), path),
            SearchTarget::Trash(rel) => (self.trash_files_root.as_ref().map(|root| root.join(rel)), rel),
            SearchTarget::Vault(rel) => (self.vault_root.as_ref().map(|root| root.join(rel)), rel),
        };

        let invalid = || Error::InvalidTarget(original.display().to_string());
        let path = path.ok_or_else(invalid)?;
        let canonical = canonicalize(&path).map_err(|_| invalid())?;
        if !canonical.is_dir() {
            return Err(invalid());
        }

        Ok(canonical)
    }

    pub fn resolve_str(&self, target: &str) -> Result<PathBuf> {
        self.resolve(&SearchTarget::parse(target)?)
    }

    /// Maps an indexed path into the caller's addressing scheme.
    pub fn map(&self, path: &Path) -> ResultUrl {
        if let Some(rel) = relative_to(self.vault_root.as_deref(), path) {
            return ResultUrl::Vault(rel);
        }
        if let Some(rel) = relative_to(self.trash_files_root.as_deref(), path) {
            return ResultUrl::Trash(rel);
        }
        ResultUrl::Local(path.to_path_buf())
    }
}

fn relative_to(root: Option<&Path>, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root?).ok().map(Path::to_path_buf)
}
