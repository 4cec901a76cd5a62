//! Source asset retrieval.
//!
//! The pipeline never reads files itself; it asks a [`BlobStore`] for the
//! bytes behind a key. [`FsStore`] serves keys as paths below a root
//! directory and refuses keys that would escape it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Transient IO error: {0}")]
    TransientIo(#[from] io::Error),
}

/// Read-only access to source assets by key.
pub trait BlobStore: Sync {
    fn fetch(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// Blob store backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a key to a path under the root.
    ///
    /// Keys are `/`-separated and relative; a leading `/` is ignored. Empty
    /// keys and keys with `..` or prefix components are rejected.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative.as_os_str().is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsStore {
    fn fetch(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) if path.is_dir() => Err(StoreError::NotFound(format!("{key} ({e})"))),
            Err(e) => Err(StoreError::TransientIo(e)),
        }
    }
}
