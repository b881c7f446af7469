//! Persistence collaborator interface.
//!
//! The core never persists anything itself. After a download completes, the
//! surrounding application saves the file path and record metadata into the
//! reader's local library through this trait. Kept narrow on purpose: the
//! core only ever needs `save`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::record::BookRecord;

/// A library save failed.
#[derive(Debug, Error)]
#[error("library save failed for {path}: {detail}")]
pub struct LibraryError {
    /// The local file that could not be saved.
    pub path: PathBuf,
    /// Underlying cause.
    pub detail: String,
}

impl LibraryError {
    /// Creates a save failure with context.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// The local-library persistence collaborator, implemented by the
/// surrounding application (not by this crate).
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Records a downloaded file and its metadata in the local library.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError`] when the library cannot store the entry.
    async fn save(&self, local_path: &Path, record: &BookRecord) -> Result<(), LibraryError>;
}
