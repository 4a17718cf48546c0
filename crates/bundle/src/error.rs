use context_indexer::IndexerError;
use context_store::{FileId, StoreError};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Indexer error: {0}")]
    Indexer(#[from] IndexerError),

    #[error("File {0} not found")]
    NotFound(FileId),

    #[error("File {0} is not an archive")]
    NotAnArchive(FileId),
}

/// A failure surfaced to whoever listens on [`crate::BundleService::subscribe_errors`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoError {
    /// Operation that failed, e.g. `Import` or `Tree`.
    pub source: &'static str,
    pub message: String,
    pub detail: Option<String>,
}

impl RepoError {
    pub(crate) fn new(source: &'static str, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
            detail: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}
