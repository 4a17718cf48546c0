use crate::error::Result;
use crate::types::{FileId, StoredFile};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::watch;

/// Persistent record store holding file metadata and cached artifacts.
///
/// Writes are last-writer-wins. Updates addressed to an unknown id are
/// no-ops and report `false`.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    async fn get_by_id(&self, id: FileId) -> Result<Option<StoredFile>>;

    async fn find_by_path(&self, path: &Path) -> Result<Option<StoredFile>>;

    /// Insert or replace a record and return its id.
    ///
    /// A record with [`crate::UNASSIGNED_ID`] whose path is already stored
    /// takes over the existing id; otherwise a fresh id is assigned.
    async fn upsert(&self, file: StoredFile) -> Result<FileId>;

    async fn update_tree(&self, id: FileId, tree: Option<String>) -> Result<bool>;

    async fn update_summary(&self, id: FileId, summary: Option<String>) -> Result<bool>;

    async fn update_tree_and_summary(
        &self,
        id: FileId,
        tree: Option<String>,
        summary: Option<String>,
    ) -> Result<bool>;

    async fn update_last_accessed(&self, id: FileId, at_ms: u64) -> Result<bool>;

    async fn set_favorite(&self, id: FileId, favorite: bool) -> Result<bool>;

    async fn set_archived(&self, id: FileId, archived: bool) -> Result<bool>;

    /// Remove the record, returning it if it existed. Backing bytes are not touched.
    async fn delete(&self, id: FileId) -> Result<Option<StoredFile>>;

    /// Non-archived files, favorites first, then most recently accessed.
    async fn all_active(&self) -> Result<Vec<StoredFile>>;

    /// Live view of [`Self::all_active`], republished after every change.
    fn observe_active(&self) -> watch::Receiver<Vec<StoredFile>>;

    /// Case-insensitive display-name substring or exact extension match,
    /// archived files included, in listing order.
    async fn search(&self, query: &str) -> Result<Vec<StoredFile>>;
}
