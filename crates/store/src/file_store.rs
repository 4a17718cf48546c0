use crate::cache::ArtifactCache;
use crate::error::{Result, StoreError};
use crate::types::{listing_order, FileId, StoredFile, UNASSIGNED_ID};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{watch, Mutex};

pub const FILE_STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default)]
struct StoreState {
    next_id: FileId,
    files: BTreeMap<FileId, StoredFile>,
}

impl StoreState {
    fn active(&self) -> Vec<StoredFile> {
        let mut files: Vec<StoredFile> = self
            .files
            .values()
            .filter(|file| !file.is_archived)
            .cloned()
            .collect();
        files.sort_by(listing_order);
        files
    }

    fn id_for_path(&self, path: &Path) -> Option<FileId> {
        self.files
            .values()
            .find(|file| file.file_path == path)
            .map(|file| file.id)
    }

    fn allocate_id(&mut self) -> FileId {
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStore {
    schema_version: u32,
    next_id: FileId,
    files: Vec<StoredFile>,
}

/// [`ArtifactCache`] kept in memory and, when opened on a path, mirrored to
/// a JSON file after every change (written to a temp file, then renamed).
#[derive(Debug)]
pub struct FileStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
    active_tx: watch::Sender<Vec<StoredFile>>,
}

impl FileStore {
    /// Store without persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_state(None, StoreState::default())
    }

    /// Load the store at `path`, or start empty if it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let persisted: PersistedStore = serde_json::from_slice(&bytes)?;
                if persisted.schema_version != FILE_STORE_SCHEMA_VERSION {
                    return Err(StoreError::Other(format!(
                        "Unsupported store schema_version {} (expected {FILE_STORE_SCHEMA_VERSION})",
                        persisted.schema_version
                    )));
                }
                let files: BTreeMap<FileId, StoredFile> = persisted
                    .files
                    .into_iter()
                    .map(|file| (file.id, file))
                    .collect();
                let max_id = files.keys().next_back().copied().unwrap_or(0);
                log::debug!("Loaded {} stored files from {}", files.len(), path.display());
                StoreState {
                    next_id: persisted.next_id.max(max_id + 1),
                    files,
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self::from_state(Some(path), state))
    }

    fn from_state(path: Option<PathBuf>, state: StoreState) -> Self {
        let (active_tx, _) = watch::channel(state.active());
        Self {
            path,
            state: Mutex::new(state),
            active_tx,
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist and republish after a change. Called with the state lock held
    /// so concurrent writers cannot interleave their snapshots.
    async fn commit(&self, state: &StoreState) -> Result<()> {
        if let Some(path) = &self.path {
            save(path, state).await?;
        }
        self.active_tx.send_replace(state.active());
        Ok(())
    }

    async fn modify<F>(&self, id: FileId, apply: F) -> Result<bool>
    where
        F: FnOnce(&mut StoredFile) + Send,
    {
        let mut state = self.state.lock().await;
        let Some(file) = state.files.get_mut(&id) else {
            log::debug!("Ignoring update for unknown file {id}");
            return Ok(false);
        };
        apply(file);
        self.commit(&state).await?;
        Ok(true)
    }
}

async fn save(path: &Path, state: &StoreState) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let persisted = PersistedStore {
        schema_version: FILE_STORE_SCHEMA_VERSION,
        next_id: state.next_id,
        files: state.files.values().cloned().collect(),
    };
    let bytes = serde_json::to_vec_pretty(&persisted)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ArtifactCache for FileStore {
    async fn get_by_id(&self, id: FileId) -> Result<Option<StoredFile>> {
        Ok(self.state.lock().await.files.get(&id).cloned())
    }

    async fn find_by_path(&self, path: &Path) -> Result<Option<StoredFile>> {
        let state = self.state.lock().await;
        Ok(state
            .id_for_path(path)
            .and_then(|id| state.files.get(&id).cloned()))
    }

    async fn upsert(&self, mut file: StoredFile) -> Result<FileId> {
        let mut state = self.state.lock().await;
        let path_owner = state.id_for_path(&file.file_path);
        let id = match (file.id, path_owner) {
            (UNASSIGNED_ID, Some(owner)) => owner,
            (UNASSIGNED_ID, None) => state.allocate_id(),
            (id, Some(owner)) if owner != id => {
                return Err(StoreError::PathConflict {
                    path: file.file_path.display().to_string(),
                    owner,
                });
            }
            (id, _) => {
                state.next_id = state.next_id.max(id + 1);
                id
            }
        };
        file.id = id;
        state.files.insert(id, file);
        self.commit(&state).await?;
        Ok(id)
    }

    async fn update_tree(&self, id: FileId, tree: Option<String>) -> Result<bool> {
        self.modify(id, |file| file.last_known_tree = tree).await
    }

    async fn update_summary(&self, id: FileId, summary: Option<String>) -> Result<bool> {
        self.modify(id, |file| file.summary = summary).await
    }

    async fn update_tree_and_summary(
        &self,
        id: FileId,
        tree: Option<String>,
        summary: Option<String>,
    ) -> Result<bool> {
        self.modify(id, |file| {
            file.last_known_tree = tree;
            file.summary = summary;
        })
        .await
    }

    async fn update_last_accessed(&self, id: FileId, at_ms: u64) -> Result<bool> {
        self.modify(id, |file| file.last_accessed_at_ms = at_ms).await
    }

    async fn set_favorite(&self, id: FileId, favorite: bool) -> Result<bool> {
        self.modify(id, |file| file.is_favorite = favorite).await
    }

    async fn set_archived(&self, id: FileId, archived: bool) -> Result<bool> {
        self.modify(id, |file| file.is_archived = archived).await
    }

    async fn delete(&self, id: FileId) -> Result<Option<StoredFile>> {
        let mut state = self.state.lock().await;
        let removed = state.files.remove(&id);
        if removed.is_some() {
            self.commit(&state).await?;
        }
        Ok(removed)
    }

    async fn all_active(&self) -> Result<Vec<StoredFile>> {
        Ok(self.state.lock().await.active())
    }

    fn observe_active(&self) -> watch::Receiver<Vec<StoredFile>> {
        self.active_tx.subscribe()
    }

    async fn search(&self, query: &str) -> Result<Vec<StoredFile>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.lock().await;
        let mut hits: Vec<StoredFile> = state
            .files
            .values()
            .filter(|file| file.matches_query(&query))
            .cloned()
            .collect();
        hits.sort_by(listing_order);
        Ok(hits)
    }
}
