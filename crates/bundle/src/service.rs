use crate::assembler::ContextBundleAssembler;
use crate::config::{BundleConfig, ServiceConfig};
use crate::error::{RepoError, Result, ServiceError};
use context_indexer::{
    read_chunk, ArchiveTree, CancellationToken, Chunk, IndexRun, KeyedSingleFlight,
};
use context_store::{
    import, now_ms, ArtifactCache, ContentSource, FileId, FileStore, StoredFile,
};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};

const ERROR_CHANNEL_CAPACITY: usize = 32;

type BundleKey = (FileId, BundleConfig);

/// Memoised bundles plus a per-file generation bumped on every invalidation.
///
/// A bundle assembled from a record read at generation `g` is only kept if
/// the file is still at `g` when it is inserted.
struct BundleMemo {
    bundles: LruCache<BundleKey, String>,
    generations: HashMap<FileId, u64>,
}

impl BundleMemo {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            bundles: LruCache::new(capacity),
            generations: HashMap::new(),
        }
    }

    fn generation(&self, id: FileId) -> u64 {
        self.generations.get(&id).copied().unwrap_or(0)
    }

    fn get(&mut self, key: &BundleKey) -> Option<String> {
        self.bundles.get(key).cloned()
    }

    fn insert_if_current(&mut self, key: BundleKey, generation: u64, text: String) -> bool {
        if self.generation(key.0) != generation {
            return false;
        }
        self.bundles.put(key, text);
        true
    }

    fn invalidate(&mut self, id: FileId) {
        let next = self.generation(id).wrapping_add(1);
        self.generations.insert(id, next);
        let stale: Vec<BundleKey> = self
            .bundles
            .iter()
            .filter(|((file_id, _), _)| *file_id == id)
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            self.bundles.pop(&key);
        }
    }
}

/// A tree handed back to the caller.
#[derive(Debug, Clone)]
pub struct TreeView {
    pub text: String,
    /// Stats of the build that produced `text`; `None` when served from the store.
    pub stats: Option<IndexRun>,
}

impl TreeView {
    #[must_use]
    pub const fn from_cache(&self) -> bool {
        self.stats.is_none()
    }
}

impl From<ArchiveTree> for TreeView {
    fn from(tree: ArchiveTree) -> Self {
        Self {
            text: tree.text,
            stats: Some(tree.stats),
        }
    }
}

/// Orchestrates import, tree caching, bundles and previews over one store.
///
/// At most one tree build per file runs at a time; distinct files build in
/// parallel. Assembled bundles are memoised per (file, config) until the
/// file's record changes.
pub struct BundleService {
    store: Arc<dyn ArtifactCache>,
    config: ServiceConfig,
    assembler: ContextBundleAssembler,
    flights: KeyedSingleFlight<FileId>,
    bundles: Mutex<BundleMemo>,
    errors: broadcast::Sender<RepoError>,
}

impl BundleService {
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactCache>, config: ServiceConfig) -> Self {
        let capacity = NonZeroUsize::new(config.bundle_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            store,
            assembler: ContextBundleAssembler::new(config.tree_limits, config.preview_chunk_bytes),
            config,
            flights: KeyedSingleFlight::new(),
            bundles: Mutex::new(BundleMemo::new(capacity)),
            errors,
        }
    }

    /// Service backed by the JSON store inside `config.storage_dir`.
    pub async fn open(config: ServiceConfig) -> Result<Self> {
        let store = FileStore::open(config.store_path()).await?;
        Ok(Self::new(Arc::new(store), config))
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<RepoError> {
        self.errors.subscribe()
    }

    pub async fn files(&self) -> Result<Vec<StoredFile>> {
        Ok(self.store.all_active().await?)
    }

    #[must_use]
    pub fn observe_files(&self) -> watch::Receiver<Vec<StoredFile>> {
        self.store.observe_active()
    }

    pub async fn search(&self, query: &str) -> Result<Vec<StoredFile>> {
        Ok(self.store.search(query).await?)
    }

    pub async fn get(&self, id: FileId) -> Result<StoredFile> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// Copy `source` into storage, then index it if it is an archive.
    pub async fn import(
        &self,
        source: &dyn ContentSource,
        display_name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<StoredFile> {
        let file = match import(
            self.store.as_ref(),
            &self.config.storage_dir,
            source,
            display_name,
        )
        .await
        {
            Ok(file) => file,
            Err(err) => {
                self.report(RepoError::new("Import", err.to_string()));
                return Err(err.into());
            }
        };
        self.invalidate_bundles(file.id);

        if file.is_archive() && self.config.index_on_import && file.last_known_tree.is_none() {
            self.request_tree(file.id, false, cancel).await?;
            return self.get(file.id).await;
        }
        Ok(file)
    }

    /// Cached tree, or a fresh build that is stored when it completed or was truncated.
    pub async fn request_tree(
        &self,
        id: FileId,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<TreeView> {
        let file = self.get(id).await?;
        if !file.is_archive() {
            return Err(ServiceError::NotAnArchive(id));
        }

        let _flight = self.flights.acquire(&id).await;
        // Another caller may have finished the same build while we waited.
        let file = self.get(id).await?;
        self.touch(id).await;
        if !force {
            if let Some(text) = &file.last_known_tree {
                return Ok(TreeView {
                    text: text.clone(),
                    stats: None,
                });
            }
        }

        let tree = self.assembler.build_tree(&file, cancel).await;
        self.store_tree(&file, &tree).await;
        Ok(tree.into())
    }

    /// Assemble a bundle, building and storing the tree on a cache miss.
    pub async fn prepare_bundle(
        &self,
        id: FileId,
        config: BundleConfig,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let (hit, generation) = {
            let mut memo = self.lock_bundles();
            (memo.get(&(id, config)), memo.generation(id))
        };
        if let Some(hit) = hit {
            self.touch(id).await;
            return Ok(hit);
        }

        let mut file = self.get(id).await?;
        let needs_tree = config.include_tree
            && config.include_source
            && file.is_archive()
            && file.last_known_tree.is_none();
        let _flight = if needs_tree {
            let guard = self.flights.acquire(&id).await;
            file = self.get(id).await?;
            Some(guard)
        } else {
            None
        };

        let bundle = self
            .assembler
            .assemble(
                &file,
                config,
                file.last_known_tree.as_deref(),
                file.summary.as_deref(),
                cancel,
            )
            .await;
        // Storing our own tree bumps the generation once.
        let mut expected = generation;
        if let Some(tree) = &bundle.computed_tree {
            if self.store_tree(&file, tree).await {
                expected = expected.wrapping_add(1);
            }
        }
        if bundle.is_cacheable()
            && !self
                .lock_bundles()
                .insert_if_current((id, config), expected, bundle.text.clone())
        {
            log::debug!("File {id} changed while its bundle was assembled, not memoising");
        }
        self.touch(id).await;
        Ok(bundle.text)
    }

    /// First preview window of the stored copy; binary files give the sentinel.
    pub async fn load_preview(&self, id: FileId) -> Result<String> {
        let chunk = self.read_chunk(id, 0, self.config.preview_chunk_bytes).await?;
        self.touch(id).await;
        Ok(chunk.text)
    }

    pub async fn read_chunk(&self, id: FileId, offset: u64, chunk_size: usize) -> Result<Chunk> {
        let file = self.get(id).await?;
        read_chunk(&file.file_path, offset, chunk_size)
            .await
            .map_err(|err| {
                self.report(RepoError::new("Preview", err.to_string()));
                err.into()
            })
    }

    pub async fn update_summary(&self, id: FileId, summary: Option<String>) -> Result<()> {
        let summary = summary.filter(|s| !s.trim().is_empty());
        if !self.store.update_summary(id, summary).await? {
            return Err(ServiceError::NotFound(id));
        }
        self.invalidate_bundles(id);
        Ok(())
    }

    pub async fn set_favorite(&self, id: FileId, favorite: bool) -> Result<()> {
        if !self.store.set_favorite(id, favorite).await? {
            return Err(ServiceError::NotFound(id));
        }
        Ok(())
    }

    pub async fn set_archived(&self, id: FileId, archived: bool) -> Result<()> {
        if !self.store.set_archived(id, archived).await? {
            return Err(ServiceError::NotFound(id));
        }
        Ok(())
    }

    /// Drop the record, then the stored copy. Failing to remove the copy is
    /// reported but does not fail the delete.
    pub async fn delete(&self, id: FileId) -> Result<bool> {
        let Some(file) = self.store.delete(id).await? else {
            return Ok(false);
        };
        self.invalidate_bundles(id);
        match tokio::fs::remove_file(&file.file_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                self.report(
                    RepoError::new("Delete", format!("could not remove stored copy: {err}"))
                        .with_detail(file.file_path.display().to_string()),
                );
            }
        }
        log::info!("Deleted file {id} ({})", file.display_name);
        Ok(true)
    }

    /// True when the tree was written and the file's bundles invalidated.
    async fn store_tree(&self, file: &StoredFile, tree: &ArchiveTree) -> bool {
        if !tree.is_cacheable() {
            let message = tree
                .stats
                .error
                .clone()
                .unwrap_or_else(|| format!("{:?}", tree.stats.outcome));
            self.report(
                RepoError::new("Tree", message).with_detail(file.file_path.display().to_string()),
            );
            return false;
        }
        match self.store.update_tree(file.id, Some(tree.text.clone())).await {
            Ok(true) => {
                self.invalidate_bundles(file.id);
                true
            }
            Ok(false) => {
                log::debug!("File {} vanished before its tree was stored", file.id);
                false
            }
            Err(err) => {
                self.report(RepoError::new("Tree", err.to_string()));
                false
            }
        }
    }

    async fn touch(&self, id: FileId) {
        if let Err(err) = self.store.update_last_accessed(id, now_ms()).await {
            log::warn!("Failed to record access to file {id}: {err}");
        }
    }

    fn invalidate_bundles(&self, id: FileId) {
        self.lock_bundles().invalidate(id);
    }

    fn lock_bundles(&self) -> std::sync::MutexGuard<'_, BundleMemo> {
        self.bundles.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn report(&self, error: RepoError) {
        log::warn!("{error}");
        // Nobody listening is fine.
        let _ = self.errors.send(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn memo() -> BundleMemo {
        BundleMemo::new(NonZeroUsize::new(4).unwrap())
    }

    #[test]
    fn invalidation_between_read_and_insert_drops_the_bundle() {
        let mut memo = memo();
        let key = (7, BundleConfig::default());
        let seen = memo.generation(7);

        // A summary update lands while the bundle is being assembled.
        memo.invalidate(7);

        assert!(!memo.insert_if_current(key, seen, "stale".into()));
        assert_eq!(memo.get(&key), None);

        let fresh = memo.generation(7);
        assert!(memo.insert_if_current(key, fresh, "fresh".into()));
        assert_eq!(memo.get(&key).as_deref(), Some("fresh"));
    }

    #[test]
    fn invalidation_is_per_file() {
        let mut memo = memo();
        let ours = (1, BundleConfig::default());
        let theirs = (2, BundleConfig::header_only());
        assert!(memo.insert_if_current(ours, 0, "one".into()));
        assert!(memo.insert_if_current(theirs, 0, "two".into()));

        memo.invalidate(1);
        assert_eq!(memo.get(&ours), None);
        assert_eq!(memo.get(&theirs).as_deref(), Some("two"));
        assert_eq!(memo.generation(1), 1);
        assert_eq!(memo.generation(2), 0);
    }
}
