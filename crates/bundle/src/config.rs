use context_indexer::IndexLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which optional sections a bundle carries. The header is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    pub include_tree: bool,
    pub include_source: bool,
    pub include_summary: bool,
    pub include_instructions: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            include_tree: true,
            include_source: true,
            include_summary: true,
            include_instructions: true,
        }
    }
}

impl BundleConfig {
    #[must_use]
    pub const fn header_only() -> Self {
        Self {
            include_tree: false,
            include_source: false,
            include_summary: false,
            include_instructions: false,
        }
    }
}

const STORE_FILE_NAME: &str = "files.json";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Private storage: imported copies and the record store live here.
    pub storage_dir: PathBuf,
    pub tree_limits: IndexLimits,
    pub preview_chunk_bytes: usize,
    pub bundle_cache_capacity: usize,
    /// Build and cache the tree right after an archive is imported.
    pub index_on_import: bool,
}

impl ServiceConfig {
    /// A relative `storage_dir` is resolved against the current directory
    /// here, so stored paths stay valid when the process moves elsewhere.
    #[must_use]
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        let storage_dir = storage_dir.into();
        Self {
            storage_dir: std::path::absolute(&storage_dir).unwrap_or(storage_dir),
            tree_limits: IndexLimits::for_bundle(),
            preview_chunk_bytes: 32 * 1024,
            bundle_cache_capacity: 10,
            index_on_import: true,
        }
    }

    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.storage_dir.join(STORE_FILE_NAME)
    }

    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}
