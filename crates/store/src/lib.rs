//! # Context Store
//!
//! Records for imported files and the artifacts cached per file (archive
//! tree, summary), behind the [`ArtifactCache`] trait.
//!
//! ```text
//! ContentSource ──> import() ──> <storage>/imported_<name>
//!                        │
//!                        └──> ArtifactCache::upsert ──> FileStore (JSON)
//!                                                         └─> observe_active()
//! ```

mod cache;
mod error;
mod file_store;
pub mod import;
mod types;

pub use cache::ArtifactCache;
pub use error::{Result, StoreError};
pub use file_store::{FileStore, FILE_STORE_SCHEMA_VERSION};
pub use import::{import, sanitize_file_name, storage_path_for, ContentSource, PathSource};
pub use types::{now_ms, FileId, StoredFile, UNASSIGNED_ID};
