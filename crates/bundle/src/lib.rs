//! # Context Bundle
//!
//! Turns imported files into documents meant to be pasted elsewhere.
//!
//! ```text
//! import ──> StoredFile ──> request_tree ──(cache-aside)──> ArtifactCache
//!                 │
//!                 └──> prepare_bundle
//!                        ├─ header
//!                        ├─ summary (or placeholder)
//!                        ├─ tree (cached, or built and written back)
//!                        ├─ source excerpt (single files)
//!                        └─ instructions
//! ```

mod assembler;
mod config;
mod error;
mod service;

pub use assembler::{
    AssembledBundle, ContextBundleAssembler, EMPTY_FILE, EXCERPT_TRUNCATED, INSTRUCTIONS,
    SUMMARY_PLACEHOLDER,
};
pub use config::{BundleConfig, ServiceConfig};
pub use error::{RepoError, Result, ServiceError};
pub use service::{BundleService, TreeView};
