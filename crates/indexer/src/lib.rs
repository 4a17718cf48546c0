//! # Context Indexer
//!
//! Bounded, streaming views of imported files.
//!
//! ## Pipeline
//!
//! ```text
//! zip / jar
//!     │
//!     ├──> Entry stream (local headers, forward-only, data descriptors)
//!     │      └─> Path filter (ignored dirs, lockfiles, dotfiles)
//!     │
//!     ├──> Content classifier (extension allow-list, binary sniff)
//!     │
//!     └──> Bounded accumulator (per-entry + total caps)
//!            └─> Tree text + IndexRun stats
//!
//! any file ──> Chunked reader (offset windows) ──> preview text
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_indexer::{ArchiveTreeIndexer, IndexLimits};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let indexer = ArchiveTreeIndexer::new(IndexLimits::default());
//!     let tree = indexer
//!         .build("/path/to/project.zip", true, &CancellationToken::new())
//!         .await;
//!
//!     println!("{}", tree.text);
//!     println!("{} of {} entries shown", tree.stats.entries_included, tree.stats.entries_scanned);
//! }
//! ```

mod accumulator;
mod archive;
mod chunk_reader;
mod error;
mod inflight;
mod limits;
mod local_header;
mod stats;

pub use accumulator::{
    Append, BoundedTextAccumulator, BINARY_SKIPPED_MARKER, CONTENT_TRUNCATED_MARKER,
    MAX_INDENT_DEPTH,
};
pub use archive::{ArchiveTree, ArchiveTreeIndexer, EMPTY_ARCHIVE, ERROR_PREFIX, NOTHING_TO_SHOW};
pub use chunk_reader::{read_chunk, read_chunk_blocking, Chunk, BINARY_PREVIEW_SENTINEL};
pub use error::{IndexerError, Result};
pub use inflight::{FlightGuard, KeyedSingleFlight};
pub use limits::{scan_concurrency_snapshot, IndexLimits, ScanConcurrencySnapshot};
pub use stats::{IndexRun, RunOutcome};

pub use tokio_util::sync::CancellationToken;
