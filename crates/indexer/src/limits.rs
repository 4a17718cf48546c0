use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const MIN_TOTAL_CAP_BYTES: usize = 1_024;
const MAX_TOTAL_CAP_BYTES: usize = 8 * 1_024 * 1_024;
const MIN_PER_ENTRY_CAP_CHARS: usize = 64;
const MAX_ENTRIES_CEILING: usize = 100_000;
const MIN_WINDOW_BYTES: usize = 512;
const MAX_WINDOW_BYTES: usize = 1_024 * 1_024;

/// Caps applied to a single tree build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexLimits {
    /// Ceiling on tree output, in bytes (the closing footer is not counted)
    pub total_cap_bytes: usize,

    /// Ceiling on body text contributed by one entry, in characters
    pub per_entry_cap_chars: usize,

    /// Hard ceiling on entries pulled from the archive stream
    pub max_entries: usize,

    /// Size of the byte windows entry bodies are read in
    pub window_bytes: usize,
}

impl Default for IndexLimits {
    fn default() -> Self {
        Self {
            total_cap_bytes: 120_000,
            per_entry_cap_chars: 4_000,
            max_entries: 8_000,
            window_bytes: 8 * 1_024,
        }
    }
}

impl IndexLimits {
    /// Smaller trees for on-screen browsing
    #[must_use]
    pub fn for_preview() -> Self {
        Self {
            total_cap_bytes: 48_000,
            per_entry_cap_chars: 2_000,
            ..Default::default()
        }
    }

    /// Trees meant to be pasted into a bundle
    #[must_use]
    pub fn for_bundle() -> Self {
        Self::default()
    }

    /// Clamp every field into a range the indexer can honour.
    #[must_use]
    pub fn validated(self) -> Self {
        let total_cap_bytes = self
            .total_cap_bytes
            .clamp(MIN_TOTAL_CAP_BYTES, MAX_TOTAL_CAP_BYTES);
        Self {
            total_cap_bytes,
            per_entry_cap_chars: self
                .per_entry_cap_chars
                .clamp(MIN_PER_ENTRY_CAP_CHARS, total_cap_bytes),
            max_entries: self.max_entries.clamp(1, MAX_ENTRIES_CEILING),
            window_bytes: self.window_bytes.clamp(MIN_WINDOW_BYTES, MAX_WINDOW_BYTES),
        }
    }
}

const MAX_SCAN_CONCURRENCY: usize = 8;

static SCAN_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConcurrencySnapshot {
    pub limit: usize,
    pub in_flight: usize,
}

fn default_scan_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / 2).clamp(1, MAX_SCAN_CONCURRENCY)
}

fn scan_limit() -> usize {
    static LIMIT: OnceLock<usize> = OnceLock::new();
    *LIMIT.get_or_init(default_scan_concurrency)
}

fn semaphore() -> Arc<Semaphore> {
    static SEM: OnceLock<Arc<Semaphore>> = OnceLock::new();
    SEM.get_or_init(|| Arc::new(Semaphore::new(scan_limit())))
        .clone()
}

pub fn scan_concurrency_snapshot() -> ScanConcurrencySnapshot {
    ScanConcurrencySnapshot {
        limit: scan_limit(),
        in_flight: SCAN_IN_FLIGHT.load(Ordering::Relaxed),
    }
}

pub(crate) struct ScanPermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
}

impl Drop for ScanPermit {
    fn drop(&mut self) {
        SCAN_IN_FLIGHT.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Wait for a slot among the process-wide archive scans.
pub(crate) async fn acquire_scan_permit() -> ScanPermit {
    // The semaphore is never closed.
    let permit = semaphore()
        .acquire_owned()
        .await
        .unwrap_or_else(|_| unreachable!("scan semaphore closed"));
    SCAN_IN_FLIGHT.fetch_add(1, Ordering::Relaxed);
    ScanPermit { permit }
}
