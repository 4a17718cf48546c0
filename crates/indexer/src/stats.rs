use context_protocol::TruncationReason;
use serde::{Deserialize, Serialize};

/// How a tree build ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    #[default]
    Complete,
    Truncated,
    Cancelled,
    Failed,
}

/// Statistics about one archive tree build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexRun {
    /// Entries pulled from the archive stream (ignored ones included)
    pub entries_scanned: usize,

    /// Entries that got a header line
    pub entries_included: usize,

    /// Entries dropped by the path filter
    pub entries_ignored: usize,

    /// Entries whose text was inlined (fully or partially)
    pub entries_with_content: usize,

    /// Entries replaced by the binary marker
    pub binary_skipped: usize,

    /// Content bytes not emitted for entries cut by the per-entry cap,
    /// estimated from declared entry sizes
    pub bytes_truncated: u64,

    /// At least one entry hit the per-entry cap
    pub truncated_by_file_cap: bool,

    pub truncated_by_total_cap: bool,

    pub entry_cap_reached: bool,

    pub outcome: RunOutcome,

    /// Failure cause when `outcome` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Time taken in milliseconds
    pub time_ms: u64,
}

impl IndexRun {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failed(cause: impl Into<String>) -> Self {
        Self {
            outcome: RunOutcome::Failed,
            error: Some(cause.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn truncation_reason(&self) -> Option<TruncationReason> {
        if self.outcome == RunOutcome::Cancelled {
            Some(TruncationReason::Cancelled)
        } else if self.truncated_by_total_cap {
            Some(TruncationReason::TotalCap)
        } else if self.entry_cap_reached {
            Some(TruncationReason::EntryCap)
        } else {
            None
        }
    }

    pub(crate) fn finish(&mut self) {
        if self.outcome == RunOutcome::Complete
            && (self.truncated_by_total_cap || self.entry_cap_reached)
        {
            self.outcome = RunOutcome::Truncated;
        }
    }
}
