//! Pure rules shared by the indexer, the store and the bundle assembler.
//!
//! Nothing in this crate performs I/O.

use serde::{Deserialize, Serialize};

pub mod classify;
pub mod path_filters;

pub use classify::{is_binary, looks_like_text_or_code};
pub use path_filters::{should_ignore, PathFilter};

/// Why a tree stopped growing before the archive was exhausted.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    TotalCap,
    EntryCap,
    Cancelled,
}

impl TruncationReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TotalCap => "output limit reached",
            Self::EntryCap => "entry limit reached",
            Self::Cancelled => "cancelled",
        }
    }
}
