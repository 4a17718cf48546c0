use context_protocol::classify::ARCHIVE_KIND;
use context_protocol::path_filters::DEFAULT_CUSTOM_IGNORE_PATTERNS;
use context_protocol::PathFilter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of a stored file. `0` means "not assigned yet".
pub type FileId = u64;

pub const UNASSIGNED_ID: FileId = 0;

/// One imported file and the artifacts cached for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: FileId,
    pub display_name: String,
    /// Absolute path under the private storage directory; unique per store.
    pub file_path: PathBuf,
    /// `zip` for archives, otherwise a language tag such as `kotlin`.
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    pub size_bytes: u64,
    pub created_at_ms: u64,
    pub last_accessed_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_tree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default = "default_ignore_patterns")]
    pub custom_ignore_patterns: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_archived: bool,
    /// Hex SHA-256 of the stored bytes, recorded at import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
}

fn default_ignore_patterns() -> Option<String> {
    Some(DEFAULT_CUSTOM_IGNORE_PATTERNS.to_string())
}

impl StoredFile {
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        file_path: impl Into<PathBuf>,
        language: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: UNASSIGNED_ID,
            display_name: display_name.into(),
            file_path: file_path.into(),
            language: language.into(),
            extension: None,
            size_bytes: 0,
            created_at_ms: now,
            last_accessed_at_ms: now,
            last_known_tree: None,
            summary: None,
            custom_ignore_patterns: default_ignore_patterns(),
            tags: Vec::new(),
            is_favorite: false,
            is_archived: false,
            content_sha256: None,
        }
    }

    #[must_use]
    pub fn is_archive(&self) -> bool {
        self.language == ARCHIVE_KIND
    }

    /// Built-in ignore rules plus this file's own patterns.
    #[must_use]
    pub fn ignore_filter(&self) -> PathFilter {
        PathFilter::with_patterns(self.custom_ignore_patterns.as_deref())
    }

    pub(crate) fn matches_query(&self, query: &str) -> bool {
        let extension_query = query.trim_start_matches('.');
        self.display_name.to_lowercase().contains(query)
            || self
                .extension
                .as_deref()
                .is_some_and(|ext| !extension_query.is_empty() && ext == extension_query)
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Favorites first, then most recently accessed; ties broken by newest id.
pub(crate) fn listing_order(a: &StoredFile, b: &StoredFile) -> std::cmp::Ordering {
    b.is_favorite
        .cmp(&a.is_favorite)
        .then(b.last_accessed_at_ms.cmp(&a.last_accessed_at_ms))
        .then(b.id.cmp(&a.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_name_substring_or_exact_extension() {
        let mut file = StoredFile::new("MyProject.zip", "/data/imported_MyProject.zip", "zip");
        file.extension = Some("zip".to_string());
        assert!(file.matches_query("project"));
        assert!(file.matches_query("zip"));
        assert!(file.matches_query(".zip"));
        assert!(!file.matches_query("kt"));
    }

    #[test]
    fn legacy_records_get_default_patterns() {
        let json = r#"{
            "id": 3,
            "display_name": "a.kt",
            "file_path": "/data/imported_a.kt",
            "language": "kotlin",
            "size_bytes": 10,
            "created_at_ms": 1,
            "last_accessed_at_ms": 2
        }"#;
        let file: StoredFile = serde_json::from_str(json).unwrap();
        assert_eq!(
            file.custom_ignore_patterns.as_deref(),
            Some(DEFAULT_CUSTOM_IGNORE_PATTERNS)
        );
        assert!(!file.is_archive());
        assert!(file.ignore_filter().should_ignore("node_modules/x.js"));
    }

    #[test]
    fn favorites_sort_before_recent_files() {
        let mut old_favorite = StoredFile::new("a", "/a", "text");
        old_favorite.id = 1;
        old_favorite.is_favorite = true;
        old_favorite.last_accessed_at_ms = 10;
        let mut recent = StoredFile::new("b", "/b", "text");
        recent.id = 2;
        recent.last_accessed_at_ms = 99;

        let mut files = vec![recent.clone(), old_favorite.clone()];
        files.sort_by(listing_order);
        assert_eq!(files[0].id, 1);
        assert_eq!(files[1].id, 2);
    }
}
