use anyhow::{Context, Result};
use context_bundle::{BundleConfig, ServiceConfig};
use context_indexer::IndexLimits;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Optional TOML file passed with `--config`.
///
/// ```toml
/// storage_dir = "/var/lib/bundles"
/// preview_chunk_bytes = 16384
///
/// [limits]
/// total_cap_bytes = 60000
/// per_entry_cap_chars = 2000
///
/// [bundle]
/// include_instructions = false
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub storage_dir: Option<PathBuf>,
    pub limits: Option<IndexLimits>,
    pub bundle: BundleConfig,
    pub preview_chunk_bytes: Option<usize>,
    pub bundle_cache_capacity: Option<usize>,
    pub index_on_import: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub storage_dir: Option<PathBuf>,
    pub compact: bool,
    pub total_cap_bytes: Option<usize>,
    pub per_entry_cap_chars: Option<usize>,
    pub max_entries: Option<usize>,
}

pub const DEFAULT_STORAGE_DIR: &str = ".context-bundle";

pub fn service_config(file: &FileConfig, overrides: &Overrides) -> ServiceConfig {
    let storage_dir = overrides
        .storage_dir
        .clone()
        .or_else(|| file.storage_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
    let mut config = ServiceConfig::new(storage_dir);

    let mut limits = if overrides.compact {
        IndexLimits::for_preview()
    } else {
        file.limits.unwrap_or_else(IndexLimits::for_bundle)
    };
    if let Some(total) = overrides.total_cap_bytes {
        limits.total_cap_bytes = total;
    }
    if let Some(per_entry) = overrides.per_entry_cap_chars {
        limits.per_entry_cap_chars = per_entry;
    }
    if let Some(max_entries) = overrides.max_entries {
        limits.max_entries = max_entries;
    }
    config.tree_limits = limits.validated();

    if let Some(bytes) = file.preview_chunk_bytes {
        config.preview_chunk_bytes = bytes.max(1);
    }
    if let Some(capacity) = file.bundle_cache_capacity {
        config.bundle_cache_capacity = capacity;
    }
    if let Some(index) = file.index_on_import {
        config.index_on_import = index;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tables_keep_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            [limits]
            per_entry_cap_chars = 1500

            [bundle]
            include_instructions = false
            "#,
        )
        .unwrap();
        let limits = file.limits.unwrap();
        assert_eq!(limits.per_entry_cap_chars, 1_500);
        assert_eq!(limits.total_cap_bytes, IndexLimits::default().total_cap_bytes);
        assert!(file.bundle.include_tree);
        assert!(!file.bundle.include_instructions);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = \"blue\"").is_err());
    }

    #[test]
    fn flags_override_file_values() {
        let file: FileConfig = toml::from_str(
            r#"
            storage_dir = "/from/file"
            [limits]
            total_cap_bytes = 50000
            "#,
        )
        .unwrap();
        let overrides = Overrides {
            storage_dir: Some(PathBuf::from("/from/flag")),
            total_cap_bytes: Some(9_000),
            ..Overrides::default()
        };
        let config = service_config(&file, &overrides);
        assert_eq!(config.storage_dir, PathBuf::from("/from/flag"));
        assert_eq!(config.tree_limits.total_cap_bytes, 9_000);

        let compact = service_config(
            &FileConfig::default(),
            &Overrides {
                compact: true,
                ..Overrides::default()
            },
        );
        assert_eq!(compact.tree_limits, IndexLimits::for_preview().validated());
        assert_eq!(compact.storage_dir, PathBuf::from(DEFAULT_STORAGE_DIR));
    }
}
