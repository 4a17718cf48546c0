//! Copy external content into private storage and register it.

use crate::cache::ArtifactCache;
use crate::error::Result;
use crate::types::{now_ms, StoredFile};
use async_trait::async_trait;
use context_protocol::classify;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Language tag used when the extension is not recognised.
pub const FALLBACK_LANGUAGE: &str = "text";

/// Something that can be copied into storage.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn open(&self) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>>;

    fn suggested_name(&self) -> Option<String>;
}

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct PathSource {
    path: PathBuf,
}

impl PathSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContentSource for PathSource {
    async fn open(&self) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }

    fn suggested_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Where an import named `display_name` lands inside `storage_dir`.
#[must_use]
pub fn storage_path_for(storage_dir: &Path, display_name: &str) -> PathBuf {
    storage_dir.join(format!("imported_{}", sanitize_file_name(display_name)))
}

fn resolve_display_name(explicit: Option<&str>, source: &dyn ContentSource) -> String {
    explicit
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| {
            source
                .suggested_name()
                .filter(|name| !name.trim().is_empty())
        })
        .unwrap_or_else(|| format!("file_{}", now_ms()))
}

/// Copy `source` into `storage_dir` and upsert its record. The record's
/// path is always absolute.
///
/// Re-importing to the same storage path keeps the existing id. Cached tree
/// and summary survive only if the content fingerprint is unchanged.
pub async fn import(
    cache: &dyn ArtifactCache,
    storage_dir: &Path,
    source: &dyn ContentSource,
    display_name: Option<&str>,
) -> Result<StoredFile> {
    let display_name = resolve_display_name(display_name, source);
    let storage_dir = std::path::absolute(storage_dir)?;
    let target = storage_path_for(&storage_dir, &display_name);
    tokio::fs::create_dir_all(&storage_dir).await?;

    let mut reader = source.open().await?;
    let (size_bytes, sha256) = copy_hashed(&mut reader, &target).await?;

    let language = classify::detect_kind(&display_name).unwrap_or(FALLBACK_LANGUAGE);
    let extension = classify::extension_of(&display_name);
    let now = now_ms();

    let mut file = match cache.find_by_path(&target).await? {
        Some(mut existing) => {
            if existing.content_sha256.as_deref() != Some(sha256.as_str()) {
                log::debug!("Content of {} changed, dropping cached artifacts", existing.id);
                existing.last_known_tree = None;
                existing.summary = None;
            }
            existing.display_name = display_name;
            existing
        }
        None => StoredFile::new(display_name, target.clone(), language),
    };
    file.language = language.to_string();
    file.extension = extension;
    file.size_bytes = size_bytes;
    file.last_accessed_at_ms = now;
    file.content_sha256 = Some(sha256);

    file.id = cache.upsert(file.clone()).await?;
    log::info!(
        "Imported {} as file {} ({} bytes, {})",
        file.display_name,
        file.id,
        file.size_bytes,
        file.language
    );
    Ok(file)
}

async fn copy_hashed<R>(reader: &mut R, target: &Path) -> Result<(u64, String)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let tmp = part_path_for(target);
    let copied = copy_into(reader, &tmp).await;
    if copied.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
        return copied;
    }
    tokio::fs::rename(&tmp, target).await?;
    copied
}

/// Unique sibling of `target` for an in-progress copy.
fn part_path_for(target: &Path) -> PathBuf {
    static NEXT_PART: AtomicU64 = AtomicU64::new(0);
    let seq = NEXT_PART.fetch_add(1, Ordering::Relaxed);
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(format!(".{}-{seq}.part", std::process::id()));
    PathBuf::from(tmp)
}

async fn copy_into<R>(reader: &mut R, tmp: &Path) -> Result<(u64, String)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut out = tokio::fs::File::create(tmp).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    let mut total: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    out.flush().await?;
    Ok((total, hex(&hasher.finalize())))
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
