//! Offset-based, fixed-window reads of a single stored file.
//!
//! Each window is decoded on its own as lossy UTF-8. A window boundary that
//! falls inside a multi-byte character therefore shows up as U+FFFD at the
//! end of one chunk and the start of the next; callers that need exact text
//! must read the file in one window or re-align offsets themselves.

use crate::error::{IndexerError, Result};
use context_protocol::classify;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Returned instead of text when a window looks binary.
pub const BINARY_PREVIEW_SENTINEL: &str = "[Binary Content - Preview Disabled]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Offset to continue from, `None` once the end of the file is reached.
    pub next_offset: Option<u64>,
}

impl Chunk {
    #[must_use]
    pub fn end() -> Self {
        Self {
            text: String::new(),
            next_offset: None,
        }
    }

    #[must_use]
    pub const fn is_end(&self) -> bool {
        self.next_offset.is_none()
    }

    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.text == BINARY_PREVIEW_SENTINEL
    }
}

/// Read up to `chunk_size` bytes at `offset` on the blocking pool.
///
/// Missing or empty files and offsets at or past the end give [`Chunk::end`].
pub async fn read_chunk(path: impl AsRef<Path>, offset: u64, chunk_size: usize) -> Result<Chunk> {
    let path: PathBuf = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || read_chunk_blocking(&path, offset, chunk_size))
        .await
        .map_err(|err| IndexerError::Join(err.to_string()))?
}

pub fn read_chunk_blocking(path: &Path, offset: u64, chunk_size: usize) -> Result<Chunk> {
    if chunk_size == 0 {
        return Err(IndexerError::InvalidArgument(
            "chunk size must be positive".to_string(),
        ));
    }

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Chunk::end()),
        Err(err) => return Err(err.into()),
    };
    let len = file.metadata()?.len();
    if len == 0 || offset >= len {
        return Ok(Chunk::end());
    }

    let to_read = (len - offset).min(chunk_size as u64);
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity(usize::try_from(to_read).unwrap_or(chunk_size));
    file.take(to_read).read_to_end(&mut buf)?;
    if buf.is_empty() {
        // Shrunk since the length was taken.
        return Ok(Chunk::end());
    }

    let next = offset + buf.len() as u64;
    let text = if classify::is_binary(&buf) {
        BINARY_PREVIEW_SENTINEL.to_string()
    } else {
        String::from_utf8_lossy(&buf).into_owned()
    };
    Ok(Chunk {
        text,
        next_offset: (next < len).then_some(next),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_and_empty_files_end_immediately() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope.txt");
        assert_eq!(read_chunk_blocking(&missing, 0, 4096).unwrap(), Chunk::end());

        let empty = temp.path().join("empty.txt");
        fs::write(&empty, b"").unwrap();
        assert_eq!(read_chunk_blocking(&empty, 0, 4096).unwrap(), Chunk::end());
    }

    #[test]
    fn offset_at_or_past_end_is_end_regardless_of_size() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();
        assert_eq!(read_chunk_blocking(&path, 5, 4096).unwrap(), Chunk::end());
        assert_eq!(read_chunk_blocking(&path, 5, 1).unwrap(), Chunk::end());
        assert_eq!(read_chunk_blocking(&path, 99, 7).unwrap(), Chunk::end());
    }

    #[test]
    fn successive_chunks_reassemble_the_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("notes.md");
        let content: String = (0..500).map(|i| format!("line {i}\n")).collect();
        fs::write(&path, &content).unwrap();

        let mut offset = 0;
        let mut rebuilt = String::new();
        let mut reads = 0;
        loop {
            let chunk = read_chunk_blocking(&path, offset, 1_000).unwrap();
            rebuilt.push_str(&chunk.text);
            reads += 1;
            match chunk.next_offset {
                Some(next) => offset = next,
                None => break,
            }
        }
        assert_eq!(rebuilt, content);
        assert_eq!(reads, content.len().div_ceil(1_000));
    }

    #[test]
    fn last_chunk_reports_end() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.txt");
        fs::write(&path, b"0123456789").unwrap();
        let first = read_chunk_blocking(&path, 0, 4).unwrap();
        assert_eq!(first.text, "0123");
        assert_eq!(first.next_offset, Some(4));
        let last = read_chunk_blocking(&path, 8, 4).unwrap();
        assert_eq!(last.text, "89");
        assert!(last.is_end());
    }

    #[test]
    fn binary_window_returns_sentinel_and_still_advances() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("blob.bin");
        let mut bytes = vec![0u8; 16];
        bytes.extend_from_slice(b"tail text");
        fs::write(&path, &bytes).unwrap();
        let chunk = read_chunk_blocking(&path, 0, 8).unwrap();
        assert!(chunk.is_binary());
        assert_eq!(chunk.next_offset, Some(8));
    }

    #[test]
    fn window_boundary_inside_a_character_is_replaced() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("utf8.txt");
        fs::write(&path, "aé".as_bytes()).unwrap();
        let head = read_chunk_blocking(&path, 0, 2).unwrap();
        assert_eq!(head.text, "a\u{FFFD}");
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.txt");
        fs::write(&path, b"x").unwrap();
        assert!(matches!(
            read_chunk_blocking(&path, 0, 0),
            Err(IndexerError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn async_variant_matches_blocking() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.txt");
        fs::write(&path, b"abc").unwrap();
        let chunk = read_chunk(&path, 1, 10).await.unwrap();
        assert_eq!(chunk.text, "bc");
        assert!(chunk.is_end());
    }
}
