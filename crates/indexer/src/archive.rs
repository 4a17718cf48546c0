use crate::accumulator::{Append, BoundedTextAccumulator, BINARY_SKIPPED_MARKER};
use crate::error::{IndexerError, Result};
use crate::limits::{acquire_scan_permit, IndexLimits};
use crate::local_header::{DescribedEntry, LocalHeader};
use crate::stats::{IndexRun, RunOutcome};
use context_protocol::{classify, path_filters, PathFilter, TruncationReason};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Tree text of an archive that has no entries at all.
pub const EMPTY_ARCHIVE: &str = "[empty archive]";

/// Tree text of an archive whose every entry was filtered out.
pub const NOTHING_TO_SHOW: &str = "[no entries to show]";

pub const ERROR_PREFIX: &str = "Error reading archive: ";

/// Output of one tree build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveTree {
    pub text: String,
    pub stats: IndexRun,
}

impl ArchiveTree {
    fn failed(err: &IndexerError) -> Self {
        Self {
            text: format!("{ERROR_PREFIX}{err}"),
            stats: IndexRun::failed(err.to_string()),
        }
    }

    /// Whether the text describes the archive (as opposed to an error or an
    /// abandoned run) and may be persisted.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        matches!(
            self.stats.outcome,
            RunOutcome::Complete | RunOutcome::Truncated
        )
    }
}

struct ScanState {
    acc: BoundedTextAccumulator,
    window: Vec<u8>,
    stats: IndexRun,
    include_content: bool,
}

/// What the scan does after an entry.
enum Step {
    Next,
    /// Body cut at the per-entry cap after `emitted` bytes.
    Cut { emitted: u64 },
    Stop,
}

enum BodyEnd {
    Complete,
    Binary,
    EntryFull { emitted: u64 },
    OutputFull,
}

/// Streams a zip/jar archive entry by entry into a bounded text tree.
///
/// The archive is read forward-only from its local file headers; the central
/// directory is never consulted. Entries appear in physical archive order,
/// including entries that trail their sizes in a data descriptor.
#[derive(Debug, Clone, Default)]
pub struct ArchiveTreeIndexer {
    limits: IndexLimits,
    filter: PathFilter,
}

impl ArchiveTreeIndexer {
    #[must_use]
    pub fn new(limits: IndexLimits) -> Self {
        Self {
            limits: limits.validated(),
            filter: PathFilter::new(),
        }
    }

    /// Use per-file ignore patterns on top of the built-in rules.
    #[must_use]
    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub const fn limits(&self) -> IndexLimits {
        self.limits
    }

    /// Build the tree on the blocking pool. Never fails: errors come back as
    /// an `Error reading archive: ...` tree with a `Failed` outcome.
    pub async fn build(
        &self,
        archive_path: impl AsRef<Path>,
        include_content: bool,
        cancel: &CancellationToken,
    ) -> ArchiveTree {
        let _permit = acquire_scan_permit().await;
        let indexer = self.clone();
        let path: PathBuf = archive_path.as_ref().to_path_buf();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || indexer.build_blocking(&path, include_content, &cancel))
            .await
            .unwrap_or_else(|err| ArchiveTree::failed(&IndexerError::Join(err.to_string())))
    }

    /// Synchronous variant of [`Self::build`] for callers already on a worker thread.
    pub fn build_blocking(
        &self,
        archive_path: &Path,
        include_content: bool,
        cancel: &CancellationToken,
    ) -> ArchiveTree {
        let start = Instant::now();
        let scanned = panic::catch_unwind(AssertUnwindSafe(|| {
            self.scan(archive_path, include_content, cancel)
        }))
        .unwrap_or_else(|payload| Err(IndexerError::Join(panic_message(payload.as_ref()))));

        let mut tree = match scanned {
            Ok(tree) => tree,
            Err(err) => {
                log::warn!("Failed to index archive {}: {err}", archive_path.display());
                ArchiveTree::failed(&err)
            }
        };
        tree.stats.time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "Indexed {}: {} entries scanned, {} shown, outcome {:?} in {} ms",
            archive_path.display(),
            tree.stats.entries_scanned,
            tree.stats.entries_included,
            tree.stats.outcome,
            tree.stats.time_ms
        );
        tree
    }

    fn scan(
        &self,
        archive_path: &Path,
        include_content: bool,
        cancel: &CancellationToken,
    ) -> Result<ArchiveTree> {
        let file = File::open(archive_path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                IndexerError::NotFound(archive_path.display().to_string())
            }
            _ => IndexerError::IoError(err),
        })?;
        let stats = IndexRun::new();
        if file.metadata()?.len() == 0 {
            return Ok(ArchiveTree {
                text: format!("{EMPTY_ARCHIVE}\n"),
                stats,
            });
        }

        let mut reader = BufReader::new(file);
        let mut scan = ScanState {
            acc: BoundedTextAccumulator::new(
                self.limits.total_cap_bytes,
                self.limits.per_entry_cap_chars,
            ),
            // Per-run window; never shared between builds.
            window: vec![0u8; self.limits.window_bytes],
            stats,
            include_content,
        };

        loop {
            if cancel.is_cancelled() {
                scan.stats.outcome = RunOutcome::Cancelled;
                break;
            }
            if scan.stats.entries_scanned >= self.limits.max_entries {
                scan.stats.entry_cap_reached = true;
                break;
            }
            let Some(header) = LocalHeader::read_next(&mut reader)? else {
                break;
            };
            scan.stats.entries_scanned += 1;

            let (step, size) = if header.has_data_descriptor() {
                self.visit_described(&header, &mut reader, &mut scan)?
            } else {
                match self.visit_sized(&header, &mut reader, &mut scan)? {
                    Some(visited) => visited,
                    None => break,
                }
            };
            match step {
                Step::Next => {}
                Step::Cut { emitted } => {
                    scan.stats.bytes_truncated += size.saturating_sub(emitted);
                }
                Step::Stop => break,
            }
        }

        let ScanState {
            mut acc, mut stats, ..
        } = scan;
        stats.truncated_by_total_cap = acc.truncated_by_total_cap();
        stats.truncated_by_file_cap = acc.truncated_by_file_cap();
        stats.finish();

        if let Some(reason) = stats.truncation_reason() {
            acc.append_footer(&footer(reason, &stats, &self.limits));
        } else if stats.entries_included == 0 {
            let sentinel = if stats.entries_scanned == 0 {
                EMPTY_ARCHIVE
            } else {
                NOTHING_TO_SHOW
            };
            acc.append_footer(sentinel);
        }

        Ok(ArchiveTree {
            text: acc.finish(),
            stats,
        })
    }

    /// Entry with sizes in its local header, parsed by the `zip` crate.
    fn visit_sized<R: Read>(
        &self,
        header: &LocalHeader,
        reader: &mut R,
        scan: &mut ScanState,
    ) -> Result<Option<(Step, u64)>> {
        let mut chained = Cursor::new(header.as_bytes()).chain(reader);
        let Some(mut entry) = zip::read::read_zipfile_from_stream(&mut chained)? else {
            return Ok(None);
        };
        let raw_name = normalize_entry_name(entry.name());
        let is_dir = entry.is_dir();
        let size = entry.size();
        // Dropping the entry skips its unread compressed bytes without inflating them.
        let step = self.visit_entry(scan, &raw_name, is_dir, &mut entry)?;
        Ok(Some((step, size)))
    }

    /// Entry whose sizes trail its data. Skipping it means inflating it.
    fn visit_described<R: BufRead>(
        &self,
        header: &LocalHeader,
        reader: &mut R,
        scan: &mut ScanState,
    ) -> Result<(Step, u64)> {
        let mut entry = DescribedEntry::open(header, reader)?;
        let raw_name = normalize_entry_name(entry.name());
        let is_dir = entry.is_dir();
        let step = self.visit_entry(scan, &raw_name, is_dir, &mut entry)?;
        if matches!(step, Step::Stop) {
            return Ok((step, 0));
        }
        let size = entry.finish()?;
        Ok((step, size))
    }

    fn visit_entry<R: Read>(
        &self,
        scan: &mut ScanState,
        raw_name: &str,
        is_dir: bool,
        body: &mut R,
    ) -> Result<Step> {
        let entry_path = raw_name.trim_end_matches('/');
        if entry_path.is_empty() {
            return Ok(Step::Next);
        }
        if self.filter.should_ignore(raw_name) {
            scan.stats.entries_ignored += 1;
            log::debug!("Skipping ignored entry {raw_name}");
            return Ok(Step::Next);
        }

        let depth = entry_path.matches('/').count();
        let name = path_filters::basename(entry_path);
        if !scan.acc.append_entry_header(depth, name, is_dir) {
            return Ok(Step::Stop);
        }
        scan.stats.entries_included += 1;

        if is_dir || !scan.include_content || !classify::looks_like_text_or_code(name) {
            return Ok(Step::Next);
        }

        Ok(match stream_body(body, &mut scan.acc, &mut scan.window)? {
            BodyEnd::Complete => {
                scan.stats.entries_with_content += 1;
                Step::Next
            }
            BodyEnd::Binary => {
                scan.stats.binary_skipped += 1;
                Step::Next
            }
            BodyEnd::EntryFull { emitted } => {
                scan.stats.entries_with_content += 1;
                Step::Cut { emitted }
            }
            BodyEnd::OutputFull => Step::Stop,
        })
    }
}

fn footer(reason: TruncationReason, stats: &IndexRun, limits: &IndexLimits) -> String {
    match reason {
        TruncationReason::TotalCap => format!(
            "[truncated: {} ({} bytes) after {} entries]",
            reason.as_str(),
            limits.total_cap_bytes,
            stats.entries_scanned
        ),
        TruncationReason::EntryCap => format!(
            "[truncated: {} ({} entries)]",
            reason.as_str(),
            limits.max_entries
        ),
        TruncationReason::Cancelled => format!(
            "[truncated: {} after {} entries]",
            reason.as_str(),
            stats.entries_scanned
        ),
    }
}

fn normalize_entry_name(name: &str) -> String {
    let mut value = name.replace('\\', "/");
    while let Some(rest) = value.strip_prefix("./") {
        value = rest.to_string();
    }
    value.trim_start_matches('/').to_string()
}

/// Feed one entry's decompressed bytes into the accumulator.
///
/// Bytes are split on `\n` before decoding, so a UTF-8 sequence is never cut.
fn stream_body<R: Read>(
    reader: &mut R,
    acc: &mut BoundedTextAccumulator,
    window: &mut [u8],
) -> Result<BodyEnd> {
    let mut filled = read_window(reader, window)?;
    if filled == 0 {
        return Ok(BodyEnd::Complete);
    }
    if classify::is_binary(&window[..filled]) {
        return Ok(match acc.append_marker(BINARY_SKIPPED_MARKER) {
            Append::OutputFull => BodyEnd::OutputFull,
            _ => BodyEnd::Binary,
        });
    }

    let mut pending: Vec<u8> = Vec::new();
    let mut emitted: u64 = 0;
    while filled > 0 {
        for piece in window[..filled].split_inclusive(|&b| b == b'\n') {
            let Some(line) = piece.strip_suffix(b"\n") else {
                pending.extend_from_slice(piece);
                continue;
            };
            pending.extend_from_slice(line);
            match offer_line(acc, &pending) {
                Append::Accepted => {
                    emitted += pending.len() as u64 + 1;
                    pending.clear();
                }
                Append::EntryFull => return Ok(BodyEnd::EntryFull { emitted }),
                Append::OutputFull => return Ok(BodyEnd::OutputFull),
            }
        }
        // A partial line with more bytes than 4x the remaining chars cannot fit.
        if pending.len() > acc.entry_remaining_chars().saturating_mul(4) {
            return Ok(match acc.close_entry_truncated() {
                Append::OutputFull => BodyEnd::OutputFull,
                _ => BodyEnd::EntryFull { emitted },
            });
        }
        filled = read_window(reader, window)?;
    }

    if !pending.is_empty() {
        match offer_line(acc, &pending) {
            Append::Accepted => {}
            Append::EntryFull => return Ok(BodyEnd::EntryFull { emitted }),
            Append::OutputFull => return Ok(BodyEnd::OutputFull),
        }
    }
    Ok(BodyEnd::Complete)
}

fn offer_line(acc: &mut BoundedTextAccumulator, bytes: &[u8]) -> Append {
    let text = String::from_utf8_lossy(bytes);
    let line = text.strip_suffix('\r').unwrap_or(&text);
    acc.append_body_line(line)
}

/// Fill `window` as far as the reader allows; 0 means end of entry.
fn read_window<R: Read>(reader: &mut R, window: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < window.len() {
        match reader.read(&mut window[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "archive reader panicked".to_string()
    }
}
