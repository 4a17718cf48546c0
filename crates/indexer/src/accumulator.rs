//! Append-only tree text with a global byte budget and a per-entry character budget.
//!
//! Body text only ever enters the buffer one whole line at a time, so every
//! emitted line is either complete or replaced by a marker line.

pub const CONTENT_TRUNCATED_MARKER: &str = "[content truncated]";
pub const BINARY_SKIPPED_MARKER: &str = "[binary content skipped]";

const INDENT_UNIT: &str = "│   ";
const INDENT_UNIT_CHARS: usize = 4;
const FILE_MARKER: &str = "├─ ";
const DIR_MARKER: &str = "▸ ";

/// Deeper nesting is drawn at this depth; keeps adversarial paths from
/// spending the whole budget on indentation.
pub const MAX_INDENT_DEPTH: usize = 24;

/// Result of offering one line to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Accepted,
    /// The current entry is out of budget; advance to the next entry.
    EntryFull,
    /// The whole run is out of budget; stop driving it.
    OutputFull,
}

#[derive(Debug)]
pub struct BoundedTextAccumulator {
    out: String,
    total_cap: usize,
    per_entry_cap: usize,
    entry_depth: usize,
    entry_chars: usize,
    entry_full: bool,
    truncated_by_total_cap: bool,
    truncated_by_file_cap: bool,
    footer_written: bool,
}

impl BoundedTextAccumulator {
    #[must_use]
    pub fn new(total_cap: usize, per_entry_cap: usize) -> Self {
        Self {
            out: String::new(),
            total_cap,
            per_entry_cap,
            entry_depth: 0,
            entry_chars: 0,
            entry_full: false,
            truncated_by_total_cap: false,
            truncated_by_file_cap: false,
            footer_written: false,
        }
    }

    /// Start a new entry and write its header line.
    ///
    /// Headers are not charged to the per-entry budget. Returns `false` when
    /// the header no longer fits in the global budget.
    pub fn append_entry_header(&mut self, depth: usize, name: &str, is_dir: bool) -> bool {
        let depth = depth.min(MAX_INDENT_DEPTH);
        self.entry_depth = depth;
        self.entry_chars = 0;
        self.entry_full = false;
        if self.truncated_by_total_cap {
            return false;
        }

        let marker = if is_dir { DIR_MARKER } else { FILE_MARKER };
        let name = printable_name(name);
        let cost = indent_bytes(depth) + marker.len() + name.len() + 1;
        if self.out.len() + cost > self.total_cap {
            self.truncated_by_total_cap = true;
            return false;
        }
        push_indent(&mut self.out, depth);
        self.out.push_str(marker);
        self.out.push_str(&name);
        self.out.push('\n');
        true
    }

    /// Append body lines of the current entry until one is refused.
    pub fn append_entry_body<I, S>(&mut self, lines: I) -> Append
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            let status = self.append_body_line(line.as_ref());
            if status != Append::Accepted {
                return status;
            }
        }
        Append::Accepted
    }

    /// Append one body line (without its newline) of the current entry.
    pub fn append_body_line(&mut self, line: &str) -> Append {
        if self.truncated_by_total_cap {
            return Append::OutputFull;
        }
        if self.entry_full {
            return Append::EntryFull;
        }

        let depth = self.body_depth();
        let cost_bytes = indent_bytes(depth) + line.len() + 1;
        if self.out.len() + cost_bytes > self.total_cap {
            self.truncated_by_total_cap = true;
            return Append::OutputFull;
        }
        let cost_chars = depth * INDENT_UNIT_CHARS + line.chars().count() + 1;
        if self.entry_chars + cost_chars > self.per_entry_cap {
            return self.close_entry_truncated();
        }

        push_indent(&mut self.out, depth);
        self.out.push_str(line);
        self.out.push('\n');
        self.entry_chars += cost_chars;
        Append::Accepted
    }

    /// Mark the current entry as cut short and write the truncation marker.
    pub fn close_entry_truncated(&mut self) -> Append {
        if self.entry_full {
            return Append::EntryFull;
        }
        self.entry_full = true;
        self.truncated_by_file_cap = true;
        match self.append_marker(CONTENT_TRUNCATED_MARKER) {
            Append::OutputFull => Append::OutputFull,
            _ => Append::EntryFull,
        }
    }

    /// Write a marker line for the current entry. Markers bypass the
    /// per-entry budget but not the global one.
    pub fn append_marker(&mut self, marker: &str) -> Append {
        if self.truncated_by_total_cap {
            return Append::OutputFull;
        }
        let depth = self.body_depth();
        let cost = indent_bytes(depth) + marker.len() + 1;
        if self.out.len() + cost > self.total_cap {
            self.truncated_by_total_cap = true;
            return Append::OutputFull;
        }
        push_indent(&mut self.out, depth);
        self.out.push_str(marker);
        self.out.push('\n');
        Append::Accepted
    }

    /// Closing line written once after the budget is spent; not charged.
    pub fn append_footer(&mut self, footer: &str) {
        if self.footer_written {
            return;
        }
        self.footer_written = true;
        self.out.push_str(footer);
        self.out.push('\n');
    }

    /// Body characters a line may still take for the current entry.
    #[must_use]
    pub fn entry_remaining_chars(&self) -> usize {
        self.per_entry_cap.saturating_sub(self.entry_chars)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.out.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    #[must_use]
    pub const fn truncated_by_total_cap(&self) -> bool {
        self.truncated_by_total_cap
    }

    #[must_use]
    pub const fn truncated_by_file_cap(&self) -> bool {
        self.truncated_by_file_cap
    }

    #[must_use]
    pub fn finish(self) -> String {
        self.out
    }

    fn body_depth(&self) -> usize {
        (self.entry_depth + 1).min(MAX_INDENT_DEPTH + 1)
    }
}

fn indent_bytes(depth: usize) -> usize {
    depth * INDENT_UNIT.len()
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT_UNIT);
    }
}

/// Entry names come from untrusted archives; keep each header on one line.
fn printable_name(name: &str) -> std::borrow::Cow<'_, str> {
    if name.chars().any(char::is_control) {
        name.chars()
            .map(|c| if c.is_control() { '?' } else { c })
            .collect::<String>()
            .into()
    } else {
        name.into()
    }
}
