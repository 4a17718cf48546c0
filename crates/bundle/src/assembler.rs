use crate::config::BundleConfig;
use context_indexer::{read_chunk, ArchiveTree, ArchiveTreeIndexer, CancellationToken, IndexLimits};
use context_store::StoredFile;

/// Shown when summaries are requested but none is stored.
pub const SUMMARY_PLACEHOLDER: &str = "No summary has been written for this file yet.";

pub const EXCERPT_TRUNCATED: &str = "[excerpt truncated]";
pub const EMPTY_FILE: &str = "[empty file]";

/// Task instructions appended to every bundle that asks for them.
pub const INSTRUCTIONS: &str = "\
You are reviewing the project described above.
- Treat the tree and excerpts as a partial view: lines marked [content truncated] or [truncated: ...] were cut for size.
- Ask for specific files before assuming their contents.
- Keep answers grounded in the paths shown; quote the path for every change you propose.";

/// Output of [`ContextBundleAssembler::assemble`].
#[derive(Debug, Clone)]
pub struct AssembledBundle {
    pub text: String,
    /// Tree built because none was cached. The caller decides whether to persist it.
    pub computed_tree: Option<ArchiveTree>,
    outline_ok: bool,
}

impl AssembledBundle {
    /// Whether the text may be memoised: it must not embed a failed or cancelled tree.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.outline_ok
            && self
                .computed_tree
                .as_ref()
                .map_or(true, ArchiveTree::is_cacheable)
    }
}

/// Markdown document builder; fences adapt to the content they wrap.
struct BundleWriter {
    out: String,
}

impl BundleWriter {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn push_line(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn push_section(&mut self, title: &str) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.push_line(&format!("## {title}"));
    }

    fn push_text(&mut self, text: &str) {
        self.out.push_str(text);
        if !text.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn push_fenced(&mut self, language: &str, body: &str) {
        let fence = fence_for(body);
        self.push_line(&format!("{fence}{language}"));
        self.push_text(body);
        self.push_line(&fence);
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Three backticks, or one more than the longest run inside `body`.
fn fence_for(body: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for ch in body.chars() {
        if ch == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

/// Composes a bundle from a file record and whatever artifacts are cached for it.
///
/// Sections always come in this order: header, summary, tree, source, instructions.
/// For archives the source lines live inside the tree, so `include_source`
/// decides whether the tree inlines entry content.
#[derive(Debug, Clone)]
pub struct ContextBundleAssembler {
    limits: IndexLimits,
    excerpt_chunk_bytes: usize,
}

impl ContextBundleAssembler {
    #[must_use]
    pub fn new(limits: IndexLimits, excerpt_chunk_bytes: usize) -> Self {
        Self {
            limits: limits.validated(),
            excerpt_chunk_bytes: excerpt_chunk_bytes.max(1),
        }
    }

    /// Never fails. A tree that cannot be built shows up as its error text.
    pub async fn assemble(
        &self,
        file: &StoredFile,
        config: BundleConfig,
        cached_tree: Option<&str>,
        cached_summary: Option<&str>,
        cancel: &CancellationToken,
    ) -> AssembledBundle {
        let mut doc = BundleWriter::new();
        push_header(&mut doc, file);

        if config.include_summary {
            doc.push_section("Summary");
            let summary = cached_summary
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(SUMMARY_PLACEHOLDER);
            doc.push_text(summary);
        }

        let mut computed_tree = None;
        let mut outline_ok = true;
        if config.include_tree && file.is_archive() {
            doc.push_section("Project tree");
            if config.include_source {
                match cached_tree {
                    Some(tree) => doc.push_fenced("text", tree),
                    None => {
                        let tree = self.build_tree(file, cancel).await;
                        doc.push_fenced("text", &tree.text);
                        computed_tree = Some(tree);
                    }
                }
            } else {
                // The stored tree always inlines content; names only are rebuilt.
                let outline = self.build_tree_with(file, false, cancel).await;
                outline_ok = outline.is_cacheable();
                doc.push_fenced("text", &outline.text);
            }
        }

        if config.include_source && !file.is_archive() {
            doc.push_section("Source excerpt");
            self.push_excerpt(&mut doc, file).await;
        }

        if config.include_instructions {
            doc.push_section("Instructions");
            doc.push_text(INSTRUCTIONS);
        }

        AssembledBundle {
            text: doc.finish(),
            computed_tree,
            outline_ok,
        }
    }

    /// Full tree with inlined content, filtered by the file's own patterns.
    pub async fn build_tree(&self, file: &StoredFile, cancel: &CancellationToken) -> ArchiveTree {
        self.build_tree_with(file, true, cancel).await
    }

    pub async fn build_tree_with(
        &self,
        file: &StoredFile,
        include_content: bool,
        cancel: &CancellationToken,
    ) -> ArchiveTree {
        ArchiveTreeIndexer::new(self.limits)
            .with_filter(file.ignore_filter())
            .build(&file.file_path, include_content, cancel)
            .await
    }

    async fn push_excerpt(&self, doc: &mut BundleWriter, file: &StoredFile) {
        let chunk = match read_chunk(&file.file_path, 0, self.excerpt_chunk_bytes).await {
            Ok(chunk) => chunk,
            Err(err) => {
                log::warn!("Failed to read excerpt of {}: {err}", file.file_path.display());
                doc.push_line(&format!("[excerpt unavailable: {err}]"));
                return;
            }
        };
        if chunk.is_binary() {
            doc.push_line(&chunk.text);
            return;
        }

        let (excerpt, mut truncated) = cut_on_line(&chunk.text, self.limits.per_entry_cap_chars);
        truncated |= !chunk.is_end();
        if excerpt.is_empty() && !truncated {
            doc.push_line(EMPTY_FILE);
            return;
        }
        if !excerpt.is_empty() {
            doc.push_fenced(&file.language, excerpt);
        }
        if truncated {
            doc.push_line(EXCERPT_TRUNCATED);
        }
    }
}

fn push_header(doc: &mut BundleWriter, file: &StoredFile) {
    doc.push_line(&format!("# Context bundle: {}", file.display_name));
    doc.push_line(&format!(
        "kind: {} | size: {} bytes | id: {}",
        file.language, file.size_bytes, file.id
    ));
}

/// Longest prefix of whole lines within `max_chars`, and whether anything was left out.
fn cut_on_line(text: &str, max_chars: usize) -> (&str, bool) {
    let mut used = 0;
    let mut end = 0;
    for line in text.split_inclusive('\n') {
        let cost = line.chars().count();
        if used + cost > max_chars {
            return (&text[..end], true);
        }
        used += cost;
        end += line.len();
    }
    (text, false)
}
