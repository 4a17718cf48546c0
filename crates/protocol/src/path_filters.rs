//! Path-based exclusion rules for archive entries.
//!
//! Entry paths are forward-slash separated and relative to the archive root.
//! A directory entry may carry one trailing `/`.

use globset::{GlobBuilder, GlobMatcher};

/// Directories whose whole subtree never makes it into a tree.
const IGNORED_DIRS: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".gradle",
    // caches / builds
    "node_modules",
    ".next",
    ".venv",
    ".cache",
    "__pycache__",
    "build",
    "dist",
    "target",
    "bin",
    "out",
    // vendored code
    "vendor",
];

/// Exact file names (lockfiles, VCS metadata, build wrappers).
const IGNORED_FILE_NAMES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "Gemfile.lock",
    "composer.lock",
    "poetry.lock",
    "gradlew",
    "gradlew.bat",
    "mvnw",
    "mvnw.cmd",
    ".gitmodules",
    ".gitattributes",
    ".DS_Store",
    "Thumbs.db",
];

/// Hidden files that are still worth showing.
const VISIBLE_DOTFILES: &[&str] = &[".gitignore", ".env"];

/// Default value of a stored file's custom ignore patterns.
pub const DEFAULT_CUSTOM_IGNORE_PATTERNS: &str = "node_modules, .git, build, .gradle";

/// Built-in exclusion rules, first match wins.
#[must_use]
pub fn should_ignore(path: &str) -> bool {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return false;
    }

    if trimmed
        .split('/')
        .any(|segment| is_ignored_dir_segment(segment))
    {
        return true;
    }

    let name = basename(trimmed);
    if IGNORED_FILE_NAMES.contains(&name) {
        return true;
    }

    name.starts_with('.') && !VISIBLE_DOTFILES.contains(&name)
}

fn is_ignored_dir_segment(segment: &str) -> bool {
    IGNORED_DIRS
        .iter()
        .any(|ignored| segment.eq_ignore_ascii_case(ignored))
}

/// Final component of an entry path, ignoring one trailing `/`.
#[must_use]
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Built-in rules plus per-file extra patterns.
///
/// Plain patterns (`logs`, `.gradle`) exclude any matching path segment,
/// case-insensitively. Patterns with glob metacharacters are matched against
/// the full path and against the basename.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    extra_segments: Vec<String>,
    extra_globs: Vec<GlobMatcher>,
}

impl PathFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated pattern list. Blank and malformed items are skipped.
    #[must_use]
    pub fn with_patterns(raw: Option<&str>) -> Self {
        let mut filter = Self::new();
        let Some(raw) = raw else {
            return filter;
        };
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let item = item.trim_matches('/');
            if item.is_empty() {
                continue;
            }
            if item.contains(['*', '?', '[']) {
                if let Ok(glob) = GlobBuilder::new(item).case_insensitive(true).build() {
                    filter.extra_globs.push(glob.compile_matcher());
                }
            } else {
                filter.extra_segments.push(item.to_ascii_lowercase());
            }
        }
        filter
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.extra_segments.is_empty() || !self.extra_globs.is_empty()
    }

    #[must_use]
    pub fn should_ignore(&self, path: &str) -> bool {
        if should_ignore(path) {
            return true;
        }
        if !self.is_active() {
            return false;
        }

        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return false;
        }
        if trimmed.split('/').any(|segment| {
            self.extra_segments
                .iter()
                .any(|extra| segment.eq_ignore_ascii_case(extra))
        }) {
            return true;
        }

        let name = basename(trimmed);
        self.extra_globs
            .iter()
            .any(|pattern| pattern.is_match(trimmed) || pattern.is_match(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_dirs_match_whole_segments_only() {
        assert!(should_ignore("node_modules/x.js"));
        assert!(should_ignore("app/node_modules/lib/index.js"));
        assert!(should_ignore(".git/config"));
        assert!(should_ignore("build/"));
        assert!(should_ignore("Build/output.txt"));
        assert!(!should_ignore("src/builder/Main.kt"));
        assert!(!should_ignore("src/my_target.rs"));
        assert!(!should_ignore("binary_search/mod.rs"));
    }

    #[test]
    fn ignored_file_names_are_exact() {
        assert!(should_ignore("package-lock.json"));
        assert!(should_ignore("frontend/yarn.lock"));
        assert!(should_ignore("gradlew"));
        assert!(!should_ignore("gradlew.md"));
        assert!(!should_ignore("my-yarn.lock.txt"));
    }

    #[test]
    fn hidden_files_are_excluded_except_allow_list() {
        assert!(should_ignore(".prettierrc"));
        assert!(should_ignore("src/.eslintrc.json"));
        assert!(!should_ignore(".gitignore"));
        assert!(!should_ignore("server/.env"));
        assert!(!should_ignore("README.md"));
    }

    #[test]
    fn root_is_never_ignored() {
        assert!(!should_ignore(""));
        assert!(!should_ignore("/"));
    }

    #[test]
    fn basename_strips_trailing_slash() {
        assert_eq!(basename("src/main/"), "main");
        assert_eq!(basename("src/main/App.kt"), "App.kt");
        assert_eq!(basename("README.md"), "README.md");
    }

    #[test]
    fn custom_patterns_extend_builtins() {
        let filter = PathFilter::with_patterns(Some("logs, *.min.js, docs/generated/*"));
        assert!(filter.is_active());
        assert!(filter.should_ignore("server/LOGS/today.txt"));
        assert!(filter.should_ignore("web/app.min.js"));
        assert!(filter.should_ignore("docs/generated/api.md"));
        assert!(filter.should_ignore("node_modules/a.js"));
        assert!(!filter.should_ignore("web/app.js"));
        assert!(!filter.should_ignore("docs/guide.md"));
    }

    #[test]
    fn blank_patterns_do_not_activate_filter() {
        let filter = PathFilter::with_patterns(Some(" , ,/ "));
        assert!(!filter.is_active());
        assert!(!filter.should_ignore("src/lib.rs"));
        assert!(!PathFilter::with_patterns(None).is_active());
    }
}
