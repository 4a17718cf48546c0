//! Content classification: which entries are worth inlining, and which byte
//! windows are binary.

/// Extensions (lower-case, without the dot) treated as text or source code.
const TEXT_EXTENSIONS: &[&str] = &[
    // Source
    "kt", "kts", "java", "py", "js", "jsx", "ts", "tsx", "c", "h", "cpp", "rb", "go", "rs",
    "swift", "php", "sh",
    // Config / build
    "xml", "json", "gradle", "properties", "yml", "yaml", "toml",
    // Docs / web
    "md", "txt", "html", "css",
];

/// Number of leading bytes inspected for control characters.
pub const SNIFF_LEN: usize = 128;

/// A sample with more control bytes than this (within [`SNIFF_LEN`]) is binary.
pub const CONTROL_BYTE_LIMIT: usize = 2;

/// Lower-cased substring after the last `.` of the final path component.
#[must_use]
pub fn extension_of(name: &str) -> Option<String> {
    let name = crate::path_filters::basename(name);
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[must_use]
pub fn looks_like_text_or_code(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()))
}

/// NUL anywhere, or too many non-whitespace control bytes near the start.
#[must_use]
pub fn is_binary(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let control = sample
        .iter()
        .take(SNIFF_LEN)
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))
        .count();
    control > CONTROL_BYTE_LIMIT
}

/// Kind tag stored for an imported file: `zip` for archives, else a language.
#[must_use]
pub fn detect_kind(name: &str) -> Option<&'static str> {
    if is_archive_name(name) {
        return Some(ARCHIVE_KIND);
    }
    guess_language(name)
}

pub const ARCHIVE_KIND: &str = "zip";

#[must_use]
pub fn is_archive_name(name: &str) -> bool {
    matches!(extension_of(name).as_deref(), Some("zip" | "jar"))
}

#[must_use]
pub fn guess_language(name: &str) -> Option<&'static str> {
    let language = match extension_of(name)?.as_str() {
        "kt" | "kts" => "kotlin",
        "java" => "java",
        "xml" => "xml",
        "json" => "json",
        "md" => "markdown",
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "c" | "h" => "c",
        "cpp" => "cpp",
        "rs" => "rust",
        "go" => "go",
        "rb" => "ruby",
        "swift" => "swift",
        "php" => "php",
        "sh" => "bash",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "html" => "html",
        "css" => "css",
        _ => return None,
    };
    Some(language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_allow_list_is_case_insensitive() {
        assert!(looks_like_text_or_code("src/Main.KT"));
        assert!(looks_like_text_or_code("README.md"));
        assert!(looks_like_text_or_code("app/build.gradle"));
        assert!(!looks_like_text_or_code("logo.png"));
        assert!(!looks_like_text_or_code("Makefile"));
        assert!(!looks_like_text_or_code("archive."));
        assert!(!looks_like_text_or_code("docs.d/"));
    }

    #[test]
    fn extension_uses_final_component_only() {
        assert_eq!(extension_of("v1.2/notes"), None);
        assert_eq!(extension_of("a/b.tar.GZ").as_deref(), Some("gz"));
    }

    #[test]
    fn binary_detection() {
        assert!(!is_binary(b""));
        assert!(!is_binary(b"fn main() {\n\tprintln!(\"hi\");\r\n}\n"));
        assert!(!is_binary("héllo wörld ✓".as_bytes()));
        assert!(is_binary(b"abc\0def"));
        assert!(is_binary(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x01, 0x02]));
        // a couple of stray control bytes are tolerated
        assert!(!is_binary(b"page one\x0cpage two\x1b[0m"));
    }

    #[test]
    fn control_bytes_after_sniff_window_are_ignored() {
        let mut sample = vec![b'a'; SNIFF_LEN];
        sample.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        assert!(!is_binary(&sample));
    }

    #[test]
    fn kind_detection() {
        assert_eq!(detect_kind("project.zip"), Some("zip"));
        assert_eq!(detect_kind("lib.JAR"), Some("zip"));
        assert_eq!(detect_kind("Main.kt"), Some("kotlin"));
        assert_eq!(detect_kind("notes"), None);
    }
}
