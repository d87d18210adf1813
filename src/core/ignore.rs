//! Gitignore-style pattern compilation and the per-root `.repo_ignore` file.
//!
//! The semantics are intentionally a subset of gitignore:
//! - a trailing `/` is stripped, so directory-only patterns also match files
//!   of the same name;
//! - patterns are OR-combined and `!pattern` is a literal, not a negation;
//! - a pattern without a leading `/` matches at any segment boundary.

use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};

use super::CoreError;

/// Name of the ignore file stored at the root of a browsed folder.
pub const IGNORE_FILE_NAME: &str = ".repo_ignore";

/// Upper bound for a single compiled pattern.
const MAX_PATTERN_REGEX_SIZE: usize = 256 * 1024;

/// Patterns used when a root has no filters of its own.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // Version control
    ".git/",
    ".svn/",
    ".hg/",
    // Dependencies
    "node_modules/",
    "bower_components/",
    "vendor/",
    "venv/",
    ".venv/",
    "__pycache__/",
    // Build output
    "dist/",
    "build/",
    "out/",
    "target/",
    ".next/",
    "coverage/",
    "*.pyc",
    "*.class",
    "*.o",
    "*.obj",
    // Editor and OS metadata
    ".idea/",
    ".vscode/",
    ".DS_Store",
    "Thumbs.db",
    "*.swp",
    // Lock files and logs
    "package-lock.json",
    "yarn.lock",
    "*.log",
    // This tool's own ignore file
    "/.repo_ignore",
];

/// Returns the built-in default pattern list as owned strings.
pub fn default_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|p| (*p).to_string()).collect()
}

/// A compiled set of ignore patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    rules: Vec<CompiledPattern>,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    regex: Regex,
}

impl PatternMatcher {
    /// Compiles the given patterns. Blank lines, comments and patterns that
    /// fail to compile are skipped; the latter are logged.
    pub fn compile<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .filter_map(|p| effective_pattern(p.as_ref()).map(str::to_string))
            .filter_map(|source| match compile_pattern(&source) {
                Ok(regex) => Some(CompiledPattern { source, regex }),
                Err(e) => {
                    tracing::warn!("Ignoring malformed pattern '{}': {}", source, e);
                    None
                }
            })
            .collect();

        Self { rules }
    }

    /// Like [`Self::compile`], but falls back to [`DEFAULT_IGNORE_PATTERNS`]
    /// when `patterns` contains nothing but blank lines and comments.
    pub fn compile_or_default<S: AsRef<str>>(patterns: &[S]) -> Self {
        let has_effective = patterns
            .iter()
            .any(|p| effective_pattern(p.as_ref()).is_some());

        if has_effective {
            Self::compile(patterns)
        } else {
            tracing::debug!("No ignore patterns supplied, using defaults");
            Self::compile(DEFAULT_IGNORE_PATTERNS)
        }
    }

    /// Returns `true` if any compiled pattern matches the root-relative,
    /// `/`-separated path.
    pub fn excludes(&self, relative_path: &str) -> bool {
        self.rules.iter().any(|rule| rule.regex.is_match(relative_path))
    }

    /// Returns the first pattern that matches `relative_path`, if any.
    pub fn matching_pattern(&self, relative_path: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.regex.is_match(relative_path))
            .map(|rule| rule.source.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Trims a raw pattern and returns it if it is neither blank nor a comment.
fn effective_pattern(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() || trimmed == "/" {
        None
    } else {
        Some(trimmed)
    }
}

/// Translates a single pattern into a segment-anchored regex.
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let (anchored, body) = match pattern.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };

    let mut expr = String::with_capacity(body.len() * 2 + 16);
    expr.push_str(if anchored { "^" } else { "(?:^|/)" });

    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                if chars.get(i) == Some(&'/') {
                    // `**/` may also match zero directories.
                    expr.push_str("(?:.*/)?");
                    i += 1;
                } else {
                    expr.push_str(".*");
                }
                continue;
            }
            '*' => expr.push_str("[^/]*"),
            '?' => expr.push_str("[^/]"),
            c => {
                let mut buf = [0u8; 4];
                expr.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
        i += 1;
    }

    expr.push_str("(?:$|/)");

    RegexBuilder::new(&expr)
        .size_limit(MAX_PATTERN_REGEX_SIZE)
        .build()
}

/// Splits newline-delimited ignore text into effective patterns,
/// dropping blank lines and `#` comments.
pub fn parse_pattern_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads `<root>/.repo_ignore`, if present.
pub fn read_ignore_file(root: &Path) -> Option<Vec<String>> {
    let path = root.join(IGNORE_FILE_NAME);
    match fs::read_to_string(&path) {
        Ok(text) => Some(parse_pattern_lines(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

/// Writes the patterns to `<root>/.repo_ignore`, one per line.
pub fn write_ignore_file<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<(), CoreError> {
    let path = root.join(IGNORE_FILE_NAME);
    let mut text = patterns
        .iter()
        .map(|p| p.as_ref().trim())
        .collect::<Vec<_>>()
        .join("\n");
    text.push('\n');
    fs::write(&path, text).map_err(|e| CoreError::io(e, &path))?;
    tracing::info!("Saved {} ignore patterns to {}", patterns.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extension_glob_matches_at_any_depth() {
        let matcher = PatternMatcher::compile(["*.png"]);
        assert!(matcher.excludes("b.png"));
        assert!(matcher.excludes("src/b.png"));
        assert!(!matcher.excludes("src/a.js"));
        assert!(!matcher.excludes("src/png"));
    }

    #[test]
    fn test_unanchored_name_respects_segment_boundaries() {
        let matcher = PatternMatcher::compile(["node_modules"]);
        assert!(matcher.excludes("node_modules"));
        assert!(matcher.excludes("node_modules/react/index.js"));
        assert!(matcher.excludes("web/node_modules/x.js"));
        assert!(!matcher.excludes("my_node_modules/x.js"));
        assert!(!matcher.excludes("node_modules_backup/x.js"));
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        let matcher = PatternMatcher::compile(["target/"]);
        assert!(matcher.excludes("target"));
        assert!(matcher.excludes("target/debug/app"));
        // Known simplification: a file named `target` matches as well.
        assert!(matcher.excludes("crates/target"));
    }

    #[test]
    fn test_leading_slash_anchors_at_root() {
        let matcher = PatternMatcher::compile(["/build"]);
        assert!(matcher.excludes("build/out.js"));
        assert!(!matcher.excludes("pkg/build/out.js"));
    }

    #[test]
    fn test_single_star_does_not_cross_separators() {
        let matcher = PatternMatcher::compile(["src/*.rs"]);
        assert!(matcher.excludes("src/main.rs"));
        assert!(!matcher.excludes("src/nested/main.rs"));
    }

    #[test]
    fn test_double_star_crosses_separators() {
        let matcher = PatternMatcher::compile(["src/**/*.rs"]);
        assert!(matcher.excludes("src/main.rs"));
        assert!(matcher.excludes("src/a/b/c.rs"));
        assert!(!matcher.excludes("lib/main.rs"));

        let everything_below = PatternMatcher::compile(["docs/**"]);
        assert!(everything_below.excludes("docs/a/b.md"));
    }

    #[test]
    fn test_question_mark_matches_one_char() {
        let matcher = PatternMatcher::compile(["file?.txt"]);
        assert!(matcher.excludes("file1.txt"));
        assert!(!matcher.excludes("file10.txt"));
        assert!(!matcher.excludes("file/.txt"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let matcher = PatternMatcher::compile(["a+b(1).txt"]);
        assert!(matcher.excludes("a+b(1).txt"));
        assert!(!matcher.excludes("aab1.txt"));
    }

    #[test]
    fn test_comments_blanks_and_negation() {
        let matcher = PatternMatcher::compile(["", "   ", "# *.rs", "!keep.txt"]);
        assert_eq!(matcher.len(), 1);
        assert!(!matcher.excludes("main.rs"));
        // Negation is not supported; the pattern is a literal.
        assert!(matcher.excludes("!keep.txt"));
        assert!(!matcher.excludes("keep.txt"));
    }

    #[test]
    fn test_malformed_pattern_is_skipped() {
        let oversized = "?".repeat(50_000);
        let matcher = PatternMatcher::compile([oversized.as_str(), "*.log"]);
        assert_eq!(matcher.len(), 1);
        assert!(matcher.excludes("debug.log"));
    }

    #[test]
    fn test_defaults_apply_only_without_effective_patterns() {
        let defaults = PatternMatcher::compile_or_default(&["# just a comment", ""]);
        assert!(defaults.excludes(".git/HEAD"));
        assert!(defaults.excludes("web/node_modules/react/index.js"));
        assert!(defaults.excludes(IGNORE_FILE_NAME));

        let custom = PatternMatcher::compile_or_default(&["*.tmp"]);
        assert!(!custom.excludes(".git/HEAD"));
        assert!(custom.excludes("x.tmp"));
    }

    #[test]
    fn test_matching_pattern_reports_source() {
        let matcher = PatternMatcher::compile(["*.md", "dist/"]);
        assert_eq!(matcher.matching_pattern("dist/app.js"), Some("dist"));
        assert_eq!(matcher.matching_pattern("src/app.js"), None);
    }

    #[test]
    fn test_parse_pattern_lines() {
        let text = "# deps\nnode_modules/\n\n  *.log  \n#*.rs\n";
        assert_eq!(parse_pattern_lines(text), vec!["node_modules/", "*.log"]);
    }

    #[test]
    fn test_ignore_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_ignore_file(dir.path()).is_none());

        write_ignore_file(dir.path(), &["dist/", "*.map"]).unwrap();
        assert_eq!(
            read_ignore_file(dir.path()),
            Some(vec!["dist/".to_string(), "*.map".to_string()])
        );
    }

    proptest! {
        #[test]
        fn prop_non_matching_pattern_is_neutral(
            segments in prop::collection::vec("[a-y]{1,4}", 1..5),
            patterns in prop::collection::vec("[a-y*?]{1,4}", 0..4),
        ) {
            let path = segments.join("/");
            let base = PatternMatcher::compile(&patterns);

            let mut extended = patterns.clone();
            extended.push("zzz_never".to_string());
            let with_extra = PatternMatcher::compile(&extended);

            prop_assert_eq!(base.excludes(&path), with_extra.excludes(&path));
        }

        #[test]
        fn prop_excludes_is_or_of_single_patterns(
            segments in prop::collection::vec("[a-d]{1,3}", 1..4),
            patterns in prop::collection::vec("[a-d*?]{1,3}", 0..4),
        ) {
            let path = segments.join("/");
            let combined = PatternMatcher::compile(&patterns).excludes(&path);
            let any_single = patterns
                .iter()
                .any(|p| PatternMatcher::compile([p]).excludes(&path));
            prop_assert_eq!(combined, any_single);
        }
    }
}
