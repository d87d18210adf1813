//! Assembles templates, instructions and selected file contents into one prompt.

use std::fs;
use std::path::Path;

use serde::Serialize;

use super::{CoreError, Template, TreeGenerator};
use crate::utils::file_detection::{TextClassifier, SAMPLE_SIZE};
use crate::utils::paths::resolve_within_root;
use crate::utils::tokens::count_tokens;

pub const INSTRUCTIONS_LABEL: &str = "Instructions:";
pub const SECTION_SEPARATOR: &str = "---";
pub const CODEBASE_HEADER: &str = "Codebase:";

/// The finished prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledPrompt {
    pub text: String,
    /// Tokens of the whole text, not the sum of per-file estimates.
    pub token_count: usize,
    /// Number of files emitted with an error marker instead of their content.
    pub failed_files: usize,
}

pub struct PromptAssembler;

impl PromptAssembler {
    /// Builds the prompt. Sections are separated by a blank line and empty
    /// sections are left out entirely:
    ///
    /// 1. template contents, in order
    /// 2. `Instructions:` followed by the instructions
    /// 3. a `---` separator (only if 1 or 2 produced output)
    /// 4. the ASCII tree of the selected files and another separator
    /// 5. the `Codebase:` header
    /// 6. every selected file, in the given order, as path plus fenced content
    ///
    /// Files that cannot be read, or whose path leaves `root_path`, get an
    /// inline error marker; the rest of the prompt is still produced.
    pub fn assemble<S: AsRef<str>>(
        root_path: &Path,
        selected_files: &[S],
        instructions: &str,
        templates: &[Template],
        include_file_tree: bool,
    ) -> AssembledPrompt {
        let mut sections: Vec<String> = templates
            .iter()
            .map(|t| t.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        let instructions = instructions.trim();
        if !instructions.is_empty() {
            sections.push(format!("{INSTRUCTIONS_LABEL}\n{instructions}"));
        }

        if !sections.is_empty() {
            sections.push(SECTION_SEPARATOR.to_string());
        }

        let mut failed_files = 0;

        if !selected_files.is_empty() {
            if include_file_tree {
                let tree = TreeGenerator::generate_tree(selected_files, root_path);
                sections.push(tree.trim_end().to_string());
                sections.push(SECTION_SEPARATOR.to_string());
            }

            sections.push(CODEBASE_HEADER.to_string());

            let classifier = TextClassifier::default();
            for path in selected_files {
                let path = path.as_ref();
                match Self::read_file_content(root_path, path, &classifier) {
                    Ok(FileContent::Text(content)) => {
                        sections.push(Self::format_file_section(path, &content));
                    }
                    Ok(FileContent::Binary) => {
                        sections.push(format!("{path}\n[BINARY FILE - CONTENT SKIPPED]"));
                    }
                    Err(e) => {
                        tracing::warn!("Could not include '{}' in prompt: {}", path, e);
                        failed_files += 1;
                        sections.push(Self::format_error_section(path, &e));
                    }
                }
            }
        }

        let text = sections.join("\n\n");
        let token_count = count_tokens(&text);

        tracing::info!(
            "Assembled prompt: {} files, {} tokens, {} failed",
            selected_files.len(),
            token_count,
            failed_files
        );

        AssembledPrompt {
            text,
            token_count,
            failed_files,
        }
    }

    fn read_file_content(
        root_path: &Path,
        relative: &str,
        classifier: &TextClassifier,
    ) -> Result<FileContent, CoreError> {
        let full_path = resolve_within_root(root_path, relative)?;
        let bytes = fs::read(&full_path).map_err(|e| CoreError::io(e, &full_path))?;

        let sample = &bytes[..bytes.len().min(SAMPLE_SIZE)];
        if !classifier.classify_bytes(sample) {
            return Ok(FileContent::Binary);
        }

        Ok(FileContent::Text(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn format_file_section(path: &str, content: &str) -> String {
        let fence = Self::fence_for(content);
        let language = get_language_from_path(Path::new(path));
        let body = content.strip_suffix('\n').unwrap_or(content);
        format!("{path}\n{fence}{language}\n{body}\n{fence}")
    }

    fn format_error_section(path: &str, error: &CoreError) -> String {
        match error {
            CoreError::PathEscapesRoot(_) => {
                format!("{path}\n[ERROR: Invalid file path - outside of the root directory]")
            }
            CoreError::Io(e, _) => format!("{path}\n[ERROR READING FILE: {e}]"),
            other => format!("{path}\n[ERROR READING FILE: {other}]"),
        }
    }

    /// A backtick fence longer than any backtick run inside `content`.
    fn fence_for(content: &str) -> String {
        let mut longest = 0;
        let mut run = 0;
        for c in content.chars() {
            if c == '`' {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }
        "`".repeat(longest.max(2) + 1)
    }
}

enum FileContent {
    Text(String),
    Binary,
}

/// Determines the language hint for a fenced code block from a file path.
pub fn get_language_from_path(path: &Path) -> &'static str {
    match path.extension().and_then(|s| s.to_str()) {
        Some("rs") => "rust",
        Some("js") | Some("mjs") | Some("cjs") | Some("jsx") => "javascript",
        Some("ts") | Some("tsx") => "typescript",
        Some("py") => "python",
        Some("html") | Some("htm") => "html",
        Some("css") => "css",
        Some("json") => "json",
        Some("md") => "markdown",
        Some("toml") => "toml",
        Some("yaml") | Some("yml") => "yaml",
        Some("sh") => "shell",
        Some("go") => "go",
        Some("java") => "java",
        Some("c") | Some("h") => "c",
        Some("cpp") | Some("hpp") | Some("cxx") | Some("hxx") => "cpp",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_helpers::{setup_test_logging, write_file};

    fn template(content: &str) -> Template {
        Template {
            id: "t1".to_string(),
            name: "Review".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_sections_appear_in_order() {
        setup_test_logging();
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.js", "console.log(1)").unwrap();

        let prompt = PromptAssembler::assemble(dir.path(), &["src/a.js"], "Fix bug", &[], false);
        let text = &prompt.text;

        let instructions = text.find("Instructions:\nFix bug").unwrap();
        let header = text.find(CODEBASE_HEADER).unwrap();
        let path = text.find("src/a.js").unwrap();
        let content = text.find("```javascript\nconsole.log(1)\n```").unwrap();

        assert!(instructions < header);
        assert!(header < path);
        assert!(path < content);
        assert!(prompt.token_count > 0);
        assert_eq!(prompt.failed_files, 0);
    }

    #[test]
    fn test_exact_layout_with_templates_and_tree() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "main.rs", "fn main() {}\n").unwrap();
        let root_name = dir.path().file_name().unwrap().to_string_lossy().to_string();

        let prompt = PromptAssembler::assemble(
            dir.path(),
            &["main.rs"],
            "  Explain  ",
            &[template("You are a reviewer.\n")],
            true,
        );

        let expected = format!(
            "You are a reviewer.\n\nInstructions:\nExplain\n\n---\n\n{root_name}/\n└── main.rs\n\n---\n\nCodebase:\n\nmain.rs\n```rust\nfn main() {{}}\n```"
        );
        assert_eq!(prompt.text, expected);
        assert_eq!(prompt.token_count, count_tokens(&expected));
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let empty: [&str; 0] = [];

        let prompt = PromptAssembler::assemble(dir.path(), &empty, "", &[template("  ")], true);
        assert_eq!(prompt.text, "");
        assert_eq!(prompt.token_count, 0);

        let only_instructions = PromptAssembler::assemble(dir.path(), &empty, "Do it", &[], true);
        assert_eq!(only_instructions.text, "Instructions:\nDo it\n\n---");
    }

    #[test]
    fn test_missing_file_gets_marker_and_assembly_continues() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "b.txt", "still here").unwrap();

        let prompt = PromptAssembler::assemble(dir.path(), &["gone.txt", "b.txt"], "", &[], false);
        assert!(prompt.text.contains("gone.txt\n[ERROR READING FILE:"));
        assert!(prompt.text.contains("b.txt\n```\nstill here\n```"));
        assert_eq!(prompt.failed_files, 1);
    }

    #[test]
    fn test_escaping_path_is_rejected_without_reading() {
        let outer = tempfile::tempdir().unwrap();
        write_file(outer.path(), "secret.txt", "TOP SECRET").unwrap();
        let root = outer.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();

        let prompt = PromptAssembler::assemble(&root, &["../secret.txt"], "", &[], false);
        assert!(prompt.text.contains("[ERROR: Invalid file path"));
        assert!(!prompt.text.contains("TOP SECRET"));
        assert_eq!(prompt.failed_files, 1);
    }

    #[test]
    fn test_binary_file_is_not_inlined() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "blob.bin", [0u8, 1, 2]).unwrap();

        let prompt = PromptAssembler::assemble(dir.path(), &["blob.bin"], "", &[], false);
        assert!(prompt.text.ends_with("blob.bin\n[BINARY FILE - CONTENT SKIPPED]"));
    }

    #[test]
    fn test_fence_grows_past_inner_backticks() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "README.md", "```sh\nls\n```").unwrap();

        let prompt = PromptAssembler::assemble(dir.path(), &["README.md"], "", &[], false);
        assert!(prompt.text.contains("README.md\n````markdown\n```sh\nls\n```\n````"));
    }
}
