use super::{CoreError, FileDescriptor, PatternMatcher};
use crate::utils::file_detection::TextClassifier;
use crate::utils::paths::relative_slash_path;
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ScanProgress {
    pub files_scanned: usize,
    pub large_files_skipped: usize,
    pub current_scanning_path: String,
}

const DEFAULT_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024; // 20MB
const PROGRESS_UPDATE_INTERVAL: usize = 25;

/// Tunables for a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Treat files whose sample is not valid UTF-8 as binary.
    pub strict_utf8: bool,
    /// Files larger than this are listed but never read; they count as non-text.
    pub max_file_size: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            strict_utf8: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// A file that survived filtering and still has to be classified.
struct Candidate {
    relative: String,
    absolute: PathBuf,
    size: u64,
}

/// Walks a root directory and produces one [`FileDescriptor`] per retained file.
///
/// Symlinked directories are never descended into, so cycles cannot occur.
/// A symlink that resolves to a regular file is reported like a regular file.
pub struct DirectoryScanner {
    matcher: Arc<PatternMatcher>,
    classifier: TextClassifier,
    options: ScanOptions,
}

impl DirectoryScanner {
    pub fn new<S: AsRef<str>>(ignore_patterns: &[S]) -> Self {
        Self::with_options(ignore_patterns, ScanOptions::default())
    }

    pub fn with_options<S: AsRef<str>>(ignore_patterns: &[S], options: ScanOptions) -> Self {
        Self {
            matcher: Arc::new(PatternMatcher::compile_or_default(ignore_patterns)),
            classifier: TextClassifier::new(options.strict_utf8),
            options,
        }
    }

    /// Scans `root_path` and returns a complete snapshot.
    pub fn scan(&self, root_path: &Path) -> Result<Vec<FileDescriptor>, CoreError> {
        self.scan_with_progress(root_path, |_| {})
    }

    /// Scans `root_path`, reporting progress while files are classified.
    ///
    /// Only a root that is not a directory is an error. Unreadable entries
    /// below it are skipped and logged.
    pub fn scan_with_progress<F>(
        &self,
        root_path: &Path,
        progress_callback: F,
    ) -> Result<Vec<FileDescriptor>, CoreError>
    where
        F: Fn(ScanProgress) + Sync,
    {
        if !root_path.is_dir() {
            return Err(CoreError::NotADirectory(root_path.to_path_buf()));
        }

        progress_callback(ScanProgress {
            files_scanned: 0,
            large_files_skipped: 0,
            current_scanning_path: "Starting directory scan...".to_string(),
        });

        let candidates = self.collect_candidates(root_path);
        let total = candidates.len();
        tracing::info!("📂 Collected {} files for classification", total);

        let files_scanned = AtomicUsize::new(0);
        let large_files_skipped = AtomicUsize::new(0);

        let mut descriptors: Vec<FileDescriptor> = candidates
            .par_iter()
            .map(|candidate| {
                let descriptor = if candidate.size > self.options.max_file_size {
                    large_files_skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        "Skipping content of large file {} ({} bytes)",
                        candidate.relative,
                        candidate.size
                    );
                    FileDescriptor::binary(candidate.relative.clone())
                } else {
                    let classification = self.classifier.inspect(&candidate.absolute);
                    FileDescriptor {
                        path: candidate.relative.clone(),
                        token_count: classification.token_count,
                        is_text: classification.is_text,
                    }
                };

                let scanned = files_scanned.fetch_add(1, Ordering::Relaxed) + 1;
                if scanned % PROGRESS_UPDATE_INTERVAL == 0 {
                    progress_callback(ScanProgress {
                        files_scanned: scanned,
                        large_files_skipped: large_files_skipped.load(Ordering::Relaxed),
                        current_scanning_path: format!(
                            "Processing: {}",
                            candidate.relative.chars().take(60).collect::<String>()
                        ),
                    });
                }

                descriptor
            })
            .collect();

        descriptors.sort_by(|a, b| a.path.cmp(&b.path));

        let final_skipped = large_files_skipped.load(Ordering::Relaxed);
        tracing::info!(
            "✅ Scan completed: {} files, {} large files skipped",
            descriptors.len(),
            final_skipped
        );

        progress_callback(ScanProgress {
            files_scanned: descriptors.len(),
            large_files_skipped: final_skipped,
            current_scanning_path: format!("Scan completed! {} files found", descriptors.len()),
        });

        Ok(descriptors)
    }

    /// Walks the tree, pruning excluded directories before descending into them.
    fn collect_candidates(&self, root_path: &Path) -> Vec<Candidate> {
        let matcher = Arc::clone(&self.matcher);
        let filter_root = root_path.to_path_buf();

        let walker = WalkBuilder::new(root_path)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| match relative_slash_path(&filter_root, entry.path()) {
                Some(relative) => !matcher.excludes(&relative),
                None => true,
            })
            .build();

        let mut candidates = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let Some(file_type) = entry.file_type() else {
                continue;
            };

            let metadata: Option<Metadata> = if file_type.is_file() {
                entry.metadata().ok()
            } else if file_type.is_symlink() {
                // Follow the link only to learn what it points at.
                std::fs::metadata(entry.path()).ok().filter(Metadata::is_file)
            } else {
                None
            };

            let Some(metadata) = metadata else {
                continue;
            };

            let Some(relative) = relative_slash_path(root_path, entry.path()) else {
                continue;
            };

            candidates.push(Candidate {
                relative,
                absolute: entry.path().to_path_buf(),
                size: metadata.len(),
            });
        }

        candidates
    }
}

/// Runs a scan on the blocking thread pool.
pub async fn scan_directory(
    root_path: PathBuf,
    ignore_patterns: Vec<String>,
    options: ScanOptions,
) -> Result<Vec<FileDescriptor>, CoreError> {
    tokio::task::spawn_blocking(move || {
        DirectoryScanner::with_options(&ignore_patterns, options).scan(&root_path)
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_helpers::{running_as_root, setup_test_logging, write_file};
    use std::sync::Mutex;

    fn paths(descriptors: &[FileDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.path.as_str()).collect()
    }

    #[test]
    fn test_scan_excludes_ignored_files() {
        setup_test_logging();
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.js", "console.log('a');").unwrap();
        write_file(dir.path(), "src/b.png", [0x89, b'P', b'N', b'G', 0, 0]).unwrap();
        write_file(dir.path(), "readme.md", "# Readme").unwrap();

        let scanner = DirectoryScanner::new(&["*.png"]);
        let result = scanner.scan(dir.path()).unwrap();

        assert_eq!(paths(&result), vec!["readme.md", "src/a.js"]);
        assert!(result.iter().all(|d| d.is_text && d.token_count > 0));
    }

    #[test]
    fn test_scan_prunes_excluded_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "node_modules/react/index.js", "x").unwrap();
        write_file(dir.path(), "web/node_modules/vue/index.js", "x").unwrap();
        write_file(dir.path(), "web/app.js", "x").unwrap();

        let result = DirectoryScanner::new(&["node_modules/"]).scan(dir.path()).unwrap();
        assert_eq!(paths(&result), vec!["web/app.js"]);
    }

    #[test]
    fn test_scan_uses_defaults_without_patterns() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), ".git/HEAD", "ref: refs/heads/main").unwrap();
        write_file(dir.path(), "main.rs", "fn main() {}").unwrap();

        let empty: [&str; 0] = [];
        let result = DirectoryScanner::new(&empty).scan(dir.path()).unwrap();
        assert_eq!(paths(&result), vec!["main.rs"]);
    }

    #[test]
    fn test_binary_and_empty_files_are_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "empty.txt", "").unwrap();
        write_file(dir.path(), "blob.bin", [1u8, 0, 2, 3]).unwrap();

        let result = DirectoryScanner::new(&["*.tmp"]).scan(dir.path()).unwrap();
        let blob = result.iter().find(|d| d.path == "blob.bin").unwrap();
        let empty = result.iter().find(|d| d.path == "empty.txt").unwrap();

        assert_eq!(blob, &FileDescriptor::binary("blob.bin"));
        assert_eq!(empty, &FileDescriptor::text("empty.txt", 0));
    }

    #[test]
    fn test_scan_rejects_non_directory_root() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "file.txt", "x").unwrap();

        let err = DirectoryScanner::new(&["*.tmp"])
            .scan(&dir.path().join("file.txt"))
            .unwrap_err();
        assert!(matches!(err, CoreError::NotADirectory(_)));
    }

    #[test]
    fn test_large_files_are_listed_without_reading() {
        setup_test_logging();
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "big.txt", "word ".repeat(100)).unwrap();
        write_file(dir.path(), "small.txt", "word").unwrap();

        let options = ScanOptions {
            max_file_size: 64,
            ..ScanOptions::default()
        };
        let progress = Mutex::new(Vec::new());
        let result = DirectoryScanner::with_options(&["*.tmp"], options)
            .scan_with_progress(dir.path(), |p| progress.lock().unwrap().push(p))
            .unwrap();

        let big = result.iter().find(|d| d.path == "big.txt").unwrap();
        assert!(!big.is_text);
        assert_eq!(big.token_count, 0);

        let last = progress.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.large_files_skipped, 1);
        assert_eq!(last.files_scanned, 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycles_do_not_loop() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/lib.rs", "pub fn x() {}").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("src/loop")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("src/lib.rs"),
            dir.path().join("alias.rs"),
        )
        .unwrap();

        let result = DirectoryScanner::new(&["*.tmp"]).scan(dir.path()).unwrap();
        assert_eq!(paths(&result), vec!["alias.rs", "src/lib.rs"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        if running_as_root() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "locked/secret.txt", "s").unwrap();
        write_file(dir.path(), "open.txt", "o").unwrap();
        let locked = dir.path().join("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let result = DirectoryScanner::new(&["*.tmp"]).scan(dir.path());

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(paths(&result.unwrap()), vec!["open.txt"]);
    }

    #[tokio::test]
    async fn test_scan_directory_async() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", "hello").unwrap();

        let result = scan_directory(
            dir.path().to_path_buf(),
            vec!["*.tmp".to_string()],
            ScanOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(paths(&result), vec!["a.txt"]);
    }
}
