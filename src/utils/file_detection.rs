//! Text/binary classification by content sampling, plus token estimation.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::tokens::count_tokens;

/// Number of leading bytes inspected when classifying a file.
pub const SAMPLE_SIZE: usize = 8 * 1024;

/// The outcome of classifying one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_text: bool,
    /// Token estimate for text files; always 0 for binary ones.
    pub token_count: usize,
}

/// Decides whether a file is text or binary by sampling its first bytes.
///
/// Classification fails closed: a file that cannot be opened or read is
/// reported as binary and never surfaces an error to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextClassifier {
    /// When set, a sample that is not valid UTF-8 is treated as binary.
    /// A multi-byte sequence cut off by the sample boundary is tolerated.
    pub strict_utf8: bool,
}

impl TextClassifier {
    pub fn new(strict_utf8: bool) -> Self {
        Self { strict_utf8 }
    }

    /// Returns `true` if the file looks like text.
    pub fn classify(&self, path: &Path) -> bool {
        match read_sample(path) {
            Ok(sample) => self.classify_bytes(&sample),
            Err(e) => {
                tracing::debug!("Treating unreadable file as binary: {} ({})", path.display(), e);
                false
            }
        }
    }

    /// Classifies an in-memory sample with the same rules as [`Self::classify`].
    pub fn classify_bytes(&self, sample: &[u8]) -> bool {
        if sample.is_empty() {
            return true;
        }
        if sample.contains(&0) {
            return false;
        }
        if self.strict_utf8 {
            return match std::str::from_utf8(sample) {
                Ok(_) => true,
                // `error_len() == None` means the input ended mid-character.
                Err(e) => e.error_len().is_none(),
            };
        }
        true
    }

    /// Estimates the token count of a text file. Binary or unreadable files yield 0.
    pub fn estimate_tokens(&self, path: &Path) -> usize {
        self.inspect(path).token_count
    }

    /// Classifies the file and, for text, tokenizes its full content.
    pub fn inspect(&self, path: &Path) -> Classification {
        if !self.classify(path) {
            return Classification {
                is_text: false,
                token_count: 0,
            };
        }

        let token_count = match std::fs::read(path) {
            Ok(bytes) => count_tokens(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                tracing::debug!("Could not read {} for token count: {}", path.display(), e);
                0
            }
        };

        Classification {
            is_text: true,
            token_count,
        }
    }
}

fn read_sample(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    file.take(SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_empty_file_is_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "").unwrap();

        let classifier = TextClassifier::default();
        assert!(classifier.classify(&path));
        assert_eq!(classifier.estimate_tokens(&path), 0);
    }

    #[test]
    fn test_nul_byte_is_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        fs::write(&path, [0x89, b'P', b'N', b'G', 0x00, 0x01]).unwrap();

        let classifier = TextClassifier::default();
        assert!(!classifier.classify(&path));
        assert_eq!(classifier.estimate_tokens(&path), 0);
    }

    #[test]
    fn test_nul_after_sample_window_is_ignored() {
        let mut bytes = vec![b'a'; SAMPLE_SIZE];
        bytes.push(0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.txt");
        fs::write(&path, &bytes).unwrap();

        assert!(TextClassifier::default().classify(&path));
    }

    #[test]
    fn test_missing_file_fails_closed() {
        let classifier = TextClassifier::default();
        let missing = Path::new("/definitely/not/here.txt");
        assert!(!classifier.classify(missing));
        assert_eq!(classifier.estimate_tokens(missing), 0);
    }

    #[test]
    fn test_invalid_utf8_depends_on_strictness() {
        let latin1 = [b'c', b'a', b'f', 0xE9, b'!'];
        assert!(TextClassifier::new(false).classify_bytes(&latin1));
        assert!(!TextClassifier::new(true).classify_bytes(&latin1));
    }

    #[test]
    fn test_strict_mode_tolerates_truncated_char_at_boundary() {
        // "é" is 0xC3 0xA9; keep only the first byte, as a sample cut would.
        let truncated = [b'a', b'b', 0xC3];
        assert!(TextClassifier::new(true).classify_bytes(&truncated));
    }

    #[test]
    fn test_inspect_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.rs");
        fs::write(&path, "fn main() { println!(\"hi\"); }\n").unwrap();

        let classifier = TextClassifier::default();
        let first = classifier.inspect(&path);
        let second = classifier.inspect(&path);
        assert_eq!(first, second);
        assert!(first.is_text);
        assert!(first.token_count > 0);
    }
}
