//! Path helpers shared by the scanner, the prompt assembler and the change applier.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::core::CoreError;

/// Converts `path` into a root-relative string joined with `/`,
/// regardless of the host separator.
///
/// Returns `None` if `path` does not live under `root` or equals it.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Resolves a user- or model-supplied relative path against `root` and
/// guarantees the result stays strictly inside it.
///
/// The check is lexical first (`..` may never climb above the root, absolute
/// paths and drive prefixes are rejected) and then physical: the deepest
/// existing ancestor of the target is canonicalized and must still be under
/// the canonical root, so a symlinked directory cannot be used to escape.
/// Symlinks count as existing even when dangling; one that cannot be resolved
/// is rejected.
pub fn resolve_within_root(root: &Path, relative: &str) -> Result<PathBuf, CoreError> {
    let escape = || CoreError::PathEscapesRoot(relative.to_string());

    let mut normalized = PathBuf::new();
    for component in Path::new(relative.trim()).components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    // The root itself is never a valid file target.
    if normalized.as_os_str().is_empty() {
        return Err(escape());
    }

    let target = root.join(&normalized);

    if let Ok(canonical_root) = root.canonicalize() {
        let mut probe = target.as_path();
        loop {
            if fs::symlink_metadata(probe).is_ok() {
                let canonical = probe.canonicalize().map_err(|_| escape())?;
                if !canonical.starts_with(&canonical_root) {
                    return Err(escape());
                }
                break;
            }
            match probe.parent() {
                Some(parent) => probe = parent,
                None => break,
            }
        }
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_slash_path_joins_with_forward_slash() {
        let root = Path::new("/repo");
        let path = Path::new("/repo").join("src").join("nested").join("a.rs");
        assert_eq!(
            relative_slash_path(root, &path).as_deref(),
            Some("src/nested/a.rs")
        );
        assert_eq!(relative_slash_path(root, root), None);
        assert_eq!(relative_slash_path(root, Path::new("/elsewhere/a.rs")), None);
    }

    #[test]
    fn test_resolve_rejects_parent_escape() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_within_root(dir.path(), "../outside.txt").unwrap_err();
        assert!(err.to_string().contains("Invalid file path"));
        assert!(resolve_within_root(dir.path(), "a/../../b").is_err());
    }

    #[test]
    fn test_resolve_rejects_absolute_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_within_root(dir.path(), "/etc/passwd").is_err());
        assert!(resolve_within_root(dir.path(), "").is_err());
        assert!(resolve_within_root(dir.path(), "./").is_err());
    }

    #[test]
    fn test_resolve_allows_inner_parent_segments() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_within_root(dir.path(), "src/../lib/x.rs").unwrap();
        assert_eq!(resolved, dir.path().join("lib").join("x.rs"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        let err = resolve_within_root(root.path(), "link/pwned.txt").unwrap_err();
        assert!(matches!(err, CoreError::PathEscapesRoot(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_dangling_symlink_to_outside() {
        let outside = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let missing = outside.path().join("pwned.txt");
        std::os::unix::fs::symlink(&missing, root.path().join("link.txt")).unwrap();

        let err = resolve_within_root(root.path(), "link.txt").unwrap_err();
        assert!(matches!(err, CoreError::PathEscapesRoot(_)));
        assert!(!missing.exists());
    }
}
