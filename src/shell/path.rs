//! Sandboxed path resolution.
//!
//! Every path a command or builtin touches is resolved against the sandbox:
//! absolute-looking input against the root, anything else against the
//! current directory. The result is normalized lexically and must stay
//! under the root, otherwise resolution fails and the caller treats it as
//! "outside the sandbox".

use std::path::{Component, Path, PathBuf};

/// Resolve `input` inside the sandbox. `None` when the normalized result
/// would leave `root`.
pub fn resolve(root: &Path, current: &Path, input: &str) -> Option<PathBuf> {
    let joined = if input.starts_with('/') {
        root.join(input.trim_start_matches('/'))
    } else {
        current.join(input)
    };
    let normalized = normalize(&joined);
    normalized.starts_with(root).then_some(normalized)
}

/// Lexical normalization: collapses `.` and `..` without touching the
/// filesystem, so paths that do not exist yet (output redirection targets)
/// still resolve.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(parts.last(), Some(Component::RootDir) | Some(Component::Prefix(_)) | None) {
                    parts.pop();
                }
            }
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

/// The sandbox-relative printable form of `path`, always `/`-rooted.
pub fn printable(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => "/".to_string(),
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    #[test]
    fn relative_input_resolves_against_current() {
        let root = Path::new("/box");
        let current = Path::new("/box/sub");
        assert_eq!(resolve(root, current, "file"), Some(PathBuf::from("/box/sub/file")));
        assert_eq!(resolve(root, current, ".."), Some(PathBuf::from("/box")));
    }

    #[test]
    fn absolute_input_resolves_against_root() {
        let root = Path::new("/box");
        let current = Path::new("/box/sub");
        assert_eq!(resolve(root, current, "/other"), Some(PathBuf::from("/box/other")));
        assert_eq!(resolve(root, current, "/"), Some(PathBuf::from("/box")));
    }

    #[test]
    fn escapes_are_rejected() {
        let root = Path::new("/box");
        let current = Path::new("/box");
        assert_eq!(resolve(root, current, ".."), None);
        assert_eq!(resolve(root, current, "../../etc/passwd"), None);
        assert_eq!(resolve(root, current, "a/../../.."), None);
        assert_eq!(resolve(root, current, "/sub/../.."), None);
    }

    #[test]
    fn printable_paths_are_sandbox_relative() {
        let root = Path::new("/box");
        assert_eq!(printable(root, Path::new("/box")), "/");
        assert_eq!(printable(root, Path::new("/box/a/b")), "/a/b");
    }
}
