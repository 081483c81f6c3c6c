//! Mapping request paths onto the project directory.
//!
//! The request path is percent-decoded and resolved lexically against the
//! project root. The result is accepted only if it is still prefixed by the
//! root component-wise; a plain string containment check would let
//! `/project-evil` pass for `/project`.

use std::path::{Component, Path, PathBuf};

/// Outcome of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalPath {
    /// Path inside the project root.
    Inside(PathBuf),
    /// Path would escape the project root.
    Forbidden(PathBuf),
}

/// Resolve `request_path` (e.g. `/blog/index.html`) under `root`.
pub fn resolve_local_path(root: &Path, request_path: &str) -> LocalPath {
    let decoded = urlencoding::decode(request_path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| request_path.to_string());

    let relative = decoded.strip_prefix('/').unwrap_or(&decoded);
    let resolved = lexical_normalize(&root.join(relative));
    let root = lexical_normalize(root);

    // An empty (relative) root prefixes everything; leftover `..` still escapes it.
    let escapes = resolved.components().any(|c| c == Component::ParentDir);
    if !escapes && resolved.strip_prefix(&root).is_ok() {
        LocalPath::Inside(resolved)
    } else {
        LocalPath::Forbidden(resolved)
    }
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/srv/project")
    }

    #[test]
    fn plain_paths_resolve_inside() {
        assert_eq!(
            resolve_local_path(&root(), "/styles/main.css"),
            LocalPath::Inside(PathBuf::from("/srv/project/styles/main.css"))
        );
    }

    #[test]
    fn dot_segments_inside_root_are_fine() {
        assert_eq!(
            resolve_local_path(&root(), "/a/../b/./c.html"),
            LocalPath::Inside(PathBuf::from("/srv/project/b/c.html"))
        );
    }

    #[test]
    fn traversal_is_forbidden() {
        let cases = [
            "/../secret.html",
            "/a/../../secret.html",
            "/%2e%2e/secret.html",
            "/..%2fsecret.html",
            "/%2F..%2F..%2Fetc%2Fpasswd",
            "/..%5c..%2fsecret",
            "//etc/passwd",
        ];
        for case in cases {
            let result = resolve_local_path(&root(), case);
            if let LocalPath::Inside(p) = &result {
                assert!(p.starts_with("/srv/project"), "{} resolved to {:?}", case, p);
            }
        }
        assert!(matches!(
            resolve_local_path(&root(), "/%2e%2e/secret.html"),
            LocalPath::Forbidden(_)
        ));
        assert!(matches!(
            resolve_local_path(&root(), "/..%2f..%2fetc/passwd"),
            LocalPath::Forbidden(_)
        ));
    }

    #[test]
    fn sibling_directory_with_common_prefix_is_forbidden() {
        assert_eq!(
            resolve_local_path(&root(), "/../project-evil/x.html"),
            LocalPath::Forbidden(PathBuf::from("/srv/project-evil/x.html"))
        );
    }

    #[test]
    fn relative_roots_work() {
        let result = resolve_local_path(Path::new("./site"), "/../x.html");
        assert!(matches!(result, LocalPath::Forbidden(_)));
        let result = resolve_local_path(Path::new("./site"), "/x.html");
        assert_eq!(result, LocalPath::Inside(PathBuf::from("site/x.html")));
    }

    #[test]
    fn current_directory_root_still_blocks_parents() {
        let result = resolve_local_path(Path::new("."), "/%2e%2e/x.html");
        assert!(matches!(result, LocalPath::Forbidden(_)));
        let result = resolve_local_path(Path::new("."), "/x.html");
        assert_eq!(result, LocalPath::Inside(PathBuf::from("x.html")));
    }
}
