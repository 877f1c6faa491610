//! Path resolution
//!
//! All user-supplied paths go through [`resolve_path`] before they reach a
//! [`FileSystem`](super::FileSystem). Resolution is purely lexical: there are
//! no symlinks to follow.

use std::path::{Component, Path, PathBuf};

/// Resolve a path relative to the current working directory.
///
/// - absolute paths are used as given (after normalization)
/// - `~` and `~/x` resolve against `home`
/// - everything else is joined onto `cwd`
///
/// `-` (previous directory) is handled by `cd` itself, since resolving it
/// also updates the session.
///
/// # Example
///
/// ```ignore
/// let abs = resolve_path(Path::new("/home"), Path::new("/root"), "/etc/passwd");
/// assert_eq!(abs, PathBuf::from("/etc/passwd"));
///
/// let rel = resolve_path(Path::new("/home"), Path::new("/root"), "file.txt");
/// assert_eq!(rel, PathBuf::from("/home/file.txt"));
/// ```
pub fn resolve_path(cwd: &Path, home: &Path, path_str: &str) -> PathBuf {
    let joined = if path_str == "~" {
        home.to_path_buf()
    } else if let Some(rest) = path_str.strip_prefix("~/") {
        home.join(rest)
    } else {
        let path = Path::new(path_str);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        }
    };
    normalize_path(&joined)
}

/// Normalize a path by resolving `.` and `..` components.
///
/// Duplicate and trailing slashes disappear along the way; `..` above the
/// root stays at the root.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::from("/");

    for component in path.components() {
        match component {
            Component::Normal(name) => result.push(name),
            Component::ParentDir => {
                result.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }

    result
}

/// Whether `path` equals `ancestor` or lies below it.
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

/// Final path component as a string, or `/` for the root.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string())
}
