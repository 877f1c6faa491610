//! Glob matching against directory listings
//!
//! Only `*` (any run of characters) and `?` (exactly one character) are
//! special. Matching is against the direct children of one directory.

use std::path::Path;

use crate::fs::FileSystem;

/// Whether `word` contains glob metacharacters.
pub fn has_glob(word: &str) -> bool {
    word.contains(['*', '?'])
}

/// Match `name` against `pattern`.
///
/// Names starting with `.` only match a pattern that starts with `.`.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    if name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }

    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    // Position of the last `*` and the name index it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while ni < n.len() {
        match p.get(pi) {
            Some('*') => {
                backtrack = Some((pi, ni));
                pi += 1;
            }
            Some('?') => {
                pi += 1;
                ni += 1;
            }
            Some(&c) if c == n[ni] => {
                pi += 1;
                ni += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    pi = star + 1;
                    ni = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// Expand `pattern` against the filesystem.
///
/// The part after the last `/` is matched against the children of the
/// directory named by the part before it (or `cwd` when there is none).
/// Results keep the pattern's directory prefix and come back sorted. A
/// prefix that itself contains metacharacters, or a directory that cannot
/// be listed, yields no matches.
pub async fn expand_glob(fs: &dyn FileSystem, cwd: &Path, home: &Path, pattern: &str) -> Vec<String> {
    let (prefix, file_pattern) = match pattern.rfind('/') {
        Some(idx) => (&pattern[..=idx], &pattern[idx + 1..]),
        None => ("", pattern),
    };
    if has_glob(prefix) {
        return Vec::new();
    }

    let dir = if prefix.is_empty() {
        cwd.to_path_buf()
    } else {
        crate::fs::resolve_path(cwd, home, prefix)
    };

    let Ok(entries) = fs.read_dir(&dir).await else {
        return Vec::new();
    };

    let mut matches: Vec<String> = entries
        .into_iter()
        .filter(|e| glob_match(file_pattern, &e.name))
        .map(|e| format!("{prefix}{}", e.name))
        .collect();
    matches.sort();
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{InMemoryFs, Ownership};

    #[test]
    fn test_star() {
        assert!(glob_match("*.txt", "notes.txt"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("*.txt", "notes.md"));
        assert!(glob_match("*a", "banana"));
    }

    #[test]
    fn test_question_mark() {
        assert!(glob_match("file?.rs", "file1.rs"));
        assert!(!glob_match("file?.rs", "file.rs"));
        assert!(!glob_match("?", ""));
    }

    #[test]
    fn test_hidden_files_need_explicit_dot() {
        assert!(!glob_match("*", ".profile"));
        assert!(!glob_match("?profile", ".profile"));
        assert!(glob_match(".*", ".profile"));
    }

    #[test]
    fn test_has_glob() {
        assert!(has_glob("*.rs"));
        assert!(has_glob("a?"));
        assert!(!has_glob("plain"));
    }

    #[tokio::test]
    async fn test_expand_glob_sorted_with_prefix() {
        let fs = InMemoryFs::new();
        let owner = Ownership::root();
        fs.mkdir(Path::new("/data"), false, &owner).await.unwrap();
        for name in ["b.txt", "a.txt", "c.md", ".hidden.txt"] {
            fs.write_file(&Path::new("/data").join(name), b"", &owner)
                .await
                .unwrap();
        }

        let cwd = Path::new("/data");
        let home = Path::new("/root");
        assert_eq!(
            expand_glob(&fs, cwd, home, "*.txt").await,
            vec!["a.txt", "b.txt"]
        );
        assert_eq!(
            expand_glob(&fs, Path::new("/"), home, "data/*.md").await,
            vec!["data/c.md"]
        );
        assert!(expand_glob(&fs, cwd, home, "*.rs").await.is_empty());
        assert!(expand_glob(&fs, cwd, home, "nope/*").await.is_empty());
    }
}
