//! Brace expansion
//!
//! `pre{a,b}post` becomes `preapost prebpost`. Groups nest, the first
//! expandable group is expanded and the results are re-scanned. Sequence
//! groups `{1..5}` and `{a..e}` are also recognized. A brace pair with no
//! top-level comma and no valid sequence is left as written.

use std::convert::Infallible;

use crate::limits::LimitExceeded;

/// Expand every brace group in `word`, with no result bound.
pub fn expand_braces(word: &str) -> Vec<String> {
    let mut out = Vec::new();
    let Ok(()) = expand_into(word, &mut |w| {
        out.push(w);
        Ok::<(), Infallible>(())
    });
    out
}

/// Expand every brace group, failing once more than `max` words result.
///
/// Sequence groups are produced lazily, so `{1..100000000}` stops after
/// `max + 1` words rather than building the whole range.
pub fn expand_braces_limited(word: &str, max: usize) -> Result<Vec<String>, LimitExceeded> {
    let mut out = Vec::new();
    expand_into(word, &mut |w| {
        if out.len() >= max {
            return Err(LimitExceeded::BraceExpansion(max));
        }
        out.push(w);
        Ok(())
    })?;
    Ok(out)
}

fn expand_into<E>(
    word: &str,
    emit: &mut impl FnMut(String) -> Result<(), E>,
) -> Result<(), E> {
    let Some(group) = find_group(word) else {
        return emit(word.to_string());
    };

    let prefix = &word[..group.open];
    let suffix = &word[group.close + 1..];
    for option in group.options.into_words() {
        expand_into(&format!("{prefix}{option}{suffix}"), &mut *emit)?;
    }
    Ok(())
}

struct Group {
    /// Byte offset of `{`
    open: usize,
    /// Byte offset of the matching `}`
    close: usize,
    options: Options,
}

/// Alternatives of one group. Ranges stay unmaterialized.
enum Options {
    List(Vec<String>),
    Numbers(i64, i64),
    Letters(char, char),
}

impl Options {
    fn into_words(self) -> Box<dyn Iterator<Item = String>> {
        match self {
            Options::List(items) => Box::new(items.into_iter()),
            Options::Numbers(a, b) if a <= b => Box::new((a..=b).map(|n| n.to_string())),
            Options::Numbers(a, b) => Box::new((b..=a).rev().map(|n| n.to_string())),
            Options::Letters(a, b) if a <= b => Box::new((a..=b).map(String::from)),
            Options::Letters(a, b) => Box::new((b..=a).rev().map(String::from)),
        }
    }
}

/// Locate the first brace pair that actually expands.
fn find_group(word: &str) -> Option<Group> {
    let bytes = word.as_bytes();
    for (open, &b) in bytes.iter().enumerate() {
        if b != b'{' {
            continue;
        }
        let Some(close) = matching_close(bytes, open) else {
            continue;
        };
        let inner = &word[open + 1..close];
        let parts = split_top_level(inner);
        let options = if parts.len() > 1 {
            Options::List(parts)
        } else if let Some(range) = sequence(inner) {
            range
        } else {
            continue;
        };
        return Some(Group {
            open,
            close,
            options,
        });
    }
    None
}

fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas that are not inside a nested brace pair.
fn split_top_level(inner: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(inner[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(inner[start..].to_string());
    parts
}

/// `{1..5}`, `{5..1}`, `{a..e}`.
fn sequence(inner: &str) -> Option<Options> {
    let (from, to) = inner.split_once("..")?;

    if let (Ok(a), Ok(b)) = (from.parse::<i64>(), to.parse::<i64>()) {
        return Some(Options::Numbers(a, b));
    }

    let mut a_chars = from.chars();
    let mut b_chars = to.chars();
    match (a_chars.next(), a_chars.next(), b_chars.next(), b_chars.next()) {
        (Some(a), None, Some(b), None) if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
            Some(Options::Letters(a, b))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_group() {
        assert_eq!(
            expand_braces("project/{src,docs}"),
            vec!["project/src", "project/docs"]
        );
    }

    #[test]
    fn test_nested_groups() {
        assert_eq!(
            expand_braces("project/{src/{js,css},docs}"),
            vec!["project/src/js", "project/src/css", "project/docs"]
        );
    }

    #[test]
    fn test_cross_product() {
        assert_eq!(
            expand_braces("{a,b}{1,2}"),
            vec!["a1", "a2", "b1", "b2"]
        );
    }

    #[test]
    fn test_no_braces_is_identity() {
        assert_eq!(expand_braces("plain.txt"), vec!["plain.txt"]);
        assert_eq!(expand_braces("{single}"), vec!["{single}"]);
        assert_eq!(expand_braces("open{a,b"), vec!["open{a,b"]);
        assert_eq!(expand_braces("{}"), vec!["{}"]);
    }

    #[test]
    fn test_empty_options_are_kept() {
        assert_eq!(expand_braces("file{,.bak}"), vec!["file", "file.bak"]);
    }

    #[test]
    fn test_sequences() {
        assert_eq!(expand_braces("{1..3}"), vec!["1", "2", "3"]);
        assert_eq!(expand_braces("v{3..1}"), vec!["v3", "v2", "v1"]);
        assert_eq!(expand_braces("{a..c}"), vec!["a", "b", "c"]);
        assert_eq!(expand_braces("{a..3}"), vec!["{a..3}"]);
    }

    #[test]
    fn test_limit() {
        assert_eq!(
            expand_braces_limited("{a,b}{c,d}{e,f}", 7),
            Err(LimitExceeded::BraceExpansion(7))
        );
        assert_eq!(expand_braces_limited("{a,b}{c,d}{e,f}", 8).unwrap().len(), 8);
    }

    #[test]
    fn test_huge_range_stops_at_limit() {
        assert_eq!(
            expand_braces_limited("{1..9223372036854775807}", 10),
            Err(LimitExceeded::BraceExpansion(10))
        );
        assert_eq!(
            expand_braces_limited("x{100000000..1}", 3),
            Err(LimitExceeded::BraceExpansion(3))
        );
        assert_eq!(
            expand_braces_limited("{1..3}", 3).unwrap(),
            vec!["1", "2", "3"]
        );
    }
}
