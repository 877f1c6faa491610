//! Word expansion
//!
//! Expansion order is fixed: brace groups, then variables, then globs.
//! Quoting decides which steps apply to a word:
//!
//! | word                      | braces | variables            | glob |
//! |---------------------------|--------|----------------------|------|
//! | unquoted                  | yes    | yes                  | yes  |
//! | any quoted/escaped part   | no     | unquoted and `"..."` | no   |
//!
//! There is no field splitting: a variable's value stays one argument.

mod brace;
mod glob;

pub use brace::{expand_braces, expand_braces_limited};
pub use glob::{expand_glob, glob_match, has_glob};

use std::path::Path;

use crate::error::Result;
use crate::fs::FileSystem;
use crate::parser::{Quote, Word};

/// Variable resolver handed to expansion.
pub type VarLookup<'a> = dyn Fn(&str) -> Option<String> + Sync + 'a;

/// Replace `$NAME`, `${NAME}` and `$?` using `lookup`.
///
/// Undefined names become the empty string. A `$` that does not start a
/// reference is kept literally.
pub fn substitute_vars(text: &str, lookup: &VarLookup<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().map(|&(_, next)| next) {
            Some('?') => {
                chars.next();
                out.push_str(&lookup("?").unwrap_or_default());
            }
            Some('{') => match text[i + 2..].find('}') {
                Some(len) if crate::parser::is_valid_var_name(&text[i + 2..i + 2 + len]) => {
                    let name = &text[i + 2..i + 2 + len];
                    out.push_str(&lookup(name).unwrap_or_default());
                    // Skip `{`, the name and `}`
                    for _ in 0..name.chars().count() + 2 {
                        chars.next();
                    }
                }
                _ => out.push('$'),
            },
            Some(next) if next.is_ascii_alphabetic() || next == '_' => {
                let mut name = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&lookup(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }

    out
}

/// Filesystem view a glob needs.
pub struct GlobScope<'a> {
    pub fs: &'a dyn FileSystem,
    pub cwd: &'a Path,
    pub home: &'a Path,
}

/// Result of expanding one word.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Resulting arguments, in order
    pub fields: Vec<String>,
    /// Glob patterns that matched nothing and were passed through literally
    pub unmatched: Vec<String>,
}

/// Expand a single word into zero or more arguments.
pub async fn expand_word(
    word: &Word,
    lookup: &VarLookup<'_>,
    scope: &GlobScope<'_>,
    max_brace: usize,
) -> Result<Expansion> {
    let mut expansion = Expansion::default();

    if word.is_quoted() {
        expansion.fields.push(expand_quoted(word, lookup));
        return Ok(expansion);
    }

    let text = word.text();
    for braced in expand_braces_limited(&text, max_brace)? {
        let value = substitute_vars(&braced, lookup);
        if value.is_empty() {
            continue;
        }
        if has_glob(&value) {
            let matches = expand_glob(scope.fs, scope.cwd, scope.home, &value).await;
            if matches.is_empty() {
                expansion.unmatched.push(value.clone());
                expansion.fields.push(value);
            } else {
                expansion.fields.extend(matches);
            }
        } else {
            expansion.fields.push(value);
        }
    }

    Ok(expansion)
}

/// Variables only: the word always yields exactly one argument.
pub fn expand_quoted(word: &Word, lookup: &VarLookup<'_>) -> String {
    word.segments
        .iter()
        .map(|seg| match seg.quote {
            Quote::None | Quote::Double => substitute_vars(&seg.text, lookup),
            Quote::Single | Quote::Escaped => seg.text.clone(),
        })
        .collect()
}
