//! Token types for the lexer

use std::fmt;

/// How a run of characters inside a word was quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    /// Bare text: subject to every expansion
    None,
    /// `'...'`: literal
    Single,
    /// `"..."`: variables expand, braces and globs do not
    Double,
    /// A single backslash-escaped character outside quotes
    Escaped,
}

/// A run of characters sharing one quoting context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub quote: Quote,
}

/// A shell word: adjacent segments with no separator between them.
///
/// `a"b c"'$d'` is one word made of three segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Word {
    pub segments: Vec<Segment>,
}

impl Word {
    /// Build an unquoted word.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment {
                text: text.into(),
                quote: Quote::None,
            }],
        }
    }

    pub(crate) fn push(&mut self, c: char, quote: Quote) {
        match self.segments.last_mut() {
            Some(seg) if seg.quote == quote && quote != Quote::Escaped => seg.text.push(c),
            _ => self.segments.push(Segment {
                text: c.to_string(),
                quote,
            }),
        }
    }

    /// Open an empty segment so that `""` still yields a word.
    pub(crate) fn open(&mut self, quote: Quote) {
        self.segments.push(Segment {
            text: String::new(),
            quote,
        });
    }

    /// The word with quoting removed.
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Whether any part of the word was quoted or escaped.
    pub fn is_quoted(&self) -> bool {
        self.segments.iter().any(|s| s.quote != Quote::None)
    }

    /// Split `NAME=VALUE` into name and value word.
    ///
    /// The name and `=` must be unquoted; the name is a letter or
    /// underscore followed by letters, digits or underscores.
    pub fn split_assignment(&self) -> Option<(String, Word)> {
        let first = self.segments.first()?;
        if first.quote != Quote::None {
            return None;
        }
        let (name, rest) = first.text.split_once('=')?;
        if !is_valid_var_name(name) {
            return None;
        }

        let mut value = Word::default();
        if !rest.is_empty() {
            value.segments.push(Segment {
                text: rest.to_string(),
                quote: Quote::None,
            });
        }
        value.segments.extend(self.segments[1..].iter().cloned());
        Some((name.to_string(), value))
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word (command name, argument, redirection target)
    Word(Word),

    /// Pipe (|)
    Pipe,

    /// Redirect output (>, 1>)
    RedirectOut,

    /// Redirect output append (>>, 1>>)
    RedirectAppend,

    /// Redirect input (<, 0<)
    RedirectIn,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "{}", w),
            Token::Pipe => f.write_str("|"),
            Token::RedirectOut => f.write_str(">"),
            Token::RedirectAppend => f.write_str(">>"),
            Token::RedirectIn => f.write_str("<"),
        }
    }
}

/// Variable names: letter or underscore, then letters, digits, underscores.
pub fn is_valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_var_names() {
        assert!(is_valid_var_name("HOME"));
        assert!(is_valid_var_name("_x1"));
        assert!(!is_valid_var_name("1x"));
        assert!(!is_valid_var_name(""));
        assert!(!is_valid_var_name("A-B"));
    }

    #[test]
    fn test_split_assignment() {
        let (name, value) = Word::literal("GREETING=hello").split_assignment().unwrap();
        assert_eq!(name, "GREETING");
        assert_eq!(value.text(), "hello");

        let (_, empty) = Word::literal("X=").split_assignment().unwrap();
        assert_eq!(empty.text(), "");

        assert!(Word::literal("=x").split_assignment().is_none());
        assert!(Word::literal("9A=x").split_assignment().is_none());
        assert!(Word::literal("plain").split_assignment().is_none());
    }

    #[test]
    fn test_quoted_name_is_not_assignment() {
        let mut word = Word::default();
        for c in "A=b".chars() {
            word.push(c, Quote::Double);
        }
        assert!(word.split_assignment().is_none());
        assert!(word.is_quoted());
    }
}
