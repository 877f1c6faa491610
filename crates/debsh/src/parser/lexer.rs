//! Lexer for debsh command lines
//!
//! Splits one input line into words and operators. Quoting is tracked per
//! segment so later expansion stages can tell `*` from `'*'`.

use super::tokens::{Quote, Token, Word};
use crate::error::{Error, Result};

/// Lexer for a single command line.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    /// Lookahead buffer for the `1>` / `0<` synonyms.
    rest: &'a str,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            rest: input,
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next();
        if let Some(c) = ch {
            self.rest = &self.rest[c.len_utf8()..];
        }
        ch
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Lex the whole input.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Get the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace();
        let Some(ch) = self.peek_char() else {
            return Ok(None);
        };

        if let Some(op) = self.numbered_redirect() {
            return Ok(Some(op));
        }

        match ch {
            '|' => {
                self.advance();
                Ok(Some(Token::Pipe))
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('>') {
                    self.advance();
                    Ok(Some(Token::RedirectAppend))
                } else {
                    Ok(Some(Token::RedirectOut))
                }
            }
            '<' => {
                self.advance();
                Ok(Some(Token::RedirectIn))
            }
            '#' => {
                // Comment runs to end of line
                while self.advance().is_some() {}
                Ok(None)
            }
            _ => self.read_word().map(|w| Some(Token::Word(w))),
        }
    }

    /// `1>`, `1>>` and `0<` at the start of a word.
    fn numbered_redirect(&mut self) -> Option<Token> {
        let (token, len) = if self.rest.starts_with("1>>") {
            (Token::RedirectAppend, 3)
        } else if self.rest.starts_with("1>") {
            (Token::RedirectOut, 2)
        } else if self.rest.starts_with("0<") {
            (Token::RedirectIn, 2)
        } else {
            return None;
        };
        for _ in 0..len {
            self.advance();
        }
        Some(token)
    }

    fn read_word(&mut self) -> Result<Word> {
        let mut word = Word::default();

        while let Some(ch) = self.peek_char() {
            match ch {
                c if c.is_whitespace() => break,
                '|' | '>' | '<' => break,
                '\'' | '"' => {
                    self.advance();
                    self.read_quoted(&mut word, ch)?;
                }
                '\\' => {
                    self.advance();
                    match self.advance() {
                        Some(escaped) => word.push(escaped, Quote::Escaped),
                        None => word.push('\\', Quote::None),
                    }
                }
                _ => {
                    self.advance();
                    word.push(ch, Quote::None);
                }
            }
        }

        Ok(word)
    }

    /// Read up to the matching `quote`. Inside, a backslash escapes only the
    /// quote character or another backslash; otherwise it stays literal.
    fn read_quoted(&mut self, word: &mut Word, quote: char) -> Result<()> {
        let kind = if quote == '\'' {
            Quote::Single
        } else {
            Quote::Double
        };
        word.open(kind);

        loop {
            match self.advance() {
                None => return Err(Error::UnterminatedQuote { quote }),
                Some(c) if c == quote => return Ok(()),
                Some('\\') => match self.peek_char() {
                    Some(next) if next == quote || next == '\\' => {
                        self.advance();
                        word.push(next, kind);
                    }
                    _ => word.push('\\', kind),
                },
                Some(c) => word.push(c, kind),
            }
        }
    }
}
