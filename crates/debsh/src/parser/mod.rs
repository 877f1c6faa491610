//! Parser module for debsh
//!
//! Turns one input line into a [`Line`]: the lexer produces words and
//! operators, and the parser groups them into pipeline stages, pulling
//! redirection operators and their targets out of each stage's arguments.

mod ast;
mod lexer;
mod tokens;

pub use ast::*;
pub use lexer::Lexer;
pub use tokens::{Quote, Segment, Token, Word, is_valid_var_name};

use crate::error::{Error, Result};

/// Parser for a single command line.
pub struct Parser {
    tokens: std::iter::Peekable<std::vec::IntoIter<Token>>,
}

impl Parser {
    /// Lex `input` and prepare to parse it.
    pub fn new(input: &str) -> Result<Self> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self {
            tokens: tokens.into_iter().peekable(),
        })
    }

    /// Parse the line.
    pub fn parse(mut self) -> Result<Line> {
        let single = self.tokens.len() == 1;
        let Some(first) = self.tokens.peek() else {
            return Ok(Line::Empty);
        };

        if single
            && let Token::Word(word) = first
            && let Some((name, value)) = word.split_assignment()
        {
            return Ok(Line::Assignment { name, value });
        }

        let mut stages = vec![self.parse_stage()?];
        while self.tokens.next_if_eq(&Token::Pipe).is_some() {
            stages.push(self.parse_stage()?);
        }
        Ok(Line::Pipeline(Pipeline { stages }))
    }

    fn parse_stage(&mut self) -> Result<Stage> {
        let mut stage = Stage::default();

        while let Some(token) = self.tokens.peek() {
            let kind = match token {
                Token::Pipe => break,
                Token::Word(_) => {
                    if let Some(Token::Word(word)) = self.tokens.next() {
                        stage.words.push(word);
                    }
                    continue;
                }
                Token::RedirectOut => RedirectKind::Output,
                Token::RedirectAppend => RedirectKind::Append,
                Token::RedirectIn => RedirectKind::Input,
            };
            self.tokens.next();
            match self.tokens.next() {
                Some(Token::Word(target)) => stage.redirects.push(Redirect { kind, target }),
                Some(other) => return Err(unexpected(&other.to_string())),
                None => return Err(unexpected("newline")),
            }
        }

        if stage.words.is_empty() && stage.redirects.is_empty() {
            return Err(unexpected("|"));
        }
        Ok(stage)
    }
}

fn unexpected(token: &str) -> Error {
    Error::Parse(format!("near unexpected token `{}'", token))
}

/// Split a line into plain strings: words with quoting removed, operators
/// as their source text.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    Ok(Lexer::new(line)
        .tokenize()?
        .into_iter()
        .map(|t| t.to_string())
        .collect())
}
