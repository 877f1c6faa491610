//! AST types for parsed command lines

use super::tokens::Word;
use crate::error::{Error, Result};

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// Blank line or comment
    Empty,
    /// A lone `NAME=VALUE` word
    Assignment { name: String, value: Word },
    /// One or more stages joined by `|`
    Pipeline(Pipeline),
}

/// A pipeline of commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

/// A single pipeline stage: arguments plus its redirections, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage {
    pub words: Vec<Word>,
    pub redirects: Vec<Redirect>,
}

/// A redirection before expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: Word,
}

/// Types of redirections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// > (truncate/create)
    Output,
    /// >> (append/create)
    Append,
    /// < (read)
    Input,
}

/// Resolved redirection targets for one stage, after expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirection {
    pub output: Option<String>,
    pub append: Option<String>,
    pub input: Option<String>,
}

impl Redirection {
    /// Record one operator. A repeated kind replaces the earlier target.
    pub fn set(&mut self, kind: RedirectKind, target: String) {
        match kind {
            RedirectKind::Output => self.output = Some(target),
            RedirectKind::Append => self.append = Some(target),
            RedirectKind::Input => self.input = Some(target),
        }
    }

    /// Reject empty targets and `>` combined with `>>`.
    pub fn validate(&self) -> Result<()> {
        if self.output.is_some() && self.append.is_some() {
            return Err(Error::Parse(
                "cannot redirect output with both > and >>".into(),
            ));
        }
        for target in [&self.output, &self.append, &self.input].into_iter().flatten() {
            if target.is_empty() {
                return Err(Error::Parse("No such file or directory: ''".into()));
            }
        }
        Ok(())
    }

    /// Output target and whether it appends.
    pub fn sink(&self) -> Option<(&str, bool)> {
        match (&self.output, &self.append) {
            (Some(path), _) => Some((path, false)),
            (None, Some(path)) => Some((path, true)),
            (None, None) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_none() && self.append.is_none() && self.input.is_none()
    }
}
