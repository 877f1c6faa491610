//! Permission strings and chmod mode arithmetic
//!
//! A [`Permissions`] value renders as the familiar 10-character string
//! (`drwxr-xr-x`). A [`ModeSpec`] is a parsed chmod expression, either
//! numeric (`755`) or symbolic (`u+x,g=r`), that can be applied to an
//! existing permission value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

const READ: u16 = 0o4;
const WRITE: u16 = 0o2;
const EXEC: u16 = 0o1;

/// Permission classes, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Owner,
    Group,
    Other,
}

impl Class {
    fn shift(self) -> u16 {
        match self {
            Class::Owner => 6,
            Class::Group => 3,
            Class::Other => 0,
        }
    }
}

/// Requested access kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl Access {
    fn bit(self) -> u16 {
        match self {
            Access::Read => READ,
            Access::Write => WRITE,
            Access::Execute => EXEC,
        }
    }
}

/// Type character plus three rwx triplets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Permissions {
    directory: bool,
    bits: u16,
}

impl Permissions {
    /// Regular file permissions from mode bits (masked to 0o777).
    pub const fn file(bits: u16) -> Self {
        Self {
            directory: false,
            bits: bits & 0o777,
        }
    }

    /// Directory permissions from mode bits (masked to 0o777).
    pub const fn directory(bits: u16) -> Self {
        Self {
            directory: true,
            bits: bits & 0o777,
        }
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn is_directory(&self) -> bool {
        self.directory
    }

    /// Same type character, new mode bits.
    pub fn with_bits(self, bits: u16) -> Self {
        Self {
            directory: self.directory,
            bits: bits & 0o777,
        }
    }

    /// Whether `class` holds the `access` bit.
    pub fn allows(&self, class: Class, access: Access) -> bool {
        (self.bits >> class.shift()) & access.bit() != 0
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(10);
        out.push(if self.directory { 'd' } else { '-' });
        for class in [Class::Owner, Class::Group, Class::Other] {
            let triplet = (self.bits >> class.shift()) & 0o7;
            out.push(if triplet & READ != 0 { 'r' } else { '-' });
            out.push(if triplet & WRITE != 0 { 'w' } else { '-' });
            out.push(if triplet & EXEC != 0 { 'x' } else { '-' });
        }
        f.write_str(&out)
    }
}

impl FromStr for Permissions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Validation(format!("invalid permission string: '{}'", s));
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 10 {
            return Err(invalid());
        }
        let directory = match chars[0] {
            'd' => true,
            '-' => false,
            _ => return Err(invalid()),
        };
        let mut bits = 0u16;
        for (i, expected) in "rwxrwxrwx".chars().enumerate() {
            bits <<= 1;
            match chars[i + 1] {
                '-' => {}
                c if c == expected => bits |= 1,
                _ => return Err(invalid()),
            }
        }
        Ok(Self { directory, bits })
    }
}

impl From<Permissions> for String {
    fn from(p: Permissions) -> Self {
        p.to_string()
    }
}

impl TryFrom<String> for Permissions {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Symbolic clause operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Remove,
    Set,
}

/// One `who op perms` clause of a symbolic mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clause {
    /// Affected bits across all selected classes (e.g. 0o700 for `u`).
    who: u16,
    op: Op,
    /// rwx bits in the low triplet.
    perms: u16,
}

impl Clause {
    fn apply(&self, bits: u16) -> u16 {
        let mut spread = 0u16;
        for class in [Class::Owner, Class::Group, Class::Other] {
            spread |= self.perms << class.shift();
        }
        let spread = spread & self.who;
        match self.op {
            Op::Add => bits | spread,
            Op::Remove => bits & !spread,
            Op::Set => (bits & !self.who) | spread,
        }
    }
}

/// A parsed chmod mode expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSpec {
    /// Three octal digits: absolute mode bits.
    Numeric(u16),
    /// Comma-separated clauses applied left to right.
    Symbolic(Vec<Clause>),
}

impl ModeSpec {
    /// Apply this mode to existing permissions, preserving the type character.
    pub fn apply(&self, current: Permissions) -> Permissions {
        match self {
            ModeSpec::Numeric(bits) => current.with_bits(*bits),
            ModeSpec::Symbolic(clauses) => {
                let bits = clauses
                    .iter()
                    .fold(current.bits(), |bits, clause| clause.apply(bits));
                current.with_bits(bits)
            }
        }
    }
}

impl FromStr for ModeSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Validation(format!("invalid mode: '{}'", s));

        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            if s.len() != 3 || s.chars().any(|c| c > '7') {
                return Err(invalid());
            }
            let bits = u16::from_str_radix(s, 8).map_err(|_| invalid())?;
            return Ok(ModeSpec::Numeric(bits));
        }

        let mut clauses = Vec::new();
        for clause in s.split(',') {
            clauses.push(parse_clause(clause).ok_or_else(invalid)?);
        }
        Ok(ModeSpec::Symbolic(clauses))
    }
}

fn parse_clause(clause: &str) -> Option<Clause> {
    let mut chars = clause.chars().peekable();

    let mut who = 0u16;
    while let Some(&c) = chars.peek() {
        who |= match c {
            'u' => 0o700,
            'g' => 0o070,
            'o' => 0o007,
            'a' => 0o777,
            _ => break,
        };
        chars.next();
    }
    if who == 0 {
        who = 0o777;
    }

    let op = match chars.next()? {
        '+' => Op::Add,
        '-' => Op::Remove,
        '=' => Op::Set,
        _ => return None,
    };

    let mut perms = 0u16;
    for c in chars {
        perms |= match c {
            'r' => READ,
            'w' => WRITE,
            'x' => EXEC,
            _ => return None,
        };
    }

    Some(Clause { who, op, perms })
}
