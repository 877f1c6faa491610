//! Colon-delimited identity records
//!
//! One line per record, in the classic layouts:
//!
//! ```text
//! /etc/passwd  username:x:uid:gid:gecos:home:shell
//! /etc/shadow  username:hash:lastchanged:min:max:warn:inactive:expire:
//! /etc/group   groupname:x:gid:member1,member2
//! ```

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use super::IdentityError;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]{0,31}$").expect("static regex compiles")
});

/// Valid user or group name.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

fn malformed(line: &str, what: &str) -> IdentityError {
    IdentityError::Malformed(format!("{what}: '{line}'"))
}

fn parse_id(field: &str, line: &str) -> Result<u32, IdentityError> {
    field.parse().map_err(|_| malformed(line, "invalid id"))
}

fn parse_days(field: &str, line: &str) -> Result<Option<u64>, IdentityError> {
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| malformed(line, "invalid day count"))
}

fn days(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// A `/etc/passwd` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub username: String,
    /// Always `x`: the hash lives in the shadow file
    pub password: String,
    pub uid: u32,
    pub gid: u32,
    pub gecos: String,
    pub home: String,
    pub shell: String,
}

impl FromStr for PasswdEntry {
    type Err = IdentityError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split(':').collect();
        let [username, password, uid, gid, gecos, home, shell] = fields[..] else {
            return Err(malformed(line, "passwd entry needs 7 fields"));
        };
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            uid: parse_id(uid, line)?,
            gid: parse_id(gid, line)?,
            gecos: gecos.to_string(),
            home: home.to_string(),
            shell: shell.to_string(),
        })
    }
}

impl fmt::Display for PasswdEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}",
            self.username, self.password, self.uid, self.gid, self.gecos, self.home, self.shell
        )
    }
}

/// A `/etc/shadow` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowEntry {
    pub username: String,
    /// `$5$salt$digest`, `!`-prefixed when locked, empty when removed
    pub hash: String,
    /// Days since the epoch of the last password change
    pub last_changed: Option<u64>,
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub warn: Option<u64>,
    pub inactive: Option<u64>,
    /// Account expiry, days since the epoch
    pub expire: Option<u64>,
}

impl ShadowEntry {
    /// Fresh locked entry with Debian's default aging.
    pub fn locked(username: &str, today: u64) -> Self {
        Self {
            username: username.to_string(),
            hash: "!".to_string(),
            last_changed: Some(today),
            min: Some(0),
            max: Some(99999),
            warn: Some(7),
            inactive: None,
            expire: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.hash.starts_with('!')
    }

    /// `P` usable password, `L` locked, `NP` no password.
    pub fn status(&self) -> &'static str {
        if self.is_locked() {
            "L"
        } else if self.hash.is_empty() {
            "NP"
        } else {
            "P"
        }
    }
}

impl FromStr for ShadowEntry {
    type Err = IdentityError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split(':').collect();
        // The ninth field is reserved and always empty.
        let fields = match fields.len() {
            8 => &fields[..],
            9 if fields[8].is_empty() => &fields[..8],
            _ => return Err(malformed(line, "shadow entry needs 9 fields")),
        };
        let &[username, hash, last, min, max, warn, inactive, expire] = fields else {
            return Err(malformed(line, "shadow entry needs 9 fields"));
        };
        Ok(Self {
            username: username.to_string(),
            hash: hash.to_string(),
            last_changed: parse_days(last, line)?,
            min: parse_days(min, line)?,
            max: parse_days(max, line)?,
            warn: parse_days(warn, line)?,
            inactive: parse_days(inactive, line)?,
            expire: parse_days(expire, line)?,
        })
    }
}

impl fmt::Display for ShadowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}:{}:",
            self.username,
            self.hash,
            days(self.last_changed),
            days(self.min),
            days(self.max),
            days(self.warn),
            days(self.inactive),
            days(self.expire)
        )
    }
}

/// A `/etc/group` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub password: String,
    pub gid: u32,
    /// Ordered, duplicate-free supplementary members
    pub members: Vec<String>,
}

impl GroupEntry {
    pub fn new(name: &str, gid: u32) -> Self {
        Self {
            name: name.to_string(),
            password: "x".to_string(),
            gid,
            members: Vec::new(),
        }
    }

    /// Add a member unless already present.
    pub fn add_member(&mut self, user: &str) {
        if !self.has_member(user) {
            self.members.push(user.to_string());
        }
    }

    pub fn remove_member(&mut self, user: &str) {
        self.members.retain(|m| m != user);
    }

    pub fn has_member(&self, user: &str) -> bool {
        self.members.iter().any(|m| m == user)
    }
}

impl FromStr for GroupEntry {
    type Err = IdentityError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split(':').collect();
        let [name, password, gid, members] = fields[..] else {
            return Err(malformed(line, "group entry needs 4 fields"));
        };
        let mut entry = Self {
            name: name.to_string(),
            password: password.to_string(),
            gid: parse_id(gid, line)?,
            members: Vec::new(),
        };
        for member in members.split(',').filter(|m| !m.is_empty()) {
            entry.add_member(member);
        }
        Ok(entry)
    }
}

impl fmt::Display for GroupEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.name,
            self.password,
            self.gid,
            self.members.join(",")
        )
    }
}

/// Parse every non-blank line of an identity file.
pub fn parse_file<T>(text: &str) -> Result<Vec<T>, IdentityError>
where
    T: FromStr<Err = IdentityError>,
{
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// Render records one per line with a trailing newline.
pub fn render_file<T: fmt::Display>(entries: &[T]) -> String {
    entries.iter().map(|e| format!("{e}\n")).collect()
}
