//! Command implementations
//!
//! Every command, shell builtin or not, implements [`Builtin`] and works
//! against the session, the VFS and the identity store through a
//! [`Context`]. Commands never write to a global sink: they return their
//! output in an [`ExecResult`] and the interpreter routes it to the next
//! pipeline stage, a redirection target or the caller.

mod cat;
mod echo;
mod environ;
mod export;
mod fileops;
mod flow;
mod ls;
mod navigation;
mod passwd;
mod system;
mod users;

pub use cat::Cat;
pub use echo::Echo;
pub use environ::Env;
pub use export::{Export, Unset};
pub use fileops::{Chmod, Chown, Mkdir, Mv, Rm, Touch};
pub use flow::{Exit, False, True};
pub use ls::Ls;
pub use navigation::{Cd, Pwd};
pub use passwd::{Passwd, Su};
pub use system::{Groups, Hostname, Id, Whoami};
pub use users::{Groupadd, Groupdel, Useradd, Userdel, Usermod};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::fs::FileSystem;
use crate::identity::{IdentityStore, Principal};
use crate::interpreter::{ExecResult, Pending, Session};

/// What happens when a glob argument matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobPolicy {
    /// The command receives the pattern text as a literal argument.
    PassLiteral,
    /// The line fails with `<cmd>: no matches found: <pattern>`.
    Reject,
}

/// Execution context for a command.
pub struct Context<'a> {
    /// Command arguments (not including the command name).
    pub args: &'a [String],

    /// Standard input: the previous pipeline stage's output or the `<` file.
    pub stdin: Option<&'a str>,

    /// Working directory, variables and the logged-in identity.
    pub session: &'a mut Session,

    /// Virtual filesystem.
    pub fs: Arc<dyn FileSystem>,

    /// Users, groups and credentials.
    pub identity: &'a IdentityStore,

    pub(crate) suspend: &'a mut Option<Pending>,
}

impl Context<'_> {
    /// The principal the command runs as.
    pub fn user(&self) -> &Principal {
        &self.session.user
    }

    /// Resolve a path argument against the session.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.session.resolve(path)
    }

    /// Suspend on a password prompt.
    pub(crate) fn prompt(&mut self, pending: Pending) -> ExecResult {
        let text = pending.prompt(&self.session.user.username);
        *self.suspend = Some(pending);
        ExecResult::awaiting(text)
    }
}

/// Trait for implementing commands.
///
/// Return [`ExecResult::ok`] for success or [`ExecResult::err`] with the
/// diagnostic and exit code for an ordinary failure. An `Err` is reserved
/// for conditions the dispatcher must handle; anything that does not abort
/// the line is reported as `<cmd>: <error>` with exit code 1.
///
/// # Example
///
/// ```rust
/// use debsh::{Builtin, BuiltinContext, ExecResult, async_trait};
///
/// struct Greet;
///
/// #[async_trait]
/// impl Builtin for Greet {
///     async fn execute(&self, ctx: BuiltinContext<'_>) -> debsh::Result<ExecResult> {
///         let name = ctx.args.first().map(String::as_str).unwrap_or("world");
///         Ok(ExecResult::ok(format!("Hello, {}!\n", name)))
///     }
/// }
/// ```
#[async_trait]
pub trait Builtin: Send + Sync {
    /// Execute the command.
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult>;

    /// Policy for glob arguments that match nothing.
    fn glob_policy(&self) -> GlobPolicy {
        GlobPolicy::PassLiteral
    }
}

/// The built-in command table.
pub(crate) fn defaults() -> HashMap<String, Box<dyn Builtin>> {
    let table: Vec<(&str, Box<dyn Builtin>)> = vec![
        ("echo", Box::new(Echo)),
        ("cat", Box::new(Cat)),
        ("ls", Box::new(Ls)),
        ("mkdir", Box::new(Mkdir)),
        ("touch", Box::new(Touch)),
        ("mv", Box::new(Mv)),
        ("rm", Box::new(Rm)),
        ("chmod", Box::new(Chmod)),
        ("chown", Box::new(Chown)),
        ("cd", Box::new(Cd)),
        ("pwd", Box::new(Pwd)),
        ("export", Box::new(Export)),
        ("unset", Box::new(Unset)),
        ("env", Box::new(Env)),
        ("true", Box::new(True)),
        ("false", Box::new(False)),
        ("exit", Box::new(Exit)),
        ("whoami", Box::new(Whoami)),
        ("id", Box::new(Id)),
        ("groups", Box::new(Groups)),
        ("hostname", Box::new(Hostname)),
        ("useradd", Box::new(Useradd)),
        ("usermod", Box::new(Usermod)),
        ("userdel", Box::new(Userdel)),
        ("groupadd", Box::new(Groupadd)),
        ("groupdel", Box::new(Groupdel)),
        ("passwd", Box::new(Passwd)),
        ("su", Box::new(Su)),
    ];
    table
        .into_iter()
        .map(|(name, builtin)| (name.to_string(), builtin))
        .collect()
}

/// Parsed command-line options.
#[derive(Debug, Default)]
pub(crate) struct Opts {
    flags: Vec<(char, Option<String>)>,
    pub operands: Vec<String>,
}

impl Opts {
    pub fn has(&self, flag: char) -> bool {
        self.flags.iter().any(|(c, _)| *c == flag)
    }

    /// Last value given for `flag`.
    pub fn value(&self, flag: char) -> Option<&str> {
        self.flags
            .iter()
            .rev()
            .find(|(c, _)| *c == flag)
            .and_then(|(_, v)| v.as_deref())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum OptError {
    Invalid(char),
    MissingArgument(char),
    UnrecognizedLong(String),
}

/// getopt-style parsing. `spec` lists short flags; a flag followed by `:`
/// takes a value. `long` maps long names onto short flags. Options and
/// operands may interleave; `--` ends option parsing.
pub(crate) fn parse_opts(
    args: &[String],
    spec: &str,
    long: &[(&str, char)],
) -> std::result::Result<Opts, OptError> {
    let takes_value = |flag: char| -> Option<bool> {
        if flag == ':' {
            return None;
        }
        let idx = spec.find(flag)?;
        Some(spec[idx + flag.len_utf8()..].starts_with(':'))
    };

    let mut opts = Opts::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            opts.operands.extend(iter.by_ref().cloned());
            break;
        }

        if let Some(name) = arg.strip_prefix("--") {
            let (name, inline) = match name.split_once('=') {
                Some((n, v)) => (n, Some(v.to_string())),
                None => (name, None),
            };
            let Some(&(_, flag)) = long.iter().find(|(l, _)| *l == name) else {
                return Err(OptError::UnrecognizedLong(arg.clone()));
            };
            let value = match takes_value(flag) {
                Some(true) => Some(
                    inline
                        .or_else(|| iter.next().cloned())
                        .ok_or(OptError::MissingArgument(flag))?,
                ),
                _ => None,
            };
            opts.flags.push((flag, value));
            continue;
        }

        if arg.len() > 1 && arg.starts_with('-') {
            let chars: Vec<char> = arg[1..].chars().collect();
            for (i, &flag) in chars.iter().enumerate() {
                match takes_value(flag) {
                    None => return Err(OptError::Invalid(flag)),
                    Some(false) => opts.flags.push((flag, None)),
                    Some(true) => {
                        let rest: String = chars[i + 1..].iter().collect();
                        let value = if rest.is_empty() {
                            iter.next().cloned().ok_or(OptError::MissingArgument(flag))?
                        } else {
                            rest
                        };
                        opts.flags.push((flag, Some(value)));
                        break;
                    }
                }
            }
            continue;
        }

        opts.operands.push(arg.clone());
    }
    Ok(opts)
}

/// Diagnostic for a bad option, in the coreutils wording.
pub(crate) fn usage_error(cmd: &str, err: OptError, exit_code: i32) -> ExecResult {
    let first = match err {
        OptError::Invalid(c) => format!("{cmd}: invalid option -- '{c}'"),
        OptError::MissingArgument(c) => format!("{cmd}: option requires an argument -- '{c}'"),
        OptError::UnrecognizedLong(opt) => format!("{cmd}: unrecognized option '{opt}'"),
    };
    ExecResult::err(
        format!("{first}\nTry '{cmd} --help' for more information.\n"),
        exit_code,
    )
}

/// Identity-changing commands need root.
pub(crate) fn require_root(cmd: &str, ctx: &Context<'_>) -> Option<ExecResult> {
    if ctx.user().is_root() {
        None
    } else {
        Some(ExecResult::err(
            format!("{cmd}: Permission denied.\n{cmd}: cannot lock /etc/passwd; try again later.\n"),
            1,
        ))
    }
}
