//! debsh - a Debian-flavored shell over a virtual filesystem
//!
//! Lines are lexed, expanded and run against an in-memory filesystem and a
//! Unix identity database kept in `/etc/passwd`, `/etc/shadow` and
//! `/etc/group`. Permission bits, ownership, account administration and
//! password prompts behave the way they do on a Debian system, without a
//! kernel underneath.
//!
//! # Example
//!
//! ```rust
//! use debsh::Shell;
//!
//! #[tokio::main]
//! async fn main() -> debsh::Result<()> {
//!     let mut shell = Shell::new().await?;
//!     shell.exec("echo hello > greeting").await?;
//!     let result = shell.exec("cat greeting").await?;
//!     assert_eq!(result.stdout, "hello\n");
//!
//!     let result = shell.exec("whoami").await?;
//!     assert_eq!(result.stdout, "user\n");
//!     Ok(())
//! }
//! ```
//!
//! # Password prompts
//!
//! `passwd`, `su` and `sudo` return a result whose `prompt` is set. The
//! next line passed to [`Shell::exec`] answers the prompt instead of being
//! parsed:
//!
//! ```rust
//! # use debsh::Shell;
//! # #[tokio::main]
//! # async fn main() -> debsh::Result<()> {
//! let mut shell = Shell::new().await?;
//! let result = shell.exec("su").await?;
//! assert_eq!(result.prompt.as_deref(), Some("Password: "));
//! shell.exec("root").await?;
//! assert_eq!(shell.exec("whoami").await?.stdout, "root\n");
//! # Ok(())
//! # }
//! ```

mod builtins;
mod error;
pub mod expand;
pub mod fs;
pub mod identity;
mod interpreter;
mod limits;
mod logging_impl;
pub mod parser;
pub mod perms;
mod seed;

pub use async_trait::async_trait;
pub use builtins::{Builtin, Context as BuiltinContext, GlobPolicy};
pub use error::{Error, FsError, FsResult, Result};
pub use interpreter::{
    ExecResult, LoginSnapshot, PasswdStage, Pending, Session, SessionSnapshot,
};
pub use limits::{LimitExceeded, ShellLimits};
pub use logging_impl::{LogConfig, format_line_for_log, sanitize_for_log};
pub use parser::tokenize;
pub use seed::{DEFAULT_HOSTNAME, DEFAULT_USER, seed};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs::{FileSystem, FsSnapshot, InMemoryFs};
use identity::{IdentityStore, PASSWD_PATH};
use interpreter::Interpreter;

/// Persistable state of a whole shell: every VFS entry plus the session.
///
/// A pending password prompt is not part of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellSnapshot {
    pub fs: FsSnapshot,
    pub session: SessionSnapshot,
}

impl ShellSnapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("cannot serialize snapshot: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("invalid snapshot: {e}")))
    }
}

/// Main entry point for debsh.
///
/// One interactive session: a logged-in principal, its working directory
/// and variables, over a filesystem shared with the identity store.
pub struct Shell {
    interpreter: Interpreter,
}

impl Shell {
    /// A freshly seeded Debian system, logged in as `user`.
    pub async fn new() -> Result<Self> {
        Self::builder().build().await
    }

    /// Create a new ShellBuilder for customized configuration.
    pub fn builder() -> ShellBuilder {
        ShellBuilder::default()
    }

    /// Execute one input line.
    ///
    /// While a prompt is pending the line is consumed as the answer and is
    /// never parsed or logged. Syntax errors and exceeded limits return
    /// `Err`; the session stays usable either way.
    pub async fn exec(&mut self, line: &str) -> Result<ExecResult> {
        self.interpreter.execute_line(line).await
    }

    /// Execute a script line by line, stopping early when the session
    /// finishes. A line that fails to parse is reported on stderr and the
    /// script continues. Lines following a prompting command answer it.
    pub async fn exec_script(&mut self, script: &str) -> Result<ExecResult> {
        let mut combined = ExecResult::default();
        for (number, line) in script.lines().enumerate() {
            if self.is_finished() {
                break;
            }
            let awaiting = self.interpreter.is_awaiting_input();
            if !awaiting && (line.trim().is_empty() || line.trim_start().starts_with('#')) {
                continue;
            }
            match self.exec(line).await {
                Ok(result) => {
                    combined.stdout.push_str(&result.stdout);
                    combined.stderr.push_str(&result.stderr);
                    combined.exit_code = result.exit_code;
                    combined.prompt = result.prompt;
                }
                Err(e) if e.aborts_line() => {
                    combined
                        .stderr
                        .push_str(&format!("debsh: line {}: {}\n", number + 1, e));
                    combined.exit_code = 2;
                    combined.prompt = None;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(combined)
    }

    /// Abandon a pending password prompt. Nothing is written.
    pub fn cancel_prompt(&mut self) -> bool {
        self.interpreter.cancel_prompt()
    }

    /// Whether the next line answers a prompt.
    pub fn awaiting_input(&self) -> bool {
        self.interpreter.is_awaiting_input()
    }

    /// The prompt to show before reading the next line.
    pub fn prompt_string(&self) -> String {
        self.interpreter
            .pending_prompt()
            .unwrap_or_else(|| self.interpreter.session().prompt_string())
    }

    /// Whether `exit` left the outermost login.
    pub fn is_finished(&self) -> bool {
        self.interpreter.session().finished
    }

    pub fn session(&self) -> &Session {
        self.interpreter.session()
    }

    pub fn fs(&self) -> Arc<dyn FileSystem> {
        self.interpreter.fs()
    }

    pub fn identity(&self) -> &IdentityStore {
        self.interpreter.identity()
    }

    /// Capture the filesystem and session for persistence.
    pub fn snapshot(&self) -> Result<ShellSnapshot> {
        Ok(ShellSnapshot {
            fs: self.interpreter.fs().snapshot()?,
            session: self.interpreter.session().snapshot(),
        })
    }
}

/// Builder for customized Shell configuration.
///
/// ```rust
/// # use debsh::{Shell, ShellLimits};
/// # #[tokio::main]
/// # async fn main() -> debsh::Result<()> {
/// let shell = Shell::builder()
///     .user("root")
///     .hostname("build01")
///     .env("LANG", "C.UTF-8")
///     .limits(ShellLimits::new().max_pipeline_stages(4))
///     .build()
///     .await?;
/// assert_eq!(shell.prompt_string(), "root@build01:~# ");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ShellBuilder {
    user: Option<String>,
    hostname: Option<String>,
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
    fs: Option<Arc<dyn FileSystem>>,
    limits: ShellLimits,
    log_config: LogConfig,
    snapshot: Option<ShellSnapshot>,
    builtins: Vec<(String, Box<dyn Builtin>)>,
}

impl ShellBuilder {
    /// Log in as this user (default `user`).
    pub fn user(mut self, name: impl Into<String>) -> Self {
        self.user = Some(name.into());
        self
    }

    /// Set the hostname. On a fresh filesystem it is also written to
    /// `/etc/hostname`.
    pub fn hostname(mut self, name: impl Into<String>) -> Self {
        self.hostname = Some(name.into());
        self
    }

    /// Set the initial working directory (default: the user's home).
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable below the synthesized ones.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Use a custom filesystem. It is seeded when `/etc/passwd` is missing.
    pub fn fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn limits(mut self, limits: ShellLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    /// Resume from a saved snapshot. Its session wins over `user` and `cwd`.
    pub fn snapshot(mut self, snapshot: ShellSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Register a custom command, replacing any built-in of the same name.
    pub fn builtin(mut self, name: impl Into<String>, builtin: Box<dyn Builtin>) -> Self {
        self.builtins.push((name.into(), builtin));
        self
    }

    /// Build the Shell instance.
    pub async fn build(self) -> Result<Shell> {
        let fs = self
            .fs
            .unwrap_or_else(|| Arc::new(InMemoryFs::new()) as Arc<dyn FileSystem>);

        if let Some(snapshot) = &self.snapshot {
            fs.restore(&snapshot.fs)?;
        } else if !fs.exists(Path::new(PASSWD_PATH)).await? {
            let hostname = self.hostname.as_deref().unwrap_or(DEFAULT_HOSTNAME);
            seed(fs.as_ref(), hostname).await?;
        }

        let hostname = match self.hostname {
            Some(name) => name,
            None => match fs.read_file(Path::new("/etc/hostname")).await {
                Ok(content) => String::from_utf8_lossy(&content).trim().to_string(),
                Err(_) => DEFAULT_HOSTNAME.to_string(),
            },
        };

        let identity = IdentityStore::new(Arc::clone(&fs));
        let session = match &self.snapshot {
            Some(snapshot) => {
                snapshot
                    .session
                    .restore(&identity, hostname, self.env)
                    .await?
            }
            None => {
                let name = self.user.as_deref().unwrap_or(DEFAULT_USER);
                let user = identity.principal(name).await?;
                let cwd = self.cwd.unwrap_or_else(|| user.home.clone());
                let mut session = Session::new(user, hostname, cwd);
                session.base_env = self.env;
                session
            }
        };

        #[cfg(feature = "logging")]
        tracing::info!(user = %session.user.username, host = %session.hostname, "session started");

        let mut interpreter = Interpreter::new(fs, session, self.limits, self.log_config);
        for (name, builtin) in self.builtins {
            interpreter.register(name, builtin);
        }
        Ok(Shell { interpreter })
    }
}
