//! Interpreter: runs parsed lines against the session
//!
//! A line goes through four steps:
//!
//! 1. parse (the whole line is rejected on a syntax error)
//! 2. expand every stage's words and redirection targets
//! 3. validate redirection targets against the VFS
//! 4. run the stages in order, buffering each stage's output as the next
//!    stage's input
//!
//! `sudo` is handled here rather than as a command because it re-enters
//! the dispatcher under a different identity.

mod prompt;
mod session;
mod state;

pub use prompt::{PasswdStage, Pending};
pub use session::{LoginSnapshot, Session, SessionSnapshot};
pub use state::ExecResult;

pub(crate) use prompt::Suspended;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::builtins::{self, Builtin, Context, GlobPolicy};
use crate::error::{Error, FsError, Result};
use crate::expand::{GlobScope, expand_quoted, expand_word};
use crate::fs::{FileSystem, check_access, check_parent_writable};
use crate::identity::IdentityStore;
use crate::limits::ShellLimits;
use crate::logging_impl::LogConfig;
use crate::parser::{Line, Parser, Pipeline, Redirection, Stage};
use crate::perms::Access;

/// A validated output redirection target.
#[derive(Debug, Clone)]
pub(crate) struct Sink {
    path: PathBuf,
    /// Target as typed, for diagnostics
    display: String,
    append: bool,
}

/// A stage ready to run: arguments expanded, redirections resolved.
struct PreparedStage {
    argv: Vec<String>,
    input: Option<String>,
    sink: Option<Sink>,
    /// Diagnostic that replaces running the command
    failure: Option<String>,
}

enum Prepared {
    Ready(PreparedStage),
    Rejected(ExecResult),
}

/// Interpreter state.
pub struct Interpreter {
    fs: Arc<dyn FileSystem>,
    identity: IdentityStore,
    session: Session,
    builtins: HashMap<String, Box<dyn Builtin>>,
    limits: ShellLimits,
    #[cfg_attr(not(feature = "logging"), allow(dead_code))]
    log_config: LogConfig,
    suspended: Option<Suspended>,
}

impl Interpreter {
    /// Create an interpreter with the default command table.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        session: Session,
        limits: ShellLimits,
        log_config: LogConfig,
    ) -> Self {
        Self {
            identity: IdentityStore::new(Arc::clone(&fs)),
            fs,
            session,
            builtins: builtins::defaults(),
            limits,
            log_config,
            suspended: None,
        }
    }

    /// Register or replace a command.
    pub fn register(&mut self, name: impl Into<String>, builtin: Box<dyn Builtin>) {
        self.builtins.insert(name.into(), builtin);
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    pub fn fs(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    /// Whether the next line answers a password prompt.
    pub fn is_awaiting_input(&self) -> bool {
        self.suspended.is_some()
    }

    /// The pending prompt text, if any.
    pub fn pending_prompt(&self) -> Option<String> {
        self.suspended
            .as_ref()
            .map(|s| s.pending.prompt(&self.session.user.username))
    }

    /// Drop a pending prompt without writing anything.
    pub fn cancel_prompt(&mut self) -> bool {
        let cancelled = self.suspended.take().is_some();
        if cancelled {
            self.session.last_exit_code = 1;
        }
        cancelled
    }

    /// Execute one input line.
    ///
    /// Syntax errors and exceeded limits abort the line and come back as
    /// `Err`; every command-level failure is an `Ok` result with a non-zero
    /// exit code.
    pub async fn execute_line(&mut self, line: &str) -> Result<ExecResult> {
        if let Some(suspended) = self.suspended.take() {
            return self.resume(suspended, Zeroizing::new(line.to_string())).await;
        }

        #[cfg(feature = "logging")]
        tracing::debug!(
            line = %crate::logging_impl::format_line_for_log(line, &self.log_config),
            "executing line"
        );

        let parsed = self
            .limits
            .check_line(line)
            .map_err(Error::from)
            .and_then(|()| Parser::new(line)?.parse());
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                self.session.last_exit_code = 2;
                return Err(e);
            }
        };

        let result = match parsed {
            Line::Empty => return Ok(ExecResult::default()),
            Line::Assignment { name, value } => {
                let session = &self.session;
                let value = expand_quoted(&value, &|n: &str| session.lookup(n));
                #[cfg(feature = "logging")]
                tracing::debug!(
                    name = %name,
                    value = %self.log_config.redact_var_value(&name, &value),
                    "assignment"
                );
                self.session.locals.insert(name, value);
                ExecResult::default()
            }
            Line::Pipeline(pipeline) => match self.run_pipeline(&pipeline).await {
                Ok(result) => result,
                Err(e) => {
                    self.session.last_exit_code = if e.aborts_line() { 2 } else { 1 };
                    return Err(e);
                }
            },
        };

        if !result.is_awaiting_input() {
            self.finish_line(&result).await;
        }
        Ok(result)
    }

    /// Record the exit status and pick up identity changes made by the line.
    pub(crate) async fn finish_line(&mut self, result: &ExecResult) {
        self.session.last_exit_code = result.exit_code;
        if let Ok(principal) = self.identity.principal(&self.session.user.username).await {
            self.session.user = principal;
        }
    }

    async fn run_pipeline(&mut self, pipeline: &Pipeline) -> Result<ExecResult> {
        self.limits.check_stages(pipeline.stages.len())?;

        let mut stages = Vec::with_capacity(pipeline.stages.len());
        for stage in &pipeline.stages {
            match self.prepare_stage(stage).await? {
                Prepared::Ready(stage) => stages.push(stage),
                Prepared::Rejected(result) => return Ok(result),
            }
        }

        let multi_stage = stages.len() > 1;
        let mut piped: Option<String> = None;
        let mut stderr = String::new();
        let mut exit_code = 0;

        for stage in stages {
            let stdin = stage.input.or(piped.take());
            let mut result = match &stage.failure {
                Some(message) => ExecResult::err(message.clone(), 1),
                None => {
                    self.dispatch(&stage.argv, stdin.as_deref(), multi_stage)
                        .await?
                }
            };

            if result.is_awaiting_input() {
                if multi_stage {
                    self.suspended = None;
                    let name = stage.argv.first().map(String::as_str).unwrap_or_default();
                    result = ExecResult::err(
                        format!("{name}: cannot read a password inside a pipeline\n"),
                        1,
                    );
                } else {
                    if let Some(suspended) = self.suspended.as_mut() {
                        suspended.sink = stage.sink;
                    }
                    result.stderr.insert_str(0, &stderr);
                    return Ok(result);
                }
            }

            let result = self.apply_sink(result, stage.sink.as_ref()).await;
            stderr.push_str(&result.stderr);
            exit_code = result.exit_code;
            piped = Some(result.stdout);
        }

        Ok(ExecResult {
            stdout: piped.unwrap_or_default(),
            stderr,
            exit_code,
            prompt: None,
        })
    }

    /// Expand words and redirections, apply the glob policy and validate
    /// redirection targets.
    async fn prepare_stage(&self, stage: &Stage) -> Result<Prepared> {
        let session = &self.session;
        let lookup = |name: &str| session.lookup(name);
        let scope = GlobScope {
            fs: self.fs.as_ref(),
            cwd: &session.cwd,
            home: &session.user.home,
        };
        let max_brace = self.limits.max_brace_expansion;

        let mut argv = Vec::new();
        let mut unmatched = Vec::new();
        for word in &stage.words {
            let expansion = expand_word(word, &lookup, &scope, max_brace).await?;
            argv.extend(expansion.fields);
            unmatched.extend(expansion.unmatched);
        }

        if let Some(pattern) = unmatched.first() {
            let command = effective_command(&argv);
            if let Some(name) = command
                && self
                    .builtins
                    .get(name)
                    .is_some_and(|b| b.glob_policy() == GlobPolicy::Reject)
            {
                return Ok(Prepared::Rejected(ExecResult::err(
                    format!("{name}: no matches found: {pattern}\n"),
                    1,
                )));
            }
        }

        let mut redirection = Redirection::default();
        for redirect in &stage.redirects {
            let mut fields = expand_word(&redirect.target, &lookup, &scope, max_brace)
                .await?
                .fields;
            if fields.len() != 1 {
                return Ok(Prepared::Rejected(ExecResult::err(
                    format!("debsh: {}: ambiguous redirect\n", redirect.target),
                    1,
                )));
            }
            redirection.set(redirect.kind, fields.remove(0));
        }
        redirection.validate()?;

        let mut prepared = PreparedStage {
            argv,
            input: None,
            sink: None,
            failure: None,
        };
        if let Some(target) = &redirection.input {
            match self.read_input(target).await {
                Ok(content) => prepared.input = Some(content),
                Err(e) => prepared.failure = Some(format!("debsh: {target}: {e}\n")),
            }
        }
        if let Some((target, append)) = redirection.sink()
            && prepared.failure.is_none()
        {
            match self.resolve_sink(target, append).await {
                Ok(sink) => prepared.sink = Some(sink),
                Err(e) => prepared.failure = Some(format!("debsh: {target}: {e}\n")),
            }
        }
        Ok(Prepared::Ready(prepared))
    }

    async fn read_input(&self, target: &str) -> std::result::Result<String, FsError> {
        let path = self.session.resolve(target);
        check_access(self.fs.as_ref(), &self.session.user, &path, Access::Read).await?;
        let content = self.fs.read_file(&path).await?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    /// The target must be writable, or creatable in an existing directory.
    async fn resolve_sink(&self, target: &str, append: bool) -> std::result::Result<Sink, FsError> {
        let path = self.session.resolve(target);
        let fs = self.fs.as_ref();
        let user = &self.session.user;
        match fs.stat(&path).await {
            Ok(meta) if meta.file_type.is_dir() => return Err(FsError::IsADirectory),
            Ok(_) => check_access(fs, user, &path, Access::Write).await?,
            Err(FsError::NotFound) => {
                let parent = path.parent().ok_or(FsError::IsADirectory)?;
                if !fs.stat(parent).await?.file_type.is_dir() {
                    return Err(FsError::NotADirectory);
                }
                check_parent_writable(fs, user, &path).await?;
            }
            Err(e) => return Err(e),
        }
        Ok(Sink {
            path,
            display: target.to_string(),
            append,
        })
    }

    /// Send a result's stdout to its redirection target.
    pub(crate) async fn apply_sink(&self, mut result: ExecResult, sink: Option<&Sink>) -> ExecResult {
        let Some(sink) = sink else {
            return result;
        };
        let content = std::mem::take(&mut result.stdout);

        let written = async {
            if sink.append {
                let existing = match self.fs.stat(&sink.path).await {
                    Ok(meta) => meta.size as usize,
                    Err(_) => 0,
                };
                self.limits
                    .check_file_size(existing + content.len())
                    .map_err(Error::from)?;
                self.fs
                    .append_file(&sink.path, content.as_bytes(), &self.session.user.ownership())
                    .await?;
            } else {
                self.limits
                    .check_file_size(content.len())
                    .map_err(Error::from)?;
                self.fs
                    .write_file(&sink.path, content.as_bytes(), &self.session.user.ownership())
                    .await?;
            }
            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = written {
            result.stderr.push_str(&format!("debsh: {}: {}\n", sink.display, e));
            result.exit_code = 1;
        }
        result
    }

    async fn dispatch(
        &mut self,
        argv: &[String],
        stdin: Option<&str>,
        in_pipeline: bool,
    ) -> Result<ExecResult> {
        match argv.first().map(String::as_str) {
            None => Ok(ExecResult::default()),
            Some("sudo") => self.run_sudo(&argv[1..], stdin, in_pipeline).await,
            Some(_) => self.run_command(argv, stdin).await,
        }
    }

    async fn run_command(&mut self, argv: &[String], stdin: Option<&str>) -> Result<ExecResult> {
        let Some((name, args)) = argv.split_first() else {
            return Ok(ExecResult::default());
        };
        let Some(builtin) = self.builtins.get(name.as_str()) else {
            let err = Error::CommandNotFound(name.clone());
            return Ok(ExecResult::err(format!("{err}\n"), 127));
        };

        #[cfg(feature = "logging")]
        tracing::debug!(command = %name, args = args.len(), user = %self.session.user.username, "dispatch");

        let mut suspend = None;
        let ctx = Context {
            args,
            stdin,
            session: &mut self.session,
            fs: Arc::clone(&self.fs),
            identity: &self.identity,
            suspend: &mut suspend,
        };
        let result = match builtin.execute(ctx).await {
            Ok(result) => result,
            Err(e) if e.aborts_line() => return Err(e),
            Err(e) => ExecResult::err(format!("{name}: {e}\n"), 1),
        };

        if let Some(pending) = suspend {
            self.suspended = Some(Suspended {
                pending,
                sink: None,
            });
        }
        Ok(result)
    }

    async fn run_sudo(
        &mut self,
        argv: &[String],
        stdin: Option<&str>,
        in_pipeline: bool,
    ) -> Result<ExecResult> {
        if argv.is_empty() {
            return Ok(ExecResult::err(
                "usage: sudo command [arg ...]\n".to_string(),
                1,
            ));
        }

        let user = &self.session.user;
        if user.is_root() || self.session.sudo_cached() {
            return self.run_as_root(argv, stdin).await;
        }
        if !user.can_sudo() {
            #[cfg(feature = "logging")]
            tracing::warn!(user = %user.username, "sudo refused: not in sudoers");
            return Ok(ExecResult::err(
                format!("{} is not in the sudoers file.\n", user.username),
                1,
            ));
        }
        if in_pipeline {
            return Ok(ExecResult::err(
                "sudo: a terminal is required to read the password\nsudo: a password is required\n",
                1,
            ));
        }

        Ok(self.suspend(
            Pending::Sudo {
                argv: argv.to_vec(),
                stdin: stdin.map(str::to_string),
                attempts: 0,
            },
            None,
        ))
    }

    /// Run a command with root's identity, then restore the caller's.
    pub(crate) async fn run_as_root(
        &mut self,
        argv: &[String],
        stdin: Option<&str>,
    ) -> Result<ExecResult> {
        let argv = skip_sudo(argv);
        if argv.is_empty() {
            return Ok(ExecResult::default());
        }
        let root = match self.identity.principal("root").await {
            Ok(root) => root,
            Err(e) => return Ok(ExecResult::err(format!("sudo: {e}\n"), 1)),
        };

        let depth = self.session.logins.len();
        let caller = std::mem::replace(&mut self.session.user, root);
        let outer = self
            .session
            .elevated_from
            .replace(caller.username.clone());
        let result = self.run_command(argv, stdin).await;
        self.session.elevated_from = outer;

        // `sudo su` leaves a new login on top: the frame it pushed holds
        // the temporary root identity and must hold the caller instead.
        let logins = self.session.logins.len();
        if logins > depth {
            self.session.logins[depth].user = caller;
        } else if logins == depth {
            self.session.user = caller;
        }
        result
    }
}

fn skip_sudo(argv: &[String]) -> &[String] {
    let skip = argv.iter().take_while(|a| *a == "sudo").count();
    &argv[skip..]
}

/// The command whose glob policy applies: `sudo` defers to its argument.
fn effective_command(argv: &[String]) -> Option<&str> {
    skip_sudo(argv).first().map(String::as_str)
}
