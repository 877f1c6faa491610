//! Credential builtins - passwd, su
//!
//! Both start a password dialogue by parking a [`Pending`] state; the
//! interpreter feeds it the following input lines.

use async_trait::async_trait;

use super::{Builtin, Context, parse_opts, usage_error};
use crate::error::Result;
use crate::identity::IdentityError;
use crate::interpreter::{ExecResult, PasswdStage, Pending};

/// The passwd builtin - change or administer a password.
///
/// Usage: passwd [-l | -u | -d | -S] [LOGIN]
///
/// Options:
///   -l   Lock the password (root only)
///   -u   Unlock the password (root only)
///   -d   Delete the password (root only)
///   -S   Show password status
///
/// Without options, starts the change dialogue. Unprivileged users may
/// only change their own password and must enter the current one first.
pub struct Passwd;

#[async_trait]
impl Builtin for Passwd {
    async fn execute(&self, mut ctx: Context<'_>) -> Result<ExecResult> {
        let long = [("lock", 'l'), ("unlock", 'u'), ("delete", 'd'), ("status", 'S')];
        let opts = match parse_opts(ctx.args, "ludS", &long) {
            Ok(opts) => opts,
            Err(e) => return Ok(usage_error("passwd", e, 2)),
        };
        if opts.operands.len() > 1 {
            return Ok(ExecResult::err("Usage: passwd [options] [LOGIN]\n", 2));
        }

        let user = ctx.user().clone();
        let target = opts
            .operands
            .first()
            .cloned()
            .unwrap_or_else(|| user.username.clone());
        if target != user.username && !user.is_root() {
            return Ok(ExecResult::err(
                format!("passwd: You may not view or modify password information for {target}.\n"),
                1,
            ));
        }
        if let Err(e) = ctx.identity.shadow(&target).await {
            return Ok(match e {
                IdentityError::UserNotFound(_) => ExecResult::err(
                    format!("passwd: user '{target}' does not exist\n"),
                    1,
                ),
                e => ExecResult::err(format!("passwd: {e}\n"), e.exit_code()),
            });
        }

        if opts.has('S') {
            return Ok(match ctx.identity.password_status(&target).await {
                Ok(status) => ExecResult::ok(format!("{status}\n")),
                Err(e) => ExecResult::err(format!("passwd: {e}\n"), e.exit_code()),
            });
        }

        let admin = [opts.has('l'), opts.has('u'), opts.has('d')];
        if admin.iter().filter(|set| **set).count() > 1 {
            return Ok(ExecResult::err(
                "passwd: only one of -l, -u, -d may be given\n",
                2,
            ));
        }
        if admin.iter().any(|set| *set) {
            if !user.is_root() {
                return Ok(ExecResult::err("passwd: Permission denied.\n", 1));
            }
            let changed = if opts.has('l') {
                ctx.identity.lock_password(&target).await
            } else if opts.has('u') {
                ctx.identity.unlock_password(&target).await
            } else {
                ctx.identity.clear_password(&target).await
            };
            return Ok(match changed {
                Ok(()) => ExecResult::ok("passwd: password changed.\n"),
                Err(e) => ExecResult::err(format!("passwd: {e}\n"), e.exit_code()),
            });
        }

        if user.is_root() {
            return Ok(ctx.prompt(Pending::PasswordChange {
                user: target,
                stage: PasswdStage::AwaitingNewPassword,
            }));
        }
        let mut result = ctx.prompt(Pending::PasswordChange {
            user: target.clone(),
            stage: PasswdStage::AwaitingCurrent,
        });
        result.stdout = format!("Changing password for {target}.\n");
        Ok(result)
    }
}

/// The su builtin - start a login as another user.
///
/// Usage: su [- | -l | --login] [LOGIN]
///
/// Defaults to root. Root switches without a password; everyone else is
/// prompted for the target's password. `exit` returns to the outer login.
pub struct Su;

#[async_trait]
impl Builtin for Su {
    async fn execute(&self, mut ctx: Context<'_>) -> Result<ExecResult> {
        let mut login_shell = false;
        let mut target: Option<&str> = None;
        for arg in ctx.args {
            match arg.as_str() {
                "-" | "-l" | "--login" => login_shell = true,
                a if a.starts_with('-') && a.len() > 1 => {
                    return Ok(ExecResult::err(
                        format!(
                            "su: invalid option -- '{}'\nTry 'su --help' for more information.\n",
                            a.trim_start_matches('-')
                        ),
                        1,
                    ));
                }
                a if target.is_none() => target = Some(a),
                _ => {
                    return Ok(ExecResult::err(
                        "su: commands are not supported; use sudo\n",
                        1,
                    ));
                }
            }
        }
        let target = target.unwrap_or("root").to_string();

        let principal = match ctx.identity.principal(&target).await {
            Ok(principal) => principal,
            Err(_) => {
                return Ok(ExecResult::err(
                    format!(
                        "su: user {target} does not exist or the user entry does not contain all the required fields\n"
                    ),
                    1,
                ));
            }
        };

        if ctx.user().is_root() {
            #[cfg(feature = "logging")]
            tracing::info!(from = %ctx.user().username, to = %principal.username, "switched user");
            ctx.session.push_login(principal, login_shell);
            return Ok(ExecResult::default());
        }

        Ok(ctx.prompt(Pending::SwitchUser {
            target,
            login_shell,
        }))
    }
}
