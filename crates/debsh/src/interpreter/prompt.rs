//! Suspended password prompts
//!
//! `passwd`, `su` and `sudo` cannot finish in one line: they return a
//! prompt and park a [`Pending`] state in the interpreter. The next input
//! line is fed to that state instead of the parser. Nothing touches the
//! identity store until the final step, so cancelling a prompt leaves no
//! partial credential write behind.
//!
//! ```text
//! passwd:  AwaitingCurrent -> AwaitingNewPassword -> AwaitingConfirmation -> done
//! su:      AwaitingPassword -> done
//! sudo:    AwaitingPassword (up to 3 tries) -> command runs as root
//! ```

use zeroize::Zeroizing;

use super::{ExecResult, Interpreter, Sink};
use crate::error::Result;

pub(crate) const CURRENT_PASSWORD: &str = "Current password: ";
pub(crate) const NEW_PASSWORD: &str = "New password: ";
pub(crate) const RETYPE_PASSWORD: &str = "Retype new password: ";
pub(crate) const PASSWORD: &str = "Password: ";

const MAX_SUDO_ATTEMPTS: u8 = 3;

const PASSWD_UNCHANGED: &str = "passwd: password unchanged\n";
const PASSWD_AUTH_FAILED: &str =
    "passwd: Authentication token manipulation error\npasswd: password unchanged\n";

/// Where a `passwd` dialogue stands.
#[derive(Debug)]
pub enum PasswdStage {
    /// Non-root users confirm their current password first.
    AwaitingCurrent,
    AwaitingNewPassword,
    AwaitingConfirmation { new: Zeroizing<String> },
}

/// A command waiting for a secret.
#[derive(Debug)]
pub enum Pending {
    PasswordChange { user: String, stage: PasswdStage },
    SwitchUser { target: String, login_shell: bool },
    Sudo {
        argv: Vec<String>,
        stdin: Option<String>,
        attempts: u8,
    },
}

impl Pending {
    /// Text shown for this state.
    pub fn prompt(&self, current_user: &str) -> String {
        match self {
            Pending::PasswordChange { stage, .. } => match stage {
                PasswdStage::AwaitingCurrent => CURRENT_PASSWORD.to_string(),
                PasswdStage::AwaitingNewPassword => NEW_PASSWORD.to_string(),
                PasswdStage::AwaitingConfirmation { .. } => RETYPE_PASSWORD.to_string(),
            },
            Pending::SwitchUser { .. } => PASSWORD.to_string(),
            Pending::Sudo { .. } => format!("[sudo] password for {current_user}: "),
        }
    }
}

/// A pending state plus the output redirection of the command that
/// started it.
#[derive(Debug)]
pub(crate) struct Suspended {
    pub pending: Pending,
    pub sink: Option<Sink>,
}

impl Interpreter {
    /// Park `pending` and return its prompt.
    pub(crate) fn suspend(&mut self, pending: Pending, sink: Option<Sink>) -> ExecResult {
        let prompt = pending.prompt(&self.session.user.username);
        self.suspended = Some(Suspended { pending, sink });
        ExecResult::awaiting(prompt)
    }

    /// Feed one input line to the parked state.
    pub(crate) async fn resume(
        &mut self,
        suspended: Suspended,
        input: Zeroizing<String>,
    ) -> Result<ExecResult> {
        let Suspended { pending, sink } = suspended;
        let result = match pending {
            Pending::PasswordChange { user, stage } => {
                self.resume_passwd(user, stage, input, sink.clone()).await
            }
            Pending::SwitchUser {
                target,
                login_shell,
            } => self.resume_su(&target, login_shell, &input).await,
            Pending::Sudo {
                argv,
                stdin,
                attempts,
            } => {
                self.resume_sudo(argv, stdin, attempts, &input, sink.clone())
                    .await?
            }
        };

        if result.is_awaiting_input() {
            return Ok(result);
        }
        let result = self.apply_sink(result, sink.as_ref()).await;
        self.finish_line(&result).await;
        Ok(result)
    }

    async fn resume_passwd(
        &mut self,
        user: String,
        stage: PasswdStage,
        input: Zeroizing<String>,
        sink: Option<Sink>,
    ) -> ExecResult {
        match stage {
            PasswdStage::AwaitingCurrent => {
                match self.identity.verify_password(&user, &input).await {
                    Ok(true) => {
                        let stage = PasswdStage::AwaitingNewPassword;
                        self.suspend(Pending::PasswordChange { user, stage }, sink)
                    }
                    Ok(false) => ExecResult::err(PASSWD_AUTH_FAILED, 10),
                    Err(e) => ExecResult::err(format!("passwd: {e}\n"), e.exit_code()),
                }
            }
            PasswdStage::AwaitingNewPassword => {
                if input.is_empty() {
                    return ExecResult::err(
                        format!("No password has been supplied.\n{PASSWD_UNCHANGED}"),
                        10,
                    );
                }
                let stage = PasswdStage::AwaitingConfirmation { new: input };
                self.suspend(Pending::PasswordChange { user, stage }, sink)
            }
            PasswdStage::AwaitingConfirmation { new } => {
                if *input != *new {
                    return ExecResult::err(
                        format!("Sorry, passwords do not match.\n{PASSWD_UNCHANGED}"),
                        10,
                    );
                }
                match self.identity.set_password(&user, &new).await {
                    Ok(()) => ExecResult::ok("passwd: password updated successfully\n"),
                    Err(e) => ExecResult::err(format!("passwd: {e}\n"), e.exit_code()),
                }
            }
        }
    }

    async fn resume_su(&mut self, target: &str, login_shell: bool, input: &str) -> ExecResult {
        let authenticated = matches!(self.identity.verify_password(target, input).await, Ok(true));
        if !authenticated {
            #[cfg(feature = "logging")]
            tracing::info!(target_user = %target, "su authentication failure");
            return ExecResult::err("su: Authentication failure\n", 1);
        }
        self.switch_user(target, login_shell).await
    }

    /// Start a nested login as `target`.
    pub(crate) async fn switch_user(&mut self, target: &str, login_shell: bool) -> ExecResult {
        match self.identity.principal(target).await {
            Ok(principal) => {
                #[cfg(feature = "logging")]
                tracing::info!(
                    from = %self.session.user.username,
                    to = %principal.username,
                    "switched user"
                );
                self.session.push_login(principal, login_shell);
                ExecResult::ok("")
            }
            Err(e) => ExecResult::err(format!("su: {e}\n"), 1),
        }
    }

    async fn resume_sudo(
        &mut self,
        argv: Vec<String>,
        stdin: Option<String>,
        attempts: u8,
        input: &str,
        sink: Option<Sink>,
    ) -> Result<ExecResult> {
        let user = self.session.user.username.clone();
        let authenticated = matches!(self.identity.verify_password(&user, input).await, Ok(true));
        if authenticated {
            self.session.remember_sudo();
            return self.run_as_root(&argv, stdin.as_deref()).await;
        }

        let attempts = attempts + 1;
        if attempts >= MAX_SUDO_ATTEMPTS {
            #[cfg(feature = "logging")]
            tracing::warn!(user = %user, "sudo: too many incorrect password attempts");
            return Ok(ExecResult::err(
                format!("sudo: {attempts} incorrect password attempts\n"),
                1,
            ));
        }
        let mut result = self.suspend(
            Pending::Sudo {
                argv,
                stdin,
                attempts,
            },
            sink,
        );
        result.stderr = "Sorry, try again.\n".to_string();
        Ok(result)
    }
}
