//! Flow control builtins (true, false, exit)

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;

/// The true builtin - always returns 0.
pub struct True;

#[async_trait]
impl Builtin for True {
    async fn execute(&self, _ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::default())
    }
}

/// The false builtin - always returns 1.
pub struct False;

#[async_trait]
impl Builtin for False {
    async fn execute(&self, _ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::err("", 1))
    }
}

/// The exit builtin - leave the current login.
///
/// Inside an `su` login, returns to the outer identity. At the outermost
/// level the session is marked finished and the host stops reading input.
pub struct Exit;

#[async_trait]
impl Builtin for Exit {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.len() > 1 {
            return Ok(ExecResult::err("debsh: exit: too many arguments\n", 1));
        }

        let result = match ctx.args.first() {
            None => ExecResult::err("", ctx.session.last_exit_code),
            Some(arg) => match arg.parse::<i64>() {
                Ok(code) => ExecResult::err("", code.rem_euclid(256) as i32),
                Err(_) => ExecResult::err(
                    format!("debsh: exit: {arg}: numeric argument required\n"),
                    2,
                ),
            },
        };

        if !ctx.session.pop_login() {
            ctx.session.finished = true;
        }
        Ok(result)
    }
}
