//! Navigation builtins (cd, pwd)

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::{FsError, Result};
use crate::fs::check_access;
use crate::interpreter::ExecResult;
use crate::perms::Access;

/// The cd builtin - change directory.
///
/// Usage: cd [DIR | - | ~]
///
/// Without an argument, changes to the home directory. `cd -` returns to
/// the previous directory and prints it.
pub struct Cd;

#[async_trait]
impl Builtin for Cd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.len() > 1 {
            return Ok(ExecResult::err("debsh: cd: too many arguments\n", 1));
        }

        let target = ctx.args.first().map(String::as_str);
        let (path, announce) = match target {
            None => (ctx.session.user.home.clone(), false),
            Some("-") => match &ctx.session.oldpwd {
                Some(old) => (old.clone(), true),
                None => return Ok(ExecResult::err("debsh: cd: OLDPWD not set\n", 1)),
            },
            Some(dir) => (ctx.resolve(dir), false),
        };
        let shown = target.unwrap_or("~");

        let checked = async {
            let meta = ctx.fs.stat(&path).await?;
            if !meta.file_type.is_dir() {
                return Err(FsError::NotADirectory);
            }
            check_access(ctx.fs.as_ref(), ctx.user(), &path, Access::Execute).await
        };
        if let Err(e) = checked.await {
            return Ok(ExecResult::err(format!("debsh: cd: {shown}: {e}\n"), 1));
        }

        let output = if announce {
            format!("{}\n", path.display())
        } else {
            String::new()
        };
        ctx.session.change_dir(path);
        Ok(ExecResult::ok(output))
    }
}

/// The pwd builtin - print working directory.
pub struct Pwd;

#[async_trait]
impl Builtin for Pwd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::ok(format!("{}\n", ctx.session.cwd.display())))
    }
}
