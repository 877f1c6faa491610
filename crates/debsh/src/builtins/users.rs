//! Account administration builtins - useradd, usermod, userdel,
//! groupadd, groupdel
//!
//! All of them need root. Identity store errors are reported with the
//! shadow-utils exit status for the failure kind.

use async_trait::async_trait;

use super::{Builtin, Context, OptError, parse_opts, require_root, usage_error};
use crate::error::Result;
use crate::identity::{IdentityError, NewUser, UserChanges, parse_expiry};
use crate::interpreter::ExecResult;

/// shadow-utils exit status for bad command syntax.
const EXIT_USAGE: i32 = 2;
/// shadow-utils exit status for an invalid argument to an option.
const EXIT_BAD_ARG: i32 = 3;

fn failure(cmd: &str, e: &IdentityError) -> ExecResult {
    ExecResult::err(format!("{cmd}: {e}\n"), e.exit_code())
}

fn usage(cmd: &str, operand: &str) -> ExecResult {
    ExecResult::err(format!("Usage: {cmd} [options] {operand}\n"), EXIT_USAGE)
}

fn bad_option(cmd: &str, err: OptError, operand: &str) -> ExecResult {
    let mut result = usage_error(cmd, err, EXIT_USAGE);
    result.stderr = result
        .stderr
        .lines()
        .next()
        .map(|line| format!("{line}\nUsage: {cmd} [options] {operand}\n"))
        .unwrap_or_default();
    result
}

fn warnings(cmd: &str, warnings: Vec<String>) -> ExecResult {
    let stderr: String = warnings
        .into_iter()
        .map(|w| format!("{cmd}: {w}\n"))
        .collect();
    ExecResult {
        stderr,
        ..Default::default()
    }
}

fn split_groups(list: &str) -> Vec<String> {
    list.split(',')
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_id(cmd: &str, kind: &str, value: &str) -> std::result::Result<u32, ExecResult> {
    value.parse::<u32>().map_err(|_| {
        ExecResult::err(format!("{cmd}: invalid {kind} ID '{value}'\n"), EXIT_BAD_ARG)
    })
}

/// The useradd builtin - create a user account.
///
/// Usage: useradd [-u UID] [-g GROUP] [-G GROUPS] [-d HOME] [-s SHELL]
///        [-c COMMENT] [-m | -M] LOGIN
pub struct Useradd;

#[async_trait]
impl Builtin for Useradd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        const CMD: &str = "useradd";
        let long = [
            ("uid", 'u'),
            ("gid", 'g'),
            ("groups", 'G'),
            ("home-dir", 'd'),
            ("shell", 's'),
            ("comment", 'c'),
            ("create-home", 'm'),
            ("no-create-home", 'M'),
        ];
        let opts = match parse_opts(ctx.args, "u:g:G:d:s:c:mM", &long) {
            Ok(opts) => opts,
            Err(e) => return Ok(bad_option(CMD, e, "LOGIN")),
        };
        let [name] = opts.operands.as_slice() else {
            return Ok(usage(CMD, "LOGIN"));
        };
        if let Some(denied) = require_root(CMD, &ctx) {
            return Ok(denied);
        }

        let uid = match opts.value('u').map(|v| parse_id(CMD, "user", v)).transpose() {
            Ok(uid) => uid,
            Err(result) => return Ok(result),
        };
        let new = NewUser {
            name: name.clone(),
            uid,
            group: opts.value('g').map(str::to_string),
            groups: opts.value('G').map(split_groups).unwrap_or_default(),
            home: opts.value('d').map(str::to_string),
            shell: opts.value('s').map(str::to_string),
            gecos: opts.value('c').unwrap_or_default().to_string(),
            create_home: opts.has('m') && !opts.has('M'),
        };

        match ctx.identity.add_user(&new).await {
            Ok(notes) => Ok(warnings(CMD, notes)),
            Err(e) => Ok(failure(CMD, &e)),
        }
    }
}

/// The usermod builtin - modify a user account.
///
/// Usage: usermod [-a] [-c COMMENT] [-d HOME [-m]] [-e EXPIRE] [-g GROUP]
///        [-G GROUPS] [-l LOGIN] [-L | -U] [-s SHELL] [-u UID] LOGIN
///
/// Changes are applied as one transaction: a failure leaves the identity
/// files as they were.
pub struct Usermod;

#[async_trait]
impl Builtin for Usermod {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        const CMD: &str = "usermod";
        let long = [
            ("append", 'a'),
            ("comment", 'c'),
            ("home", 'd'),
            ("expiredate", 'e'),
            ("gid", 'g'),
            ("groups", 'G'),
            ("login", 'l'),
            ("lock", 'L'),
            ("move-home", 'm'),
            ("shell", 's'),
            ("uid", 'u'),
            ("unlock", 'U'),
        ];
        let opts = match parse_opts(ctx.args, "ac:d:e:g:G:l:Lms:u:U", &long) {
            Ok(opts) => opts,
            Err(e) => return Ok(bad_option(CMD, e, "LOGIN")),
        };
        let [name] = opts.operands.as_slice() else {
            return Ok(usage(CMD, "LOGIN"));
        };

        let uid = match opts.value('u').map(|v| parse_id(CMD, "user", v)).transpose() {
            Ok(uid) => uid,
            Err(result) => return Ok(result),
        };
        let expire = match opts.value('e').map(parse_expiry).transpose() {
            Ok(expire) => expire,
            Err(e) => return Ok(failure(CMD, &e)),
        };
        let changes = UserChanges {
            login: opts.value('l').map(str::to_string),
            uid,
            gecos: opts.value('c').map(str::to_string),
            home: opts.value('d').map(str::to_string),
            move_home: opts.has('m'),
            shell: opts.value('s').map(str::to_string),
            expire,
            lock: opts.has('L'),
            unlock: opts.has('U'),
            primary_group: opts.value('g').map(str::to_string),
            groups: opts.value('G').map(split_groups),
            append: opts.has('a'),
        };
        if changes.is_empty() {
            return Ok(ExecResult::err(
                format!("{CMD}: no options\nUsage: {CMD} [options] LOGIN\n"),
                EXIT_USAGE,
            ));
        }
        if let Some(denied) = require_root(CMD, &ctx) {
            return Ok(denied);
        }

        let logged_in = ctx.session.logged_in();
        match ctx.identity.modify_user(name, &changes, &logged_in).await {
            Ok(()) => Ok(ExecResult::default()),
            Err(e) => Ok(failure(CMD, &e)),
        }
    }
}

/// The userdel builtin - delete a user account.
///
/// Usage: userdel [-r] LOGIN
pub struct Userdel;

#[async_trait]
impl Builtin for Userdel {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        const CMD: &str = "userdel";
        let opts = match parse_opts(ctx.args, "r", &[("remove", 'r')]) {
            Ok(opts) => opts,
            Err(e) => return Ok(bad_option(CMD, e, "LOGIN")),
        };
        let [name] = opts.operands.as_slice() else {
            return Ok(usage(CMD, "LOGIN"));
        };
        if let Some(denied) = require_root(CMD, &ctx) {
            return Ok(denied);
        }

        let logged_in = ctx.session.logged_in();
        match ctx.identity.delete_user(name, opts.has('r'), &logged_in).await {
            Ok(notes) => Ok(warnings(CMD, notes)),
            Err(e) => Ok(failure(CMD, &e)),
        }
    }
}

/// The groupadd builtin - create a group.
///
/// Usage: groupadd [-g GID] GROUP
pub struct Groupadd;

#[async_trait]
impl Builtin for Groupadd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        const CMD: &str = "groupadd";
        let opts = match parse_opts(ctx.args, "g:", &[("gid", 'g')]) {
            Ok(opts) => opts,
            Err(e) => return Ok(bad_option(CMD, e, "GROUP")),
        };
        let [name] = opts.operands.as_slice() else {
            return Ok(usage(CMD, "GROUP"));
        };
        if let Some(denied) = require_root(CMD, &ctx) {
            return Ok(denied);
        }

        let gid = match opts.value('g').map(|v| parse_id(CMD, "group", v)).transpose() {
            Ok(gid) => gid,
            Err(result) => return Ok(result),
        };
        match ctx.identity.add_group(name, gid).await {
            Ok(_) => Ok(ExecResult::default()),
            Err(e) => Ok(failure(CMD, &e)),
        }
    }
}

/// The groupdel builtin - delete a group.
///
/// Usage: groupdel GROUP
pub struct Groupdel;

#[async_trait]
impl Builtin for Groupdel {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        const CMD: &str = "groupdel";
        let opts = match parse_opts(ctx.args, "", &[]) {
            Ok(opts) => opts,
            Err(e) => return Ok(bad_option(CMD, e, "GROUP")),
        };
        let [name] = opts.operands.as_slice() else {
            return Ok(usage(CMD, "GROUP"));
        };
        if let Some(denied) = require_root(CMD, &ctx) {
            return Ok(denied);
        }

        match ctx.identity.delete_group(name).await {
            Ok(()) => Ok(ExecResult::default()),
            Err(e) => Ok(failure(CMD, &e)),
        }
    }
}
