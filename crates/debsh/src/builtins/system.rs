//! Identity and system information builtins (whoami, id, groups, hostname)
//!
//! All answers come from the identity database and the session, never the
//! host.

use async_trait::async_trait;
use std::path::Path;

use super::{Builtin, Context, parse_opts, usage_error};
use crate::error::Result;
use crate::identity::{GroupEntry, Principal};
use crate::interpreter::ExecResult;

/// The whoami builtin - print the effective user name.
pub struct Whoami;

#[async_trait]
impl Builtin for Whoami {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if let Some(extra) = ctx.args.first() {
            return Ok(ExecResult::err(
                format!("whoami: extra operand '{extra}'\nTry 'whoami --help' for more information.\n"),
                1,
            ));
        }
        Ok(ExecResult::ok(format!("{}\n", ctx.user().username)))
    }
}

/// Resolve the principal an `id`/`groups` operand names, or the session's.
async fn principal_for(ctx: &Context<'_>, name: Option<&str>) -> Option<Principal> {
    match name {
        None => Some(ctx.user().clone()),
        Some(name) => ctx.identity.principal(name).await.ok(),
    }
}

fn gid_of(groups: &[GroupEntry], name: &str) -> Option<u32> {
    groups.iter().find(|g| g.name == name).map(|g| g.gid)
}

/// The id builtin - print user and group IDs.
///
/// Usage: id [-u | -g | -G] [-n] [USER]
///
/// Default output: `uid=1000(user) gid=1000(user) groups=1000(user),27(sudo)`
pub struct Id;

#[async_trait]
impl Builtin for Id {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let long = [("user", 'u'), ("group", 'g'), ("groups", 'G'), ("name", 'n')];
        let opts = match parse_opts(ctx.args, "ugGn", &long) {
            Ok(opts) => opts,
            Err(e) => return Ok(usage_error("id", e, 1)),
        };
        if opts.operands.len() > 1 {
            return Ok(ExecResult::err(
                format!(
                    "id: extra operand '{}'\nTry 'id --help' for more information.\n",
                    opts.operands[1]
                ),
                1,
            ));
        }
        let selected = ['u', 'g', 'G'].iter().filter(|c| opts.has(**c)).count();
        if selected > 1 {
            return Ok(ExecResult::err(
                "id: cannot print \"only\" of more than one choice\n",
                1,
            ));
        }
        if selected == 0 && opts.has('n') {
            return Ok(ExecResult::err(
                "id: cannot print only names or real IDs in default format\n",
                1,
            ));
        }

        let name = opts.operands.first().map(String::as_str);
        let Some(who) = principal_for(&ctx, name).await else {
            return Ok(ExecResult::err(
                format!("id: '{}': no such user\n", name.unwrap_or_default()),
                1,
            ));
        };
        let groups = ctx.identity.groups().await?;
        let names = opts.has('n');

        let line = if opts.has('u') {
            if names { who.username.clone() } else { who.uid.to_string() }
        } else if opts.has('g') {
            if names { who.group.clone() } else { who.gid.to_string() }
        } else if opts.has('G') {
            who.groups
                .iter()
                .map(|g| {
                    if names {
                        g.clone()
                    } else {
                        gid_of(&groups, g).map(|gid| gid.to_string()).unwrap_or_else(|| g.clone())
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            let memberships: Vec<String> = who
                .groups
                .iter()
                .map(|g| match gid_of(&groups, g) {
                    Some(gid) => format!("{gid}({g})"),
                    None => g.clone(),
                })
                .collect();
            format!(
                "uid={}({}) gid={}({}) groups={}",
                who.uid,
                who.username,
                who.gid,
                who.group,
                memberships.join(",")
            )
        };

        Ok(ExecResult::ok(format!("{line}\n")))
    }
}

/// The groups builtin - print group memberships.
///
/// Usage: groups [USER...]
pub struct Groups;

#[async_trait]
impl Builtin for Groups {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.is_empty() {
            return Ok(ExecResult::ok(format!("{}\n", ctx.user().groups.join(" "))));
        }

        let mut stdout = String::new();
        let mut stderr = String::new();
        for name in ctx.args {
            match principal_for(&ctx, Some(name)).await {
                Some(who) => stdout.push_str(&format!("{name} : {}\n", who.groups.join(" "))),
                None => stderr.push_str(&format!("groups: '{name}': no such user\n")),
            }
        }
        let exit_code = if stderr.is_empty() { 0 } else { 1 };
        Ok(ExecResult {
            stdout,
            stderr,
            exit_code,
            prompt: None,
        })
    }
}

/// The hostname builtin - show or set the system's host name.
///
/// Setting needs root and rewrites `/etc/hostname`.
pub struct Hostname;

#[async_trait]
impl Builtin for Hostname {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let Some(name) = ctx.args.first() else {
            return Ok(ExecResult::ok(format!("{}\n", ctx.session.hostname)));
        };
        if !ctx.user().is_root() {
            return Ok(ExecResult::err(
                "hostname: you must be root to change the host name\n",
                1,
            ));
        }
        let valid = !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !valid {
            return Ok(ExecResult::err("hostname: the specified hostname is invalid\n", 1));
        }

        let owner = ctx.user().ownership();
        ctx.fs
            .write_file(Path::new("/etc/hostname"), format!("{name}\n").as_bytes(), &owner)
            .await?;
        ctx.session.hostname = name.clone();
        Ok(ExecResult::default())
    }
}
