//! File operation builtins - mkdir, rm, mv, touch, chmod, chown

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::{Builtin, Context, GlobPolicy, parse_opts, usage_error};
use crate::error::{FsError, FsResult, Result};
use crate::fs::{
    check_access, check_owner, check_parent_writable, check_traverse, file_name, is_within,
};
use crate::interpreter::ExecResult;
use crate::perms::{Access, ModeSpec};

/// Collects per-path diagnostics for commands that keep going after a
/// failure.
#[derive(Default)]
struct Report {
    stderr: String,
    failed: bool,
}

impl Report {
    fn fail(&mut self, message: String) {
        self.stderr.push_str(&message);
        self.stderr.push('\n');
        self.failed = true;
    }

    fn finish(self) -> ExecResult {
        ExecResult {
            stdout: String::new(),
            exit_code: if self.failed { 1 } else { 0 },
            stderr: self.stderr,
            prompt: None,
        }
    }
}

fn missing_operand(cmd: &str) -> ExecResult {
    ExecResult::err(
        format!("{cmd}: missing operand\nTry '{cmd} --help' for more information.\n"),
        1,
    )
}

/// The mkdir builtin - create directories.
///
/// Usage: mkdir [-p] DIRECTORY...
///
/// Options:
///   -p   Create parent directories as needed, no error if existing
pub struct Mkdir;

#[async_trait]
impl Builtin for Mkdir {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let opts = match parse_opts(ctx.args, "p", &[("parents", 'p')]) {
            Ok(opts) => opts,
            Err(e) => return Ok(usage_error("mkdir", e, 1)),
        };
        if opts.operands.is_empty() {
            return Ok(missing_operand("mkdir"));
        }
        let parents = opts.has('p');

        let mut report = Report::default();
        for dir in &opts.operands {
            let path = ctx.resolve(dir);
            let created = if parents {
                make_parents(&ctx, &path).await
            } else {
                make_one(&ctx, &path).await
            };
            if let Err(e) = created {
                report.fail(format!("mkdir: cannot create directory '{dir}': {e}"));
            }
        }
        Ok(report.finish())
    }
}

async fn make_one(ctx: &Context<'_>, path: &Path) -> FsResult<()> {
    if ctx.fs.exists(path).await? {
        return Err(FsError::AlreadyExists);
    }
    check_parent_writable(ctx.fs.as_ref(), ctx.user(), path).await?;
    ctx.fs.mkdir(path, false, &ctx.user().ownership()).await
}

/// Create every missing component, each one under the usual parent check.
async fn make_parents(ctx: &Context<'_>, path: &Path) -> FsResult<()> {
    let mut current = PathBuf::from("/");
    for component in path.components().skip(1) {
        current.push(component);
        match ctx.fs.stat(&current).await {
            Ok(meta) if meta.file_type.is_dir() => continue,
            Ok(_) => return Err(FsError::NotADirectory),
            Err(FsError::NotFound) => make_one(ctx, &current).await?,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// The rm builtin - remove files or directories.
///
/// Usage: rm [-rf] FILE...
///
/// Options:
///   -r, -R   Remove directories and their contents recursively
///   -f       Ignore nonexistent files
pub struct Rm;

#[async_trait]
impl Builtin for Rm {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let long = [("recursive", 'r'), ("force", 'f')];
        let opts = match parse_opts(ctx.args, "rRf", &long) {
            Ok(opts) => opts,
            Err(e) => return Ok(usage_error("rm", e, 1)),
        };
        let recursive = opts.has('r') || opts.has('R');
        let force = opts.has('f');

        if opts.operands.is_empty() {
            return Ok(if force {
                ExecResult::default()
            } else {
                missing_operand("rm")
            });
        }

        let mut report = Report::default();
        for file in &opts.operands {
            let base = file.trim_end_matches('/');
            if base == "." || base == ".." || base.ends_with("/.") || base.ends_with("/..") {
                report.fail(format!(
                    "rm: refusing to remove '.' or '..' directory: skipping '{file}'"
                ));
                continue;
            }
            let path = ctx.resolve(file);
            if path == Path::new("/") {
                report.fail(
                    "rm: it is dangerous to operate recursively on '/'\n\
                     rm: use --no-preserve-root to override this failsafe"
                        .to_string(),
                );
                continue;
            }

            let meta = match ctx.fs.stat(&path).await {
                Ok(meta) => meta,
                Err(FsError::NotFound) if force => continue,
                Err(e) => {
                    report.fail(format!("rm: cannot remove '{file}': {e}"));
                    continue;
                }
            };
            if meta.file_type.is_dir() && !recursive {
                report.fail(format!("rm: cannot remove '{file}': Is a directory"));
                continue;
            }

            if let Err(e) = remove_checked(&ctx, &path, meta.file_type.is_dir()).await {
                report.fail(format!("rm: cannot remove '{file}': {e}"));
            }
        }
        Ok(report.finish())
    }

    fn glob_policy(&self) -> GlobPolicy {
        GlobPolicy::Reject
    }
}

/// Removing a tree needs write access to every directory emptied on the way.
async fn remove_checked(ctx: &Context<'_>, path: &Path, is_dir: bool) -> FsResult<()> {
    let fs = ctx.fs.as_ref();
    check_parent_writable(fs, ctx.user(), path).await?;
    if is_dir && !ctx.user().is_root() {
        let mut dirs = vec![path.to_path_buf()];
        for child in fs.descendants(path).await? {
            if fs.stat(&child).await?.file_type.is_dir() {
                dirs.push(child);
            }
        }
        for dir in dirs {
            if !fs.read_dir(&dir).await?.is_empty() {
                check_access(fs, ctx.user(), &dir, Access::Write).await?;
                check_access(fs, ctx.user(), &dir, Access::Execute).await?;
            }
        }
    }
    fs.remove(path, is_dir).await
}

/// The mv builtin - move (rename) files.
///
/// Usage: mv SOURCE... DEST
pub struct Mv;

#[async_trait]
impl Builtin for Mv {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let opts = match parse_opts(ctx.args, "f", &[("force", 'f')]) {
            Ok(opts) => opts,
            Err(e) => return Ok(usage_error("mv", e, 1)),
        };
        let Some((dest, sources)) = opts.operands.split_last() else {
            return Ok(missing_operand("mv"));
        };
        if sources.is_empty() {
            return Ok(ExecResult::err(
                format!(
                    "mv: missing destination file operand after '{dest}'\n\
                     Try 'mv --help' for more information.\n"
                ),
                1,
            ));
        }

        let dest_path = ctx.resolve(dest);
        let dest_is_dir = matches!(ctx.fs.stat(&dest_path).await, Ok(m) if m.file_type.is_dir());
        if sources.len() > 1 && !dest_is_dir {
            return Ok(ExecResult::err(
                format!("mv: target '{dest}' is not a directory\n"),
                1,
            ));
        }

        let mut report = Report::default();
        for source in sources {
            let from = ctx.resolve(source);
            let to = if dest_is_dir {
                dest_path.join(file_name(&from))
            } else {
                dest_path.clone()
            };

            if from != to && is_within(&to, &from) {
                report.fail(format!(
                    "mv: cannot move '{source}' to a subdirectory of itself, '{}'",
                    to.display()
                ));
                continue;
            }
            if let Err(e) = move_checked(&ctx, &from, &to).await {
                let message = match e {
                    FsError::NotFound => format!("mv: cannot stat '{source}': {e}"),
                    FsError::IsADirectory => format!(
                        "mv: cannot overwrite directory '{}' with non-directory",
                        to.display()
                    ),
                    _ => format!("mv: cannot move '{source}' to '{}': {e}", to.display()),
                };
                report.fail(message);
            }
        }
        Ok(report.finish())
    }

    fn glob_policy(&self) -> GlobPolicy {
        GlobPolicy::Reject
    }
}

async fn move_checked(ctx: &Context<'_>, from: &Path, to: &Path) -> FsResult<()> {
    let fs = ctx.fs.as_ref();
    check_traverse(fs, ctx.user(), from).await?;
    fs.stat(from).await?;
    check_parent_writable(fs, ctx.user(), from).await?;
    check_parent_writable(fs, ctx.user(), to).await?;
    fs.rename(from, to).await
}

/// The touch builtin - change file timestamps or create empty files.
///
/// Usage: touch [-a] [-m] [-c] [-r REF] FILE...
///
/// Options:
///   -a       Change only the access time
///   -m       Change only the modification time
///   -c       Do not create missing files
///   -r REF   Use REF's times instead of the current time
pub struct Touch;

#[async_trait]
impl Builtin for Touch {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let long = [("no-create", 'c'), ("reference", 'r')];
        let opts = match parse_opts(ctx.args, "amcr:", &long) {
            Ok(opts) => opts,
            Err(e) => return Ok(usage_error("touch", e, 1)),
        };
        if opts.operands.is_empty() {
            return Ok(ExecResult::err(
                "touch: missing file operand\nTry 'touch --help' for more information.\n",
                1,
            ));
        }

        let (mut atime, mut mtime) = {
            let now = SystemTime::now();
            (now, now)
        };
        if let Some(reference) = opts.value('r') {
            let path = ctx.resolve(reference);
            let meta = async {
                check_traverse(ctx.fs.as_ref(), ctx.user(), &path).await?;
                ctx.fs.stat(&path).await
            };
            match meta.await {
                Ok(meta) => {
                    atime = meta.accessed;
                    mtime = meta.modified;
                }
                Err(e) => {
                    return Ok(ExecResult::err(
                        format!("touch: failed to get attributes of '{reference}': {e}\n"),
                        1,
                    ));
                }
            }
        }
        // Neither -a nor -m means both
        let (set_a, set_m) = match (opts.has('a'), opts.has('m')) {
            (false, false) => (true, true),
            flags => flags,
        };
        let no_create = opts.has('c');

        let mut report = Report::default();
        for file in &opts.operands {
            let path = ctx.resolve(file);
            let touched = async {
                let fs = ctx.fs.as_ref();
                match fs.stat(&path).await {
                    Ok(_) => {
                        // Explicit times need ownership; "now" only needs write
                        let writable =
                            check_access(fs, ctx.user(), &path, Access::Write).await.is_ok();
                        if !writable || opts.has('r') {
                            check_owner(fs, ctx.user(), &path).await?;
                        }
                    }
                    Err(FsError::NotFound) if no_create => return Ok(()),
                    Err(FsError::NotFound) => {
                        check_parent_writable(fs, ctx.user(), &path).await?;
                        fs.write_file(&path, b"", &ctx.user().ownership()).await?;
                    }
                    Err(e) => return Err(e),
                }
                fs.set_times(&path, set_a.then_some(atime), set_m.then_some(mtime))
                    .await
            };
            if let Err(e) = touched.await {
                report.fail(format!("touch: cannot touch '{file}': {e}"));
            }
        }
        Ok(report.finish())
    }
}

/// The chmod builtin - change file mode bits.
///
/// Usage: chmod [-R] MODE FILE...
///
/// MODE is three octal digits or comma-separated symbolic clauses such as
/// `u+x,g=r`. A leading `-` clause (`chmod -x f`) is a mode, not an option.
pub struct Chmod;

#[async_trait]
impl Builtin for Chmod {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut recursive = false;
        let mut mode: Option<&str> = None;
        let mut files: Vec<&str> = Vec::new();
        let mut options_done = false;

        for arg in ctx.args {
            if !options_done {
                match arg.as_str() {
                    "--" => {
                        options_done = true;
                        continue;
                    }
                    "-R" | "--recursive" => {
                        recursive = true;
                        continue;
                    }
                    a if a.starts_with("--") => {
                        return Ok(ExecResult::err(
                            format!(
                                "chmod: unrecognized option '{a}'\n\
                                 Try 'chmod --help' for more information.\n"
                            ),
                            1,
                        ));
                    }
                    _ => {}
                }
            }
            if mode.is_none() {
                mode = Some(arg);
            } else {
                files.push(arg);
            }
        }

        let Some(mode) = mode else {
            return Ok(missing_operand("chmod"));
        };
        if files.is_empty() {
            return Ok(ExecResult::err(
                format!(
                    "chmod: missing operand after '{mode}'\n\
                     Try 'chmod --help' for more information.\n"
                ),
                1,
            ));
        }
        // A bad mode touches nothing
        let spec: ModeSpec = match mode.parse() {
            Ok(spec) => spec,
            Err(e) => return Ok(ExecResult::err(format!("chmod: {e}\n"), 1)),
        };

        let mut report = Report::default();
        for file in files {
            let path = ctx.resolve(file);
            let mut targets = vec![(path.clone(), file.to_string())];
            if recursive && matches!(ctx.fs.stat(&path).await, Ok(m) if m.file_type.is_dir()) {
                for child in ctx.fs.descendants(&path).await? {
                    let shown = match child.strip_prefix(&path) {
                        Ok(rest) => format!("{}/{}", file.trim_end_matches('/'), rest.display()),
                        Err(_) => child.display().to_string(),
                    };
                    targets.push((child, shown));
                }
            }

            for (target, shown) in targets {
                match check_owner(ctx.fs.as_ref(), ctx.user(), &target).await {
                    Ok(meta) => {
                        let updated = spec.apply(meta.permissions());
                        ctx.fs.chmod(&target, updated.bits()).await?;
                    }
                    Err(FsError::PermissionDenied) => report.fail(format!(
                        "chmod: changing permissions of '{shown}': Operation not permitted"
                    )),
                    Err(e) => report.fail(format!("chmod: cannot access '{shown}': {e}")),
                }
            }
        }
        Ok(report.finish())
    }

    fn glob_policy(&self) -> GlobPolicy {
        GlobPolicy::Reject
    }
}

/// The chown builtin - change file owner and group.
///
/// Usage: chown [-R] OWNER[:GROUP] FILE...
///
/// `OWNER:` takes the owner's login group, `:GROUP` changes only the group.
/// Changing the owner needs root; the owner of a file may move it to any
/// group they belong to.
pub struct Chown;

#[async_trait]
impl Builtin for Chown {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let opts = match parse_opts(ctx.args, "R", &[("recursive", 'R')]) {
            Ok(opts) => opts,
            Err(e) => return Ok(usage_error("chown", e, 1)),
        };
        let Some((spec, files)) = opts.operands.split_first() else {
            return Ok(missing_operand("chown"));
        };
        if files.is_empty() {
            return Ok(ExecResult::err(
                format!(
                    "chown: missing operand after '{spec}'\n\
                     Try 'chown --help' for more information.\n"
                ),
                1,
            ));
        }

        let (owner, group) = match resolve_owner_spec(&ctx, spec).await {
            Ok(pair) => pair,
            Err(message) => return Ok(ExecResult::err(format!("chown: {message}\n"), 1)),
        };

        let user = ctx.user();
        if owner.is_some() && !user.is_root() {
            let mut report = Report::default();
            for file in files {
                report.fail(format!(
                    "chown: changing ownership of '{file}': Operation not permitted"
                ));
            }
            return Ok(report.finish());
        }
        if let Some(group) = &group
            && !user.is_root()
            && !user.in_group(group)
        {
            let mut report = Report::default();
            for file in files {
                report.fail(format!(
                    "chown: changing group of '{file}': Operation not permitted"
                ));
            }
            return Ok(report.finish());
        }

        let mut report = Report::default();
        for file in files {
            let path = ctx.resolve(file);
            let mut targets = vec![path.clone()];
            if opts.has('R') && matches!(ctx.fs.stat(&path).await, Ok(m) if m.file_type.is_dir())
            {
                targets.extend(ctx.fs.descendants(&path).await?);
            }
            for target in targets {
                match check_owner(ctx.fs.as_ref(), user, &target).await {
                    Ok(_) => {
                        ctx.fs
                            .chown(&target, owner.as_deref(), group.as_deref())
                            .await?;
                    }
                    Err(FsError::PermissionDenied) => report.fail(format!(
                        "chown: changing ownership of '{}': Operation not permitted",
                        target.display()
                    )),
                    Err(e) => report.fail(format!("chown: cannot access '{file}': {e}")),
                }
            }
        }
        Ok(report.finish())
    }

    fn glob_policy(&self) -> GlobPolicy {
        GlobPolicy::Reject
    }
}

/// Split `OWNER[:GROUP]` and check both names against the identity store.
async fn resolve_owner_spec(
    ctx: &Context<'_>,
    spec: &str,
) -> std::result::Result<(Option<String>, Option<String>), String> {
    let (owner, group) = match spec.split_once(':') {
        Some((owner, group)) => (owner, Some(group)),
        None => (spec, None),
    };

    let owner = if owner.is_empty() {
        None
    } else {
        let entry = match ctx.identity.user(owner).await {
            Ok(entry) => entry,
            Err(_) => {
                let by_uid = match owner.parse::<u32>() {
                    Ok(uid) => ctx
                        .identity
                        .users()
                        .await
                        .ok()
                        .and_then(|users| users.into_iter().find(|u| u.uid == uid)),
                    Err(_) => None,
                };
                by_uid.ok_or_else(|| format!("invalid user: '{spec}'"))?
            }
        };
        Some(entry)
    };

    let group = match group {
        None => None,
        // `OWNER:` means the owner's login group
        Some("") => match &owner {
            Some(entry) => Some(
                ctx.identity
                    .group(&entry.gid.to_string())
                    .await
                    .map(|g| g.name)
                    .map_err(|_| format!("invalid group: '{spec}'"))?,
            ),
            None => None,
        },
        Some(name) => Some(
            ctx.identity
                .group(name)
                .await
                .map(|g| g.name)
                .map_err(|_| format!("invalid group: '{spec}'"))?,
        ),
    };

    if owner.is_none() && group.is_none() && spec != ":" {
        return Err(format!("invalid spec: '{spec}'"));
    }
    Ok((owner.map(|entry| entry.username), group))
}
