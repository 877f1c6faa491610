//! ls builtin command

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local};
use std::path::{Path, PathBuf};

use super::{Builtin, Context, GlobPolicy, parse_opts, usage_error};
use crate::error::{FsError, Result};
use crate::fs::{DirEntry, Metadata, check_access, check_traverse};
use crate::interpreter::ExecResult;
use crate::perms::Access;

/// Options for ls command
struct LsOptions {
    long: bool,
    all: bool,
    human: bool,
    one_per_line: bool,
    recursive: bool,
}

/// The ls builtin - list directory contents.
///
/// Usage: ls [-l] [-a] [-h] [-1] [-R] [PATH...]
///
/// Options:
///   -l   Use long listing format
///   -a   Show hidden entries, including `.` and `..`
///   -h   Human-readable sizes (with -l)
///   -1   One entry per line
///   -R   List subdirectories recursively
pub struct Ls;

#[async_trait]
impl Builtin for Ls {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let long = [
            ("all", 'a'),
            ("human-readable", 'h'),
            ("recursive", 'R'),
        ];
        let parsed = match parse_opts(ctx.args, "lah1R", &long) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(usage_error("ls", e, 2)),
        };
        let opts = LsOptions {
            long: parsed.has('l'),
            all: parsed.has('a'),
            human: parsed.has('h'),
            one_per_line: parsed.has('1'),
            recursive: parsed.has('R'),
        };

        let mut operands = parsed.operands;
        if operands.is_empty() {
            operands.push(".".to_string());
        }

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut files: Vec<(String, Metadata)> = Vec::new();
        let mut dirs: Vec<(String, PathBuf)> = Vec::new();

        for operand in &operands {
            let path = ctx.resolve(operand);
            let stat = async {
                check_traverse(ctx.fs.as_ref(), ctx.user(), &path).await?;
                ctx.fs.stat(&path).await
            };
            match stat.await {
                Ok(meta) if meta.file_type.is_dir() => dirs.push((operand.clone(), path)),
                Ok(meta) => files.push((operand.clone(), meta)),
                Err(e) => stderr.push_str(&format!("ls: cannot access '{operand}': {e}\n")),
            }
        }

        files.sort_by(|a, b| sort_key(&a.0).cmp(&sort_key(&b.0)));
        dirs.sort_by(|a, b| sort_key(&a.0).cmp(&sort_key(&b.0)));

        if !files.is_empty() {
            let rows: Vec<(String, &Metadata)> =
                files.iter().map(|(name, meta)| (name.clone(), meta)).collect();
            stdout.push_str(&render(&rows, &opts, false));
        }

        let headers = operands.len() > 1 || opts.recursive;
        let mut queue: Vec<(String, PathBuf)> = dirs.into_iter().rev().collect();
        while let Some((display, path)) = queue.pop() {
            if !stdout.is_empty() {
                stdout.push('\n');
            }
            if headers {
                stdout.push_str(&format!("{display}:\n"));
            }
            match read_listing(&ctx, &path, opts.all).await {
                Ok(entries) => {
                    let rows: Vec<(String, &Metadata)> = entries
                        .iter()
                        .map(|e| (e.name.clone(), &e.metadata))
                        .collect();
                    stdout.push_str(&render(&rows, &opts, true));
                    if opts.recursive {
                        let subdirs = entries
                            .iter()
                            .filter(|e| e.metadata.file_type.is_dir())
                            .filter(|e| e.name != "." && e.name != "..")
                            .map(|e| {
                                let display = if display.ends_with('/') {
                                    format!("{display}{}", e.name)
                                } else {
                                    format!("{display}/{}", e.name)
                                };
                                (display, path.join(&e.name))
                            });
                        // Depth-first: children are listed before later siblings
                        let subdirs: Vec<_> = subdirs.collect();
                        queue.extend(subdirs.into_iter().rev());
                    }
                }
                Err(e) => {
                    stderr.push_str(&format!("ls: cannot open directory '{display}': {e}\n"));
                }
            }
        }

        let exit_code = if stderr.is_empty() { 0 } else { 2 };
        Ok(ExecResult {
            stdout,
            stderr,
            exit_code,
            prompt: None,
        })
    }

    fn glob_policy(&self) -> GlobPolicy {
        GlobPolicy::Reject
    }
}

/// Sorted directory entries, with `.` and `..` under `-a`.
async fn read_listing(
    ctx: &Context<'_>,
    path: &Path,
    all: bool,
) -> std::result::Result<Vec<DirEntry>, FsError> {
    check_access(ctx.fs.as_ref(), ctx.user(), path, Access::Read).await?;
    let mut entries: Vec<DirEntry> = ctx
        .fs
        .read_dir(path)
        .await?
        .into_iter()
        .filter(|e| all || !e.name.starts_with('.'))
        .collect();
    entries.sort_by(|a, b| sort_key(&a.name).cmp(&sort_key(&b.name)));

    if all {
        let parent = path.parent().unwrap_or(path);
        let dot = ctx.fs.stat(path).await?;
        let dotdot = ctx.fs.stat(parent).await?;
        entries.insert(0, DirEntry { name: "..".into(), metadata: dotdot });
        entries.insert(0, DirEntry { name: ".".into(), metadata: dot });
    }
    Ok(entries)
}

/// Case-folded with leading dots ignored, close to Debian's default
/// collation.
fn sort_key(name: &str) -> (String, String) {
    let trimmed = name.trim_start_matches('.');
    (trimmed.to_lowercase(), name.to_string())
}

fn render(rows: &[(String, &Metadata)], opts: &LsOptions, with_total: bool) -> String {
    if rows.is_empty() {
        return if opts.long && with_total {
            "total 0\n".to_string()
        } else {
            String::new()
        };
    }
    if opts.long {
        return render_long(rows, opts.human, with_total);
    }

    let names: Vec<&str> = rows.iter().map(|(name, _)| name.as_str()).collect();
    if opts.one_per_line {
        let mut out = names.join("\n");
        out.push('\n');
        out
    } else {
        let mut out = names.join("  ");
        out.push('\n');
        out
    }
}

fn render_long(rows: &[(String, &Metadata)], human: bool, with_total: bool) -> String {
    let sizes: Vec<String> = rows
        .iter()
        .map(|(_, m)| {
            if human {
                human_readable_size(m.size)
            } else {
                m.size.to_string()
            }
        })
        .collect();
    let links_w = rows.iter().map(|(_, m)| m.links.to_string().len()).max().unwrap_or(1);
    let owner_w = rows.iter().map(|(_, m)| m.owner.len()).max().unwrap_or(1);
    let group_w = rows.iter().map(|(_, m)| m.group.len()).max().unwrap_or(1);
    let size_w = sizes.iter().map(String::len).max().unwrap_or(1);

    let mut out = String::new();
    if with_total {
        let blocks: u64 = rows.iter().map(|(_, m)| allocated_blocks(m)).sum();
        let total = if human {
            human_readable_size(blocks * 1024)
        } else {
            blocks.to_string()
        };
        out.push_str(&format!("total {total}\n"));
    }

    let now = Local::now();
    for ((name, meta), size) in rows.iter().zip(&sizes) {
        out.push_str(&format!(
            "{} {:>links_w$} {:<owner_w$} {:<group_w$} {:>size_w$} {} {}\n",
            meta.permissions(),
            meta.links,
            meta.owner,
            meta.group,
            size,
            format_time(meta, now),
            name,
        ));
    }
    out
}

/// 1K blocks, rounded to 4K allocation units.
fn allocated_blocks(meta: &Metadata) -> u64 {
    if meta.file_type.is_dir() {
        4
    } else {
        meta.size.div_ceil(4096) * 4
    }
}

/// `Mon DD HH:MM`, or `Mon DD  YYYY` for entries more than six months
/// away from now.
fn format_time(meta: &Metadata, now: DateTime<Local>) -> String {
    let modified: DateTime<Local> = meta.modified.into();
    let recent = modified > now - Duration::days(182) && modified <= now + Duration::hours(1);
    if recent {
        modified.format("%b %e %H:%M").to_string()
    } else {
        modified.format("%b %e  %Y").to_string()
    }
}

fn human_readable_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    if size < 1024 {
        return size.to_string();
    }
    let mut value = size as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value < 10.0 {
        format!("{:.1}{}", (value * 10.0).ceil() / 10.0, UNITS[unit])
    } else {
        format!("{:.0}{}", value.ceil(), UNITS[unit])
    }
}
