//! cat builtin command

use async_trait::async_trait;

use super::{Builtin, Context, GlobPolicy, parse_opts, usage_error};
use crate::error::{FsError, Result};
use crate::fs::check_access;
use crate::interpreter::ExecResult;
use crate::perms::Access;

/// The cat builtin command.
pub struct Cat;

#[async_trait]
impl Builtin for Cat {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let long = [("number", 'n'), ("show-ends", 'E')];
        let opts = match parse_opts(ctx.args, "nE", &long) {
            Ok(opts) => opts,
            Err(e) => return Ok(usage_error("cat", e, 1)),
        };
        let number_lines = opts.has('n');
        let show_ends = opts.has('E');

        let mut raw = String::new();
        let mut stderr = String::new();

        if opts.operands.is_empty() {
            raw.push_str(ctx.stdin.unwrap_or_default());
        }
        for file in &opts.operands {
            if file == "-" {
                raw.push_str(ctx.stdin.unwrap_or_default());
                continue;
            }
            let path = ctx.resolve(file);
            let read = async {
                check_access(ctx.fs.as_ref(), ctx.user(), &path, Access::Read).await?;
                if ctx.fs.stat(&path).await?.file_type.is_dir() {
                    return Err(FsError::IsADirectory);
                }
                ctx.fs.read_file(&path).await
            };
            match read.await {
                Ok(content) => raw.push_str(&String::from_utf8_lossy(&content)),
                Err(e) => stderr.push_str(&format!("cat: {file}: {e}\n")),
            }
        }

        let output = if number_lines || show_ends {
            decorate(&raw, number_lines, show_ends)
        } else {
            raw
        };

        let exit_code = if stderr.is_empty() { 0 } else { 1 };
        Ok(ExecResult {
            stdout: output,
            stderr,
            exit_code,
            prompt: None,
        })
    }

    fn glob_policy(&self) -> GlobPolicy {
        GlobPolicy::Reject
    }
}

/// Apply `-n` numbering and `-E` end markers.
fn decorate(raw: &str, number_lines: bool, show_ends: bool) -> String {
    let mut output = String::with_capacity(raw.len());
    for (i, line) in raw.split_inclusive('\n').enumerate() {
        if number_lines {
            output.push_str(&format!("{:>6}\t", i + 1));
        }
        match line.strip_suffix('\n') {
            Some(body) => {
                output.push_str(body);
                if show_ends {
                    output.push('$');
                }
                output.push('\n');
            }
            None => output.push_str(line),
        }
    }
    output
}
