//! Environment builtins - env

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;

/// The env builtin - print the environment.
///
/// Usage: env [-i] [NAME=VALUE]...
///
/// Options:
///   -i   Start with an empty environment
///
/// Prints the synthesized environment plus exported variables, sorted by
/// name, followed by any `NAME=VALUE` operands.
pub struct Env;

#[async_trait]
impl Builtin for Env {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut ignore_env = false;
        let mut extra: Vec<(&str, &str)> = Vec::new();

        for arg in ctx.args {
            if arg == "-i" || arg == "--ignore-environment" {
                ignore_env = true;
            } else if let Some((name, value)) = arg.split_once('=') {
                extra.push((name, value));
            } else {
                // Commands run only through the shell's own dispatcher
                return Ok(ExecResult::err(
                    format!("env: '{arg}': No such file or directory\n"),
                    127,
                ));
            }
        }

        let mut env = if ignore_env {
            Default::default()
        } else {
            ctx.session.environment()
        };
        for (name, value) in extra {
            env.insert(name.to_string(), value.to_string());
        }

        let output: String = env
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect();
        Ok(ExecResult::ok(output))
    }
}
