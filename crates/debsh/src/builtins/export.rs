//! export and unset builtins

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::ExecResult;
use crate::parser::is_valid_var_name;

/// export builtin - move variables into the session scope
///
/// `export NAME=VALUE` sets the exported value and drops any local binding.
/// `export NAME` promotes the local value, or an empty one. Without
/// arguments it lists exported variables as `declare -x NAME="value"`.
pub struct Export;

#[async_trait]
impl Builtin for Export {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let session = ctx.session;

        if ctx.args.is_empty() {
            let mut names: Vec<&String> = session.exported.keys().collect();
            names.sort();
            let output: String = names
                .into_iter()
                .map(|name| {
                    let value = session.exported[name].replace('\\', "\\\\").replace('"', "\\\"");
                    format!("declare -x {name}=\"{value}\"\n")
                })
                .collect();
            return Ok(ExecResult::ok(output));
        }

        let mut stderr = String::new();
        for arg in ctx.args {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (arg.as_str(), None),
            };
            if !is_valid_var_name(name) {
                stderr.push_str(&format!("debsh: export: `{arg}': not a valid identifier\n"));
                continue;
            }
            let local = session.locals.remove(name);
            let value = value
                .or(local)
                .or_else(|| session.exported.get(name).cloned())
                .unwrap_or_default();
            session.exported.insert(name.to_string(), value);
        }

        let exit_code = if stderr.is_empty() { 0 } else { 1 };
        Ok(ExecResult {
            stderr,
            exit_code,
            ..Default::default()
        })
    }
}

/// unset builtin - remove variables from the local and session scopes
pub struct Unset;

#[async_trait]
impl Builtin for Unset {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut stderr = String::new();
        for name in ctx.args {
            if name == "-v" {
                continue;
            }
            if !is_valid_var_name(name) {
                stderr.push_str(&format!("debsh: unset: `{name}': not a valid identifier\n"));
                continue;
            }
            ctx.session.locals.remove(name.as_str());
            ctx.session.exported.remove(name.as_str());
        }

        let exit_code = if stderr.is_empty() { 0 } else { 1 };
        Ok(ExecResult {
            stderr,
            exit_code,
            ..Default::default()
        })
    }
}
