//! debsh CLI - run shell lines against a persisted virtual Debian system
//!
//! Usage:
//!   debsh -c 'echo hello'              # Execute a command string
//!   debsh script.sh                    # Execute a script file
//!   debsh --state box.json             # Interactive session, state kept on exit
//!   debsh --user root --hostname build # Log in as root on host "build"

#[cfg(feature = "logging")]
mod logging;
#[cfg(feature = "interactive")]
mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use debsh::{Shell, ShellSnapshot};
use std::path::{Path, PathBuf};

/// debsh - a Debian-flavored shell over a virtual filesystem
#[derive(Parser, Debug)]
#[command(name = "debsh")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Execute the given command string
    #[arg(short = 'c')]
    command: Option<String>,

    /// Script file to execute
    #[arg()]
    script: Option<PathBuf>,

    /// Log in as this user on a fresh system
    #[arg(long)]
    user: Option<String>,

    /// Hostname for a fresh system
    #[arg(long)]
    hostname: Option<String>,

    /// JSON snapshot to resume from and save to on exit
    #[arg(long)]
    state: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    #[cfg(feature = "logging")]
    logging::init();

    let mut shell = open_shell(&args).await?;

    let exit_code = if let Some(cmd) = &args.command {
        run_script(&mut shell, cmd).await?
    } else if let Some(path) = &args.script {
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?;
        run_script(&mut shell, &script).await?
    } else {
        interactive(&mut shell).await?
    };

    if let Some(state) = &args.state {
        save_state(&shell, state)?;
    }
    std::process::exit(exit_code);
}

/// Build the shell, resuming from `--state` when the file exists.
async fn open_shell(args: &Args) -> Result<Shell> {
    let mut builder = Shell::builder();
    if let Some(user) = &args.user {
        builder = builder.user(user);
    }
    if let Some(hostname) = &args.hostname {
        builder = builder.hostname(hostname);
    }
    if let Some(state) = &args.state
        && state.exists()
    {
        let json = std::fs::read_to_string(state)
            .with_context(|| format!("Failed to read state: {}", state.display()))?;
        let snapshot = ShellSnapshot::from_json(&json)
            .with_context(|| format!("Failed to load state: {}", state.display()))?;
        builder = builder.snapshot(snapshot);
    }
    builder.build().await.context("Failed to start shell")
}

fn save_state(shell: &Shell, path: &Path) -> Result<()> {
    let json = shell.snapshot()?.to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write state: {}", path.display()))
}

/// Run a multi-line script and print its output. A prompt still open at
/// the end of the input is abandoned.
async fn run_script(shell: &mut Shell, script: &str) -> Result<i32> {
    let result = shell
        .exec_script(script)
        .await
        .context("Failed to execute script")?;
    print!("{}", result.stdout);
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }
    if shell.cancel_prompt() {
        eprintln!("debsh: input ended while waiting for a password");
        return Ok(1);
    }
    Ok(result.exit_code)
}

#[cfg(feature = "interactive")]
async fn interactive(shell: &mut Shell) -> Result<i32> {
    repl::run(shell).await
}

/// Without a line editor, standard input is read as one script.
#[cfg(not(feature = "interactive"))]
async fn interactive(shell: &mut Shell) -> Result<i32> {
    let script = std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?;
    run_script(shell, &script).await
}
