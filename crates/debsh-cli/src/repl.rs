//! Interactive read-eval-print loop

use anyhow::{Context, Result};
use debsh::Shell;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;

/// Read lines until `exit` at the outermost login or end of input.
///
/// Answers to password prompts are kept out of the history.
pub async fn run(shell: &mut Shell) -> Result<i32> {
    let mut editor = DefaultEditor::new().context("Failed to initialise line editor")?;

    while !shell.is_finished() {
        let secret = shell.awaiting_input();
        match editor.readline(&shell.prompt_string()) {
            Ok(line) => {
                if !secret && !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                match shell.exec(&line).await {
                    Ok(result) => {
                        print!("{}", result.stdout);
                        eprint!("{}", result.stderr);
                    }
                    Err(e) => eprintln!("debsh: {e}"),
                }
                std::io::stdout().flush()?;
            }
            Err(ReadlineError::Interrupted) => {
                if !shell.cancel_prompt() {
                    println!("^C");
                }
            }
            Err(ReadlineError::Eof) => {
                shell.cancel_prompt();
                println!("exit");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(shell.session().last_exit_code)
}
