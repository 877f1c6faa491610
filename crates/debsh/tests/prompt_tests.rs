//! Password dialogues: passwd, su, sudo, cancellation and nested logins.
//!
//! Run with: `cargo test -p debsh --test prompt_tests`

use debsh::{ExecResult, Shell};
use pretty_assertions::assert_eq;
use std::path::Path;

async fn shell() -> Shell {
    Shell::new().await.unwrap()
}

async fn run(shell: &mut Shell, line: &str) -> ExecResult {
    shell.exec(line).await.unwrap()
}

async fn shadow(shell: &Shell) -> String {
    let bytes = shell.fs().read_file(Path::new("/etc/shadow")).await.unwrap();
    String::from_utf8(bytes).unwrap()
}

// =============================================================================
// passwd
// =============================================================================

#[tokio::test]
async fn test_passwd_full_dialogue() {
    let mut sh = shell().await;
    let result = run(&mut sh, "passwd").await;
    assert_eq!(result.stdout, "Changing password for user.\n");
    assert_eq!(result.prompt.as_deref(), Some("Current password: "));
    assert_eq!(sh.prompt_string(), "Current password: ");

    let result = run(&mut sh, "user").await;
    assert_eq!(result.prompt.as_deref(), Some("New password: "));
    let result = run(&mut sh, "hunter2").await;
    assert_eq!(result.prompt.as_deref(), Some("Retype new password: "));
    let result = run(&mut sh, "hunter2").await;
    assert_eq!(result.stdout, "passwd: password updated successfully\n");
    assert_eq!(result.exit_code, 0);
    assert!(!sh.awaiting_input());

    assert!(sh.identity().verify_password("user", "hunter2").await.unwrap());
    assert!(!sh.identity().verify_password("user", "user").await.unwrap());
}

#[tokio::test]
async fn test_passwd_wrong_current_password() {
    let mut sh = shell().await;
    let before = shadow(&sh).await;
    run(&mut sh, "passwd").await;
    let result = run(&mut sh, "nope").await;
    assert_eq!(result.exit_code, 10);
    assert_eq!(
        result.stderr,
        "passwd: Authentication token manipulation error\npasswd: password unchanged\n"
    );
    assert_eq!(shadow(&sh).await, before);
}

#[tokio::test]
async fn test_passwd_mismatch_writes_nothing() {
    let mut sh = shell().await;
    let before = shadow(&sh).await;
    run(&mut sh, "passwd").await;
    run(&mut sh, "user").await;
    run(&mut sh, "first").await;
    let result = run(&mut sh, "second").await;
    assert_eq!(result.exit_code, 10);
    assert_eq!(
        result.stderr,
        "Sorry, passwords do not match.\npasswd: password unchanged\n"
    );
    assert_eq!(shadow(&sh).await, before);
}

#[tokio::test]
async fn test_passwd_input_is_not_parsed() {
    let mut sh = shell().await;
    run(&mut sh, "passwd").await;
    run(&mut sh, "user").await;
    run(&mut sh, "a 'b > c").await;
    let result = run(&mut sh, "a 'b > c").await;
    assert_eq!(result.exit_code, 0);
    assert!(!sh.fs().exists(Path::new("/home/user/c")).await.unwrap());
    assert!(sh.identity().verify_password("user", "a 'b > c").await.unwrap());
}

#[tokio::test]
async fn test_passwd_other_user_needs_root() {
    let mut sh = shell().await;
    let result = run(&mut sh, "passwd root").await;
    assert_eq!(result.exit_code, 1);
    assert!(!sh.awaiting_input());
}

#[tokio::test]
async fn test_passwd_admin_options() {
    let mut sh = Shell::builder().user("root").build().await.unwrap();
    let result = run(&mut sh, "passwd -l user").await;
    assert_eq!(result.stdout, "passwd: password changed.\n");
    let status = run(&mut sh, "passwd -S user").await.stdout;
    assert!(status.starts_with("user L "));

    run(&mut sh, "passwd -u user").await;
    assert!(run(&mut sh, "passwd -S user").await.stdout.starts_with("user P "));

    // root skips the current password
    let result = run(&mut sh, "passwd user").await;
    assert_eq!(result.prompt.as_deref(), Some("New password: "));
}

#[tokio::test]
async fn test_cancel_prompt() {
    let mut sh = shell().await;
    let before = shadow(&sh).await;
    run(&mut sh, "passwd").await;
    run(&mut sh, "user").await;
    assert!(sh.cancel_prompt());
    assert!(!sh.awaiting_input());
    assert_eq!(sh.session().last_exit_code, 1);
    assert_eq!(shadow(&sh).await, before);

    // The next line is a command again.
    assert_eq!(run(&mut sh, "whoami").await.stdout, "user\n");
    assert!(!sh.cancel_prompt());
}

// =============================================================================
// su and exit
// =============================================================================

#[tokio::test]
async fn test_su_and_exit() {
    let mut sh = shell().await;
    run(&mut sh, "cd /tmp").await;
    let result = run(&mut sh, "su").await;
    assert_eq!(result.prompt.as_deref(), Some("Password: "));
    run(&mut sh, "root").await;

    assert_eq!(run(&mut sh, "whoami").await.stdout, "root\n");
    assert_eq!(sh.session().login_depth(), 1);
    assert_eq!(sh.prompt_string(), "root@debian:/tmp# ");

    run(&mut sh, "exit").await;
    assert_eq!(run(&mut sh, "whoami").await.stdout, "user\n");
    assert_eq!(run(&mut sh, "pwd").await.stdout, "/tmp\n");
    assert!(!sh.is_finished());

    run(&mut sh, "exit").await;
    assert!(sh.is_finished());
}

#[tokio::test]
async fn test_su_login_shell_goes_home() {
    let mut sh = shell().await;
    run(&mut sh, "su - root").await;
    run(&mut sh, "root").await;
    assert_eq!(run(&mut sh, "pwd").await.stdout, "/root\n");
    assert_eq!(run(&mut sh, "echo $HOME").await.stdout, "/root\n");
}

#[tokio::test]
async fn test_su_wrong_password() {
    let mut sh = shell().await;
    run(&mut sh, "su").await;
    let result = run(&mut sh, "wrong").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "su: Authentication failure\n");
    assert_eq!(run(&mut sh, "whoami").await.stdout, "user\n");
}

#[tokio::test]
async fn test_su_unknown_user() {
    let mut sh = shell().await;
    let result = run(&mut sh, "su ghost").await;
    assert_eq!(result.exit_code, 1);
    assert!(!sh.awaiting_input());
}

#[tokio::test]
async fn test_exit_code_argument() {
    let mut sh = shell().await;
    let result = run(&mut sh, "exit 3").await;
    assert_eq!(result.exit_code, 3);
    assert!(sh.is_finished());
}

// =============================================================================
// sudo
// =============================================================================

#[tokio::test]
async fn test_sudo_runs_as_root_then_caches() {
    let mut sh = shell().await;
    let result = run(&mut sh, "sudo whoami").await;
    assert_eq!(result.prompt.as_deref(), Some("[sudo] password for user: "));
    let result = run(&mut sh, "user").await;
    assert_eq!(result.stdout, "root\n");

    // Back to the caller afterwards, and no second prompt.
    assert_eq!(run(&mut sh, "whoami").await.stdout, "user\n");
    let result = run(&mut sh, "sudo id -u").await;
    assert_eq!(result.prompt, None);
    assert_eq!(result.stdout, "0\n");
}

#[tokio::test]
async fn test_sudo_retries_then_gives_up() {
    let mut sh = shell().await;
    run(&mut sh, "sudo true").await;
    let result = run(&mut sh, "bad1").await;
    assert_eq!(result.stderr, "Sorry, try again.\n");
    assert!(result.is_awaiting_input());
    run(&mut sh, "bad2").await;
    let result = run(&mut sh, "bad3").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "sudo: 3 incorrect password attempts\n");
    assert!(!sh.awaiting_input());
}

#[tokio::test]
async fn test_sudo_output_redirect_applies_after_prompt() {
    let mut sh = shell().await;
    run(&mut sh, "sudo echo elevated > note").await;
    run(&mut sh, "user").await;
    let meta = sh.fs().stat(Path::new("/home/user/note")).await.unwrap();
    assert_eq!(meta.owner, "user");
    let content = sh.fs().read_file(Path::new("/home/user/note")).await.unwrap();
    assert_eq!(content, b"elevated\n");
}

#[tokio::test]
async fn test_sudo_not_in_sudoers() {
    let mut sh = Shell::builder().user("root").build().await.unwrap();
    run(&mut sh, "useradd -m alice").await;
    run(&mut sh, "su alice").await;

    let result = run(&mut sh, "sudo whoami").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "alice is not in the sudoers file.\n");
    assert!(!sh.awaiting_input());
}

#[tokio::test]
async fn test_sudo_in_pipeline_cannot_prompt() {
    let mut sh = shell().await;
    let result = run(&mut sh, "sudo cat /etc/shadow | cat").await;
    assert_eq!(result.exit_code, 0);
    assert!(result.stderr.contains("sudo: a terminal is required"));
    assert!(!sh.awaiting_input());
}

#[tokio::test]
async fn test_sudo_su_as_root_switches_directly() {
    let mut sh = shell().await;
    run(&mut sh, "sudo su").await;
    run(&mut sh, "user").await;
    assert_eq!(run(&mut sh, "whoami").await.stdout, "root\n");
    run(&mut sh, "exit").await;
    assert_eq!(run(&mut sh, "whoami").await.stdout, "user\n");
}
