//! End-to-end tests for line execution: quoting, expansion, redirection,
//! variables and the file commands.
//!
//! Run with: `cargo test -p debsh --test shell_tests`

use debsh::{Error, ExecResult, Shell, ShellLimits, tokenize};
use pretty_assertions::assert_eq;
use std::path::Path;

async fn shell() -> Shell {
    Shell::new().await.unwrap()
}

async fn root_shell() -> Shell {
    Shell::builder().user("root").build().await.unwrap()
}

async fn run(shell: &mut Shell, line: &str) -> ExecResult {
    shell.exec(line).await.unwrap()
}

async fn read(shell: &Shell, path: &str) -> String {
    let bytes = shell.fs().read_file(Path::new(path)).await.unwrap();
    String::from_utf8(bytes).unwrap()
}

// =============================================================================
// Lexing and expansion
// =============================================================================

#[test]
fn test_tokenize_keeps_quoted_spaces() {
    assert_eq!(tokenize(r#"echo "a b" c"#).unwrap(), vec!["echo", "a b", "c"]);
    assert_eq!(
        tokenize("cat<in|wc>>out").unwrap(),
        vec!["cat", "<", "in", "|", "wc", ">>", "out"]
    );
}

#[tokio::test]
async fn test_unterminated_quote_aborts_line() {
    let mut sh = shell().await;
    let err = sh.exec("echo 'oops").await.unwrap_err();
    assert!(matches!(err, Error::UnterminatedQuote { quote: '\'' }));
    assert_eq!(sh.session().last_exit_code, 2);

    // The session stays usable.
    assert_eq!(run(&mut sh, "echo fine").await.stdout, "fine\n");
}

#[tokio::test]
async fn test_trailing_pipe_is_syntax_error() {
    let mut sh = shell().await;
    let err = sh.exec("echo a |").await.unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
}

#[tokio::test]
async fn test_brace_expansion() {
    let mut sh = shell().await;
    assert_eq!(run(&mut sh, "echo a{b,c}d").await.stdout, "abd acd\n");
    assert_eq!(run(&mut sh, "echo {1..3}").await.stdout, "1 2 3\n");
    assert_eq!(run(&mut sh, "echo '{x,y}'").await.stdout, "{x,y}\n");
}

#[tokio::test]
async fn test_brace_expansion_limit() {
    let mut sh = Shell::builder()
        .limits(ShellLimits::new().max_brace_expansion(8))
        .build()
        .await
        .unwrap();
    let err = sh.exec("echo {a,b,c}{a,b,c}").await.unwrap_err();
    assert!(matches!(err, Error::ResourceLimit(_)));
}

#[tokio::test]
async fn test_huge_brace_range_is_cut_off_at_limit() {
    let mut sh = Shell::builder()
        .limits(ShellLimits::new().max_brace_expansion(10))
        .build()
        .await
        .unwrap();
    let err = sh.exec("echo {1..100000000}").await.unwrap_err();
    assert!(matches!(err, Error::ResourceLimit(_)));
    assert_eq!(sh.session().last_exit_code, 2);

    assert_eq!(run(&mut sh, "echo {1..10}").await.stdout, "1 2 3 4 5 6 7 8 9 10\n");
}

#[tokio::test]
async fn test_tilde_and_quoting() {
    let mut sh = shell().await;
    run(&mut sh, "cd /tmp").await;
    run(&mut sh, "echo hi > ~/t").await;
    assert_eq!(read(&sh, "/home/user/t").await, "hi\n");
    assert_eq!(run(&mut sh, "cat ~/t").await.stdout, "hi\n");
    assert_eq!(run(&mut sh, "echo '$HOME'").await.stdout, "$HOME\n");
    assert_eq!(run(&mut sh, "echo \"$HOME\"").await.stdout, "/home/user\n");
}

#[tokio::test]
async fn test_glob_expansion_sorted() {
    let mut sh = shell().await;
    run(&mut sh, "touch b.txt a.txt c.log").await;
    assert_eq!(run(&mut sh, "echo *.txt").await.stdout, "a.txt b.txt\n");
}

#[tokio::test]
async fn test_unmatched_glob_policies() {
    let mut sh = shell().await;
    // echo passes the pattern through untouched.
    assert_eq!(run(&mut sh, "echo *.none").await.stdout, "*.none\n");

    // rm refuses to run at all.
    let result = run(&mut sh, "rm *.none").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "rm: no matches found: *.none\n");
}

// =============================================================================
// Variables
// =============================================================================

#[tokio::test]
async fn test_variable_priority() {
    let mut sh = shell().await;
    assert_eq!(run(&mut sh, "echo $USER").await.stdout, "user\n");

    run(&mut sh, "export USER=exported").await;
    assert_eq!(run(&mut sh, "echo $USER").await.stdout, "exported\n");

    run(&mut sh, "USER=local").await;
    assert_eq!(run(&mut sh, "echo $USER").await.stdout, "local\n");

    run(&mut sh, "unset USER").await;
    assert_eq!(run(&mut sh, "echo $USER").await.stdout, "user\n");
}

#[tokio::test]
async fn test_unset_variable_expands_empty() {
    let mut sh = shell().await;
    assert_eq!(run(&mut sh, "echo a${NOPE}b $NOPE").await.stdout, "ab\n");
}

#[tokio::test]
async fn test_exit_status_variable() {
    let mut sh = shell().await;
    run(&mut sh, "false").await;
    assert_eq!(run(&mut sh, "echo $?").await.stdout, "1\n");
    assert_eq!(run(&mut sh, "echo $?").await.stdout, "0\n");
}

#[tokio::test]
async fn test_local_variables_not_in_env() {
    let mut sh = shell().await;
    run(&mut sh, "SECRET=1").await;
    run(&mut sh, "export SHOWN=2").await;
    let env = run(&mut sh, "env").await.stdout;
    assert!(env.contains("SHOWN=2\n"));
    assert!(!env.contains("SECRET"));
    assert!(env.contains("HOME=/home/user\n"));
}

#[tokio::test]
async fn test_export_invalid_identifier() {
    let mut sh = shell().await;
    let result = run(&mut sh, "export 1abc=x").await;
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("not a valid identifier"));
}

// =============================================================================
// Redirection and pipelines
// =============================================================================

#[tokio::test]
async fn test_redirect_truncate_then_append() {
    let mut sh = shell().await;
    run(&mut sh, "echo x > f").await;
    assert_eq!(read(&sh, "/home/user/f").await, "x\n");
    run(&mut sh, "echo y >> f").await;
    assert_eq!(read(&sh, "/home/user/f").await, "x\ny\n");
    run(&mut sh, "echo z > f").await;
    assert_eq!(read(&sh, "/home/user/f").await, "z\n");
}

#[tokio::test]
async fn test_redirect_missing_parent_creates_nothing() {
    let mut sh = shell().await;
    let result = run(&mut sh, "echo x > nodir/f").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "debsh: nodir/f: No such file or directory\n");
    assert!(!sh.fs().exists(Path::new("/home/user/nodir")).await.unwrap());
}

#[tokio::test]
async fn test_redirect_into_unwritable_directory() {
    let mut sh = shell().await;
    let result = run(&mut sh, "echo x > /etc/motd").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "debsh: /etc/motd: Permission denied\n");
}

#[tokio::test]
async fn test_input_redirection_and_pipeline() {
    let mut sh = shell().await;
    run(&mut sh, "echo hello > in").await;
    assert_eq!(run(&mut sh, "cat < in").await.stdout, "hello\n");
    assert_eq!(run(&mut sh, "cat in | cat -n").await.stdout, "     1\thello\n");
}

#[tokio::test]
async fn test_pipeline_into_file() {
    let mut sh = shell().await;
    run(&mut sh, "echo piped | cat > out").await;
    assert_eq!(read(&sh, "/home/user/out").await, "piped\n");
}

#[tokio::test]
async fn test_pipeline_stage_limit() {
    let mut sh = Shell::builder()
        .limits(ShellLimits::new().max_pipeline_stages(2))
        .build()
        .await
        .unwrap();
    let err = sh.exec("echo a | cat | cat").await.unwrap_err();
    assert!(matches!(err, Error::ResourceLimit(_)));
}

#[tokio::test]
async fn test_command_not_found() {
    let mut sh = shell().await;
    let result = run(&mut sh, "frobnicate").await;
    assert_eq!(result.exit_code, 127);
    assert_eq!(result.stderr, "frobnicate: command not found\n");
}

// =============================================================================
// Files and permissions
// =============================================================================

#[tokio::test]
async fn test_mkdir_parents_idempotent() {
    let mut sh = shell().await;
    assert_eq!(run(&mut sh, "mkdir -p a/b/c").await.exit_code, 0);
    assert_eq!(run(&mut sh, "mkdir -p a/b/c").await.exit_code, 0);

    let result = run(&mut sh, "mkdir a").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "mkdir: cannot create directory 'a': File exists\n");
}

#[tokio::test]
async fn test_new_files_get_default_modes() {
    let mut sh = shell().await;
    run(&mut sh, "touch f").await;
    run(&mut sh, "mkdir d").await;
    let meta = sh.fs().stat(Path::new("/home/user/f")).await.unwrap();
    assert_eq!(meta.permissions().to_string(), "-rw-r--r--");
    assert_eq!(meta.owner, "user");
    let meta = sh.fs().stat(Path::new("/home/user/d")).await.unwrap();
    assert_eq!(meta.permissions().to_string(), "drwxr-xr-x");
}

#[tokio::test]
async fn test_chmod_symbolic_and_octal() {
    let mut sh = shell().await;
    run(&mut sh, "touch f").await;
    run(&mut sh, "chmod 600 f").await;
    run(&mut sh, "chmod g+r,o=x f").await;
    let meta = sh.fs().stat(Path::new("/home/user/f")).await.unwrap();
    assert_eq!(meta.permissions().to_string(), "-rw-r----x");

    let result = run(&mut sh, "chmod 999 f").await;
    assert_eq!(result.exit_code, 1);
}

#[tokio::test]
async fn test_read_permission_enforced() {
    let mut sh = shell().await;
    run(&mut sh, "echo secret > f").await;
    run(&mut sh, "chmod 000 f").await;
    let result = run(&mut sh, "cat f").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "cat: f: Permission denied\n");

    // root ignores permission bits
    let result = run(&mut sh, "sudo cat f").await;
    assert!(result.is_awaiting_input());
    let result = run(&mut sh, "user").await;
    assert_eq!(result.stdout, "secret\n");
}

#[tokio::test]
async fn test_shadow_unreadable_for_user() {
    let mut sh = shell().await;
    let result = run(&mut sh, "cat /etc/shadow").await;
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("Permission denied"));
}

#[tokio::test]
async fn test_mv_and_rm() {
    let mut sh = shell().await;
    run(&mut sh, "mkdir d").await;
    run(&mut sh, "echo a > f").await;
    assert_eq!(run(&mut sh, "mv f d").await.exit_code, 0);
    assert_eq!(read(&sh, "/home/user/d/f").await, "a\n");

    let result = run(&mut sh, "rm d").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "rm: cannot remove 'd': Is a directory\n");

    assert_eq!(run(&mut sh, "rm -r d").await.exit_code, 0);
    assert!(!sh.fs().exists(Path::new("/home/user/d")).await.unwrap());
    assert_eq!(run(&mut sh, "rm -f missing").await.exit_code, 0);
}

#[tokio::test]
async fn test_mv_into_own_subdirectory() {
    let mut sh = shell().await;
    run(&mut sh, "mkdir -p a/b").await;
    let result = run(&mut sh, "mv a a/b").await;
    assert_eq!(result.exit_code, 1);
    assert!(sh.fs().exists(Path::new("/home/user/a/b")).await.unwrap());
}

#[tokio::test]
async fn test_rm_root_refused() {
    let mut sh = root_shell().await;
    let result = run(&mut sh, "rm -rf /").await;
    assert_eq!(result.exit_code, 1);
    assert!(sh.fs().exists(Path::new("/etc/passwd")).await.unwrap());
}

#[tokio::test]
async fn test_chown_requires_root() {
    let mut sh = shell().await;
    run(&mut sh, "touch f").await;
    let result = run(&mut sh, "chown root f").await;
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("Operation not permitted"));

    // group change to a group the user belongs to is allowed
    assert_eq!(run(&mut sh, "chown :sudo f").await.exit_code, 0);
    let meta = sh.fs().stat(Path::new("/home/user/f")).await.unwrap();
    assert_eq!(meta.group, "sudo");
}

#[tokio::test]
async fn test_ls_long_format() {
    let mut sh = shell().await;
    run(&mut sh, "mkdir sub").await;
    run(&mut sh, "echo hi > file").await;
    assert_eq!(run(&mut sh, "ls").await.stdout, "file  sub\n");

    let long = run(&mut sh, "ls -l").await.stdout;
    let lines: Vec<&str> = long.lines().collect();
    assert!(lines[0].starts_with("total "));
    let file: Vec<&str> = lines[1].split_whitespace().collect();
    assert_eq!(&file[..5], &["-rw-r--r--", "1", "user", "user", "3"]);
    assert_eq!(file.last(), Some(&"file"));
    let dir: Vec<&str> = lines[2].split_whitespace().collect();
    assert_eq!(&dir[..4], &["drwxr-xr-x", "2", "user", "user"]);
    assert_eq!(dir.last(), Some(&"sub"));
}

#[tokio::test]
async fn test_ls_missing_operand() {
    let mut sh = shell().await;
    let result = run(&mut sh, "ls nothing").await;
    assert_eq!(result.exit_code, 2);
    assert_eq!(
        result.stderr,
        "ls: cannot access 'nothing': No such file or directory\n"
    );
}

// =============================================================================
// Navigation
// =============================================================================

#[tokio::test]
async fn test_cd_and_prompt() {
    let mut sh = shell().await;
    assert_eq!(sh.prompt_string(), "user@debian:~$ ");
    run(&mut sh, "cd /tmp").await;
    assert_eq!(run(&mut sh, "pwd").await.stdout, "/tmp\n");
    assert_eq!(sh.prompt_string(), "user@debian:/tmp$ ");

    assert_eq!(run(&mut sh, "cd -").await.stdout, "/home/user\n");
    run(&mut sh, "cd ..").await;
    assert_eq!(run(&mut sh, "pwd").await.stdout, "/home\n");
}

#[tokio::test]
async fn test_cd_into_protected_dir() {
    let mut sh = shell().await;
    let result = run(&mut sh, "cd /root").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "debsh: cd: /root: Permission denied\n");
    assert_eq!(sh.session().cwd, Path::new("/home/user"));
}

#[tokio::test]
async fn test_exec_script_continues_after_syntax_error() {
    let mut sh = shell().await;
    let result = sh
        .exec_script("# setup\necho one\necho 'broken\n\necho two\n")
        .await
        .unwrap();
    assert_eq!(result.stdout, "one\ntwo\n");
    assert!(result.stderr.starts_with("debsh: line 3: "));
}
