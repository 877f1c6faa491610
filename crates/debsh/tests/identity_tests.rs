//! Account administration through the shell: useradd, usermod, userdel,
//! groupadd, groupdel, id and groups.
//!
//! Run with: `cargo test -p debsh --test identity_tests`

use debsh::{ExecResult, Shell};
use pretty_assertions::assert_eq;
use std::path::Path;

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

#[tokio::test]
async fn test_useradd_writes_passwd() {
    let mut sh = root_shell().await;
    let result = run(&mut sh, "useradd -m -c Alice -s /bin/sh alice").await;
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);

    insta::assert_snapshot!(read(&sh, "/etc/passwd").await, @r"
    root:x:0:0:root:/root:/bin/bash
    nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
    user:x:1000:1000:user,,,:/home/user:/bin/bash
    alice:x:1001:1001:Alice:/home/alice:/bin/sh
    ");

    assert!(read(&sh, "/etc/group").await.contains("alice:x:1001:\n"));
    assert!(read(&sh, "/etc/shadow").await.contains("alice:!:"));

    let home = sh.fs().stat(Path::new("/home/alice")).await.unwrap();
    assert_eq!(home.owner, "alice");
    assert_eq!(home.group, "alice");
}

#[tokio::test]
async fn test_useradd_duplicate_and_invalid() {
    let mut sh = root_shell().await;
    let result = run(&mut sh, "useradd user").await;
    assert_eq!(result.exit_code, 9);
    assert_eq!(result.stderr, "useradd: user 'user' already exists\n");

    let result = run(&mut sh, "useradd -u 1000 other").await;
    assert_eq!(result.exit_code, 4);

    let result = run(&mut sh, "useradd Bad:Name").await;
    assert_eq!(result.exit_code, 3);

    let result = run(&mut sh, "useradd -G nosuch carol").await;
    assert_eq!(result.exit_code, 6);
    assert!(!read(&sh, "/etc/passwd").await.contains("carol"));
}

#[tokio::test]
async fn test_useradd_requires_root() {
    let mut sh = Shell::new().await.unwrap();
    let before = read(&sh, "/etc/passwd").await;
    let result = run(&mut sh, "useradd mallory").await;
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.starts_with("useradd: Permission denied.\n"));
    assert_eq!(read(&sh, "/etc/passwd").await, before);
}

#[tokio::test]
async fn test_usermod_groups_append_and_replace() {
    let mut sh = root_shell().await;
    run(&mut sh, "useradd alice").await;
    run(&mut sh, "groupadd devs").await;

    run(&mut sh, "usermod -aG sudo alice").await;
    run(&mut sh, "usermod -a -G devs alice").await;
    assert_eq!(run(&mut sh, "groups alice").await.stdout, "alice : alice sudo devs\n");

    run(&mut sh, "usermod -G devs alice").await;
    assert_eq!(run(&mut sh, "groups alice").await.stdout, "alice : alice devs\n");
}

#[tokio::test]
async fn test_usermod_rename_reowns_files() {
    let mut sh = root_shell().await;
    run(&mut sh, "useradd -m alice").await;
    let result = run(&mut sh, "usermod -l bob -d /home/bob -m alice").await;
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);

    assert!(read(&sh, "/etc/passwd").await.contains("bob:x:1001:1001::/home/bob:/bin/bash\n"));
    assert!(read(&sh, "/etc/shadow").await.contains("bob:"));
    assert!(!sh.fs().exists(Path::new("/home/alice")).await.unwrap());
    let home = sh.fs().stat(Path::new("/home/bob")).await.unwrap();
    assert_eq!(home.owner, "bob");
}

#[tokio::test]
async fn test_usermod_rejects_bad_combinations() {
    let mut sh = root_shell().await;
    let result = run(&mut sh, "usermod -a user").await;
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stderr, "usermod: -a flag is only allowed with the -G flag\n");

    let result = run(&mut sh, "usermod user").await;
    assert_eq!(result.exit_code, 2);

    let result = run(&mut sh, "usermod -s /bin/sh ghost").await;
    assert_eq!(result.exit_code, 6);
}

#[tokio::test]
async fn test_usermod_failure_leaves_files_untouched() {
    let mut sh = root_shell().await;
    let passwd = read(&sh, "/etc/passwd").await;
    let group = read(&sh, "/etc/group").await;

    // The shell change is written first, then the group lookup fails.
    let result = run(&mut sh, "usermod -s /bin/sh -G nosuch user").await;
    assert_eq!(result.exit_code, 6);
    assert_eq!(result.stderr, "usermod: group 'nosuch' does not exist\n");

    assert_eq!(read(&sh, "/etc/passwd").await, passwd);
    assert_eq!(read(&sh, "/etc/group").await, group);
}

#[tokio::test]
async fn test_field_separator_in_values_is_rejected() {
    let mut sh = root_shell().await;
    let passwd = read(&sh, "/etc/passwd").await;

    let result = run(&mut sh, "usermod -c 'Bob:Admin' user").await;
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stderr, "usermod: invalid comment 'Bob:Admin'\n");

    let result = run(&mut sh, "usermod -d /home/a:b user").await;
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stderr, "usermod: invalid home directory '/home/a:b'\n");

    let result = run(&mut sh, "usermod -s /bin/sh:x user").await;
    assert_eq!(result.exit_code, 3);

    let result = run(&mut sh, "useradd -c a:b alice").await;
    assert_eq!(result.exit_code, 3);
    let result = run(&mut sh, "useradd -d /srv/x:y alice").await;
    assert_eq!(result.exit_code, 3);
    let result = run(&mut sh, "useradd -s :/bin/sh alice").await;
    assert_eq!(result.exit_code, 3);

    // The database still parses and nothing was written.
    assert_eq!(read(&sh, "/etc/passwd").await, passwd);
    assert_eq!(run(&mut sh, "id -u user").await.stdout, "1000\n");
    assert_eq!(run(&mut sh, "useradd alice").await.exit_code, 0);
}

#[tokio::test]
async fn test_usermod_logged_in_user() {
    let mut sh = root_shell().await;
    let result = run(&mut sh, "usermod -l admin root").await;
    assert_eq!(result.exit_code, 8);
    assert_eq!(result.stderr, "usermod: user root is currently used by process 1\n");
}

#[tokio::test]
async fn test_userdel_removes_records_and_home() {
    let mut sh = root_shell().await;
    run(&mut sh, "useradd -m -G sudo alice").await;
    let result = run(&mut sh, "userdel -r alice").await;
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);

    assert!(!read(&sh, "/etc/passwd").await.contains("alice"));
    assert!(!read(&sh, "/etc/shadow").await.contains("alice"));
    let group = read(&sh, "/etc/group").await;
    assert!(!group.contains("alice"));
    assert!(group.contains("sudo:x:27:user\n"));
    assert!(!sh.fs().exists(Path::new("/home/alice")).await.unwrap());

    let result = run(&mut sh, "userdel alice").await;
    assert_eq!(result.exit_code, 6);
}

#[tokio::test]
async fn test_userdel_refuses_sudo_caller() {
    let mut sh = Shell::new().await.unwrap();
    run(&mut sh, "sudo true").await;
    run(&mut sh, "user").await;

    let result = run(&mut sh, "sudo userdel user").await;
    assert_eq!(result.exit_code, 8);
    assert!(read(&sh, "/etc/passwd").await.contains("user:x:1000"));
}

#[tokio::test]
async fn test_groupadd_and_groupdel() {
    let mut sh = root_shell().await;
    assert_eq!(run(&mut sh, "groupadd -g 2000 devs").await.exit_code, 0);
    assert!(read(&sh, "/etc/group").await.contains("devs:x:2000:\n"));

    let result = run(&mut sh, "groupadd -g 2000 ops").await;
    assert_eq!(result.exit_code, 4);

    assert_eq!(run(&mut sh, "groupdel devs").await.exit_code, 0);
    assert!(!read(&sh, "/etc/group").await.contains("devs"));

    let result = run(&mut sh, "groupdel user").await;
    assert_eq!(result.exit_code, 8);
    assert_eq!(
        result.stderr,
        "groupdel: cannot remove the primary group of user 'user'\n"
    );
}

#[tokio::test]
async fn test_id_and_groups_output() {
    let mut sh = Shell::new().await.unwrap();
    assert_eq!(
        run(&mut sh, "id").await.stdout,
        "uid=1000(user) gid=1000(user) groups=1000(user),27(sudo)\n"
    );
    assert_eq!(run(&mut sh, "id -u").await.stdout, "1000\n");
    assert_eq!(run(&mut sh, "id -Gn").await.stdout, "user sudo\n");
    assert_eq!(run(&mut sh, "id -un root").await.stdout, "root\n");
    assert_eq!(run(&mut sh, "groups").await.stdout, "user sudo\n");

    let result = run(&mut sh, "id ghost").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "id: 'ghost': no such user\n");
}

#[tokio::test]
async fn test_group_change_visible_without_relogin() {
    let mut sh = root_shell().await;
    run(&mut sh, "groupadd devs").await;
    run(&mut sh, "usermod -aG devs root").await;
    assert_eq!(run(&mut sh, "groups").await.stdout, "root devs\n");
}
