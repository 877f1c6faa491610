//! Initial Debian-style system image
//!
//! Lays down the base directory tree and the identity database a fresh
//! shell starts from. Seed passwords: `root`/`root` and `user`/`user`.

use std::path::Path;

use crate::error::FsResult;
use crate::fs::{FileSystem, Ownership};
use crate::identity::{
    GROUP_PATH, GroupEntry, PASSWD_PATH, PasswdEntry, SHADOW_PATH, ShadowEntry,
    days_since_epoch, hash_new, render_file,
};

/// Login name of the unprivileged seed account.
pub const DEFAULT_USER: &str = "user";
/// Hostname used when none is configured.
pub const DEFAULT_HOSTNAME: &str = "debian";

struct SeedUser {
    name: &'static str,
    uid: u32,
    gecos: &'static str,
    home: &'static str,
    shell: &'static str,
    password: Option<&'static str>,
}

const USERS: &[SeedUser] = &[
    SeedUser {
        name: "root",
        uid: 0,
        gecos: "root",
        home: "/root",
        shell: "/bin/bash",
        password: Some("root"),
    },
    SeedUser {
        name: "nobody",
        uid: 65534,
        gecos: "nobody",
        home: "/nonexistent",
        shell: "/usr/sbin/nologin",
        password: None,
    },
    SeedUser {
        name: DEFAULT_USER,
        uid: 1000,
        gecos: "user,,,",
        home: "/home/user",
        shell: "/bin/bash",
        password: Some("user"),
    },
];

const GROUPS: &[(&str, u32, &[&str])] = &[
    ("root", 0, &[]),
    ("sudo", 27, &[DEFAULT_USER]),
    ("shadow", 42, &[]),
    ("users", 100, &[]),
    ("nogroup", 65534, &[]),
    (DEFAULT_USER, 1000, &[]),
];

/// Directories created on a fresh filesystem, with their modes.
const DIRECTORIES: &[(&str, u16)] = &[
    ("/bin", 0o755),
    ("/etc", 0o755),
    ("/home", 0o755),
    ("/root", 0o700),
    ("/tmp", 0o777),
    ("/usr", 0o755),
    ("/usr/bin", 0o755),
    ("/var", 0o755),
];

/// Populate `fs` with the base system.
pub async fn seed(fs: &dyn FileSystem, hostname: &str) -> FsResult<()> {
    let root = Ownership::root();
    for (dir, mode) in DIRECTORIES {
        let path = Path::new(dir);
        fs.mkdir(path, true, &root).await?;
        fs.chmod(path, *mode).await?;
    }

    let today = days_since_epoch();
    let mut passwd = Vec::new();
    let mut shadow = Vec::new();
    for user in USERS {
        passwd.push(PasswdEntry {
            username: user.name.to_string(),
            password: "x".to_string(),
            uid: user.uid,
            gid: user.uid,
            gecos: user.gecos.to_string(),
            home: user.home.to_string(),
            shell: user.shell.to_string(),
        });
        let mut entry = ShadowEntry::locked(user.name, today);
        entry.hash = match user.password {
            Some(password) => hash_new(password),
            None => "*".to_string(),
        };
        shadow.push(entry);
    }

    let groups: Vec<GroupEntry> = GROUPS
        .iter()
        .map(|(name, gid, members)| {
            let mut group = GroupEntry::new(name, *gid);
            for member in members.iter() {
                group.add_member(member);
            }
            group
        })
        .collect();

    fs.write_file(Path::new(PASSWD_PATH), render_file(&passwd).as_bytes(), &root)
        .await?;
    fs.write_file(Path::new(GROUP_PATH), render_file(&groups).as_bytes(), &root)
        .await?;
    let shadow_path = Path::new(SHADOW_PATH);
    fs.write_file(
        shadow_path,
        render_file(&shadow).as_bytes(),
        &Ownership::new("root", "shadow"),
    )
    .await?;
    fs.chmod(shadow_path, 0o640).await?;
    fs.write_file(
        Path::new("/etc/hostname"),
        format!("{hostname}\n").as_bytes(),
        &root,
    )
    .await?;

    let home = Path::new("/home/user");
    fs.mkdir(home, false, &Ownership::new(DEFAULT_USER, DEFAULT_USER))
        .await?;

    Ok(())
}
