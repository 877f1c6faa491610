//! Identity store: users, groups and shadow credentials
//!
//! The database lives in three VFS text files (`/etc/passwd`,
//! `/etc/shadow`, `/etc/group`) and is parsed on every access, so what
//! `cat /etc/passwd` shows is always what the store acts on.
//!
//! Mutations that touch more than one file snapshot all three first and
//! restore them when any later step fails. The snapshot covers only the
//! identity files: home-directory moves and re-ownership in the VFS are
//! not undone.

mod password;
mod records;
mod usermod;

pub use password::{days_since_epoch, hash_new, hash_password, verify_password};
pub use records::{
    GroupEntry, PasswdEntry, ShadowEntry, is_valid_name, parse_file, render_file,
};
pub use usermod::{UserChanges, parse_expiry};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::DateTime;
#[cfg(feature = "failpoints")]
use fail::fail_point;
use thiserror::Error;

use crate::error::FsError;
use crate::fs::{FileSystem, Ownership};

pub const PASSWD_PATH: &str = "/etc/passwd";
pub const SHADOW_PATH: &str = "/etc/shadow";
pub const GROUP_PATH: &str = "/etc/group";

/// First id handed out to regular users and groups.
pub const FIRST_ID: u32 = 1000;
const LAST_ID: u32 = 60000;

/// Result type for identity operations.
pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

/// Identity store errors.
///
/// Display strings follow the shadow-utils wording, without the command
/// prefix the caller adds.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("user '{0}' already exists")]
    UserExists(String),

    #[error("user '{0}' does not exist")]
    UserNotFound(String),

    #[error("group '{0}' already exists")]
    GroupExists(String),

    #[error("group '{0}' does not exist")]
    GroupNotFound(String),

    #[error("UID '{0}' already exists")]
    UidInUse(u32),

    #[error("GID '{0}' already exists")]
    GidInUse(u32),

    #[error("invalid {kind} name '{name}'")]
    InvalidName { kind: &'static str, name: String },

    #[error("{0}")]
    InvalidField(String),

    #[error("cannot remove the primary group of user '{user}'")]
    PrimaryGroup { group: String, user: String },

    #[error("user {0} is currently used by process 1")]
    UserLoggedIn(String),

    #[error("directory {0} exists")]
    HomeExists(String),

    #[error("unlocking the password would result in a passwordless account.")]
    Passwordless,

    #[error("malformed identity database: {0}")]
    Malformed(String),

    #[error("cannot update identity database: {0}")]
    Fs(#[from] FsError),

    /// A multi-step change failed and the identity files were restored.
    #[error("{cause}")]
    RolledBack { cause: Box<IdentityError> },

    /// A multi-step change failed and restoring the identity files failed
    /// too; the files may hold a partial update.
    #[error("{cause}; rollback failed: {restore}")]
    RollbackFailed {
        cause: Box<IdentityError>,
        restore: Box<IdentityError>,
    },
}

impl IdentityError {
    /// Exit status in the shadow-utils convention.
    pub fn exit_code(&self) -> i32 {
        match self {
            IdentityError::InvalidName { .. } | IdentityError::InvalidField(_) => 3,
            IdentityError::Passwordless => 3,
            IdentityError::UidInUse(_) | IdentityError::GidInUse(_) => 4,
            IdentityError::UserNotFound(_) | IdentityError::GroupNotFound(_) => 6,
            IdentityError::PrimaryGroup { .. } | IdentityError::UserLoggedIn(_) => 8,
            IdentityError::UserExists(_) | IdentityError::GroupExists(_) => 9,
            IdentityError::HomeExists(_) | IdentityError::Fs(_) => 12,
            IdentityError::Malformed(_) => 1,
            IdentityError::RolledBack { cause } => cause.exit_code(),
            IdentityError::RollbackFailed { .. } => 12,
        }
    }

    /// The underlying error, looking through a rollback.
    pub fn root_cause(&self) -> &IdentityError {
        match self {
            IdentityError::RolledBack { cause } | IdentityError::RollbackFailed { cause, .. } => {
                cause.root_cause()
            }
            other => other,
        }
    }
}

/// A resolved, authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    /// Primary group name
    pub group: String,
    /// Primary group first, then supplementary groups in file order
    pub groups: Vec<String>,
    pub home: PathBuf,
    pub shell: String,
}

impl Principal {
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    /// Members of `sudo` (and root) may run commands as root.
    pub fn can_sudo(&self) -> bool {
        self.is_root() || self.in_group("sudo")
    }

    /// Owner and group for entries this principal creates.
    pub fn ownership(&self) -> Ownership {
        Ownership::new(&self.username, &self.group)
    }
}

/// Options for [`IdentityStore::add_user`].
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub uid: Option<u32>,
    /// Primary group by name or gid; a private group is created when unset
    pub group: Option<String>,
    /// Supplementary groups
    pub groups: Vec<String>,
    pub home: Option<String>,
    pub shell: Option<String>,
    pub gecos: String,
    pub create_home: bool,
}

/// Saved contents of the three identity files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySnapshot {
    files: Vec<(&'static str, Option<Vec<u8>>)>,
}

/// Reads and writes the identity database through the VFS.
#[derive(Clone)]
pub struct IdentityStore {
    fs: Arc<dyn FileSystem>,
}

impl IdentityStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    pub(crate) fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    async fn read_text(&self, path: &str) -> IdentityResult<String> {
        match self.fs.read_file(Path::new(path)).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(FsError::NotFound) => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_text(&self, path: &str, text: &str) -> IdentityResult<()> {
        self.fs
            .write_file(Path::new(path), text.as_bytes(), &Ownership::root())
            .await?;
        Ok(())
    }

    pub async fn users(&self) -> IdentityResult<Vec<PasswdEntry>> {
        parse_file(&self.read_text(PASSWD_PATH).await?)
    }

    pub async fn shadows(&self) -> IdentityResult<Vec<ShadowEntry>> {
        parse_file(&self.read_text(SHADOW_PATH).await?)
    }

    pub async fn groups(&self) -> IdentityResult<Vec<GroupEntry>> {
        parse_file(&self.read_text(GROUP_PATH).await?)
    }

    pub async fn save_users(&self, users: &[PasswdEntry]) -> IdentityResult<()> {
        self.write_text(PASSWD_PATH, &render_file(users)).await
    }

    pub async fn save_shadows(&self, shadows: &[ShadowEntry]) -> IdentityResult<()> {
        self.write_text(SHADOW_PATH, &render_file(shadows)).await
    }

    pub async fn save_groups(&self, groups: &[GroupEntry]) -> IdentityResult<()> {
        self.write_text(GROUP_PATH, &render_file(groups)).await
    }

    /// Look up a user by name.
    pub async fn user(&self, name: &str) -> IdentityResult<PasswdEntry> {
        self.users()
            .await?
            .into_iter()
            .find(|u| u.username == name)
            .ok_or_else(|| IdentityError::UserNotFound(name.to_string()))
    }

    /// Look up a group by name, or by gid when `spec` is numeric.
    pub async fn group(&self, spec: &str) -> IdentityResult<GroupEntry> {
        let groups = self.groups().await?;
        find_group(&groups, spec)
            .cloned()
            .ok_or_else(|| IdentityError::GroupNotFound(spec.to_string()))
    }

    /// Resolve a username to a full principal.
    pub async fn principal(&self, name: &str) -> IdentityResult<Principal> {
        let user = self.user(name).await?;
        let groups = self.groups().await?;

        let primary = groups
            .iter()
            .find(|g| g.gid == user.gid)
            .map(|g| g.name.clone())
            .unwrap_or_else(|| user.gid.to_string());

        let mut names = vec![primary.clone()];
        for group in groups.iter().filter(|g| g.has_member(name)) {
            if !names.contains(&group.name) {
                names.push(group.name.clone());
            }
        }

        Ok(Principal {
            username: user.username,
            uid: user.uid,
            gid: user.gid,
            group: primary,
            groups: names,
            home: PathBuf::from(user.home),
            shell: user.shell,
        })
    }

    /// Capture the three identity files.
    pub async fn snapshot(&self) -> IdentityResult<IdentitySnapshot> {
        let mut files = Vec::with_capacity(3);
        for path in [PASSWD_PATH, SHADOW_PATH, GROUP_PATH] {
            let content = match self.fs.read_file(Path::new(path)).await {
                Ok(bytes) => Some(bytes),
                Err(FsError::NotFound) => None,
                Err(e) => return Err(e.into()),
            };
            files.push((path, content));
        }
        Ok(IdentitySnapshot { files })
    }

    /// Put the identity files back exactly as captured.
    pub async fn restore(&self, snapshot: &IdentitySnapshot) -> IdentityResult<()> {
        #[cfg(feature = "failpoints")]
        fail_point!("identity::restore", |_| Err(IdentityError::Fs(FsError::Unavailable)));

        for (path, content) in &snapshot.files {
            let path = Path::new(path);
            match content {
                Some(bytes) => self.fs.write_file(path, bytes, &Ownership::root()).await?,
                None => match self.fs.remove(path, false).await {
                    Ok(()) | Err(FsError::NotFound) => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }
        Ok(())
    }

    /// Restore `snapshot` after `cause` and wrap it as a rollback.
    ///
    /// Returns [`IdentityError::RollbackFailed`] when the restore itself
    /// fails.
    pub(crate) async fn roll_back(
        &self,
        snapshot: &IdentitySnapshot,
        cause: IdentityError,
    ) -> IdentityError {
        match self.restore(snapshot).await {
            Ok(()) => {
                #[cfg(feature = "logging")]
                tracing::warn!(cause = %cause, "identity transaction rolled back");
                IdentityError::RolledBack {
                    cause: Box::new(cause),
                }
            }
            Err(restore) => {
                #[cfg(feature = "logging")]
                tracing::error!(cause = %cause, error = %restore, "identity rollback failed");
                IdentityError::RollbackFailed {
                    cause: Box::new(cause),
                    restore: Box::new(restore),
                }
            }
        }
    }

    /// Create a user account. Returns warnings to print.
    pub async fn add_user(&self, new: &NewUser) -> IdentityResult<Vec<String>> {
        if !is_valid_name(&new.name) {
            return Err(IdentityError::InvalidName {
                kind: "user",
                name: new.name.clone(),
            });
        }
        check_field("comment", &new.gecos)?;
        if let Some(home) = &new.home {
            check_field("home directory", home)?;
        }
        if let Some(shell) = &new.shell {
            check_field("shell", shell)?;
        }
        let users = self.users().await?;
        if users.iter().any(|u| u.username == new.name) {
            return Err(IdentityError::UserExists(new.name.clone()));
        }
        let taken_uids: HashSet<u32> = users.iter().map(|u| u.uid).collect();
        let uid = match new.uid {
            Some(uid) if taken_uids.contains(&uid) => return Err(IdentityError::UidInUse(uid)),
            Some(uid) => uid,
            None => next_free_id(&taken_uids)?,
        };

        let groups = self.groups().await?;
        let (gid, group_name, private_group) = match &new.group {
            Some(spec) => {
                let group = find_group(&groups, spec)
                    .ok_or_else(|| IdentityError::GroupNotFound(spec.clone()))?;
                (group.gid, group.name.clone(), None)
            }
            None => {
                if groups.iter().any(|g| g.name == new.name) {
                    return Err(IdentityError::GroupExists(new.name.clone()));
                }
                let taken_gids: HashSet<u32> = groups.iter().map(|g| g.gid).collect();
                let gid = if taken_gids.contains(&uid) {
                    next_free_id(&taken_gids)?
                } else {
                    uid
                };
                (gid, new.name.clone(), Some(GroupEntry::new(&new.name, gid)))
            }
        };
        for extra in &new.groups {
            if find_group(&groups, extra).is_none() {
                return Err(IdentityError::GroupNotFound(extra.clone()));
            }
        }

        let entry = PasswdEntry {
            username: new.name.clone(),
            password: "x".to_string(),
            uid,
            gid,
            gecos: new.gecos.clone(),
            home: new
                .home
                .clone()
                .unwrap_or_else(|| format!("/home/{}", new.name)),
            shell: new.shell.clone().unwrap_or_else(|| "/bin/bash".to_string()),
        };

        let snapshot = self.snapshot().await?;
        let result = self
            .write_new_user(new, &entry, &group_name, private_group, groups, users)
            .await;
        match result {
            Ok(warnings) => {
                #[cfg(feature = "logging")]
                tracing::info!(user = %entry.username, uid = entry.uid, "user added");
                Ok(warnings)
            }
            Err(e) => Err(self.roll_back(&snapshot, e).await),
        }
    }

    async fn write_new_user(
        &self,
        new: &NewUser,
        entry: &PasswdEntry,
        group_name: &str,
        private_group: Option<GroupEntry>,
        mut groups: Vec<GroupEntry>,
        mut users: Vec<PasswdEntry>,
    ) -> IdentityResult<Vec<String>> {
        let mut warnings = Vec::new();

        if let Some(group) = private_group {
            groups.push(group);
        }
        for extra in &new.groups {
            if let Some(group) = find_group_mut(&mut groups, extra) {
                group.add_member(&entry.username);
            }
        }
        self.save_groups(&groups).await?;

        users.push(entry.clone());
        self.save_users(&users).await?;

        let mut shadows = self.shadows().await?;
        shadows.retain(|s| s.username != entry.username);
        shadows.push(ShadowEntry::locked(&entry.username, days_since_epoch()));
        self.save_shadows(&shadows).await?;

        if new.create_home {
            let home = Path::new(&entry.home);
            if self.fs.exists(home).await? {
                warnings.push(format!(
                    "warning: the home directory {} already exists.",
                    entry.home
                ));
            } else {
                self.fs
                    .mkdir(home, false, &Ownership::new(&entry.username, group_name))
                    .await?;
            }
        }

        Ok(warnings)
    }

    /// Delete a user account. Returns warnings to print.
    pub async fn delete_user(
        &self,
        name: &str,
        remove_home: bool,
        logged_in: &[String],
    ) -> IdentityResult<Vec<String>> {
        let user = self.user(name).await?;
        if logged_in.iter().any(|u| u == name) {
            return Err(IdentityError::UserLoggedIn(name.to_string()));
        }

        let snapshot = self.snapshot().await?;
        match self.remove_user_records(&user, remove_home).await {
            Ok(warnings) => {
                #[cfg(feature = "logging")]
                tracing::info!(user = %name, remove_home, "user deleted");
                Ok(warnings)
            }
            Err(e) => Err(self.roll_back(&snapshot, e).await),
        }
    }

    async fn remove_user_records(
        &self,
        user: &PasswdEntry,
        remove_home: bool,
    ) -> IdentityResult<Vec<String>> {
        let mut warnings = Vec::new();
        let name = user.username.as_str();

        let mut users = self.users().await?;
        users.retain(|u| u.username != name);
        let primary_elsewhere = users.iter().any(|u| u.gid == user.gid);

        let mut groups = self.groups().await?;
        for group in groups.iter_mut() {
            group.remove_member(name);
        }
        let private = groups.iter().position(|g| g.name == name && g.gid == user.gid);
        match private {
            Some(idx) if !primary_elsewhere => {
                groups.remove(idx);
            }
            Some(_) => warnings.push(format!(
                "group {name} not removed because it is the primary group of another user."
            )),
            None => {}
        }

        let mut shadows = self.shadows().await?;
        shadows.retain(|s| s.username != name);

        self.save_users(&users).await?;
        self.save_shadows(&shadows).await?;
        self.save_groups(&groups).await?;

        if remove_home {
            let home = Path::new(&user.home);
            if self.fs.exists(home).await? {
                self.fs.remove(home, true).await?;
            } else {
                warnings.push(format!("{} home directory ({}) not found", name, user.home));
            }
        }

        Ok(warnings)
    }

    /// Create a group.
    pub async fn add_group(&self, name: &str, gid: Option<u32>) -> IdentityResult<GroupEntry> {
        if !is_valid_name(name) {
            return Err(IdentityError::InvalidName {
                kind: "group",
                name: name.to_string(),
            });
        }
        let mut groups = self.groups().await?;
        if groups.iter().any(|g| g.name == name) {
            return Err(IdentityError::GroupExists(name.to_string()));
        }
        let taken: HashSet<u32> = groups.iter().map(|g| g.gid).collect();
        let gid = match gid {
            Some(gid) if taken.contains(&gid) => return Err(IdentityError::GidInUse(gid)),
            Some(gid) => gid,
            None => next_free_id(&taken)?,
        };

        let group = GroupEntry::new(name, gid);
        groups.push(group.clone());
        self.save_groups(&groups).await?;

        #[cfg(feature = "logging")]
        tracing::info!(group = %name, gid, "group added");
        Ok(group)
    }

    /// Delete a group that is nobody's primary group.
    pub async fn delete_group(&self, name: &str) -> IdentityResult<()> {
        let mut groups = self.groups().await?;
        let idx = groups
            .iter()
            .position(|g| g.name == name)
            .ok_or_else(|| IdentityError::GroupNotFound(name.to_string()))?;

        let gid = groups[idx].gid;
        if let Some(user) = self.users().await?.into_iter().find(|u| u.gid == gid) {
            return Err(IdentityError::PrimaryGroup {
                group: name.to_string(),
                user: user.username,
            });
        }

        groups.remove(idx);
        self.save_groups(&groups).await?;

        #[cfg(feature = "logging")]
        tracing::info!(group = %name, "group deleted");
        Ok(())
    }

    /// Shadow record for `name`.
    pub async fn shadow(&self, name: &str) -> IdentityResult<ShadowEntry> {
        self.user(name).await?;
        Ok(self
            .shadows()
            .await?
            .into_iter()
            .find(|s| s.username == name)
            .unwrap_or_else(|| ShadowEntry::locked(name, days_since_epoch())))
    }

    async fn update_shadow<F>(&self, name: &str, update: F) -> IdentityResult<()>
    where
        F: FnOnce(&mut ShadowEntry) -> IdentityResult<()>,
    {
        self.user(name).await?;
        let mut shadows = self.shadows().await?;
        let idx = match shadows.iter().position(|s| s.username == name) {
            Some(idx) => idx,
            None => {
                shadows.push(ShadowEntry::locked(name, days_since_epoch()));
                shadows.len() - 1
            }
        };
        update(&mut shadows[idx])?;
        self.save_shadows(&shadows).await
    }

    /// Replace the password hash.
    pub async fn set_password(&self, name: &str, password: &str) -> IdentityResult<()> {
        let hash = hash_new(password);
        self.update_shadow(name, |entry| {
            entry.hash = hash;
            entry.last_changed = Some(days_since_epoch());
            Ok(())
        })
        .await?;

        #[cfg(feature = "logging")]
        tracing::info!(user = %name, "password changed");
        Ok(())
    }

    /// Prefix the hash with `!`.
    pub async fn lock_password(&self, name: &str) -> IdentityResult<()> {
        self.update_shadow(name, |entry| {
            lock_hash(entry);
            Ok(())
        })
        .await
    }

    /// Remove one `!` prefix; refuses to leave an empty hash.
    pub async fn unlock_password(&self, name: &str) -> IdentityResult<()> {
        self.update_shadow(name, unlock_hash).await
    }

    /// Make the account passwordless.
    pub async fn clear_password(&self, name: &str) -> IdentityResult<()> {
        self.update_shadow(name, |entry| {
            entry.hash.clear();
            entry.last_changed = Some(days_since_epoch());
            Ok(())
        })
        .await
    }

    /// `passwd -S` line: `name P|L|NP YYYY-MM-DD min max warn inactive`.
    pub async fn password_status(&self, name: &str) -> IdentityResult<String> {
        let entry = self.shadow(name).await?;
        let changed = entry
            .last_changed
            .and_then(|days| i64::try_from(days).ok())
            .and_then(|days| DateTime::from_timestamp(days * 86_400, 0))
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());
        let age = |v: Option<u64>| v.map(|v| v.to_string()).unwrap_or_else(|| "-1".to_string());
        Ok(format!(
            "{} {} {} {} {} {} {}",
            name,
            entry.status(),
            changed,
            age(entry.min),
            age(entry.max),
            age(entry.warn),
            age(entry.inactive)
        ))
    }

    /// Check a password against the user's shadow hash.
    pub async fn verify_password(&self, name: &str, password: &str) -> IdentityResult<bool> {
        let entry = self.shadow(name).await?;
        Ok(verify_password(password, &entry.hash))
    }

    /// Next unused uid.
    pub async fn next_uid(&self) -> IdentityResult<u32> {
        let taken: HashSet<u32> = self.users().await?.iter().map(|u| u.uid).collect();
        next_free_id(&taken)
    }
}

/// A passwd field value must not split the record.
pub(crate) fn check_field(kind: &str, value: &str) -> IdentityResult<()> {
    if value.contains([':', '\n']) {
        return Err(IdentityError::InvalidField(format!(
            "invalid {kind} '{}'",
            value.escape_default()
        )));
    }
    Ok(())
}

fn find_group<'a>(groups: &'a [GroupEntry], spec: &str) -> Option<&'a GroupEntry> {
    match spec.parse::<u32>() {
        Ok(gid) => groups.iter().find(|g| g.gid == gid),
        Err(_) => groups.iter().find(|g| g.name == spec),
    }
}

fn find_group_mut<'a>(groups: &'a mut [GroupEntry], spec: &str) -> Option<&'a mut GroupEntry> {
    match spec.parse::<u32>() {
        Ok(gid) => groups.iter_mut().find(|g| g.gid == gid),
        Err(_) => groups.iter_mut().find(|g| g.name == spec),
    }
}

fn next_free_id(taken: &HashSet<u32>) -> IdentityResult<u32> {
    (FIRST_ID..=LAST_ID)
        .find(|id| !taken.contains(id))
        .ok_or_else(|| IdentityError::InvalidField("no free id available".to_string()))
}

fn lock_hash(entry: &mut ShadowEntry) {
    if !entry.is_locked() {
        entry.hash.insert(0, '!');
    }
}

fn unlock_hash(entry: &mut ShadowEntry) -> IdentityResult<()> {
    if let Some(rest) = entry.hash.strip_prefix('!') {
        if rest.is_empty() {
            return Err(IdentityError::Passwordless);
        }
        entry.hash = rest.to_string();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;

    async fn store() -> IdentityStore {
        let fs: Arc<dyn FileSystem> = Arc::new(InMemoryFs::new());
        crate::seed::seed(fs.as_ref(), "debian").await.unwrap();
        IdentityStore::new(fs)
    }

    #[tokio::test]
    async fn test_seed_principals() {
        let store = store().await;
        let root = store.principal("root").await.unwrap();
        assert!(root.is_root());
        assert_eq!(root.home, PathBuf::from("/root"));

        let user = store.principal("user").await.unwrap();
        assert_eq!(user.uid, 1000);
        assert_eq!(user.groups, vec!["user", "sudo"]);
        assert!(user.can_sudo());
    }

    #[tokio::test]
    async fn test_add_user_defaults() {
        let store = store().await;
        store
            .add_user(&NewUser {
                name: "alice".into(),
                create_home: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let alice = store.user("alice").await.unwrap();
        assert_eq!(alice.uid, 1001);
        assert_eq!(alice.gid, 1001);
        assert_eq!(alice.home, "/home/alice");
        assert_eq!(alice.shell, "/bin/bash");
        assert_eq!(store.group("alice").await.unwrap().gid, 1001);
        assert_eq!(store.shadow("alice").await.unwrap().status(), "L");

        let meta = store.fs().stat(Path::new("/home/alice")).await.unwrap();
        assert_eq!(meta.owner, "alice");
        assert_eq!(meta.group, "alice");
    }

    #[tokio::test]
    async fn test_add_user_collisions() {
        let store = store().await;
        let dup = NewUser {
            name: "user".into(),
            ..Default::default()
        };
        assert!(matches!(
            store.add_user(&dup).await,
            Err(IdentityError::UserExists(_))
        ));

        let uid_taken = NewUser {
            name: "bob".into(),
            uid: Some(1000),
            ..Default::default()
        };
        assert!(matches!(
            store.add_user(&uid_taken).await,
            Err(IdentityError::UidInUse(1000))
        ));

        let bad = NewUser {
            name: "9bob".into(),
            ..Default::default()
        };
        let err = store.add_user(&bad).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_add_user_rejects_field_separators() {
        let store = store().await;
        let before = store.snapshot().await.unwrap();
        let cases = [
            NewUser {
                name: "erin".into(),
                gecos: "Erin:Admin".into(),
                ..Default::default()
            },
            NewUser {
                name: "erin".into(),
                home: Some("/home/e:rin".into()),
                ..Default::default()
            },
            NewUser {
                name: "erin".into(),
                shell: Some("/bin/sh\nroot::0:0::/:/bin/sh".into()),
                ..Default::default()
            },
        ];
        for new in &cases {
            let err = store.add_user(new).await.unwrap_err();
            assert!(matches!(err, IdentityError::InvalidField(_)), "{err}");
            assert_eq!(err.exit_code(), 3);
        }
        assert_eq!(store.snapshot().await.unwrap(), before);
        assert_eq!(store.users().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_add_user_rolls_back_when_home_parent_missing() {
        let store = store().await;
        let before = store.snapshot().await.unwrap();
        let err = store
            .add_user(&NewUser {
                name: "carol".into(),
                home: Some("/nowhere/carol".into()),
                create_home: true,
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IdentityError::RolledBack { .. }));
        assert_eq!(store.snapshot().await.unwrap(), before);
    }

    #[test]
    fn test_rollback_failure_keeps_both_errors() {
        let err = IdentityError::RollbackFailed {
            cause: Box::new(IdentityError::GroupNotFound("devs".into())),
            restore: Box::new(IdentityError::Fs(FsError::Unavailable)),
        };
        assert_eq!(err.exit_code(), 12);
        assert!(matches!(err.root_cause(), IdentityError::GroupNotFound(_)));
        assert_eq!(
            err.to_string(),
            "group 'devs' does not exist; rollback failed: \
             cannot update identity database: filesystem unavailable"
        );
    }

    #[tokio::test]
    async fn test_delete_user_removes_memberships_and_private_group() {
        let store = store().await;
        store
            .add_user(&NewUser {
                name: "dave".into(),
                groups: vec!["sudo".into()],
                create_home: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let warnings = store.delete_user("dave", true, &[]).await.unwrap();
        assert!(warnings.is_empty());
        assert!(store.user("dave").await.is_err());
        assert!(store.group("dave").await.is_err());
        assert!(!store.group("sudo").await.unwrap().has_member("dave"));
        assert!(!store.fs().exists(Path::new("/home/dave")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_logged_in_user_refused() {
        let store = store().await;
        let err = store
            .delete_user("user", false, &["user".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::UserLoggedIn(_)));
    }

    #[tokio::test]
    async fn test_groups() {
        let store = store().await;
        let group = store.add_group("devs", None).await.unwrap();
        assert_eq!(group.gid, 1001);
        assert!(matches!(
            store.add_group("staff", Some(27)).await,
            Err(IdentityError::GidInUse(27))
        ));
        assert!(matches!(
            store.delete_group("user").await,
            Err(IdentityError::PrimaryGroup { .. })
        ));
        store.delete_group("devs").await.unwrap();
        assert!(store.group("devs").await.is_err());
    }

    #[tokio::test]
    async fn test_password_lifecycle() {
        let store = store().await;
        store.set_password("user", "s3cret").await.unwrap();
        assert!(store.verify_password("user", "s3cret").await.unwrap());

        store.lock_password("user").await.unwrap();
        assert!(!store.verify_password("user", "s3cret").await.unwrap());
        assert!(store.password_status("user").await.unwrap().starts_with("user L "));

        store.unlock_password("user").await.unwrap();
        assert!(store.verify_password("user", "s3cret").await.unwrap());

        store.clear_password("user").await.unwrap();
        store.lock_password("user").await.unwrap();
        assert!(matches!(
            store.unlock_password("user").await,
            Err(IdentityError::Passwordless)
        ));
    }

    #[tokio::test]
    async fn test_password_status_format() {
        let store = store().await;
        let status = store.password_status("root").await.unwrap();
        let fields: Vec<&str> = status.split(' ').collect();
        assert_eq!(fields[0], "root");
        assert_eq!(fields[1], "P");
        assert_eq!(fields[2].len(), 10);
        assert_eq!(&fields[3..], &["0", "99999", "7", "-1"]);
    }
}
