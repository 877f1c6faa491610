//! Transactional account modification
//!
//! `modify_user` runs in four phases over a snapshot of the identity files:
//!
//! 1. passwd/shadow properties (login, uid, gecos, home, shell, expiry, lock)
//! 2. home directory move (`-m` together with a new `-d`)
//! 3. primary and supplementary group membership
//! 4. re-ownership of VFS entries when the uid or login changed
//!
//! A failure in any phase restores the identity files and stops. Phases 2
//! and 4 mutate the VFS and are not undone by the restore.
//!
//! # Fail Points (enabled with `failpoints` feature)
//!
//! - `identity::move_home` - fail the home directory move
//! - `identity::groups` - fail the group membership phase
//! - `identity::reown` - fail re-ownership of VFS entries
//! - `identity::restore` - fail the rollback itself (see [`IdentityStore::restore`])

use std::path::Path;

use chrono::NaiveDate;

#[cfg(feature = "failpoints")]
use fail::fail_point;

use super::{
    IdentityError, IdentityResult, IdentityStore, PasswdEntry, check_field, find_group,
    is_valid_name, lock_hash, unlock_hash,
};

/// Requested `usermod` changes. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    /// `-l`: new login name
    pub login: Option<String>,
    /// `-u`: new uid
    pub uid: Option<u32>,
    /// `-c`
    pub gecos: Option<String>,
    /// `-d`
    pub home: Option<String>,
    /// `-m`: move the home directory contents to the new home
    pub move_home: bool,
    /// `-s`
    pub shell: Option<String>,
    /// `-e`: `Some(None)` clears the expiry date
    pub expire: Option<Option<u64>>,
    /// `-L`
    pub lock: bool,
    /// `-U`
    pub unlock: bool,
    /// `-g`: primary group by name or gid
    pub primary_group: Option<String>,
    /// `-G`: supplementary groups
    pub groups: Option<Vec<String>>,
    /// `-a`: add to `groups` instead of replacing the membership
    pub append: bool,
}

impl UserChanges {
    /// Flag combinations rejected before anything is read.
    pub fn validate(&self) -> IdentityResult<()> {
        if self.append && self.groups.is_none() {
            return Err(IdentityError::InvalidField(
                "-a flag is only allowed with the -G flag".to_string(),
            ));
        }
        if self.move_home && self.home.is_none() {
            return Err(IdentityError::InvalidField(
                "-m flag is only allowed with the -d flag".to_string(),
            ));
        }
        if self.lock && self.unlock {
            return Err(IdentityError::InvalidField(
                "the -L and -U flags are exclusive".to_string(),
            ));
        }
        for (kind, value) in [
            ("comment", &self.gecos),
            ("home directory", &self.home),
            ("shell", &self.shell),
        ] {
            if let Some(value) = value {
                check_field(kind, value)?;
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == UserChanges::default()
    }
}

/// Parse a `-e` argument: `YYYY-MM-DD`, or empty / `-1` for never.
pub fn parse_expiry(value: &str) -> IdentityResult<Option<u64>> {
    if value.is_empty() || value == "-1" {
        return Ok(None);
    }
    let invalid = || IdentityError::InvalidField(format!("invalid date '{value}'"));
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).ok_or_else(invalid)?;
    u64::try_from((date - epoch).num_days())
        .map(Some)
        .map_err(|_| invalid())
}

impl IdentityStore {
    /// Apply `changes` to user `name`.
    ///
    /// `logged_in` lists the users with an active login; their login, uid
    /// and home cannot change.
    pub async fn modify_user(
        &self,
        name: &str,
        changes: &UserChanges,
        logged_in: &[String],
    ) -> IdentityResult<()> {
        changes.validate()?;
        let user = self.user(name).await?;
        let users = self.users().await?;

        if let Some(login) = &changes.login {
            if !is_valid_name(login) {
                return Err(IdentityError::InvalidName {
                    kind: "user",
                    name: login.clone(),
                });
            }
            if login != name && users.iter().any(|u| &u.username == login) {
                return Err(IdentityError::UserExists(login.clone()));
            }
        }
        if let Some(uid) = changes.uid
            && users.iter().any(|u| u.uid == uid && u.username != name)
        {
            return Err(IdentityError::UidInUse(uid));
        }
        let identity_changes =
            changes.login.is_some() || changes.uid.is_some() || changes.home.is_some();
        if identity_changes && logged_in.iter().any(|u| u == name) {
            return Err(IdentityError::UserLoggedIn(name.to_string()));
        }

        let snapshot = self.snapshot().await?;
        match self.run_phases(&user, changes).await {
            Ok(()) => {
                #[cfg(feature = "logging")]
                tracing::info!(user = %name, "user modified");
                Ok(())
            }
            Err(e) => Err(self.roll_back(&snapshot, e).await),
        }
    }

    async fn run_phases(&self, old: &PasswdEntry, changes: &UserChanges) -> IdentityResult<()> {
        let updated = self.apply_properties(old, changes).await?;
        if changes.move_home && updated.home != old.home {
            self.move_home(&old.home, &updated.home).await?;
        }
        self.apply_groups(&updated.username, changes).await?;
        if updated.uid != old.uid || updated.username != old.username {
            self.reown_entries(&old.username, &updated.username).await?;
        }
        Ok(())
    }

    /// Phase 1: passwd and shadow fields.
    async fn apply_properties(
        &self,
        old: &PasswdEntry,
        changes: &UserChanges,
    ) -> IdentityResult<PasswdEntry> {
        let mut users = self.users().await?;
        let entry = users
            .iter_mut()
            .find(|u| u.username == old.username)
            .ok_or_else(|| IdentityError::UserNotFound(old.username.clone()))?;

        if let Some(login) = &changes.login {
            entry.username = login.clone();
        }
        if let Some(uid) = changes.uid {
            entry.uid = uid;
        }
        if let Some(gecos) = &changes.gecos {
            entry.gecos = gecos.clone();
        }
        if let Some(home) = &changes.home {
            entry.home = home.clone();
        }
        if let Some(shell) = &changes.shell {
            entry.shell = shell.clone();
        }
        let updated = entry.clone();
        self.save_users(&users).await?;

        let renamed = updated.username != old.username;
        if renamed || changes.lock || changes.unlock || changes.expire.is_some() {
            let mut shadows = self.shadows().await?;
            if let Some(shadow) = shadows.iter_mut().find(|s| s.username == old.username) {
                shadow.username = updated.username.clone();
                if changes.lock {
                    lock_hash(shadow);
                }
                if changes.unlock {
                    unlock_hash(shadow)?;
                }
                if let Some(expire) = changes.expire {
                    shadow.expire = expire;
                }
            }
            self.save_shadows(&shadows).await?;
        }

        if renamed {
            let mut groups = self.groups().await?;
            for group in groups.iter_mut().filter(|g| g.has_member(&old.username)) {
                for member in group.members.iter_mut() {
                    if *member == old.username {
                        *member = updated.username.clone();
                    }
                }
            }
            self.save_groups(&groups).await?;
        }

        Ok(updated)
    }

    /// Phase 2: relocate the home subtree.
    async fn move_home(&self, from: &str, to: &str) -> IdentityResult<()> {
        #[cfg(feature = "failpoints")]
        fail_point!("identity::move_home", |_| {
            Err(IdentityError::Fs(crate::error::FsError::Unavailable))
        });

        let (from, to) = (Path::new(from), Path::new(to));
        if self.fs().exists(to).await? {
            return Err(IdentityError::HomeExists(to.display().to_string()));
        }
        if self.fs().exists(from).await? {
            self.fs().rename(from, to).await?;
        }
        Ok(())
    }

    /// Phase 3: primary group and supplementary membership.
    async fn apply_groups(&self, username: &str, changes: &UserChanges) -> IdentityResult<()> {
        #[cfg(feature = "failpoints")]
        fail_point!("identity::groups", |_| {
            Err(IdentityError::Fs(crate::error::FsError::Unavailable))
        });

        let mut groups = self.groups().await?;

        if let Some(spec) = &changes.primary_group {
            let gid = find_group(&groups, spec)
                .ok_or_else(|| IdentityError::GroupNotFound(spec.clone()))?
                .gid;
            let mut users = self.users().await?;
            if let Some(entry) = users.iter_mut().find(|u| u.username == username) {
                entry.gid = gid;
            }
            self.save_users(&users).await?;
        }

        let Some(wanted) = &changes.groups else {
            return Ok(());
        };
        let mut targets = Vec::with_capacity(wanted.len());
        for spec in wanted {
            let group = find_group(&groups, spec)
                .ok_or_else(|| IdentityError::GroupNotFound(spec.clone()))?;
            targets.push(group.name.clone());
        }
        for group in groups.iter_mut() {
            if targets.contains(&group.name) {
                group.add_member(username);
            } else if !changes.append {
                group.remove_member(username);
            }
        }
        self.save_groups(&groups).await
    }

    /// Phase 4: owner names in the VFS follow the account.
    async fn reown_entries(&self, from: &str, to: &str) -> IdentityResult<()> {
        #[cfg(feature = "failpoints")]
        fail_point!("identity::reown", |_| {
            Err(IdentityError::Fs(crate::error::FsError::Unavailable))
        });

        let _count = self.fs().reown(from, to).await?;
        #[cfg(feature = "logging")]
        tracing::debug!(from = %from, to = %to, entries = _count, "re-owned entries");
        Ok(())
    }
}
