//! Permission checks against the authenticated principal
//!
//! Debian semantics: root bypasses every check; otherwise the class is
//! owner if the principal owns the entry, group if it belongs to the
//! entry's group, other in every remaining case. Reaching a path needs
//! search (`x`) on each ancestor directory.

use std::path::Path;

use super::traits::{FileSystem, Metadata};
use crate::error::{FsError, FsResult};
use crate::identity::Principal;
use crate::perms::{Access, Class};

/// Which permission class `who` falls into for an entry.
pub fn class_for(who: &Principal, metadata: &Metadata) -> Class {
    if metadata.owner == who.username {
        Class::Owner
    } else if who.in_group(&metadata.group) {
        Class::Group
    } else {
        Class::Other
    }
}

/// Check `access` on `path`, including search permission on its ancestors.
///
/// Missing entries surface as [`FsError::NotFound`] so callers can report
/// the usual coreutils diagnostic.
pub async fn check_access(
    fs: &dyn FileSystem,
    who: &Principal,
    path: &Path,
    access: Access,
) -> FsResult<()> {
    if who.is_root() {
        return Ok(());
    }
    check_traverse(fs, who, path).await?;
    let metadata = fs.stat(path).await?;
    if metadata.permissions().allows(class_for(who, &metadata), access) {
        Ok(())
    } else {
        Err(FsError::PermissionDenied)
    }
}

/// Check search permission on every ancestor directory of `path`.
pub async fn check_traverse(fs: &dyn FileSystem, who: &Principal, path: &Path) -> FsResult<()> {
    if who.is_root() {
        return Ok(());
    }
    let ancestors: Vec<&Path> = path.ancestors().skip(1).collect();
    for dir in ancestors.into_iter().rev() {
        let metadata = fs.stat(dir).await?;
        if !metadata.file_type.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !metadata
            .permissions()
            .allows(class_for(who, &metadata), Access::Execute)
        {
            return Err(FsError::PermissionDenied);
        }
    }
    Ok(())
}

/// Creating, removing or renaming `path` needs write and search on its parent.
pub async fn check_parent_writable(
    fs: &dyn FileSystem,
    who: &Principal,
    path: &Path,
) -> FsResult<()> {
    let Some(parent) = path.parent() else {
        return Err(FsError::PermissionDenied);
    };
    check_access(fs, who, parent, Access::Write).await?;
    check_access(fs, who, parent, Access::Execute).await
}

/// `chmod`, `touch -r` style metadata changes need ownership (or root).
pub async fn check_owner(fs: &dyn FileSystem, who: &Principal, path: &Path) -> FsResult<Metadata> {
    check_traverse(fs, who, path).await?;
    let metadata = fs.stat(path).await?;
    if who.is_root() || metadata.owner == who.username {
        Ok(metadata)
    } else {
        Err(FsError::PermissionDenied)
    }
}
