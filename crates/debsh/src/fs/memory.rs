//! In-memory filesystem implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use super::path::is_within;
use super::traits::{
    DirEntry, EntrySnapshot, FileSystem, FileType, FsSnapshot, Metadata, Ownership,
};
use crate::error::{FsError, FsResult};

/// Default mode for newly created files.
pub const FILE_MODE: u16 = 0o644;
/// Default mode for newly created directories.
pub const DIR_MODE: u16 = 0o755;

/// In-memory filesystem.
///
/// A flat map from absolute path to entry. Subtree operations (remove,
/// rename, descendants) walk the keys by path prefix under a single write
/// lock, so no caller can observe a half-moved tree.
pub struct InMemoryFs {
    entries: RwLock<HashMap<PathBuf, FsEntry>>,
}

#[derive(Debug, Clone)]
enum FsEntry {
    File { content: Vec<u8>, metadata: Metadata },
    Directory { metadata: Metadata },
}

impl FsEntry {
    fn metadata(&self) -> &Metadata {
        match self {
            FsEntry::File { metadata, .. } | FsEntry::Directory { metadata } => metadata,
        }
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            FsEntry::File { metadata, .. } | FsEntry::Directory { metadata } => metadata,
        }
    }

    fn directory(mode: u16, owner: &Ownership) -> Self {
        FsEntry::Directory {
            metadata: Metadata::new(FileType::Directory, mode, owner),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, FsEntry::Directory { .. })
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFs {
    /// Create a filesystem holding only the root directory.
    ///
    /// The Debian base tree is laid down by [`seed`](crate::seed) when a
    /// [`Shell`](crate::Shell) is built.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(PathBuf::from("/"), FsEntry::directory(DIR_MODE, &Ownership::root()));
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn read(&self) -> FsResult<RwLockReadGuard<'_, HashMap<PathBuf, FsEntry>>> {
        self.entries.read().map_err(|_| FsError::Unavailable)
    }

    fn write(&self) -> FsResult<RwLockWriteGuard<'_, HashMap<PathBuf, FsEntry>>> {
        self.entries.write().map_err(|_| FsError::Unavailable)
    }

    /// Parent must exist and be a directory.
    fn check_parent(entries: &HashMap<PathBuf, FsEntry>, path: &Path) -> FsResult<()> {
        let Some(parent) = path.parent() else {
            // Only `/` has no parent, and it always exists.
            return Err(FsError::AlreadyExists);
        };
        match entries.get(parent) {
            Some(entry) if entry.is_dir() => Ok(()),
            Some(_) => Err(FsError::NotADirectory),
            None => Err(FsError::NotFound),
        }
    }

    fn has_children(entries: &HashMap<PathBuf, FsEntry>, path: &Path) -> bool {
        entries.keys().any(|p| p.parent() == Some(path))
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read_file(&self, path: &Path) -> FsResult<Vec<u8>> {
        let mut entries = self.write()?;

        match entries.get_mut(path) {
            Some(FsEntry::File { content, metadata }) => {
                metadata.accessed = SystemTime::now();
                Ok(content.clone())
            }
            Some(FsEntry::Directory { .. }) => Err(FsError::IsADirectory),
            None => Err(FsError::NotFound),
        }
    }

    async fn write_file(&self, path: &Path, content: &[u8], owner: &Ownership) -> FsResult<()> {
        let mut entries = self.write()?;

        match entries.get_mut(path) {
            Some(FsEntry::File {
                content: existing,
                metadata,
            }) => {
                *existing = content.to_vec();
                metadata.size = content.len() as u64;
                metadata.modified = SystemTime::now();
                Ok(())
            }
            Some(FsEntry::Directory { .. }) => Err(FsError::IsADirectory),
            None => {
                Self::check_parent(&entries, path)?;
                let mut metadata = Metadata::new(FileType::File, FILE_MODE, owner);
                metadata.size = content.len() as u64;
                entries.insert(
                    path.to_path_buf(),
                    FsEntry::File {
                        content: content.to_vec(),
                        metadata,
                    },
                );
                Ok(())
            }
        }
    }

    async fn append_file(&self, path: &Path, content: &[u8], owner: &Ownership) -> FsResult<()> {
        {
            let mut entries = self.write()?;
            match entries.get_mut(path) {
                Some(FsEntry::File {
                    content: existing,
                    metadata,
                }) => {
                    existing.extend_from_slice(content);
                    metadata.size = existing.len() as u64;
                    metadata.modified = SystemTime::now();
                    return Ok(());
                }
                Some(FsEntry::Directory { .. }) => return Err(FsError::IsADirectory),
                None => {}
            }
        }

        self.write_file(path, content, owner).await
    }

    async fn mkdir(&self, path: &Path, recursive: bool, owner: &Ownership) -> FsResult<()> {
        let mut entries = self.write()?;

        if recursive {
            let mut current = PathBuf::from("/");
            for component in path.components().skip(1) {
                current.push(component);
                match entries.get(&current) {
                    Some(entry) if entry.is_dir() => {}
                    Some(_) => return Err(FsError::NotADirectory),
                    None => {
                        entries.insert(current.clone(), FsEntry::directory(DIR_MODE, owner));
                    }
                }
            }
            return Ok(());
        }

        if entries.contains_key(path) {
            return Err(FsError::AlreadyExists);
        }
        Self::check_parent(&entries, path)?;
        entries.insert(path.to_path_buf(), FsEntry::directory(DIR_MODE, owner));
        Ok(())
    }

    async fn remove(&self, path: &Path, recursive: bool) -> FsResult<()> {
        if path == Path::new("/") {
            return Err(FsError::PermissionDenied);
        }
        let mut entries = self.write()?;

        match entries.get(path) {
            Some(FsEntry::Directory { .. }) => {
                if recursive {
                    entries.retain(|p, _| !is_within(p, path));
                } else if Self::has_children(&entries, path) {
                    return Err(FsError::NotEmpty);
                } else {
                    entries.remove(path);
                }
            }
            Some(FsEntry::File { .. }) => {
                entries.remove(path);
            }
            None => return Err(FsError::NotFound),
        }

        Ok(())
    }

    async fn stat(&self, path: &Path) -> FsResult<Metadata> {
        let entries = self.read()?;
        entries
            .get(path)
            .map(|e| e.metadata().clone())
            .ok_or(FsError::NotFound)
    }

    async fn read_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let entries = self.read()?;

        match entries.get(path) {
            Some(FsEntry::Directory { .. }) => {
                let mut result: Vec<DirEntry> = entries
                    .iter()
                    .filter(|(p, _)| p.parent() == Some(path))
                    .map(|(p, entry)| DirEntry {
                        name: super::path::file_name(p),
                        metadata: entry.metadata().clone(),
                    })
                    .collect();
                result.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(result)
            }
            Some(_) => Err(FsError::NotADirectory),
            None => Err(FsError::NotFound),
        }
    }

    async fn exists(&self, path: &Path) -> FsResult<bool> {
        let entries = self.read()?;
        Ok(entries.contains_key(path))
    }

    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        if from == to {
            return Ok(());
        }
        if from == Path::new("/") || is_within(to, from) {
            return Err(FsError::InvalidPath);
        }
        let mut entries = self.write()?;

        let source_is_dir = match entries.get(from) {
            Some(entry) => entry.is_dir(),
            None => return Err(FsError::NotFound),
        };
        Self::check_parent(&entries, to)?;
        match entries.get(to) {
            Some(FsEntry::Directory { .. }) => return Err(FsError::IsADirectory),
            Some(FsEntry::File { .. }) if source_is_dir => return Err(FsError::NotADirectory),
            Some(FsEntry::File { .. }) => {
                entries.remove(to);
            }
            None => {}
        }

        // Collect first, then reinsert: all keys move under one lock.
        let moved: Vec<PathBuf> = entries
            .keys()
            .filter(|p| is_within(p, from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(entry) = entries.remove(&old) {
                let suffix = old.strip_prefix(from).unwrap_or(Path::new(""));
                let new = if suffix.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(suffix)
                };
                entries.insert(new, entry);
            }
        }
        Ok(())
    }

    async fn chmod(&self, path: &Path, mode: u16) -> FsResult<()> {
        let mut entries = self.write()?;
        let entry = entries.get_mut(path).ok_or(FsError::NotFound)?;
        entry.metadata_mut().mode = mode & 0o777;
        Ok(())
    }

    async fn chown(&self, path: &Path, user: Option<&str>, group: Option<&str>) -> FsResult<()> {
        let mut entries = self.write()?;
        let metadata = entries.get_mut(path).ok_or(FsError::NotFound)?.metadata_mut();
        if let Some(user) = user {
            metadata.owner = user.to_string();
        }
        if let Some(group) = group {
            metadata.group = group.to_string();
        }
        Ok(())
    }

    async fn set_times(
        &self,
        path: &Path,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()> {
        let mut entries = self.write()?;
        let metadata = entries.get_mut(path).ok_or(FsError::NotFound)?.metadata_mut();
        if let Some(accessed) = accessed {
            metadata.accessed = accessed;
        }
        if let Some(modified) = modified {
            metadata.modified = modified;
        }
        Ok(())
    }

    async fn descendants(&self, path: &Path) -> FsResult<Vec<PathBuf>> {
        let entries = self.read()?;
        if !entries.contains_key(path) {
            return Err(FsError::NotFound);
        }
        let mut result: Vec<PathBuf> = entries
            .keys()
            .filter(|p| p.as_path() != path && is_within(p, path))
            .cloned()
            .collect();
        result.sort();
        Ok(result)
    }

    async fn reown(&self, from: &str, to: &str) -> FsResult<usize> {
        let mut entries = self.write()?;
        let mut count = 0;
        for entry in entries.values_mut() {
            let metadata = entry.metadata_mut();
            if metadata.owner == from {
                metadata.owner = to.to_string();
                count += 1;
            }
        }
        Ok(count)
    }

    fn snapshot(&self) -> FsResult<FsSnapshot> {
        let entries = self.read()?;
        let mut snapshot: Vec<EntrySnapshot> = entries
            .iter()
            .map(|(path, entry)| {
                let metadata = entry.metadata();
                let content = match entry {
                    FsEntry::File { content, .. } => content.clone(),
                    FsEntry::Directory { .. } => Vec::new(),
                };
                EntrySnapshot {
                    path: path.to_string_lossy().into_owned(),
                    kind: metadata.file_type,
                    content,
                    permissions: metadata.permissions(),
                    owner: metadata.owner.clone(),
                    group: metadata.group.clone(),
                    links: metadata.links,
                    created: metadata.created,
                    modified: metadata.modified,
                    accessed: metadata.accessed,
                }
            })
            .collect();
        snapshot.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(FsSnapshot { entries: snapshot })
    }

    fn restore(&self, snapshot: &FsSnapshot) -> FsResult<()> {
        let mut restored = HashMap::with_capacity(snapshot.entries.len());
        for item in &snapshot.entries {
            let path = PathBuf::from(&item.path);
            if !path.is_absolute() || item.permissions.is_directory() != item.kind.is_dir() {
                return Err(FsError::InvalidPath);
            }
            let metadata = Metadata {
                file_type: item.kind,
                size: match item.kind {
                    FileType::File => item.content.len() as u64,
                    FileType::Directory => 4096,
                },
                mode: item.permissions.bits(),
                owner: item.owner.clone(),
                group: item.group.clone(),
                links: item.links,
                created: item.created,
                modified: item.modified,
                accessed: item.accessed,
            };
            let entry = match item.kind {
                FileType::File => FsEntry::File {
                    content: item.content.clone(),
                    metadata,
                },
                FileType::Directory => FsEntry::Directory { metadata },
            };
            restored.insert(path, entry);
        }

        if !matches!(restored.get(Path::new("/")), Some(FsEntry::Directory { .. })) {
            return Err(FsError::NotFound);
        }
        for path in restored.keys() {
            if let Some(parent) = path.parent()
                && !matches!(restored.get(parent), Some(FsEntry::Directory { .. }))
            {
                return Err(FsError::NotFound);
            }
        }

        *self.write()? = restored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Ownership {
        Ownership::new("user", "user")
    }

    async fn fs_with_tmp() -> InMemoryFs {
        let fs = InMemoryFs::new();
        fs.mkdir(Path::new("/tmp"), false, &Ownership::root())
            .await
            .unwrap();
        fs
    }

    #[tokio::test]
    async fn test_write_and_read_file() {
        let fs = fs_with_tmp().await;

        fs.write_file(Path::new("/tmp/test.txt"), b"hello world", &user())
            .await
            .unwrap();

        let content = fs.read_file(Path::new("/tmp/test.txt")).await.unwrap();
        assert_eq!(content, b"hello world");
        let meta = fs.stat(Path::new("/tmp/test.txt")).await.unwrap();
        assert_eq!(meta.owner, "user");
        assert_eq!(meta.size, 11);
        assert_eq!(meta.mode, FILE_MODE);
    }

    #[tokio::test]
    async fn test_write_requires_parent() {
        let fs = InMemoryFs::new();
        let err = fs
            .write_file(Path::new("/nope/f"), b"x", &user())
            .await
            .unwrap_err();
        assert_eq!(err, FsError::NotFound);
        assert!(!fs.exists(Path::new("/nope/f")).await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_owner_and_mode() {
        let fs = fs_with_tmp().await;
        let path = Path::new("/tmp/f");
        fs.write_file(path, b"one", &Ownership::root()).await.unwrap();
        fs.chmod(path, 0o600).await.unwrap();
        fs.write_file(path, b"two", &user()).await.unwrap();

        let meta = fs.stat(path).await.unwrap();
        assert_eq!(meta.owner, "root");
        assert_eq!(meta.mode, 0o600);
        assert_eq!(fs.read_file(path).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_append_creates_then_extends() {
        let fs = fs_with_tmp().await;
        let path = Path::new("/tmp/log");
        fs.append_file(path, b"x\n", &user()).await.unwrap();
        fs.append_file(path, b"y\n", &user()).await.unwrap();
        assert_eq!(fs.read_file(path).await.unwrap(), b"x\ny\n");
    }

    #[tokio::test]
    async fn test_mkdir_recursive_is_idempotent() {
        let fs = InMemoryFs::new();
        let path = Path::new("/a/b/c");
        fs.mkdir(path, true, &user()).await.unwrap();
        fs.mkdir(path, true, &user()).await.unwrap();

        assert_eq!(
            fs.descendants(Path::new("/")).await.unwrap(),
            vec![
                PathBuf::from("/a"),
                PathBuf::from("/a/b"),
                PathBuf::from("/a/b/c")
            ]
        );
        assert_eq!(
            fs.mkdir(Path::new("/a"), false, &user()).await.unwrap_err(),
            FsError::AlreadyExists
        );
    }

    #[tokio::test]
    async fn test_mkdir_recursive_through_file_fails() {
        let fs = InMemoryFs::new();
        fs.write_file(Path::new("/f"), b"", &user()).await.unwrap();
        assert_eq!(
            fs.mkdir(Path::new("/f/g"), true, &user()).await.unwrap_err(),
            FsError::NotADirectory
        );
    }

    #[tokio::test]
    async fn test_remove_cascades_only_under_prefix() {
        let fs = InMemoryFs::new();
        fs.mkdir(Path::new("/home/user/docs"), true, &user())
            .await
            .unwrap();
        fs.mkdir(Path::new("/home/username"), true, &user())
            .await
            .unwrap();

        assert_eq!(
            fs.remove(Path::new("/home/user"), false).await.unwrap_err(),
            FsError::NotEmpty
        );
        fs.remove(Path::new("/home/user"), true).await.unwrap();
        assert!(!fs.exists(Path::new("/home/user/docs")).await.unwrap());
        assert!(fs.exists(Path::new("/home/username")).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let fs = InMemoryFs::new();
        fs.mkdir(Path::new("/home/old/a"), true, &user()).await.unwrap();
        fs.write_file(Path::new("/home/old/a/f"), b"data", &user())
            .await
            .unwrap();

        fs.rename(Path::new("/home/old"), Path::new("/home/new"))
            .await
            .unwrap();

        assert!(!fs.exists(Path::new("/home/old")).await.unwrap());
        assert_eq!(
            fs.read_file(Path::new("/home/new/a/f")).await.unwrap(),
            b"data"
        );
    }

    #[tokio::test]
    async fn test_rename_into_itself_is_refused() {
        let fs = InMemoryFs::new();
        fs.mkdir(Path::new("/a/b"), true, &user()).await.unwrap();
        assert_eq!(
            fs.rename(Path::new("/a"), Path::new("/a/b/a")).await.unwrap_err(),
            FsError::InvalidPath
        );
        assert!(fs.exists(Path::new("/a/b")).await.unwrap());
    }

    #[tokio::test]
    async fn test_reown_counts_entries() {
        let fs = InMemoryFs::new();
        fs.mkdir(Path::new("/home/alice"), true, &Ownership::new("alice", "alice"))
            .await
            .unwrap();
        let count = fs.reown("alice", "bob").await.unwrap();
        assert_eq!(count, 2);
        let meta = fs.stat(Path::new("/home/alice")).await.unwrap();
        assert_eq!(meta.owner, "bob");
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let fs = fs_with_tmp().await;
        fs.write_file(Path::new("/tmp/keep"), b"kept", &user())
            .await
            .unwrap();
        let snapshot = fs.snapshot().unwrap();

        fs.remove(Path::new("/tmp"), true).await.unwrap();
        fs.restore(&snapshot).unwrap();

        assert_eq!(fs.snapshot().unwrap(), snapshot);
        assert_eq!(fs.read_file(Path::new("/tmp/keep")).await.unwrap(), b"kept");
    }

    #[tokio::test]
    async fn test_restore_rejects_orphans() {
        let fs = InMemoryFs::new();
        let mut snapshot = fs.snapshot().unwrap();
        let mut orphan = snapshot.entries[0].clone();
        orphan.path = "/missing/child".into();
        snapshot.entries.push(orphan);
        assert!(fs.restore(&snapshot).is_err());
    }
}
