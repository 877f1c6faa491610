//! Filesystem trait definitions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::FsResult;
use crate::perms::Permissions;

/// Owner and group assigned to newly created entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub user: String,
    pub group: String,
}

impl Ownership {
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }

    pub fn root() -> Self {
        Self::new("root", "root")
    }
}

/// Async filesystem trait.
///
/// Paths handed to implementations are absolute and already normalized by
/// [`resolve_path`](super::resolve_path). Every entry other than `/` has a
/// parent directory present; implementations enforce that on creation and
/// cascade removals and renames over whole subtrees.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file's contents.
    async fn read_file(&self, path: &Path) -> FsResult<Vec<u8>>;

    /// Create or truncate a file. Existing files keep their owner and mode.
    async fn write_file(&self, path: &Path, content: &[u8], owner: &Ownership) -> FsResult<()>;

    /// Append to a file, creating it if missing.
    async fn append_file(&self, path: &Path, content: &[u8], owner: &Ownership) -> FsResult<()>;

    /// Create a directory. With `recursive`, missing parents are created and
    /// an existing directory is not an error.
    async fn mkdir(&self, path: &Path, recursive: bool, owner: &Ownership) -> FsResult<()>;

    /// Remove a file, or a directory (and its subtree when `recursive`).
    async fn remove(&self, path: &Path, recursive: bool) -> FsResult<()>;

    /// Get entry metadata.
    async fn stat(&self, path: &Path) -> FsResult<Metadata>;

    /// Read the direct children of a directory.
    async fn read_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> FsResult<bool>;

    /// Move an entry and every descendant to a new path, atomically.
    async fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;

    /// Replace the permission bits (0o777 mask), keeping the entry type.
    async fn chmod(&self, path: &Path, mode: u16) -> FsResult<()>;

    /// Change owner and/or group.
    async fn chown(&self, path: &Path, user: Option<&str>, group: Option<&str>) -> FsResult<()>;

    /// Update access and/or modification times.
    async fn set_times(
        &self,
        path: &Path,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()>;

    /// All paths strictly below `path`, sorted.
    async fn descendants(&self, path: &Path) -> FsResult<Vec<PathBuf>>;

    /// Hand every entry owned by `from` over to `to`. Returns the count.
    async fn reown(&self, from: &str, to: &str) -> FsResult<usize>;

    /// Capture every entry for persistence.
    fn snapshot(&self) -> FsResult<FsSnapshot>;

    /// Replace all entries with a previously captured snapshot.
    fn restore(&self, snapshot: &FsSnapshot) -> FsResult<()>;
}

/// Entry metadata.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// File type
    pub file_type: FileType,
    /// Content size in bytes (4096 for directories)
    pub size: u64,
    /// Permission bits (0o777 mask)
    pub mode: u16,
    /// Owning user name
    pub owner: String,
    /// Owning group name
    pub group: String,
    /// Hard link count (2 for directories, 1 for files)
    pub links: u32,
    pub created: SystemTime,
    pub modified: SystemTime,
    pub accessed: SystemTime,
}

impl Metadata {
    pub(crate) fn new(file_type: FileType, mode: u16, owner: &Ownership) -> Self {
        let now = SystemTime::now();
        Self {
            file_type,
            size: if file_type.is_dir() { 4096 } else { 0 },
            mode,
            owner: owner.user.clone(),
            group: owner.group.clone(),
            links: if file_type.is_dir() { 2 } else { 1 },
            created: now,
            modified: now,
            accessed: now,
        }
    }

    /// The 10-character permission view of this entry.
    pub fn permissions(&self) -> Permissions {
        match self.file_type {
            FileType::Directory => Permissions::directory(self.mode),
            FileType::File => Permissions::file(self.mode),
        }
    }
}

/// File type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Regular file
    File,
    /// Directory
    Directory,
}

impl FileType {
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Directory entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name (not full path)
    pub name: String,
    /// Entry metadata
    pub metadata: Metadata,
}

/// Serializable image of a whole filesystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FsSnapshot {
    pub entries: Vec<EntrySnapshot>,
}

/// Serializable image of one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub path: String,
    pub kind: FileType,
    /// File content, base64-encoded on the wire
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<u8>,
    pub permissions: Permissions,
    pub owner: String,
    pub group: String,
    pub links: u32,
    pub created: SystemTime,
    pub modified: SystemTime,
    pub accessed: SystemTime,
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
