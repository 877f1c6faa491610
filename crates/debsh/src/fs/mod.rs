//! Virtual filesystem for debsh
//!
//! Provides an async filesystem trait, the in-memory implementation every
//! shell starts from, lexical path resolution and the permission checks
//! command handlers apply on behalf of the logged-in principal.

mod access;
mod memory;
mod path;
mod traits;

pub use access::{check_access, check_owner, check_parent_writable, check_traverse, class_for};
pub use memory::{DIR_MODE, FILE_MODE, InMemoryFs};
pub use path::{file_name, is_within, normalize_path, resolve_path};
pub use traits::{
    DirEntry, EntrySnapshot, FileSystem, FileType, FsSnapshot, Metadata, Ownership,
};
