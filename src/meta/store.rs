//! Metadata store abstract interface
//!
//! Defines the types and the unified interface for filesystem metadata and
//! chunk-map operations. Errors are POSIX-shaped because they propagate to a
//! kernel interface on the FS host side.

use async_trait::async_trait;
use bitflags::bitflags;
use chrono::{DateTime, Utc};

/// `SetXattr` flag: insert only, fail if the key exists.
pub const XATTR_CREATE: u32 = 0x1;

/// `SetXattr` flag: update only, fail if the key is absent.
pub const XATTR_REPLACE: u32 = 0x2;

bitflags! {
    /// Write flags interpreted by `add_chunk`. Only the append bit is
    /// honored; everything else the host passes through is ignored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WriteFlags: u32 {
        const APPEND = 0x400;
    }
}

/// Inode attributes. Timestamps are UTC nanoseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub id: u64,
    /// POSIX mode including the file-type bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Symlink target, empty for non-symlinks.
    pub target: Vec<u8>,
    /// Logical file size in bytes.
    pub size: u64,
    /// Number of directory entries pointing at this inode.
    pub refcount: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub crtime: i64,
}

impl Inode {
    pub fn is_dir(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFDIR as u32
    }
}

/// Directory entry: a (parent, name) binding together with a snapshot of the
/// inode it points at. Names are byte strings, not necessarily UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub parent: u64,
    pub name: Vec<u8>,
    pub inode: Inode,
}

/// One child of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    pub inode: u64,
    pub name: Vec<u8>,
    pub mode: u32,
}

/// A live chunk: bytes `[inode_offset, inode_offset + size)` of the inode are
/// backed by `[object_offset, object_offset + size)` of the blob at
/// `(storage, key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: u64,
    pub inode: u64,
    pub storage: String,
    pub key: String,
    pub object_offset: u64,
    pub inode_offset: u64,
    pub size: u64,
}

impl Chunk {
    /// Exclusive end of the mapped byte range within the inode.
    pub fn end(&self) -> u64 {
        self.inode_offset + self.size
    }
}

/// Chunk reference registered by `add_chunk`. The blob itself was already
/// written to the backend by the host; the engine only records the mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChunk {
    pub storage: String,
    pub key: String,
    pub object_offset: u64,
    pub inode_offset: u64,
    pub size: u64,
}

/// An orphaned chunk row awaiting collection. Only the backend coordinates
/// survive orphaning; the inode mapping is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanChunk {
    pub id: u64,
    pub storage: String,
    pub key: String,
}

/// Aggregate filesystem counters, maintained transactionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub inodes: u64,
    pub size: u64,
}

/// Input to `create`. With `id == 0` a fresh inode is allocated from the
/// attribute fields; with a non-zero `id` the existing inode is hard-linked
/// and the attribute fields are ignored.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub parent: u64,
    pub name: Vec<u8>,
    pub id: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub target: Vec<u8>,
}

/// Attribute subset applied by `touch`. `ctime` is bumped unconditionally;
/// a size change goes through the chunk-map resize protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct TouchRequest {
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub atime: Option<i64>,
    pub mtime: Option<i64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Metadata operation errors
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("inode not found: {0}")]
    InodeNotFound(u64),

    #[error("entry {name:?} not found under inode {parent}")]
    EntryNotFound { parent: u64, name: String },

    #[error("not a directory: {0}")]
    NotDirectory(u64),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(u64),

    #[error("no such attribute on inode {0}")]
    NoAttribute(u64),

    #[error("attribute already exists on inode {0}")]
    AttributeExists(u64),

    #[error("chunk row {0} has no live mapping")]
    CorruptChunk(u64),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetaError {
    /// POSIX errno the FS host should surface for this error. Store-level
    /// failures map to EIO; the host decides whether to retry them.
    pub fn errno(&self) -> i32 {
        match self {
            MetaError::InodeNotFound(_) | MetaError::EntryNotFound { .. } => libc::ENOENT,
            MetaError::NotDirectory(_) => libc::ENOTDIR,
            MetaError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            MetaError::NoAttribute(_) => libc::ENODATA,
            MetaError::AttributeExists(_) => libc::EEXIST,
            MetaError::CorruptChunk(_)
            | MetaError::Database(_)
            | MetaError::Config(_)
            | MetaError::Internal(_) => libc::EIO,
        }
    }
}

/// Metadata store abstract interface
///
/// Every mutating operation executes in exactly one store transaction and
/// rolls back on any error. Read-only operations run as single autocommit
/// statements.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait MetaStore: Send + Sync {
    /// One-time schema installation: tables, indexes, the root inode and the
    /// initial stats row. Idempotent.
    async fn setup(&self) -> Result<(), MetaError>;

    /// O(1) read of the aggregate counters.
    async fn stats(&self) -> Result<Stats, MetaError>;

    /// Create a new inode or hard-link an existing one, and insert the
    /// directory entry for it.
    async fn create(&self, req: CreateRequest) -> Result<Entry, MetaError>;

    /// Fetch inode attributes.
    async fn get(&self, ino: u64) -> Result<Inode, MetaError>;

    /// Called when the host has released all references to an inode. If its
    /// refcount is zero the inode is reclaimed: chunks orphaned, xattrs
    /// dropped, row deleted, stats adjusted. Otherwise a no-op.
    async fn forget(&self, ino: u64) -> Result<(), MetaError>;

    /// Apply a subset of mutable attributes, returning the updated inode.
    async fn touch(&self, ino: u64, req: TouchRequest) -> Result<Inode, MetaError>;

    /// Resolve a name under a parent directory.
    async fn look_up(&self, parent: u64, name: &[u8]) -> Result<Entry, MetaError>;

    /// List a directory. Bumps the directory's atime.
    async fn children(&self, ino: u64) -> Result<Vec<Child>, MetaError>;

    /// Remove a directory entry and decrement the target's refcount. Fails
    /// with the ENOTEMPTY-shaped error if the target has children.
    async fn unlink(&self, parent: u64, name: &[u8]) -> Result<(), MetaError>;

    /// Atomically unlink any existing destination entry and relocate the
    /// source entry to the destination.
    async fn rename(
        &self,
        old_parent: u64,
        old_name: &[u8],
        new_parent: u64,
        new_name: &[u8],
    ) -> Result<(), MetaError>;

    async fn list_xattr(&self, ino: u64) -> Result<Vec<Vec<u8>>, MetaError>;

    async fn get_xattr(&self, ino: u64, key: &[u8]) -> Result<Vec<u8>, MetaError>;

    /// Set an extended attribute. `flags` follows the POSIX convention:
    /// `XATTR_CREATE` inserts only, `XATTR_REPLACE` updates only, anything
    /// else upserts.
    async fn set_xattr(
        &self,
        ino: u64,
        key: &[u8],
        value: &[u8],
        flags: u32,
    ) -> Result<(), MetaError>;

    async fn remove_xattr(&self, ino: u64, key: &[u8]) -> Result<(), MetaError>;

    /// All live chunks of the inode, ordered by `inode_offset` ascending.
    /// Bumps the inode's atime. Zero-fill ranges are returned explicitly as
    /// `storage = "zero"` entries.
    async fn chunks(&self, ino: u64) -> Result<Vec<Chunk>, MetaError>;

    /// Splice-write: register a new chunk over the inode's byte range,
    /// adjusting every previously-mapped range it overlaps.
    async fn add_chunk(&self, ino: u64, flags: WriteFlags, chunk: NewChunk)
        -> Result<(), MetaError>;

    /// Purge all inodes with refcount zero that the host never forgot, then
    /// recompute the stats counters from primary state.
    async fn clean_orphan_inodes(&self) -> Result<(), MetaError>;

    /// Orphaned chunk rows older than the threshold, for the collector.
    async fn orphan_chunks_before(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<OrphanChunk>, MetaError>;

    /// Delete orphaned chunk rows older than the threshold, returning the
    /// number of rows removed. Called after the backend sweep.
    async fn purge_orphan_chunks_before(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<u64, MetaError>;
}
