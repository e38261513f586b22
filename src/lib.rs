// Library crate for the KeelFS metadata engine: expose the store API while
// keeping persistence internals private.

pub mod gc;
pub mod meta;
pub mod storage;

// Public surface for FS hosts and operational tooling.
pub use crate::gc::{GcConfig, OrphanCollector};
pub use crate::meta::config::{Config, ConfigError, DatabaseConfig, DatabaseType};
pub use crate::meta::store::{
    Child, Chunk, CreateRequest, Entry, Inode, MetaError, MetaStore, NewChunk, OrphanChunk, Stats,
    TouchRequest, WriteFlags, XATTR_CREATE, XATTR_REPLACE,
};
pub use crate::meta::stores::DatabaseMetaStore;
pub use crate::meta::ROOT_INODE;
pub use crate::storage::{StorageBackend, ZERO_STORAGE};
