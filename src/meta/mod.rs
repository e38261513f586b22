//! Metadata client and schema
//!
//! Responsibilities:
//! - Persist all filesystem metadata (inodes, directory entries, extended
//!   attributes, accounting stats) in the chosen SQL backend (Postgres for
//!   production, SQLite for single-node development) via SeaORM.
//! - Maintain the chunk map: each inode's byte-range-indexed list of
//!   references to blobs held in external object stores. Splice-writes and
//!   truncations run as single transactions with row locks on the touched
//!   chunk rows.
//! - Orphan displaced chunk rows instead of deleting them, so concurrent
//!   readers keep valid blob references until the collector sweeps them.
//!
//! Submodules:
//! - `store`: public types, error taxonomy and the `MetaStore` trait
//! - `splice`: pure interval arithmetic for splice-writes and truncation
//! - `entities`: SeaORM table models
//! - `stores`: concrete `MetaStore` implementations
//! - `config`: database connection configuration

pub mod config;
pub mod entities;
pub(crate) mod splice;
pub mod store;
pub mod stores;

pub use store::MetaStore;

/// Inode id of the filesystem root, installed by `setup`.
pub const ROOT_INODE: u64 = 1;

/// Mode of the root inode: a directory with full access.
pub const ROOT_MODE: u32 = 0o40777;
