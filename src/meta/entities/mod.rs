// Core entities for the metadata schema
pub mod chunk_meta;
pub mod entry_meta;
pub mod inode_meta;
pub mod stats_meta;
pub mod xattr_meta;

pub use chunk_meta::{Entity as ChunkMeta, Model as ChunkMetaModel};
pub use entry_meta::{Entity as EntryMeta, Model as EntryMetaModel};
pub use inode_meta::{Entity as InodeMeta, Model as InodeMetaModel};
pub use stats_meta::{Entity as StatsMeta, Model as StatsMetaModel};
pub use xattr_meta::{Entity as XattrMeta, Model as XattrMetaModel};
