use crate::meta::store::Inode;
use sea_orm::entity::prelude::*;

/// Inode attribute row. Timestamps are UTC nanoseconds; identifiers and byte
/// counts are stored signed for database portability and widened to `u64` at
/// the store boundary.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "inodes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// POSIX mode including the file-type bits.
    pub mode: i32,
    pub uid: i32,
    pub gid: i32,

    /// Symlink target, empty for non-symlinks.
    #[sea_orm(column_type = "VarBinary(StringLen::N(4096))")]
    pub target: Vec<u8>,

    pub size: i64,
    pub refcount: i32,

    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub crtime: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Inode {
    fn from(model: Model) -> Self {
        Self {
            id: model.id as u64,
            mode: model.mode as u32,
            uid: model.uid as u32,
            gid: model.gid as u32,
            target: model.target,
            size: model.size as u64,
            refcount: model.refcount as u32,
            atime: model.atime,
            mtime: model.mtime,
            ctime: model.ctime,
            crtime: model.crtime,
        }
    }
}
