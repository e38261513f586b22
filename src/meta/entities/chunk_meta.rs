use crate::meta::store::{Chunk, MetaError, OrphanChunk};
use sea_orm::entity::prelude::*;

/// Chunk map row. While `inode` is non-null the row maps bytes
/// `[inode_offset, inode_offset + size)` of that inode onto the blob at
/// `(storage, key)` starting at `object_offset`. Orphaning nulls the mapping
/// columns and stamps `orphandate`; `storage` and `key` survive so the
/// collector can still delete the backing blob.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "chunks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub inode: Option<i64>,

    pub storage: String,
    pub key: String,

    pub object_offset: Option<i64>,
    pub inode_offset: Option<i64>,
    pub size: Option<i64>,

    /// UTC nanoseconds at which the row was orphaned.
    pub orphandate: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inode_meta::Entity",
        from = "Column::Inode",
        to = "super::inode_meta::Column::Id"
    )]
    OwnerInode,
}

impl Related<super::inode_meta::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OwnerInode.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Chunk {
    type Error = MetaError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let (Some(inode), Some(object_offset), Some(inode_offset), Some(size)) = (
            model.inode,
            model.object_offset,
            model.inode_offset,
            model.size,
        ) else {
            return Err(MetaError::CorruptChunk(model.id as u64));
        };

        Ok(Chunk {
            id: model.id as u64,
            inode: inode as u64,
            storage: model.storage,
            key: model.key,
            object_offset: object_offset as u64,
            inode_offset: inode_offset as u64,
            size: size as u64,
        })
    }
}

impl From<Model> for OrphanChunk {
    fn from(model: Model) -> Self {
        Self {
            id: model.id as u64,
            storage: model.storage,
            key: model.key,
        }
    }
}
