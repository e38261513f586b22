use sea_orm::entity::prelude::*;

/// Extended attribute row: one (inode, key) → value binding.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "xattr")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub inode: i64,

    #[sea_orm(primary_key, auto_increment = false, column_type = "VarBinary(StringLen::N(255))")]
    pub key: Vec<u8>,

    #[sea_orm(column_type = "VarBinary(StringLen::N(4096))")]
    pub value: Vec<u8>,
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
