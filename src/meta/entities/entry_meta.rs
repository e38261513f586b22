use sea_orm::entity::prelude::*;

/// Directory entry row: a (parent, name) → inode binding. Names are byte
/// strings and need not be valid UTF-8.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub parent: i64,

    #[sea_orm(primary_key, auto_increment = false, column_type = "VarBinary(StringLen::N(255))")]
    pub name: Vec<u8>,

    pub inode: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inode_meta::Entity",
        from = "Column::Parent",
        to = "super::inode_meta::Column::Id"
    )]
    ParentInode,

    #[sea_orm(
        belongs_to = "super::inode_meta::Entity",
        from = "Column::Inode",
        to = "super::inode_meta::Column::Id"
    )]
    TargetInode,
}

// Entry joins default to the inode the entry points at, not the parent.
impl Related<super::inode_meta::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TargetInode.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
