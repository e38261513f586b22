use crate::meta::store::Stats;
use sea_orm::entity::prelude::*;

/// Row id of the single stats row. The table is an aggregate, not a
/// collection; SeaORM entities need a primary key, so the one row carries a
/// constant id.
pub const STATS_ROW: i32 = 1;

/// Aggregate counters: total live inodes and total live bytes. Maintained in
/// the same transaction as every create, delete and resize, and recomputable
/// from the inodes table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "stats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    pub inodes: i64,
    pub size: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Stats {
    fn from(model: Model) -> Self {
        Self {
            inodes: model.inodes as u64,
            size: model.size as u64,
        }
    }
}
