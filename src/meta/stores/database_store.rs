//! Database-based metadata store implementation
//!
//! Supports SQLite and PostgreSQL backends via SeaORM. Every mutating
//! operation runs in a single transaction; splice-writes and truncations
//! additionally take row locks on the chunk rows they touch, so writes to
//! the same inode serialize at the store.

use crate::meta::config::{Config, DatabaseType};
use crate::meta::entities::stats_meta::STATS_ROW;
use crate::meta::entities::{
    chunk_meta, entry_meta, inode_meta, stats_meta, xattr_meta, ChunkMeta, EntryMeta, InodeMeta,
    StatsMeta, XattrMeta,
};
use crate::meta::splice::{splice_plan, truncate_plan};
use crate::meta::store::{
    Child, Chunk, CreateRequest, Entry, Inode, MetaError, MetaStore, NewChunk, OrphanChunk, Stats,
    TouchRequest, WriteFlags, XATTR_CREATE, XATTR_REPLACE,
};
use crate::meta::{ROOT_INODE, ROOT_MODE};
use crate::storage::ZERO_STORAGE;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Schema, SqlErr,
    TransactionTrait,
};
use sea_query::{Expr, ExprTrait, Index, OnConflict};
use tracing::{debug, info};

/// Database-based metadata store
pub struct DatabaseMetaStore {
    db: DatabaseConnection,
}

impl DatabaseMetaStore {
    /// Connect to the store by URL (`sqlite:...` or `postgres:...`).
    pub async fn connect(url: &str) -> Result<Self, MetaError> {
        let mut opts = ConnectOptions::new(url.to_owned());
        if url.contains(":memory:") {
            // A pooled in-memory SQLite hands every connection its own
            // database; pin the pool to one connection.
            opts.max_connections(1);
        }

        let db = Database::connect(opts).await?;
        Ok(Self { db })
    }

    /// Connect using a parsed configuration.
    pub async fn from_config(config: &Config) -> Result<Self, MetaError> {
        match &config.database.db_config {
            DatabaseType::Sqlite { url } => {
                info!("Connecting to SQLite: {}", url);
                Self::connect(url).await
            }
            DatabaseType::Postgres { url } => {
                info!("Connecting to PostgreSQL: {}", url);
                Self::connect(url).await
            }
        }
    }

    fn now_nanos() -> i64 {
        Utc::now().timestamp_nanos_opt().unwrap_or(0)
    }

    async fn get_inode<C: ConnectionTrait>(&self, conn: &C, ino: u64) -> Result<Inode, MetaError> {
        let model = InodeMeta::find_by_id(ino as i64)
            .one(conn)
            .await
            .map_err(MetaError::Database)?
            .ok_or(MetaError::InodeNotFound(ino))?;

        Ok(model.into())
    }

    /// Adjust the aggregate counters inside the caller's transaction.
    async fn bump_stats<C: ConnectionTrait>(
        &self,
        conn: &C,
        inodes_delta: i64,
        size_delta: i64,
    ) -> Result<(), MetaError> {
        if inodes_delta == 0 && size_delta == 0 {
            return Ok(());
        }

        let mut update = StatsMeta::update_many();
        if inodes_delta != 0 {
            update = update.col_expr(
                stats_meta::Column::Inodes,
                Expr::col(stats_meta::Column::Inodes).add(inodes_delta),
            );
        }
        if size_delta != 0 {
            update = update.col_expr(
                stats_meta::Column::Size,
                Expr::col(stats_meta::Column::Size).add(size_delta),
            );
        }

        update
            .filter(stats_meta::Column::Id.eq(STATS_ROW))
            .exec(conn)
            .await
            .map_err(MetaError::Database)?;

        Ok(())
    }

    /// Sever the inode link of the given chunk rows in one batch, stamping
    /// `orphandate`. Backend coordinates stay behind for the collector.
    async fn orphan_chunk_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[u64],
        now: i64,
    ) -> Result<(), MetaError> {
        if ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = ids.iter().map(|id| *id as i64).collect();
        ChunkMeta::update_many()
            .col_expr(chunk_meta::Column::Inode, Expr::value(Option::<i64>::None))
            .col_expr(
                chunk_meta::Column::ObjectOffset,
                Expr::value(Option::<i64>::None),
            )
            .col_expr(
                chunk_meta::Column::InodeOffset,
                Expr::value(Option::<i64>::None),
            )
            .col_expr(chunk_meta::Column::Size, Expr::value(Option::<i64>::None))
            .col_expr(chunk_meta::Column::Orphandate, Expr::value(Some(now)))
            .filter(chunk_meta::Column::Id.is_in(ids))
            .exec(conn)
            .await
            .map_err(MetaError::Database)?;

        Ok(())
    }

    /// Orphan every chunk still linked to the given inodes.
    async fn orphan_chunks_of_inodes<C: ConnectionTrait>(
        &self,
        conn: &C,
        inodes: &[i64],
        now: i64,
    ) -> Result<(), MetaError> {
        if inodes.is_empty() {
            return Ok(());
        }

        ChunkMeta::update_many()
            .col_expr(chunk_meta::Column::Inode, Expr::value(Option::<i64>::None))
            .col_expr(
                chunk_meta::Column::ObjectOffset,
                Expr::value(Option::<i64>::None),
            )
            .col_expr(
                chunk_meta::Column::InodeOffset,
                Expr::value(Option::<i64>::None),
            )
            .col_expr(chunk_meta::Column::Size, Expr::value(Option::<i64>::None))
            .col_expr(chunk_meta::Column::Orphandate, Expr::value(Some(now)))
            .filter(chunk_meta::Column::Inode.is_in(inodes.to_vec()))
            .exec(conn)
            .await
            .map_err(MetaError::Database)?;

        Ok(())
    }

    async fn insert_chunk_row<C: ConnectionTrait>(
        &self,
        conn: &C,
        ino: u64,
        piece: &NewChunk,
    ) -> Result<(), MetaError> {
        chunk_meta::ActiveModel {
            inode: Set(Some(ino as i64)),
            storage: Set(piece.storage.clone()),
            key: Set(piece.key.clone()),
            object_offset: Set(Some(piece.object_offset as i64)),
            inode_offset: Set(Some(piece.inode_offset as i64)),
            size: Set(Some(piece.size as i64)),
            orphandate: Set(None),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(MetaError::Database)?;

        Ok(())
    }

    /// Materialize the gap `[offset, offset + len)` as a zero-fill chunk.
    async fn insert_zero_chunk<C: ConnectionTrait>(
        &self,
        conn: &C,
        ino: u64,
        offset: u64,
        len: u64,
    ) -> Result<(), MetaError> {
        self.insert_chunk_row(
            conn,
            ino,
            &NewChunk {
                storage: ZERO_STORAGE.to_string(),
                key: String::new(),
                object_offset: 0,
                inode_offset: offset,
                size: len,
            },
        )
        .await
    }

    /// Load the live chunks of `ino` intersecting `[off, end)`, locked for
    /// update so concurrent splices on the inode serialize.
    async fn live_chunks_overlapping<C: ConnectionTrait>(
        &self,
        conn: &C,
        ino: u64,
        off: u64,
        end: u64,
    ) -> Result<Vec<Chunk>, MetaError> {
        let rows = ChunkMeta::find()
            .filter(chunk_meta::Column::Inode.eq(ino as i64))
            .filter(chunk_meta::Column::InodeOffset.lt(end as i64))
            .filter(
                Expr::col(chunk_meta::Column::InodeOffset)
                    .add(Expr::col(chunk_meta::Column::Size))
                    .gt(off as i64),
            )
            .lock_exclusive()
            .all(conn)
            .await
            .map_err(MetaError::Database)?;

        rows.into_iter().map(Chunk::try_from).collect()
    }

    /// Remove the entry at (parent, name) and decrement the target's
    /// refcount. Returns false when no such entry exists. Fails when the
    /// target still has children of its own.
    async fn unlink_entry<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: u64,
        name: &[u8],
    ) -> Result<bool, MetaError> {
        let entry = EntryMeta::find()
            .filter(entry_meta::Column::Parent.eq(parent as i64))
            .filter(entry_meta::Column::Name.eq(name.to_vec()))
            .one(conn)
            .await
            .map_err(MetaError::Database)?;

        let Some(entry) = entry else {
            return Ok(false);
        };

        let children = EntryMeta::find()
            .filter(entry_meta::Column::Parent.eq(entry.inode))
            .count(conn)
            .await
            .map_err(MetaError::Database)?;

        if children > 0 {
            return Err(MetaError::DirectoryNotEmpty(entry.inode as u64));
        }

        EntryMeta::delete_many()
            .filter(entry_meta::Column::Parent.eq(parent as i64))
            .filter(entry_meta::Column::Name.eq(name.to_vec()))
            .exec(conn)
            .await
            .map_err(MetaError::Database)?;

        InodeMeta::update_many()
            .col_expr(
                inode_meta::Column::Refcount,
                Expr::col(inode_meta::Column::Refcount).sub(1),
            )
            .filter(inode_meta::Column::Id.eq(entry.inode))
            .exec(conn)
            .await
            .map_err(MetaError::Database)?;

        Ok(true)
    }

    /// Bump atime and ctime after an xattr mutation.
    async fn touch_xattr_times<C: ConnectionTrait>(
        &self,
        conn: &C,
        ino: u64,
        now: i64,
    ) -> Result<(), MetaError> {
        InodeMeta::update_many()
            .col_expr(inode_meta::Column::Atime, Expr::value(now))
            .col_expr(inode_meta::Column::Ctime, Expr::value(now))
            .filter(inode_meta::Column::Id.eq(ino as i64))
            .exec(conn)
            .await
            .map_err(MetaError::Database)?;

        Ok(())
    }

    fn nanos_of(threshold: DateTime<Utc>) -> i64 {
        threshold.timestamp_nanos_opt().unwrap_or(0)
    }
}

#[async_trait]
impl MetaStore for DatabaseMetaStore {
    async fn setup(&self) -> Result<(), MetaError> {
        let builder = self.db.get_database_backend();
        let schema = Schema::new(builder);

        let stmts = [
            schema
                .create_table_from_entity(InodeMeta)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(EntryMeta)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(ChunkMeta)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(XattrMeta)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(StatsMeta)
                .if_not_exists()
                .to_owned(),
        ];

        for stmt in stmts.iter() {
            let sql = builder.build(stmt);
            self.db.execute(sql).await.map_err(MetaError::Database)?;
        }

        let indexes = [
            Index::create()
                .if_not_exists()
                .name("idx_entries_parent")
                .table(EntryMeta)
                .col(entry_meta::Column::Parent)
                .to_owned(),
            Index::create()
                .if_not_exists()
                .name("idx_entries_inode")
                .table(EntryMeta)
                .col(entry_meta::Column::Inode)
                .to_owned(),
            Index::create()
                .if_not_exists()
                .name("idx_chunks_inode")
                .table(ChunkMeta)
                .col(chunk_meta::Column::Inode)
                .to_owned(),
            Index::create()
                .if_not_exists()
                .name("idx_xattr_inode")
                .table(XattrMeta)
                .col(xattr_meta::Column::Inode)
                .to_owned(),
        ];

        for stmt in indexes.iter() {
            let sql = builder.build(stmt);
            self.db.execute(sql).await.map_err(MetaError::Database)?;
        }

        if InodeMeta::find_by_id(ROOT_INODE as i64)
            .one(&self.db)
            .await
            .map_err(MetaError::Database)?
            .is_none()
        {
            let now = Self::now_nanos();
            inode_meta::ActiveModel {
                id: Set(ROOT_INODE as i64),
                mode: Set(ROOT_MODE as i32),
                uid: Set(0),
                gid: Set(0),
                target: Set(Vec::new()),
                size: Set(0),
                refcount: Set(1),
                atime: Set(now),
                mtime: Set(now),
                ctime: Set(now),
                crtime: Set(now),
            }
            .insert(&self.db)
            .await
            .map_err(MetaError::Database)?;

            info!("Root inode installed");
        }

        if StatsMeta::find_by_id(STATS_ROW)
            .one(&self.db)
            .await
            .map_err(MetaError::Database)?
            .is_none()
        {
            stats_meta::ActiveModel {
                id: Set(STATS_ROW),
                inodes: Set(1),
                size: Set(0),
            }
            .insert(&self.db)
            .await
            .map_err(MetaError::Database)?;
        }

        info!("Metadata schema initialized");
        Ok(())
    }

    async fn stats(&self) -> Result<Stats, MetaError> {
        let model = StatsMeta::find_by_id(STATS_ROW)
            .one(&self.db)
            .await
            .map_err(MetaError::Database)?
            .ok_or_else(|| MetaError::Internal("stats row missing, setup has not run".into()))?;

        Ok(model.into())
    }

    async fn create(&self, req: CreateRequest) -> Result<Entry, MetaError> {
        let txn = self.db.begin().await.map_err(MetaError::Database)?;

        let parent = self.get_inode(&txn, req.parent).await?;
        if !parent.is_dir() {
            txn.rollback().await.map_err(MetaError::Database)?;
            return Err(MetaError::NotDirectory(req.parent));
        }

        let id = if req.id == 0 {
            self.bump_stats(&txn, 1, 0).await?;

            let now = Self::now_nanos();
            let model = inode_meta::ActiveModel {
                mode: Set(req.mode as i32),
                uid: Set(req.uid as i32),
                gid: Set(req.gid as i32),
                target: Set(req.target.clone()),
                size: Set(0),
                refcount: Set(1),
                atime: Set(now),
                mtime: Set(now),
                ctime: Set(now),
                crtime: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(MetaError::Database)?;

            model.id as u64
        } else {
            // Hard link: the target must already exist.
            self.get_inode(&txn, req.id).await?;
            req.id
        };

        entry_meta::ActiveModel {
            parent: Set(req.parent as i64),
            name: Set(req.name.clone()),
            inode: Set(id as i64),
        }
        .insert(&txn)
        .await
        .map_err(MetaError::Database)?;

        if req.id != 0 {
            InodeMeta::update_many()
                .col_expr(
                    inode_meta::Column::Refcount,
                    Expr::col(inode_meta::Column::Refcount).add(1),
                )
                .filter(inode_meta::Column::Id.eq(id as i64))
                .exec(&txn)
                .await
                .map_err(MetaError::Database)?;
        }

        let inode = self.get_inode(&txn, id).await?;
        txn.commit().await.map_err(MetaError::Database)?;

        Ok(Entry {
            parent: req.parent,
            name: req.name,
            inode,
        })
    }

    async fn get(&self, ino: u64) -> Result<Inode, MetaError> {
        self.get_inode(&self.db, ino).await
    }

    async fn forget(&self, ino: u64) -> Result<(), MetaError> {
        let txn = self.db.begin().await.map_err(MetaError::Database)?;

        let inode = self.get_inode(&txn, ino).await?;
        if inode.refcount == 0 {
            let now = Self::now_nanos();
            self.orphan_chunks_of_inodes(&txn, &[ino as i64], now)
                .await?;

            XattrMeta::delete_many()
                .filter(xattr_meta::Column::Inode.eq(ino as i64))
                .exec(&txn)
                .await
                .map_err(MetaError::Database)?;

            InodeMeta::delete_by_id(ino as i64)
                .exec(&txn)
                .await
                .map_err(MetaError::Database)?;

            self.bump_stats(&txn, -1, -(inode.size as i64)).await?;
            debug!(inode = ino, "reclaimed forgotten inode");
        }

        txn.commit().await.map_err(MetaError::Database)?;
        Ok(())
    }

    async fn touch(&self, ino: u64, req: TouchRequest) -> Result<Inode, MetaError> {
        let txn = self.db.begin().await.map_err(MetaError::Database)?;

        let mut inode = self.get_inode(&txn, ino).await?;
        let now = Self::now_nanos();

        if let Some(new_size) = req.size {
            if new_size != inode.size {
                if new_size > inode.size {
                    self.insert_zero_chunk(&txn, ino, inode.size, new_size - inode.size)
                        .await?;
                    self.bump_stats(&txn, 0, (new_size - inode.size) as i64)
                        .await?;
                } else {
                    let affected = {
                        let rows = ChunkMeta::find()
                            .filter(chunk_meta::Column::Inode.eq(ino as i64))
                            .filter(
                                Expr::col(chunk_meta::Column::InodeOffset)
                                    .add(Expr::col(chunk_meta::Column::Size))
                                    .gt(new_size as i64),
                            )
                            .lock_exclusive()
                            .all(&txn)
                            .await
                            .map_err(MetaError::Database)?;
                        rows.into_iter()
                            .map(Chunk::try_from)
                            .collect::<Result<Vec<_>, _>>()?
                    };

                    let plan = truncate_plan(new_size, affected);
                    for chunk in &plan.shrinks {
                        chunk_meta::ActiveModel {
                            id: Set(chunk.id as i64),
                            size: Set(Some(chunk.size as i64)),
                            ..Default::default()
                        }
                        .update(&txn)
                        .await
                        .map_err(MetaError::Database)?;
                    }

                    self.orphan_chunk_rows(&txn, &plan.orphans, now).await?;
                    self.bump_stats(&txn, 0, -((inode.size - new_size) as i64))
                        .await?;
                }

                inode.size = new_size;
            }
        }

        if let Some(mode) = req.mode {
            inode.mode = mode;
        }
        if let Some(uid) = req.uid {
            inode.uid = uid;
        }
        if let Some(gid) = req.gid {
            inode.gid = gid;
        }
        if let Some(atime) = req.atime {
            inode.atime = atime;
        }
        if let Some(mtime) = req.mtime {
            inode.mtime = mtime;
        }
        inode.ctime = now;

        inode_meta::ActiveModel {
            id: Set(ino as i64),
            mode: Set(inode.mode as i32),
            uid: Set(inode.uid as i32),
            gid: Set(inode.gid as i32),
            size: Set(inode.size as i64),
            atime: Set(inode.atime),
            mtime: Set(inode.mtime),
            ctime: Set(inode.ctime),
            ..Default::default()
        }
        .update(&txn)
        .await
        .map_err(MetaError::Database)?;

        txn.commit().await.map_err(MetaError::Database)?;
        Ok(inode)
    }

    async fn look_up(&self, parent: u64, name: &[u8]) -> Result<Entry, MetaError> {
        let found = EntryMeta::find()
            .filter(entry_meta::Column::Parent.eq(parent as i64))
            .filter(entry_meta::Column::Name.eq(name.to_vec()))
            .find_also_related(InodeMeta)
            .one(&self.db)
            .await
            .map_err(MetaError::Database)?;

        let Some((entry, inode)) = found else {
            return Err(MetaError::EntryNotFound {
                parent,
                name: String::from_utf8_lossy(name).into_owned(),
            });
        };

        let inode = inode.ok_or_else(|| {
            MetaError::Internal(format!(
                "entry under inode {} points at missing inode {}",
                parent, entry.inode
            ))
        })?;

        Ok(Entry {
            parent,
            name: entry.name,
            inode: inode.into(),
        })
    }

    async fn children(&self, ino: u64) -> Result<Vec<Child>, MetaError> {
        InodeMeta::update_many()
            .col_expr(inode_meta::Column::Atime, Expr::value(Self::now_nanos()))
            .filter(inode_meta::Column::Id.eq(ino as i64))
            .exec(&self.db)
            .await
            .map_err(MetaError::Database)?;

        let rows = EntryMeta::find()
            .filter(entry_meta::Column::Parent.eq(ino as i64))
            .find_also_related(InodeMeta)
            .all(&self.db)
            .await
            .map_err(MetaError::Database)?;

        let mut children = Vec::with_capacity(rows.len());
        for (entry, inode) in rows {
            let inode = inode.ok_or_else(|| {
                MetaError::Internal(format!(
                    "entry under inode {} points at missing inode {}",
                    ino, entry.inode
                ))
            })?;

            children.push(Child {
                inode: entry.inode as u64,
                name: entry.name,
                mode: inode.mode as u32,
            });
        }

        Ok(children)
    }

    async fn unlink(&self, parent: u64, name: &[u8]) -> Result<(), MetaError> {
        let txn = self.db.begin().await.map_err(MetaError::Database)?;

        match self.unlink_entry(&txn, parent, name).await {
            Ok(true) => {}
            Ok(false) => {
                txn.rollback().await.map_err(MetaError::Database)?;
                return Err(MetaError::EntryNotFound {
                    parent,
                    name: String::from_utf8_lossy(name).into_owned(),
                });
            }
            Err(err) => {
                txn.rollback().await.map_err(MetaError::Database)?;
                return Err(err);
            }
        }

        txn.commit().await.map_err(MetaError::Database)?;
        Ok(())
    }

    async fn rename(
        &self,
        old_parent: u64,
        old_name: &[u8],
        new_parent: u64,
        new_name: &[u8],
    ) -> Result<(), MetaError> {
        let txn = self.db.begin().await.map_err(MetaError::Database)?;

        // A missing destination is a no-op; a destination with children
        // aborts the whole rename.
        if let Err(err) = self.unlink_entry(&txn, new_parent, new_name).await {
            txn.rollback().await.map_err(MetaError::Database)?;
            return Err(err);
        }

        let result = EntryMeta::update_many()
            .col_expr(entry_meta::Column::Parent, Expr::value(new_parent as i64))
            .col_expr(entry_meta::Column::Name, Expr::value(new_name.to_vec()))
            .filter(entry_meta::Column::Parent.eq(old_parent as i64))
            .filter(entry_meta::Column::Name.eq(old_name.to_vec()))
            .exec(&txn)
            .await
            .map_err(MetaError::Database)?;

        if result.rows_affected == 0 {
            txn.rollback().await.map_err(MetaError::Database)?;
            return Err(MetaError::EntryNotFound {
                parent: old_parent,
                name: String::from_utf8_lossy(old_name).into_owned(),
            });
        }

        txn.commit().await.map_err(MetaError::Database)?;
        Ok(())
    }

    async fn list_xattr(&self, ino: u64) -> Result<Vec<Vec<u8>>, MetaError> {
        let rows = XattrMeta::find()
            .filter(xattr_meta::Column::Inode.eq(ino as i64))
            .all(&self.db)
            .await
            .map_err(MetaError::Database)?;

        Ok(rows.into_iter().map(|row| row.key).collect())
    }

    async fn get_xattr(&self, ino: u64, key: &[u8]) -> Result<Vec<u8>, MetaError> {
        let row = XattrMeta::find_by_id((ino as i64, key.to_vec()))
            .one(&self.db)
            .await
            .map_err(MetaError::Database)?
            .ok_or(MetaError::NoAttribute(ino))?;

        Ok(row.value)
    }

    async fn set_xattr(
        &self,
        ino: u64,
        key: &[u8],
        value: &[u8],
        flags: u32,
    ) -> Result<(), MetaError> {
        let txn = self.db.begin().await.map_err(MetaError::Database)?;

        match flags {
            XATTR_CREATE => {
                let insert = xattr_meta::ActiveModel {
                    inode: Set(ino as i64),
                    key: Set(key.to_vec()),
                    value: Set(value.to_vec()),
                }
                .insert(&txn)
                .await;

                if let Err(err) = insert {
                    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                        txn.rollback().await.map_err(MetaError::Database)?;
                        return Err(MetaError::AttributeExists(ino));
                    }
                    return Err(MetaError::Database(err));
                }
            }
            XATTR_REPLACE => {
                let result = XattrMeta::update_many()
                    .col_expr(xattr_meta::Column::Value, Expr::value(value.to_vec()))
                    .filter(xattr_meta::Column::Inode.eq(ino as i64))
                    .filter(xattr_meta::Column::Key.eq(key.to_vec()))
                    .exec(&txn)
                    .await
                    .map_err(MetaError::Database)?;

                if result.rows_affected == 0 {
                    txn.rollback().await.map_err(MetaError::Database)?;
                    return Err(MetaError::NoAttribute(ino));
                }
            }
            _ => {
                XattrMeta::insert(xattr_meta::ActiveModel {
                    inode: Set(ino as i64),
                    key: Set(key.to_vec()),
                    value: Set(value.to_vec()),
                })
                .on_conflict(
                    OnConflict::columns([xattr_meta::Column::Inode, xattr_meta::Column::Key])
                        .update_column(xattr_meta::Column::Value)
                        .to_owned(),
                )
                .exec(&txn)
                .await
                .map_err(MetaError::Database)?;
            }
        }

        self.touch_xattr_times(&txn, ino, Self::now_nanos()).await?;
        txn.commit().await.map_err(MetaError::Database)?;
        Ok(())
    }

    async fn remove_xattr(&self, ino: u64, key: &[u8]) -> Result<(), MetaError> {
        let txn = self.db.begin().await.map_err(MetaError::Database)?;

        XattrMeta::delete_many()
            .filter(xattr_meta::Column::Inode.eq(ino as i64))
            .filter(xattr_meta::Column::Key.eq(key.to_vec()))
            .exec(&txn)
            .await
            .map_err(MetaError::Database)?;

        self.touch_xattr_times(&txn, ino, Self::now_nanos()).await?;
        txn.commit().await.map_err(MetaError::Database)?;
        Ok(())
    }

    async fn chunks(&self, ino: u64) -> Result<Vec<Chunk>, MetaError> {
        InodeMeta::update_many()
            .col_expr(inode_meta::Column::Atime, Expr::value(Self::now_nanos()))
            .filter(inode_meta::Column::Id.eq(ino as i64))
            .exec(&self.db)
            .await
            .map_err(MetaError::Database)?;

        let rows = ChunkMeta::find()
            .filter(chunk_meta::Column::Inode.eq(ino as i64))
            .order_by_asc(chunk_meta::Column::InodeOffset)
            .all(&self.db)
            .await
            .map_err(MetaError::Database)?;

        rows.into_iter().map(Chunk::try_from).collect()
    }

    async fn add_chunk(
        &self,
        ino: u64,
        flags: WriteFlags,
        chunk: NewChunk,
    ) -> Result<(), MetaError> {
        if chunk.size == 0 {
            debug!(inode = ino, "ignoring zero-length chunk registration");
            return Ok(());
        }

        let txn = self.db.begin().await.map_err(MetaError::Database)?;

        let inode = self.get_inode(&txn, ino).await?;

        let mut chunk = chunk;
        if flags.contains(WriteFlags::APPEND) {
            chunk.inode_offset = inode.size;
        }

        if inode.size < chunk.inode_offset {
            self.insert_zero_chunk(&txn, ino, inode.size, chunk.inode_offset - inode.size)
                .await?;
        }

        let off = chunk.inode_offset;
        let write_end = off + chunk.size;

        let overlapping = self
            .live_chunks_overlapping(&txn, ino, off, write_end)
            .await?;
        let plan = splice_plan(off, chunk.size, overlapping);

        for survivor in &plan.updates {
            chunk_meta::ActiveModel {
                id: Set(survivor.id as i64),
                object_offset: Set(Some(survivor.object_offset as i64)),
                inode_offset: Set(Some(survivor.inode_offset as i64)),
                size: Set(Some(survivor.size as i64)),
                ..Default::default()
            }
            .update(&txn)
            .await
            .map_err(MetaError::Database)?;
        }

        self.insert_chunk_row(&txn, ino, &chunk).await?;
        for piece in &plan.inserts {
            self.insert_chunk_row(&txn, ino, piece).await?;
        }

        let now = Self::now_nanos();
        let new_size = inode.size.max(write_end);
        if new_size != inode.size {
            self.bump_stats(&txn, 0, (new_size - inode.size) as i64)
                .await?;
        }

        inode_meta::ActiveModel {
            id: Set(ino as i64),
            size: Set(new_size as i64),
            atime: Set(now),
            mtime: Set(now),
            ctime: Set(now),
            ..Default::default()
        }
        .update(&txn)
        .await
        .map_err(MetaError::Database)?;

        self.orphan_chunk_rows(&txn, &plan.orphans, now).await?;

        txn.commit().await.map_err(MetaError::Database)?;
        Ok(())
    }

    async fn clean_orphan_inodes(&self) -> Result<(), MetaError> {
        let txn = self.db.begin().await.map_err(MetaError::Database)?;

        let doomed = InodeMeta::find()
            .filter(inode_meta::Column::Refcount.eq(0))
            .all(&txn)
            .await
            .map_err(MetaError::Database)?;

        if !doomed.is_empty() {
            let ids: Vec<i64> = doomed.iter().map(|model| model.id).collect();
            let now = Self::now_nanos();

            self.orphan_chunks_of_inodes(&txn, &ids, now).await?;

            XattrMeta::delete_many()
                .filter(xattr_meta::Column::Inode.is_in(ids.clone()))
                .exec(&txn)
                .await
                .map_err(MetaError::Database)?;

            InodeMeta::delete_many()
                .filter(inode_meta::Column::Refcount.eq(0))
                .exec(&txn)
                .await
                .map_err(MetaError::Database)?;

            info!(count = doomed.len(), "purged unreferenced inodes");
        }

        // Recompute the counters from primary state; the purge above may be
        // correcting for forgets the host never issued.
        let survivors = InodeMeta::find()
            .all(&txn)
            .await
            .map_err(MetaError::Database)?;
        let total: i64 = survivors.iter().map(|model| model.size.max(0)).sum();

        stats_meta::ActiveModel {
            id: Set(STATS_ROW),
            inodes: Set(survivors.len() as i64),
            size: Set(total),
        }
        .update(&txn)
        .await
        .map_err(MetaError::Database)?;

        txn.commit().await.map_err(MetaError::Database)?;
        Ok(())
    }

    async fn orphan_chunks_before(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<OrphanChunk>, MetaError> {
        let rows = ChunkMeta::find()
            .filter(chunk_meta::Column::Inode.is_null())
            .filter(chunk_meta::Column::Orphandate.lt(Self::nanos_of(threshold)))
            .all(&self.db)
            .await
            .map_err(MetaError::Database)?;

        Ok(rows.into_iter().map(OrphanChunk::from).collect())
    }

    async fn purge_orphan_chunks_before(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<u64, MetaError> {
        let result = ChunkMeta::delete_many()
            .filter(chunk_meta::Column::Inode.is_null())
            .filter(chunk_meta::Column::Orphandate.lt(Self::nanos_of(threshold)))
            .exec(&self.db)
            .await
            .map_err(MetaError::Database)?;

        Ok(result.rows_affected)
    }
}
