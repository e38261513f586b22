//! Integration tests for inode, directory, xattr and stats operations.

use keelfs_meta::{
    CreateRequest, DatabaseMetaStore, MetaError, MetaStore, NewChunk, WriteFlags, ROOT_INODE,
    XATTR_CREATE, XATTR_REPLACE,
};

async fn new_store() -> DatabaseMetaStore {
    let store = DatabaseMetaStore::connect("sqlite::memory:")
        .await
        .expect("connect in-memory store");
    store.setup().await.expect("setup schema");
    store
}

async fn mkdir(store: &DatabaseMetaStore, parent: u64, name: &[u8]) -> u64 {
    let entry = store
        .create(CreateRequest {
            parent,
            name: name.to_vec(),
            mode: 0o40755,
            ..Default::default()
        })
        .await
        .expect("create directory");
    entry.inode.id
}

async fn mkfile(store: &DatabaseMetaStore, parent: u64, name: &[u8]) -> u64 {
    let entry = store
        .create(CreateRequest {
            parent,
            name: name.to_vec(),
            mode: 0o100644,
            ..Default::default()
        })
        .await
        .expect("create file")
        .inode;
    entry.id
}

#[tokio::test]
async fn setup_installs_root_and_is_idempotent() {
    let store = new_store().await;
    store.setup().await.unwrap();

    let root = store.get(ROOT_INODE).await.unwrap();
    assert!(root.is_dir());
    assert_eq!(root.mode, 0o40777);
    assert_eq!(root.refcount, 1);
    assert_eq!(root.size, 0);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.inodes, 1);
    assert_eq!(stats.size, 0);
}

#[tokio::test]
async fn create_lookup_children_roundtrip() {
    let store = new_store().await;

    let dir = mkdir(&store, ROOT_INODE, b"docs").await;
    let file = mkfile(&store, dir, b"readme").await;

    let entry = store.look_up(dir, b"readme").await.unwrap();
    assert_eq!(entry.inode.id, file);
    assert_eq!(entry.name, b"readme");
    assert_eq!(entry.inode.refcount, 1);

    let children = store.children(ROOT_INODE).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, b"docs");
    assert_eq!(children[0].inode, dir);
    assert_eq!(children[0].mode, 0o40755);

    let missing = store.look_up(dir, b"absent").await.unwrap_err();
    assert!(matches!(missing, MetaError::EntryNotFound { .. }));
    assert_eq!(missing.errno(), libc::ENOENT);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.inodes, 3);
}

#[tokio::test]
async fn create_under_a_file_is_rejected() {
    let store = new_store().await;
    let file = mkfile(&store, ROOT_INODE, b"plain").await;

    let err = store
        .create(CreateRequest {
            parent: file,
            name: b"child".to_vec(),
            mode: 0o100644,
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, MetaError::NotDirectory(ino) if ino == file));
    assert_eq!(err.errno(), libc::ENOTDIR);
    assert_eq!(store.stats().await.unwrap().inodes, 2);
}

#[tokio::test]
async fn symlink_target_survives_the_roundtrip() {
    let store = new_store().await;

    let entry = store
        .create(CreateRequest {
            parent: ROOT_INODE,
            name: b"link".to_vec(),
            mode: 0o120777,
            target: b"/somewhere/else".to_vec(),
            ..Default::default()
        })
        .await
        .unwrap();

    let inode = store.get(entry.inode.id).await.unwrap();
    assert_eq!(inode.target, b"/somewhere/else");
}

#[tokio::test]
async fn hard_link_shares_the_inode_and_counts_references() {
    let store = new_store().await;
    let ino = mkfile(&store, ROOT_INODE, b"original").await;

    let link = store
        .create(CreateRequest {
            parent: ROOT_INODE,
            name: b"alias".to_vec(),
            id: ino,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(link.inode.id, ino);
    assert_eq!(link.inode.refcount, 2);

    // Linking must not count a new inode.
    assert_eq!(store.stats().await.unwrap().inodes, 2);

    store.unlink(ROOT_INODE, b"original").await.unwrap();
    assert_eq!(store.get(ino).await.unwrap().refcount, 1);

    // Still reachable through the second name.
    let entry = store.look_up(ROOT_INODE, b"alias").await.unwrap();
    assert_eq!(entry.inode.id, ino);
}

#[tokio::test]
async fn forget_reclaims_an_unreferenced_inode() {
    let store = new_store().await;
    let ino = mkfile(&store, ROOT_INODE, b"doomed").await;

    store
        .add_chunk(
            ino,
            WriteFlags::empty(),
            NewChunk {
                storage: "s3".to_string(),
                key: "blob-1".to_string(),
                object_offset: 0,
                inode_offset: 0,
                size: 64,
            },
        )
        .await
        .unwrap();
    store
        .set_xattr(ino, b"user.note", b"bye", 0)
        .await
        .unwrap();
    assert_eq!(store.stats().await.unwrap().size, 64);

    store.unlink(ROOT_INODE, b"doomed").await.unwrap();
    // The inode row survives until the host releases it.
    assert_eq!(store.get(ino).await.unwrap().refcount, 0);

    // Forget with references still held is a no-op.
    store.forget(ROOT_INODE).await.unwrap();
    assert!(store.get(ROOT_INODE).await.is_ok());

    store.forget(ino).await.unwrap();
    let err = store.get(ino).await.unwrap_err();
    assert!(matches!(err, MetaError::InodeNotFound(_)));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.inodes, 1);
    assert_eq!(stats.size, 0);

    // The chunk outlives the inode as an orphan.
    let orphans = store
        .orphan_chunks_before(chrono::Utc::now() + chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert!(orphans.iter().any(|o| o.key == "blob-1"));
}

#[tokio::test]
async fn unlink_of_a_directory_with_children_is_refused() {
    let store = new_store().await;
    let dir = mkdir(&store, ROOT_INODE, b"full").await;
    mkfile(&store, dir, b"occupant").await;

    let err = store.unlink(ROOT_INODE, b"full").await.unwrap_err();
    assert!(matches!(err, MetaError::DirectoryNotEmpty(ino) if ino == dir));
    assert_eq!(err.errno(), libc::ENOTEMPTY);

    // Nothing changed.
    assert_eq!(store.look_up(ROOT_INODE, b"full").await.unwrap().inode.id, dir);
    assert_eq!(store.get(dir).await.unwrap().refcount, 1);

    // Empty it out and the unlink goes through.
    store.unlink(dir, b"occupant").await.unwrap();
    store.unlink(ROOT_INODE, b"full").await.unwrap();
    assert_eq!(store.get(dir).await.unwrap().refcount, 0);
}

#[tokio::test]
async fn rename_moves_an_entry_between_directories() {
    let store = new_store().await;
    let src = mkdir(&store, ROOT_INODE, b"src").await;
    let dst = mkdir(&store, ROOT_INODE, b"dst").await;
    let ino = mkfile(&store, src, b"file").await;

    store.rename(src, b"file", dst, b"moved").await.unwrap();

    assert!(matches!(
        store.look_up(src, b"file").await.unwrap_err(),
        MetaError::EntryNotFound { .. }
    ));
    assert_eq!(store.look_up(dst, b"moved").await.unwrap().inode.id, ino);
    // A move is not a new link.
    assert_eq!(store.get(ino).await.unwrap().refcount, 1);
}

#[tokio::test]
async fn rename_over_an_existing_entry_unlinks_it() {
    let store = new_store().await;
    let dir = mkdir(&store, ROOT_INODE, b"a").await;
    let kept = mkfile(&store, dir, b"x").await;
    let displaced = mkfile(&store, dir, b"y").await;

    store.rename(dir, b"x", dir, b"y").await.unwrap();

    let entry = store.look_up(dir, b"y").await.unwrap();
    assert_eq!(entry.inode.id, kept);
    assert!(matches!(
        store.look_up(dir, b"x").await.unwrap_err(),
        MetaError::EntryNotFound { .. }
    ));

    // The displaced inode lost its last reference and awaits Forget.
    assert_eq!(store.get(displaced).await.unwrap().refcount, 0);
}

#[tokio::test]
async fn rename_over_a_nonempty_directory_is_refused() {
    let store = new_store().await;
    let file = mkfile(&store, ROOT_INODE, b"file").await;
    let dir = mkdir(&store, ROOT_INODE, b"dir").await;
    mkfile(&store, dir, b"occupant").await;

    let err = store
        .rename(ROOT_INODE, b"file", ROOT_INODE, b"dir")
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::DirectoryNotEmpty(_)));

    // The failed rename left both entries in place.
    assert_eq!(store.look_up(ROOT_INODE, b"file").await.unwrap().inode.id, file);
    assert_eq!(store.look_up(ROOT_INODE, b"dir").await.unwrap().inode.id, dir);
}

#[tokio::test]
async fn rename_of_a_missing_source_fails() {
    let store = new_store().await;

    let err = store
        .rename(ROOT_INODE, b"ghost", ROOT_INODE, b"elsewhere")
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::EntryNotFound { .. }));
    assert_eq!(err.errno(), libc::ENOENT);
}

#[tokio::test]
async fn xattr_flag_semantics() {
    let store = new_store().await;
    let ino = mkfile(&store, ROOT_INODE, b"tagged").await;

    // Upsert path works for both insert and overwrite.
    store.set_xattr(ino, b"user.a", b"one", 0).await.unwrap();
    store.set_xattr(ino, b"user.a", b"two", 0).await.unwrap();
    assert_eq!(store.get_xattr(ino, b"user.a").await.unwrap(), b"two");

    // CREATE refuses to clobber.
    let err = store
        .set_xattr(ino, b"user.a", b"three", XATTR_CREATE)
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::AttributeExists(_)));
    assert_eq!(err.errno(), libc::EEXIST);
    assert_eq!(store.get_xattr(ino, b"user.a").await.unwrap(), b"two");

    store
        .set_xattr(ino, b"user.b", b"fresh", XATTR_CREATE)
        .await
        .unwrap();

    // REPLACE needs an existing key.
    let err = store
        .set_xattr(ino, b"user.c", b"x", XATTR_REPLACE)
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::NoAttribute(_)));
    assert_eq!(err.errno(), libc::ENODATA);

    store
        .set_xattr(ino, b"user.b", b"replaced", XATTR_REPLACE)
        .await
        .unwrap();
    assert_eq!(store.get_xattr(ino, b"user.b").await.unwrap(), b"replaced");

    let mut keys = store.list_xattr(ino).await.unwrap();
    keys.sort();
    assert_eq!(keys, vec![b"user.a".to_vec(), b"user.b".to_vec()]);

    store.remove_xattr(ino, b"user.a").await.unwrap();
    assert!(matches!(
        store.get_xattr(ino, b"user.a").await.unwrap_err(),
        MetaError::NoAttribute(_)
    ));
    // Removing an absent key is silent.
    store.remove_xattr(ino, b"user.a").await.unwrap();
}

#[tokio::test]
async fn names_need_not_be_utf8() {
    let store = new_store().await;
    let name = vec![0xff, 0xfe, 0x00, 0x7f];

    let ino = {
        let entry = store
            .create(CreateRequest {
                parent: ROOT_INODE,
                name: name.clone(),
                mode: 0o100644,
                ..Default::default()
            })
            .await
            .unwrap();
        entry.inode.id
    };

    let entry = store.look_up(ROOT_INODE, &name).await.unwrap();
    assert_eq!(entry.inode.id, ino);
    assert_eq!(entry.name, name);

    store.unlink(ROOT_INODE, &name).await.unwrap();
}

#[tokio::test]
async fn metadata_persists_across_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("meta.db").display());

    let ino = {
        let store = DatabaseMetaStore::connect(&url).await.unwrap();
        store.setup().await.unwrap();
        mkfile(&store, ROOT_INODE, b"persistent").await
    };

    let store = DatabaseMetaStore::connect(&url).await.unwrap();
    // Setup against an existing database must leave it untouched.
    store.setup().await.unwrap();

    let entry = store.look_up(ROOT_INODE, b"persistent").await.unwrap();
    assert_eq!(entry.inode.id, ino);
    assert_eq!(store.stats().await.unwrap().inodes, 2);
}

#[tokio::test]
async fn stats_track_creates_writes_and_forgets() {
    let store = new_store().await;

    let a = mkfile(&store, ROOT_INODE, b"a").await;
    let b = mkfile(&store, ROOT_INODE, b"b").await;
    assert_eq!(store.stats().await.unwrap().inodes, 3);

    store
        .add_chunk(
            a,
            WriteFlags::empty(),
            NewChunk {
                storage: "s3".to_string(),
                key: "a1".to_string(),
                object_offset: 0,
                inode_offset: 0,
                size: 1000,
            },
        )
        .await
        .unwrap();
    store
        .add_chunk(
            b,
            WriteFlags::empty(),
            NewChunk {
                storage: "s3".to_string(),
                key: "b1".to_string(),
                object_offset: 0,
                inode_offset: 500,
                size: 500,
            },
        )
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.size, 2000);

    // Overwriting within the file does not grow it.
    store
        .add_chunk(
            a,
            WriteFlags::empty(),
            NewChunk {
                storage: "s3".to_string(),
                key: "a2".to_string(),
                object_offset: 0,
                inode_offset: 100,
                size: 100,
            },
        )
        .await
        .unwrap();
    assert_eq!(store.stats().await.unwrap().size, 2000);

    store.unlink(ROOT_INODE, b"a").await.unwrap();
    store.forget(a).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.inodes, 2);
    assert_eq!(stats.size, 1000);
}
