//! Background orphan collection
//!
//! Chunks are never deleted synchronously: a splice-write or truncation only
//! severs the inode link and stamps `orphandate`, so readers holding stale
//! chunk lists keep valid blob references. The collector sweeps orphans past
//! a retention threshold, deletes the backing blobs through the storage
//! backend, and only then removes the rows. The retention threshold must
//! exceed the longest expected reader lifetime.

use crate::meta::store::{MetaError, MetaStore, OrphanChunk};
use crate::storage::{StorageBackend, ZERO_STORAGE};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Orphan collection configuration
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Collection cycle interval (seconds)
    pub interval_secs: u64,
    /// Minimum age of an orphan chunk before its blob is deleted (seconds)
    pub retention_secs: u64,
    /// Number of concurrent blob-removal workers
    pub workers: usize,
    /// Capacity of the channel feeding the workers
    pub channel_capacity: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            retention_secs: 3600,
            workers: 4,
            channel_capacity: 64,
        }
    }
}

pub struct OrphanCollector<B: StorageBackend + 'static> {
    store: Arc<dyn MetaStore>,
    backend: Arc<B>,
    config: GcConfig,
}

impl<B: StorageBackend + 'static> OrphanCollector<B> {
    pub fn new(store: Arc<dyn MetaStore>, backend: Arc<B>, config: GcConfig) -> Self {
        Self {
            store,
            backend,
            config,
        }
    }

    /// Purge refcount-zero inodes the host never forgot.
    pub async fn clean_orphan_inodes(&self) -> Result<(), MetaError> {
        self.store.clean_orphan_inodes().await
    }

    /// Sweep orphan chunks older than `threshold`: remove the backing blobs
    /// through a fixed pool of workers, then delete the rows. Backend
    /// failures are logged and do not fail the batch; the affected rows are
    /// still deleted and any surviving blob is unreachable garbage on the
    /// backend side.
    pub async fn clean_orphan_chunks(&self, threshold: DateTime<Utc>) -> Result<u64, MetaError> {
        let orphans = self.store.orphan_chunks_before(threshold).await?;
        if orphans.is_empty() {
            return Ok(0);
        }

        let (tx, rx) = mpsc::channel::<OrphanChunk>(self.config.channel_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut handles = Vec::with_capacity(self.config.workers.max(1));
        for _ in 0..self.config.workers.max(1) {
            let rx = Arc::clone(&rx);
            let backend = Arc::clone(&self.backend);
            handles.push(tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(chunk) = next else {
                        break;
                    };

                    if let Err(err) = backend.remove(&chunk.storage, &chunk.key).await {
                        warn!(
                            chunk = chunk.id,
                            storage = %chunk.storage,
                            key = %chunk.key,
                            "failed to remove orphan chunk blob: {err}"
                        );
                    }
                }
            }));
        }

        for chunk in orphans {
            // Zero-fill rows have no backing blob.
            if chunk.storage == ZERO_STORAGE {
                continue;
            }

            if tx.send(chunk).await.is_err() {
                break;
            }
        }

        drop(tx);
        for handle in handles {
            let _ = handle.await;
        }

        let purged = self.store.purge_orphan_chunks_before(threshold).await?;
        Ok(purged)
    }

    /// Execute one full collection cycle.
    pub async fn run_cycle(&self) -> Result<u64, MetaError> {
        self.clean_orphan_inodes().await?;

        let threshold = Utc::now() - Duration::seconds(self.config.retention_secs as i64);
        self.clean_orphan_chunks(threshold).await
    }

    /// Run the collector on its configured interval with graceful shutdown
    /// support.
    pub async fn start(&self) {
        let mut interval = interval(tokio::time::Duration::from_secs(self.config.interval_secs));

        info!(
            "Orphan collector interval {} seconds, retention {} seconds",
            self.config.interval_secs, self.config.retention_secs
        );

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received Ctrl+C, shutting down orphan collector gracefully");
                let _ = shutdown_tx.send(());
            }
        });

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_cycle().await {
                        Ok(purged) => {
                            if purged > 0 {
                                info!("Collection cycle completed, purged {} orphan chunks", purged);
                            } else {
                                debug!("Collection cycle completed, nothing to purge");
                            }
                        }
                        Err(err) => {
                            error!("Collection cycle failed: {}", err);
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    info!("Orphan collector shutting down gracefully");
                    break;
                }
            }
        }

        info!("Orphan collector stopped");
    }
}
