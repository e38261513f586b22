//! Storage backend contract
//!
//! The engine never reads or writes blob bytes; the FS host populates the
//! object stores out-of-band. The only backend operation consumed here is
//! blob deletion, issued by the orphan collector.

use async_trait::async_trait;

/// Reserved logical storage name denoting a zero-fill range. Rows tagged
/// with it have no backing blob and are filtered out of collector sweeps.
pub const ZERO_STORAGE: &str = "zero";

/// External object store, keyed by a short backend identifier plus a
/// backend-specific blob key.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn remove(
        &self,
        storage: &str,
        key: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
