//! The storage seam the worker depends on.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Where stem artifacts end up.
///
/// Kept object-safe so the worker can hold an `Arc<dyn ObjectStore>` and
/// tests can substitute an in-memory implementation.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under the given key.
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Whether an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Generate a presigned GET URL.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Stable (non-presigned) URL of an object, as reported in callbacks.
    fn object_url(&self, key: &str) -> String;

    /// Cheap round trip for readiness checks.
    async fn check_connectivity(&self) -> StorageResult<()>;
}
