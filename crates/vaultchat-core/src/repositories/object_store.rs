use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use super::error::StoreResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Metadata for one stored object, as returned by `list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Boundary to the object-storage bucket holding notes and chat records.
///
/// Keys are flat strings; any hierarchy a front-end shows is built by
/// splitting keys on `/`, not a storage feature. Implementations must treat
/// values as opaque byte blobs.
pub trait ObjectStore: Send + Sync + 'static {
    /// List all objects whose key starts with `prefix`.
    fn list(&self, prefix: &str) -> BoxFuture<'static, StoreResult<Vec<ObjectMeta>>>;

    /// Read the full contents of one object.
    fn get(&self, key: &str) -> BoxFuture<'static, StoreResult<Vec<u8>>>;

    /// Write an object, replacing any previous value at `key`.
    fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> BoxFuture<'static, StoreResult<()>>;

    /// Delete one object. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> BoxFuture<'static, StoreResult<()>>;
}
