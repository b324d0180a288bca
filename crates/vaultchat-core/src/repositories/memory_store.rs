use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::error::{StoreError, StoreResult};
use super::object_store::{BoxFuture, ObjectMeta, ObjectStore};

#[derive(Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// In-memory object store.
/// Useful for testing and development.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn list(&self, prefix: &str) -> BoxFuture<'static, StoreResult<Vec<ObjectMeta>>> {
        let objects = self.objects.clone();
        let prefix = prefix.to_string();

        Box::pin(async move {
            let store = objects.lock();

            let mut result: Vec<ObjectMeta> = store
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(key, object)| ObjectMeta {
                    key: key.clone(),
                    size: object.bytes.len() as u64,
                    last_modified: Some(object.last_modified),
                })
                .collect();

            // HashMap iteration order is arbitrary; keep listings stable.
            result.sort_by(|a, b| a.key.cmp(&b.key));

            Ok(result)
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'static, StoreResult<Vec<u8>>> {
        let objects = self.objects.clone();
        let key = key.to_string();

        Box::pin(async move {
            let store = objects.lock();

            store
                .get(&key)
                .map(|object| object.bytes.clone())
                .ok_or(StoreError::NotFound { key })
        })
    }

    fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let objects = self.objects.clone();
        let key = key.to_string();

        Box::pin(async move {
            let mut store = objects.lock();

            store.insert(
                key,
                StoredObject {
                    bytes,
                    last_modified: Utc::now(),
                },
            );

            Ok(())
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'static, StoreResult<()>> {
        let objects = self.objects.clone();
        let key = key.to_string();

        Box::pin(async move {
            let mut store = objects.lock();

            store.remove(&key);

            Ok(())
        })
    }
}
