use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

use super::error::{StoreError, StoreResult};
use super::object_store::{BoxFuture, ObjectMeta, ObjectStore};

/// Filesystem-backed object store.
/// Maps flat object keys onto files below a root directory, with `/` in the
/// key becoming directory separators.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` below the root, rejecting anything that would escape it.
    fn object_path(root: &Path, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));

        if key.is_empty() || escapes {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
            });
        }

        Ok(root.join(relative))
    }

    /// Collect every file below `dir` into `out`, keyed relative to `root`.
    fn collect_objects(root: &Path, dir: &Path, out: &mut Vec<ObjectMeta>) -> StoreResult<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                Self::collect_objects(root, &path, out)?;
                continue;
            }

            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let key = relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/");

            let metadata = entry.metadata()?;
            let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);

            out.push(ObjectMeta {
                key,
                size: metadata.len(),
                last_modified,
            });
        }

        Ok(())
    }
}

/// Run a filesystem closure on the blocking pool.
async fn run_blocking<T: Send + 'static>(
    work: impl FnOnce() -> StoreResult<T> + Send + 'static,
) -> StoreResult<T> {
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

impl ObjectStore for FsObjectStore {
    fn list(&self, prefix: &str) -> BoxFuture<'static, StoreResult<Vec<ObjectMeta>>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        Box::pin(async move {
            run_blocking(move || {
                std::fs::create_dir_all(&root)?;

                let mut objects = Vec::new();
                Self::collect_objects(&root, &root, &mut objects)?;

                objects.retain(|meta| meta.key.starts_with(&prefix));
                objects.sort_by(|a, b| a.key.cmp(&b.key));

                Ok(objects)
            })
            .await
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'static, StoreResult<Vec<u8>>> {
        let root = self.root.clone();
        let key = key.to_string();

        Box::pin(async move {
            run_blocking(move || {
                let path = Self::object_path(&root, &key)?;

                match std::fs::read(&path) {
                    Ok(bytes) => Ok(bytes),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(StoreError::NotFound { key })
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
        })
    }

    fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let root = self.root.clone();
        let key = key.to_string();

        Box::pin(async move {
            run_blocking(move || {
                let path = Self::object_path(&root, &key)?;

                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                // Write atomically (write to temp, then rename)
                let temp_path = PathBuf::from(format!("{}.tmp", path.display()));
                std::fs::write(&temp_path, &bytes)?;
                std::fs::rename(&temp_path, &path)?;

                Ok(())
            })
            .await
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'static, StoreResult<()>> {
        let root = self.root.clone();
        let key = key.to_string();

        Box::pin(async move {
            run_blocking(move || {
                let path = Self::object_path(&root, &key)?;

                if path.exists() {
                    std::fs::remove_file(&path)?;
                }

                Ok(())
            })
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store
            .put("notes/deep/a.md", b"Alpha".to_vec(), "text/markdown")
            .await
            .unwrap();

        let bytes = store.get("notes/deep/a.md").await.unwrap();
        assert_eq!(bytes, b"Alpha");
    }

    #[tokio::test]
    async fn test_list_builds_slash_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store
            .put("notes/a.md", b"A".to_vec(), "text/markdown")
            .await
            .unwrap();
        store
            .put("chats/1.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        let listed = store.list("notes/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "notes/a.md");
        assert!(listed[0].last_modified.is_some());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let err = store.get("missing.md").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_escaping_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let err = store
            .put("../outside.md", b"x".to_vec(), "text/markdown")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store
            .put("a.md", b"one".to_vec(), "text/markdown")
            .await
            .unwrap();
        store
            .put("a.md", b"two".to_vec(), "text/markdown")
            .await
            .unwrap();

        assert_eq!(store.get("a.md").await.unwrap(), b"two");
    }
}
