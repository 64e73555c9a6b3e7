//! Local filesystem durable store.
//!
//! Each object is a data file at `<root>/<key>` plus a JSON sidecar at
//! `<root>/<key>.meta.json` carrying the content type and optional expiry.
//! Cache keys always end in `@<w>x<h>` or `@hd`, so a sidecar path can never
//! collide with a data path. Writes go to a temporary file first and are
//! renamed into place.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shutter_core::{Artifact, CacheKey, DurableStore, StoreError};
use tokio::fs;

const META_SUFFIX: &str = ".meta.json";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Durable store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Unavailable {
                reason: format!("cannot create {}: {}", root.display(), e),
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, key: &CacheKey) -> Result<PathBuf, StoreError> {
        let relative = key.as_str().trim_start_matches('/');
        let invalid = |reason: &str| StoreError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if relative.is_empty() {
            return Err(invalid("empty key"));
        }
        if relative.contains('\0') {
            return Err(invalid("key contains a NUL byte"));
        }
        let escapes = Path::new(relative)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(invalid("key must not contain relative or absolute components"));
        }

        Ok(self.root.join(relative))
    }

    fn meta_path(data_path: &Path) -> PathBuf {
        let mut meta = data_path.as_os_str().to_owned();
        meta.push(META_SUFFIX);
        PathBuf::from(meta)
    }

    async fn read_meta(&self, key: &CacheKey, data_path: &Path) -> Result<ObjectMeta, StoreError> {
        match fs::read(Self::meta_path(data_path)).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| StoreError::Io {
                key: key.to_string(),
                reason: format!("corrupt metadata: {}", e),
            }),
            Err(e) if is_absent(&e) => Ok(ObjectMeta {
                content_type: DEFAULT_CONTENT_TYPE.to_string(),
                expires_at: None,
            }),
            Err(e) => Err(io_error(key, e)),
        }
    }

    async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".tmp-{:016x}", rand::random::<u64>()));
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, contents).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn remove_if_present(path: &Path) -> std::io::Result<()> {
        match fs::remove_file(path).await {
            Err(e) if !is_absent(&e) => Err(e),
            _ => Ok(()),
        }
    }
}

/// Errors meaning "nothing stored here". A key can walk through another key's
/// data file (`a.jpg@200x0/b.jpg@100x0`) or land on a directory.
fn is_absent(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::NotFound | ErrorKind::NotADirectory | ErrorKind::IsADirectory
    )
}

fn io_error(key: &CacheKey, e: std::io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

fn is_expired(meta: &ObjectMeta) -> bool {
    meta.expires_at.is_some_and(|at| at <= Utc::now())
}

#[async_trait]
impl DurableStore for FsStore {
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        let path = self.data_path(key)?;
        match fs::metadata(&path).await {
            Ok(_) => {
                let meta = self.read_meta(key, &path).await?;
                Ok(!is_expired(&meta))
            }
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(io_error(key, e)),
        }
    }

    async fn get(&self, key: &CacheKey) -> Result<Artifact, StoreError> {
        let path = self.data_path(key)?;
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(e) if is_absent(&e) => {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(io_error(key, e)),
        };

        let meta = self.read_meta(key, &path).await?;
        if is_expired(&meta) {
            if let Err(e) = self.delete(key).await {
                tracing::debug!(key = %key, error = %e, "Failed to remove expired object");
            }
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }

        Ok(Artifact::new(body, meta.content_type))
    }

    async fn put(
        &self,
        key: &CacheKey,
        artifact: &Artifact,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let path = self.data_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, e))?;
        }

        let meta = ObjectMeta {
            content_type: artifact.content_type.clone(),
            expires_at,
        };
        let meta = serde_json::to_vec(&meta).map_err(|e| StoreError::Io {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        Self::write_atomic(&Self::meta_path(&path), &meta)
            .await
            .map_err(|e| io_error(key, e))?;
        Self::write_atomic(&path, &artifact.body)
            .await
            .map_err(|e| io_error(key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        let path = self.data_path(key)?;
        Self::remove_if_present(&path)
            .await
            .map_err(|e| io_error(key, e))?;
        Self::remove_if_present(&Self::meta_path(&path))
            .await
            .map_err(|e| io_error(key, e))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, FsStore) {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path().join("objects")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (_dir, store) = store().await;
        let key = CacheKey::new("/pic/cover/l/a.jpg@200x0");
        let artifact = Artifact::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg");

        assert!(!store.exists(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap_err().is_not_found());

        store.put(&key, &artifact, None).await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), artifact);

        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content_type() {
        let (_dir, store) = store().await;
        let key = CacheKey::new("/a.webp@100x0");

        store
            .put(&key, &Artifact::new("one", "image/jpeg"), None)
            .await
            .unwrap();
        store
            .put(&key, &Artifact::new("two", "image/webp"), None)
            .await
            .unwrap();

        let artifact = store.get(&key).await.unwrap();
        assert_eq!(artifact.body.as_ref(), b"two");
        assert_eq!(artifact.content_type, "image/webp");
    }

    #[tokio::test]
    async fn test_expired_object_is_removed() {
        let (_dir, store) = store().await;
        let key = CacheKey::new("/a.jpg@100x0");
        let past = Utc::now() - chrono::Duration::seconds(5);

        store
            .put(&key, &Artifact::new("old", "image/jpeg"), Some(past))
            .await
            .unwrap();
        assert!(!store.exists(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap_err().is_not_found());
        assert!(!store.data_path(&key).unwrap().exists());
    }

    #[tokio::test]
    async fn test_key_below_a_data_file_is_absent() {
        let (_dir, store) = store().await;
        let parent = CacheKey::new("/pic/a.jpg@200x0");
        store
            .put(&parent, &Artifact::new("data", "image/jpeg"), None)
            .await
            .unwrap();

        let nested = CacheKey::new("/pic/a.jpg@200x0/b.jpg@100x0");
        assert!(store.get(&nested).await.unwrap_err().is_not_found());
        assert!(!store.exists(&nested).await.unwrap());
        store.delete(&nested).await.unwrap();
        assert!(store.exists(&parent).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_dir, store) = store().await;
        let key = CacheKey::new("/../etc/passwd@1x1");
        let err = store.get(&key).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }
}
