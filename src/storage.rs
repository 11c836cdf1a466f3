use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;
use tracing::debug;

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Writes `body` under `key` and returns the path it was stored at.
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<PathBuf>;
    async fn get_object(&self, key: &str) -> anyhow::Result<Bytes>;
    /// Removing a key that does not exist is not an error.
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    async fn exists(&self, key: &str) -> bool;
    fn object_path(&self, key: &str) -> PathBuf;
}

/// Flat directory of uploaded images.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Opens (creating if needed) the upload directory. Runs once at startup.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        // keys are generated file names, never nested paths
        anyhow::ensure!(
            !key.is_empty() && !key.contains(['/', '\\']) && key != "." && key != "..",
            "invalid storage key {key:?}"
        );
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<PathBuf> {
        let path = self.resolve(key)?;
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), size = body.len(), "stored object");
        Ok(path)
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<Bytes> {
        let path = self.resolve(key)?;
        let data = tokio::fs::read(&path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        Ok(Bytes::from(data))
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        remove_file_if_exists(&path).await
    }

    async fn exists(&self, key: &str) -> bool {
        match self.resolve(key) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

/// Deletes a file by path; a missing file counts as deleted.
pub async fn remove_file_if_exists(path: &Path) -> anyhow::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "deleted object");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("delete {}", path.display())),
    }
}

#[cfg(test)]
mod storage_tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();

        let path = storage
            .put_object("abc.jpg", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("abc.jpg"));
        assert!(storage.exists("abc.jpg").await);
        assert_eq!(&storage.get_object("abc.jpg").await.unwrap()[..], b"hello");

        storage.delete_object("abc.jpg").await.unwrap();
        assert!(!storage.exists("abc.jpg").await);
    }

    #[tokio::test]
    async fn deleting_missing_object_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        storage.delete_object("nope.png").await.unwrap();
        remove_file_if_exists(Path::new("/nonexistent/path/file.jpg"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        assert!(storage
            .put_object("../escape.jpg", Bytes::from_static(b"x"))
            .await
            .is_err());
        assert!(!storage.exists("..").await);
    }

    #[tokio::test]
    async fn creates_root_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("uploads");
        let storage = LocalStorage::new(&nested).unwrap();
        assert!(storage.root().is_dir());
    }
}
