//! Durable blob storage and time-limited read URLs.
//!
//! Paths are the canonical artifact paths from `domain::BlobPath`; since the
//! version is part of the path, writes never race and overwriting a path
//! with identical content (an idempotent re-run) is harmless.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by blob storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),
}

/// Result type for blob operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable byte storage addressed by canonical paths.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a blob; overwrites are allowed (paths embed the version).
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read a blob.
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// True if the path holds a blob.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Delete one blob; absent paths are a no-op.
    async fn delete(&self, path: &str) -> Result<()>;

    /// All blob paths under a prefix.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete everything under a prefix; returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let mut removed = 0;
        for path in self.list_prefix(prefix).await? {
            self.delete(&path).await?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// Filesystem-backed blob store rooted at one directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a canonical path under the root, rejecting traversal.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty()
            || path.starts_with('/')
            || path.split('/').any(|seg| seg == ".." || seg == "." || seg.is_empty())
        {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(path))
    }

    fn collect_files(dir: &Path, root: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::collect_files(&path, root, out)?;
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix)?;
        let root = self.root.clone();
        let mut out = Vec::new();
        Self::collect_files(&dir, &root, &mut out)?;
        out.retain(|p| p.starts_with(prefix));
        out.sort();
        Ok(out)
    }
}

/// Issues and verifies time-limited read URLs.
///
/// The signature is a keyed sha256 over `path` and expiry; credentials never
/// appear in the URL.
#[derive(Clone)]
pub struct UrlSigner {
    key: String,
    base_url: String,
    ttl_s: u64,
}

impl UrlSigner {
    pub fn new(key: impl Into<String>, base_url: impl Into<String>, ttl_s: u64) -> Self {
        Self {
            key: key.into(),
            base_url: base_url.into(),
            ttl_s,
        }
    }

    fn signature(&self, path: &str, expires_unix: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(b"\n");
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires_unix.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Issue a signed URL valid for the configured TTL from `now`.
    pub fn sign(&self, path: &str, now: DateTime<Utc>) -> String {
        let expires = (now + ChronoDuration::seconds(self.ttl_s as i64)).timestamp();
        let sig = self.signature(path, expires);
        format!(
            "{}/{}?expires={}&sig={}",
            self.base_url.trim_end_matches('/'),
            path,
            expires,
            sig
        )
    }

    /// Verify a signature and expiry for a path.
    pub fn verify(&self, path: &str, expires_unix: i64, sig: &str, now: DateTime<Utc>) -> bool {
        if now.timestamp() > expires_unix {
            return false;
        }
        // Hex compare; timing attacks are out of scope for blob reads.
        self.signature(path, expires_unix) == sig
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalBlobStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, store) = store();
        store
            .put("user-1/videos/job-1/main/cp-1/spec/spec_v1.json", b"{}")
            .await
            .unwrap();
        let bytes = store
            .get("user-1/videos/job-1/main/cp-1/spec/spec_v1.json")
            .await
            .unwrap();
        assert_eq!(bytes, b"{}");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.get("user-1/videos/missing.json").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (_dir, store) = store();
        for bad in ["../etc/passwd", "/abs/path", "a//b", "a/./b", ""] {
            assert!(matches!(
                store.put(bad, b"x").await,
                Err(StorageError::InvalidPath(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_overwrite_is_allowed() {
        let (_dir, store) = store();
        store.put("u/videos/j/b/cp/chunk/chunk_00_v1.mp4", b"one").await.unwrap();
        store.put("u/videos/j/b/cp/chunk/chunk_00_v1.mp4", b"two").await.unwrap();
        assert_eq!(
            store.get("u/videos/j/b/cp/chunk/chunk_00_v1.mp4").await.unwrap(),
            b"two"
        );
    }

    #[tokio::test]
    async fn test_list_and_delete_prefix() {
        let (_dir, store) = store();
        store.put("u/videos/j/main/cp/chunk/chunk_00_v1.mp4", b"a").await.unwrap();
        store.put("u/videos/j/main/cp/chunk/chunk_01_v1.mp4", b"b").await.unwrap();
        store.put("u/videos/other/main/cp/spec/spec_v1.json", b"c").await.unwrap();

        let listed = store.list_prefix("u/videos/j").await.unwrap();
        assert_eq!(listed.len(), 2);

        let removed = store.delete_prefix("u/videos/j").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.list_prefix("u/videos/j").await.unwrap().is_empty());
        assert!(store.exists("u/videos/other/main/cp/spec/spec_v1.json").await.unwrap());
    }

    #[test]
    fn test_signed_url_verifies_and_expires() {
        let signer = UrlSigner::new("secret", "https://cdn.example.com/blobs", 3_600);
        let now = Utc::now();
        let url = signer.sign("u/videos/j/main/cp/spec/spec_v1.json", now);
        assert!(url.starts_with("https://cdn.example.com/blobs/u/videos/"));
        assert!(!url.contains("secret"));

        let expires: i64 = url.split("expires=").nth(1).unwrap().split('&').next().unwrap()
            .parse()
            .unwrap();
        let sig = url.split("sig=").nth(1).unwrap();

        assert!(signer.verify("u/videos/j/main/cp/spec/spec_v1.json", expires, sig, now));
        // Wrong path fails.
        assert!(!signer.verify("u/videos/j/main/cp/spec/spec_v2.json", expires, sig, now));
        // Past expiry fails.
        let later = now + ChronoDuration::seconds(3_601);
        assert!(!signer.verify("u/videos/j/main/cp/spec/spec_v1.json", expires, sig, later));
    }
}
