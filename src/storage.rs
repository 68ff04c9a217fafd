//! Object storage collaborator.
//!
//! The core treats locators as opaque string keys; the filesystem store
//! below is the default backend, with the trait as the seam for S3-style
//! backends.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Blob storage for raw image bytes.
pub trait ObjectStore: Send + Sync {
    /// Store bytes under a name, returning an opaque locator.
    fn put(&self, bytes: &[u8], name: &str) -> Result<String>;

    /// Fetch the bytes a locator points at.
    fn get(&self, locator: &str) -> Result<Vec<u8>>;
}

/// Local-directory store with `fs://` locators.
pub struct FsStore {
    root: PathBuf,
    counter: AtomicU64,
}

const FS_SCHEME: &str = "fs://";

impl FsStore {
    pub fn open(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating object store root {:?}", root))?;
        Ok(Self {
            root,
            counter: AtomicU64::new(1),
        })
    }
}

impl ObjectStore for FsStore {
    fn put(&self, bytes: &[u8], name: &str) -> Result<String> {
        // Same original filename may arrive many times; the sequence
        // prefix keeps every upload a distinct object.
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let stamp = chrono::Utc::now().timestamp_micros();
        let key = format!("{stamp}-{seq}-{}", sanitize_name(name));

        let path = self.root.join(&key);
        std::fs::write(&path, bytes).with_context(|| format!("writing object {:?}", path))?;

        Ok(format!("{FS_SCHEME}{key}"))
    }

    fn get(&self, locator: &str) -> Result<Vec<u8>> {
        let key = locator
            .strip_prefix(FS_SCHEME)
            .ok_or_else(|| anyhow!("unsupported locator: {locator}"))?;

        // Locators are opaque keys, never paths supplied by callers
        if key.contains("..") || key.contains('/') {
            return Err(anyhow!("malformed locator key: {key}"));
        }

        let path = self.root.join(key);
        std::fs::read(&path).with_context(|| format!("reading object {:?}", path))
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path().to_path_buf()).unwrap();

        let locator = store.put(b"hello", "kitchen.jpg").unwrap();
        assert!(locator.starts_with("fs://"));
        assert_eq!(store.get(&locator).unwrap(), b"hello");
    }

    #[test]
    fn same_name_yields_distinct_locators() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path().to_path_buf()).unwrap();

        let a = store.put(b"one", "photo.jpg").unwrap();
        let b = store.put(b"two", "photo.jpg").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.get(&a).unwrap(), b"one");
        assert_eq!(store.get(&b).unwrap(), b"two");
    }

    #[test]
    fn rejects_foreign_locators() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path().to_path_buf()).unwrap();

        assert!(store.get("s3://bucket/key").is_err());
        assert!(store.get("fs://../escape").is_err());
    }
}
