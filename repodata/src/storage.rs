//! Storage abstraction the updater reads packages from and publishes
//! metadata to.
//!
//! Keys are slash-separated paths relative to the storage root, whatever
//! the backing medium. [`MemoryStorage`] backs tests and small tools;
//! [`LocalStorage`] maps keys onto a directory tree.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Asynchronous blob storage.
#[async_trait]
pub trait Storage: Send + Sync {
    /// List the keys starting with the given prefix, sorted.
    async fn list(&self, prefix: &str) -> io::Result<Vec<String>>;

    /// Fetch the contents stored under a key.
    async fn fetch(&self, key: &str) -> io::Result<Bytes>;

    /// Store contents under a key, replacing any previous contents.
    async fn save(&self, key: &str, data: Bytes) -> io::Result<()>;

    /// Whether a key currently holds contents.
    async fn exists(&self, key: &str) -> io::Result<bool>;

    /// Remove the contents stored under a key.
    async fn delete(&self, key: &str) -> io::Result<()>;
}

/// Join a base key and a name with a single slash.
pub fn join_key(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

fn not_found(key: &str) -> io::Error {
    io::Error::new(ErrorKind::NotFound, format!("no such key: {}", key))
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    contents: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.contents.read().await.len()
    }

    /// Whether no keys are stored.
    pub async fn is_empty(&self) -> bool {
        self.contents.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        Ok(self
            .contents
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn fetch(&self, key: &str) -> io::Result<Bytes> {
        self.contents
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| not_found(key))
    }

    async fn save(&self, key: &str, data: Bytes) -> io::Result<()> {
        self.contents.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> io::Result<bool> {
        Ok(self.contents.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        self.contents
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| not_found(key))
    }
}

/// Storage backed by a local directory tree.
#[derive(Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Open storage rooted at the given directory, creating it if needed.
    pub fn new(path: &Path) -> io::Result<Self> {
        if !path.is_dir() {
            std::fs::create_dir_all(path)?;
        }
        Ok(Self {
            root: std::fs::canonicalize(path)?,
        })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(key.split('/').collect::<PathBuf>())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn fetch(&self, key: &str) -> io::Result<Bytes> {
        Ok(Bytes::from(tokio::fs::read(self.key_path(key)).await?))
    }

    async fn save(&self, key: &str, data: Bytes) -> io::Result<()> {
        let path = self.key_path(key);
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidInput, format!("invalid key: {}", key))
        })?;
        tokio::fs::create_dir_all(parent).await?;

        // Write to a temporary file in the target directory, then rename
        // into place so readers never observe a half-written file.
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(&data)?;
        temp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> io::Result<bool> {
        match tokio::fs::metadata(self.key_path(key)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        tokio::fs::remove_file(self.key_path(key)).await
    }
}
