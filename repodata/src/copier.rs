//! Content-addressed selective copying of packages between storages.
//!
//! Used to stage a repository rebuild: copy every `.rpm` under a prefix
//! into a work area, except the ones whose digest is already accounted
//! for (typically the pkgids of an existing primary document).

use crate::error::{RepodataError, RepodataResult};
use crate::storage::Storage;
use futures::StreamExt;
use rpm_repository::Digest;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a [`ByDigestCopy::copy`] run.
#[derive(Debug, Default)]
pub struct CopyReport {
    /// Source keys copied to the destination.
    pub copied: Vec<String>,
    /// Keys skipped because their digest was excluded.
    pub skipped: Vec<String>,
    /// Keys that failed, with the error each produced.
    pub failed: Vec<(String, RepodataError)>,
}

impl CopyReport {
    /// Whether every candidate was either copied or skipped.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Copies `.rpm` files between storages, excluding known digests.
pub struct ByDigestCopy {
    from: Arc<dyn Storage>,
    prefix: String,
    exclude: HashSet<String>,
    algorithm: Digest,
    fail_fast: bool,
    max_concurrent: usize,
}

impl ByDigestCopy {
    /// Create a copier reading from `from` under `prefix`, excluding the
    /// given digest hex strings.
    pub fn new(from: Arc<dyn Storage>, prefix: &str, exclude: HashSet<String>) -> Self {
        Self {
            from,
            prefix: prefix.to_string(),
            exclude,
            algorithm: Digest::Sha256,
            fail_fast: true,
            max_concurrent: num_cpus::get(),
        }
    }

    /// Digest algorithm the exclusion set is expressed in.
    pub fn algorithm(mut self, algorithm: Digest) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Abort on the first failure instead of collecting failures.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Maximum packages copied concurrently.
    pub fn max_concurrent(mut self, limit: usize) -> Self {
        self.max_concurrent = limit;
        self
    }

    /// Copy the non-excluded packages into `dest`, flattened to their
    /// final path segment.
    pub async fn copy(&self, dest: Arc<dyn Storage>) -> RepodataResult<CopyReport> {
        let keys = self
            .from
            .list(&self.prefix)
            .await
            .map_err(|e| RepodataError::storage(&self.prefix, e))?;
        let candidates: Vec<String> = keys.into_iter().filter(|k| k.ends_with(".rpm")).collect();
        debug!(
            "Copying {} packages under '{}' ({} digests excluded)",
            candidates.len(),
            self.prefix,
            self.exclude.len()
        );

        let exclude = Arc::new(self.exclude.clone());
        let from = Arc::clone(&self.from);
        let algorithm = self.algorithm;
        let limit = self.max_concurrent.max(1);

        let mut results = futures::stream::iter(candidates.into_iter().map(move |key| {
            let from = Arc::clone(&from);
            let dest = Arc::clone(&dest);
            let exclude = Arc::clone(&exclude);
            async move {
                tokio::spawn(async move {
                    let result = copy_one(from, dest, exclude, algorithm, &key).await;
                    (key, result)
                })
                .await
            }
        }))
        .buffered(limit);

        let mut report = CopyReport::default();
        while let Some(joined) = results.next().await {
            let (key, result) = joined.map_err(|e| RepodataError::Task(e.to_string()))?;
            match result {
                Ok(true) => report.copied.push(key),
                Ok(false) => report.skipped.push(key),
                Err(err) if self.fail_fast => return Err(err),
                Err(err) => {
                    warn!("Failed to copy {}: {}", key, err);
                    report.failed.push((key, err));
                }
            }
        }
        info!(
            "Copied {} packages, skipped {} under '{}'",
            report.copied.len(),
            report.skipped.len(),
            self.prefix
        );
        Ok(report)
    }
}

/// The final path segment of a key.
fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

async fn copy_one(
    from: Arc<dyn Storage>,
    dest: Arc<dyn Storage>,
    exclude: Arc<HashSet<String>>,
    algorithm: Digest,
    key: &str,
) -> RepodataResult<bool> {
    let bytes = from
        .fetch(key)
        .await
        .map_err(|e| RepodataError::storage(key, e))?;
    let hex = algorithm.hex(&bytes);
    if exclude.contains(&hex) {
        debug!("Skipping {} ({} already known)", key, hex);
        return Ok(false);
    }
    let name = file_name(key);
    dest.save(name, bytes)
        .await
        .map_err(|e| RepodataError::storage(name, e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn populated() -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        let seed = [
            ("repo/packages/a.rpm", "alpha"),
            ("repo/packages/sub/b.rpm", "beta"),
            ("repo/packages/notes.txt", "not a package"),
        ];
        for (key, contents) in seed {
            storage
                .save(key, Bytes::from_static(contents.as_bytes()))
                .await
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_copies_only_rpm_keys_flattened() {
        let from = populated().await;
        let dest = Arc::new(MemoryStorage::new());
        let report = ByDigestCopy::new(from, "repo/packages/", HashSet::new())
            .copy(Arc::clone(&dest) as Arc<dyn Storage>)
            .await
            .unwrap();

        assert_eq!(report.copied.len(), 2);
        assert!(report.skipped.is_empty());
        assert!(report.is_complete());
        assert!(dest.exists("a.rpm").await.unwrap());
        assert!(dest.exists("b.rpm").await.unwrap());
        assert!(!dest.exists("notes.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_skips_excluded_digests() {
        let from = populated().await;
        let dest = Arc::new(MemoryStorage::new());
        let mut exclude = HashSet::new();
        exclude.insert(Digest::Sha256.hex(b"alpha"));

        let report = ByDigestCopy::new(from, "repo/packages/", exclude)
            .copy(Arc::clone(&dest) as Arc<dyn Storage>)
            .await
            .unwrap();

        assert_eq!(report.copied, vec!["repo/packages/sub/b.rpm".to_string()]);
        assert_eq!(report.skipped, vec!["repo/packages/a.rpm".to_string()]);
        assert!(!dest.exists("a.rpm").await.unwrap());
        assert!(dest.exists("b.rpm").await.unwrap());
    }

    #[tokio::test]
    async fn test_exclusion_respects_algorithm() {
        let from = populated().await;
        let dest = Arc::new(MemoryStorage::new());
        let mut exclude = HashSet::new();
        exclude.insert(Digest::Md5.hex(b"alpha"));

        let report = ByDigestCopy::new(from, "repo/packages/", exclude)
            .algorithm(Digest::Md5)
            .copy(Arc::clone(&dest) as Arc<dyn Storage>)
            .await
            .unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.copied.len(), 1);
    }

    struct FailingFetch {
        inner: MemoryStorage,
        bad: String,
    }

    #[async_trait]
    impl Storage for FailingFetch {
        async fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
            self.inner.list(prefix).await
        }

        async fn fetch(&self, key: &str) -> io::Result<Bytes> {
            if key == self.bad {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
            }
            self.inner.fetch(key).await
        }

        async fn save(&self, key: &str, data: Bytes) -> io::Result<()> {
            self.inner.save(key, data).await
        }

        async fn exists(&self, key: &str) -> io::Result<bool> {
            self.inner.exists(key).await
        }

        async fn delete(&self, key: &str) -> io::Result<()> {
            self.inner.delete(key).await
        }
    }

    async fn failing() -> Arc<FailingFetch> {
        let inner = MemoryStorage::new();
        inner
            .save("pkgs/good.rpm", Bytes::from_static(b"good"))
            .await
            .unwrap();
        inner
            .save("pkgs/bad.rpm", Bytes::from_static(b"bad"))
            .await
            .unwrap();
        Arc::new(FailingFetch {
            inner,
            bad: "pkgs/bad.rpm".to_string(),
        })
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_on_first_failure() {
        let from = failing().await;
        let dest = Arc::new(MemoryStorage::new());
        let err = ByDigestCopy::new(from, "pkgs/", HashSet::new())
            .max_concurrent(1)
            .copy(Arc::clone(&dest) as Arc<dyn Storage>)
            .await
            .unwrap_err();
        assert!(matches!(err, RepodataError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_best_effort_collects_failures() {
        let from = failing().await;
        let dest = Arc::new(MemoryStorage::new());
        let report = ByDigestCopy::new(from, "pkgs/", HashSet::new())
            .fail_fast(false)
            .copy(Arc::clone(&dest) as Arc<dyn Storage>)
            .await
            .unwrap();

        assert_eq!(report.copied, vec!["pkgs/good.rpm".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "pkgs/bad.rpm");
        assert!(!report.is_complete());
        assert!(dest.exists("good.rpm").await.unwrap());
    }

    struct CountingFetch {
        inner: MemoryStorage,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Storage for CountingFetch {
        async fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
            self.inner.list(prefix).await
        }

        async fn fetch(&self, key: &str) -> io::Result<Bytes> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let result = self.inner.fetch(key).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn save(&self, key: &str, data: Bytes) -> io::Result<()> {
            self.inner.save(key, data).await
        }

        async fn exists(&self, key: &str) -> io::Result<bool> {
            self.inner.exists(key).await
        }

        async fn delete(&self, key: &str) -> io::Result<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_copy_caps_concurrent_fetches() {
        let inner = MemoryStorage::new();
        for i in 0..8 {
            inner
                .save(&format!("pkgs/p{}.rpm", i), Bytes::from(format!("package {}", i)))
                .await
                .unwrap();
        }
        let from = Arc::new(CountingFetch {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let dest = Arc::new(MemoryStorage::new());

        let report =
            ByDigestCopy::new(Arc::clone(&from) as Arc<dyn Storage>, "pkgs/", HashSet::new())
                .max_concurrent(2)
                .copy(Arc::clone(&dest) as Arc<dyn Storage>)
                .await
                .unwrap();

        assert_eq!(report.copied.len(), 8);
        assert!(from.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("repo/packages/a.rpm"), "a.rpm");
        assert_eq!(file_name("a.rpm"), "a.rpm");
    }
}
