//! The repository update protocol.
//!
//! A [`RepoUpdater`] accumulates packages and publishes them in one
//! finalize step: every metadata document is saved before the manifest
//! that references it, so readers either see the previous revision or
//! the new one, never a mix. Updates against an existing repository
//! merge with the published documents instead of rebuilding them from
//! every package file.

use crate::config::UpdateConfig;
use crate::error::{RepodataError, RepodataResult};
use crate::storage::{join_key, Storage};
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use once_cell::sync::Lazy;
use rpm_repository::{
    Compression, Digest, DocumentKind, DocumentWriter, ExistingDocument, PackageMetadata,
    PackageReader, RecordIdentity, RepoMd, RepoMdEntry, RpmRepositoryError, REPODATA_DIR,
    REPOMD_NAME,
};
use std::collections::HashSet;
use std::fmt;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Lifecycle of an update session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdaterState {
    /// No packages accumulated yet.
    Idle,
    /// At least one package accumulated.
    Accumulating,
    /// `complete` is running.
    Finalizing,
    /// The manifest was saved; the session is over.
    Published,
    /// Finalizing failed; the session is over.
    Aborted,
}

impl UpdaterState {
    /// The state name, for error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdaterState::Idle => "idle",
            UpdaterState::Accumulating => "accumulating",
            UpdaterState::Finalizing => "finalizing",
            UpdaterState::Published => "published",
            UpdaterState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for UpdaterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a best-effort batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Packages parsed and accumulated.
    pub processed: usize,
    /// Keys that failed, with the error each produced.
    pub failures: Vec<(String, RepodataError)>,
}

impl BatchReport {
    /// Whether every package in the batch was accumulated.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// Bases currently being finalized, across all updaters in the process.
static FINALIZING_BASES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

struct FinalizeGuard {
    base: String,
}

impl FinalizeGuard {
    fn acquire(base: &str) -> RepodataResult<Self> {
        let mut bases = FINALIZING_BASES.lock().unwrap_or_else(|e| e.into_inner());
        if !bases.insert(base.to_string()) {
            return Err(RepodataError::FinalizeInProgress(base.to_string()));
        }
        Ok(Self {
            base: base.to_string(),
        })
    }
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        FINALIZING_BASES
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.base);
    }
}

#[derive(Debug)]
struct PendingPackage {
    key: String,
    metadata: PackageMetadata,
}

impl PendingPackage {
    /// The location href the package is published under, relative to the
    /// repository base.
    fn href(&self, base: &str) -> String {
        if base.is_empty() {
            return self.key.clone();
        }
        match self.key.strip_prefix(&format!("{}/", base)) {
            Some(relative) => relative.to_string(),
            None => self.key.clone(),
        }
    }
}

/// Accumulates package metadata and publishes repository documents.
///
/// Dropping an updater before [`complete`](RepoUpdater::complete) discards
/// everything it accumulated and leaves storage untouched.
pub struct RepoUpdater {
    storage: Arc<dyn Storage>,
    config: UpdateConfig,
    state: UpdaterState,
    pending: Vec<PendingPackage>,
}

impl RepoUpdater {
    /// Create an updater with the default configuration.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, UpdateConfig::default())
    }

    /// Create an updater with an explicit configuration.
    pub fn with_config(storage: Arc<dyn Storage>, config: UpdateConfig) -> Self {
        Self {
            storage,
            config,
            state: UpdaterState::Idle,
            pending: Vec::new(),
        }
    }

    /// The current session state.
    pub fn state(&self) -> UpdaterState {
        self.state
    }

    /// Number of packages accumulated so far.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The configuration this updater runs with.
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    fn ensure_accumulating(&self) -> RepodataResult<()> {
        match self.state {
            UpdaterState::Idle | UpdaterState::Accumulating => Ok(()),
            state => Err(RepodataError::invalid_state(
                "idle or accumulating",
                state.as_str(),
            )),
        }
    }

    fn push_package(&mut self, key: String, metadata: PackageMetadata) {
        debug!("Accumulated {} from {}", metadata.nevra(), key);
        self.pending.push(PendingPackage { key, metadata });
        self.state = UpdaterState::Accumulating;
    }

    /// Parse one package and accumulate its record. `key` is the storage
    /// key the package is (or will be) published under; it also determines
    /// the record's location href.
    ///
    /// A parse failure reports the offending key and accumulates nothing.
    pub fn process_next(&mut self, key: &str, bytes: &[u8]) -> RepodataResult<()> {
        self.ensure_accumulating()?;
        let metadata = PackageReader::new(self.config.digest)
            .read(bytes)
            .map_err(|e| RepodataError::package(key, e))?;
        self.push_package(key.to_string(), metadata);
        Ok(())
    }

    /// Fetch and parse a batch of packages concurrently, accumulating the
    /// results in submission order.
    ///
    /// At most `max_concurrent` packages are in flight at once. With
    /// `fail_fast` set (the default) the first failure is returned and the
    /// packages accumulated before it stay accumulated; otherwise failing
    /// packages are skipped and reported in the returned [`BatchReport`].
    pub async fn process_batch(&mut self, keys: &[String]) -> RepodataResult<BatchReport> {
        self.ensure_accumulating()?;
        let storage = Arc::clone(&self.storage);
        let digest = self.config.digest;
        let limit = self.config.max_concurrent.max(1);

        let mut results = futures::stream::iter(keys.to_vec().into_iter().map(move |key| {
            let storage = Arc::clone(&storage);
            async move {
                tokio::spawn(async move {
                    let result = read_package(storage, digest, &key).await;
                    (key, result)
                })
                .await
            }
        }))
        .buffered(limit);

        let mut report = BatchReport::default();
        while let Some(joined) = results.next().await {
            let (key, result) = joined.map_err(|e| RepodataError::Task(e.to_string()))?;
            match result {
                Ok(metadata) => {
                    self.push_package(key, metadata);
                    report.processed += 1;
                }
                Err(err) if self.config.fail_fast => return Err(err),
                Err(err) => {
                    warn!("Skipping {}: {}", key, err);
                    report.failures.push((key, err));
                }
            }
        }
        Ok(report)
    }

    /// Publish the accumulated packages under the given repository base.
    ///
    /// If `base` already hosts a manifest, records for packages this
    /// session did not touch are carried over from the published documents.
    /// Every document is saved before the manifest; a failure anywhere
    /// before the manifest save leaves the previous revision intact and
    /// aborts the session. Documents the superseded manifest referenced
    /// and the new one does not are deleted best-effort afterwards.
    pub async fn complete(&mut self, base: &str) -> RepodataResult<RepoMd> {
        self.ensure_accumulating()?;
        let _guard = FinalizeGuard::acquire(base)?;
        self.state = UpdaterState::Finalizing;
        match self.finalize(base).await {
            Ok(manifest) => {
                self.state = UpdaterState::Published;
                Ok(manifest)
            }
            Err(err) => {
                self.state = UpdaterState::Aborted;
                Err(err)
            }
        }
    }

    async fn finalize(&mut self, base: &str) -> RepodataResult<RepoMd> {
        let compression = self.config.compression();
        let digest = self.config.digest;
        let manifest_key = join_key(&join_key(base, REPODATA_DIR), REPOMD_NAME);

        let previous = self.load_manifest(&manifest_key).await?;
        let incoming: Vec<RecordIdentity> = self
            .pending
            .iter()
            .map(|p| RecordIdentity::of(&p.metadata))
            .collect();

        // Build and seal every active document before saving anything
        let mut documents = Vec::new();
        let mut package_count = 0;
        for kind in self.config.documents.iter() {
            let mut writer = DocumentWriter::new(kind);
            if let Some(previous) = &previous {
                self.merge_existing(base, previous, kind, &incoming, &mut writer)
                    .await?;
            }
            for package in &self.pending {
                writer.append(&package.metadata, &package.href(base));
            }
            if kind == DocumentKind::Primary {
                package_count = writer.count();
            }
            let sealed = writer.seal(compression)?;
            let name = self
                .config
                .naming
                .filename(&sealed.plain_name(), &sealed.bytes);
            documents.push((format!("{}/{}", REPODATA_DIR, name), sealed));
        }

        for (location, sealed) in &documents {
            let key = join_key(base, location);
            self.storage
                .save(&key, Bytes::from(sealed.bytes.clone()))
                .await
                .map_err(|e| RepodataError::storage(&key, e))?;
            debug!("Saved {} ({} bytes)", key, sealed.size());
        }

        // Only after every document is durable does the manifest change
        let revision = Utc::now().timestamp();
        let mut manifest = RepoMd::new(revision);
        for (location, sealed) in &documents {
            manifest.add_entry(RepoMdEntry {
                kind: sealed.kind,
                checksum_type: digest,
                checksum: digest.hex(&sealed.bytes),
                open_checksum: digest.hex(&sealed.open_bytes),
                location: location.clone(),
                timestamp: revision,
                size: sealed.size(),
                open_size: sealed.open_size(),
            });
        }
        self.storage
            .save(&manifest_key, Bytes::from(manifest.to_xml().into_bytes()))
            .await
            .map_err(|e| RepodataError::storage(&manifest_key, e))?;
        info!(
            "Published {} packages in {} documents under '{}' (revision {})",
            package_count,
            documents.len(),
            base,
            revision
        );

        if let Some(previous) = &previous {
            self.remove_superseded(base, previous, &manifest).await;
        }
        Ok(manifest)
    }

    async fn load_manifest(&self, manifest_key: &str) -> RepodataResult<Option<RepoMd>> {
        match self.storage.fetch(manifest_key).await {
            Ok(bytes) => {
                let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
                    RpmRepositoryError::invalid_document("repomd.xml is not valid UTF-8")
                })?;
                Ok(Some(RepoMd::from_str(&text)?))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RepodataError::storage(manifest_key, e)),
        }
    }

    /// Carry over records from the published document of `kind` for
    /// packages this session did not touch.
    async fn merge_existing(
        &self,
        base: &str,
        previous: &RepoMd,
        kind: DocumentKind,
        incoming: &[RecordIdentity],
        writer: &mut DocumentWriter,
    ) -> RepodataResult<()> {
        let entry = match previous.entry(kind) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        let key = join_key(base, &entry.location);
        let stored = self
            .storage
            .fetch(&key)
            .await
            .map_err(|e| RepodataError::storage(&key, e))?;
        let open = Compression::from_path(&entry.location).decompress(&stored)?;
        let text = String::from_utf8(open).map_err(|_| {
            RpmRepositoryError::invalid_document(format!("{} document is not valid UTF-8", kind))
        })?;

        for record in ExistingDocument::parse(kind, &text)?.into_records() {
            match incoming.iter().find(|id| id.same_package(&record.identity)) {
                Some(new) if new.pkgid == record.identity.pkgid => {
                    debug!("Replacing unchanged record for {}", record.identity.nevra());
                }
                Some(new) => return Err(RepodataError::merge_conflict(&record.identity, new)),
                None => writer.append_fragment(record.fragment),
            }
        }
        Ok(())
    }

    /// Delete documents the superseded manifest referenced and the new one
    /// does not. Failures are logged and never fail the publish.
    async fn remove_superseded(&self, base: &str, previous: &RepoMd, current: &RepoMd) {
        let kept: HashSet<&str> = current.locations().collect();
        for location in previous.locations() {
            if kept.contains(location) {
                continue;
            }
            let key = join_key(base, location);
            match self.storage.delete(&key).await {
                Ok(()) => debug!("Removed superseded document {}", key),
                Err(err) => warn!("Failed to remove superseded document {}: {}", key, err),
            }
        }
    }
}

async fn read_package(
    storage: Arc<dyn Storage>,
    digest: Digest,
    key: &str,
) -> RepodataResult<PackageMetadata> {
    let bytes = storage
        .fetch(key)
        .await
        .map_err(|e| RepodataError::storage(key, e))?;
    PackageReader::new(digest)
        .read(&bytes)
        .map_err(|e| RepodataError::package(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use rpm_repository::test_utils::FixtureRpm;

    fn memory() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new())
    }

    #[test]
    fn test_process_next_accumulates() {
        let mut updater = RepoUpdater::new(memory());
        assert_eq!(updater.state(), UpdaterState::Idle);
        updater
            .process_next("packages/nginx.rpm", &FixtureRpm::nginx().build())
            .unwrap();
        assert_eq!(updater.state(), UpdaterState::Accumulating);
        assert_eq!(updater.pending_count(), 1);
    }

    #[test]
    fn test_process_next_reports_offending_key() {
        let mut updater = RepoUpdater::new(memory());
        let err = updater.process_next("packages/zero.rpm", b"garbage").unwrap_err();
        match err {
            RepodataError::Package { key, .. } => assert_eq!(key, "packages/zero.rpm"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(updater.pending_count(), 0);
        assert_eq!(updater.state(), UpdaterState::Idle);
    }

    #[tokio::test]
    async fn test_no_accumulation_after_publish() {
        let mut updater = RepoUpdater::new(memory());
        updater.complete("state-test").await.unwrap();
        assert_eq!(updater.state(), UpdaterState::Published);

        let err = updater
            .process_next("packages/nginx.rpm", &FixtureRpm::nginx().build())
            .unwrap_err();
        assert!(matches!(err, RepodataError::InvalidState { .. }));
        let err = updater.complete("state-test").await.unwrap_err();
        assert!(matches!(err, RepodataError::InvalidState { .. }));
    }

    #[test]
    fn test_finalize_guard_is_per_base() {
        let first = FinalizeGuard::acquire("guard-base-a").unwrap();
        assert!(matches!(
            FinalizeGuard::acquire("guard-base-a"),
            Err(RepodataError::FinalizeInProgress(_))
        ));
        let other = FinalizeGuard::acquire("guard-base-b").unwrap();
        drop(first);
        let again = FinalizeGuard::acquire("guard-base-a").unwrap();
        drop(again);
        drop(other);
    }

    #[test]
    fn test_href_strips_base_prefix() {
        let package = PendingPackage {
            key: "repo/packages/nginx.rpm".to_string(),
            metadata: rpm_repository::test_utils::sample_metadata(),
        };
        assert_eq!(package.href("repo"), "packages/nginx.rpm");
        assert_eq!(package.href(""), "repo/packages/nginx.rpm");
        assert_eq!(package.href("elsewhere"), "repo/packages/nginx.rpm");
    }
}
