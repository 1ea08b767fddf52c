//! Error types for repository update operations.

use rpm_repository::{RecordIdentity, RpmRepositoryError};
use thiserror::Error;

/// Result type used throughout this crate.
pub type RepodataResult<T> = std::result::Result<T, RepodataError>;

/// Errors that can occur while updating repository metadata.
#[derive(Debug, Error)]
pub enum RepodataError {
    /// A storage operation failed for the given key.
    #[error("storage operation failed for '{key}': {source}")]
    Storage {
        /// The key the operation targeted.
        key: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A package file could not be parsed.
    #[error("invalid package '{key}': {source}")]
    Package {
        /// The key of the offending package.
        key: String,
        /// The underlying parse failure.
        #[source]
        source: RpmRepositoryError,
    },

    /// A metadata document or manifest operation failed.
    #[error("metadata error: {0}")]
    Metadata(#[from] RpmRepositoryError),

    /// An existing record and an incoming record name the same package
    /// version but different package bytes.
    #[error(
        "conflicting records for {name}-{epoch}:{version}-{release}.{arch}: \
         existing pkgid {existing}, incoming pkgid {incoming}"
    )]
    MergeConflict {
        /// Package name.
        name: String,
        /// Package epoch.
        epoch: String,
        /// Package version.
        version: String,
        /// Package release.
        release: String,
        /// Package architecture.
        arch: String,
        /// Digest of the already published package.
        existing: String,
        /// Digest of the package being added.
        incoming: String,
    },

    /// An operation was invoked in the wrong updater state.
    #[error("invalid updater state: expected {expected}, was {actual}")]
    InvalidState {
        /// The state the operation requires.
        expected: String,
        /// The state the updater was in.
        actual: String,
    },

    /// Another update is finalizing the same repository base.
    #[error("another update is finalizing '{0}'")]
    FinalizeInProgress(String),

    /// A background worker task failed to complete.
    #[error("worker task failed: {0}")]
    Task(String),
}

impl RepodataError {
    /// Create a storage error with key context.
    pub fn storage<S: Into<String>>(key: S, source: std::io::Error) -> Self {
        RepodataError::Storage {
            key: key.into(),
            source,
        }
    }

    /// Create a package parse error with key context.
    pub fn package<S: Into<String>>(key: S, source: RpmRepositoryError) -> Self {
        RepodataError::Package {
            key: key.into(),
            source,
        }
    }

    /// Create a merge conflict error from the two colliding identities.
    pub fn merge_conflict(existing: &RecordIdentity, incoming: &RecordIdentity) -> Self {
        RepodataError::MergeConflict {
            name: incoming.name.clone(),
            epoch: incoming.epoch.clone(),
            version: incoming.version.clone(),
            release: incoming.release.clone(),
            arch: incoming.arch.clone(),
            existing: existing.pkgid.clone(),
            incoming: incoming.pkgid.clone(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state<S: Into<String>, T: Into<String>>(expected: S, actual: T) -> Self {
        RepodataError::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_message() {
        let err = RepodataError::storage(
            "repo/packages/a.rpm",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("repo/packages/a.rpm"));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_merge_conflict_message_names_both_digests() {
        let existing = RecordIdentity {
            name: "nginx".to_string(),
            arch: "x86_64".to_string(),
            epoch: "1".to_string(),
            version: "1.16.1".to_string(),
            release: "1.el8".to_string(),
            pkgid: "aaaa".to_string(),
        };
        let mut incoming = existing.clone();
        incoming.pkgid = "bbbb".to_string();
        let err = RepodataError::merge_conflict(&existing, &incoming);
        let message = err.to_string();
        assert!(message.contains("nginx-1:1.16.1-1.el8.x86_64"));
        assert!(message.contains("aaaa"));
        assert!(message.contains("bbbb"));
    }

    #[test]
    fn test_metadata_error_converts() {
        let err: RepodataError = RpmRepositoryError::invalid_document("bad").into();
        assert!(matches!(err, RepodataError::Metadata(_)));
    }
}
