//! Configuration for repository updates.

use rpm_repository::{Compression, Digest, DocumentKind, NamingPolicy};
use serde::{Deserialize, Serialize};

/// Which metadata documents an update publishes.
///
/// The primary document is always published; filelists and other can be
/// switched off for repositories whose clients never ask for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSet {
    filelists: bool,
    other: bool,
}

impl DocumentSet {
    /// Publish primary, filelists and other.
    pub fn all() -> Self {
        Self {
            filelists: true,
            other: true,
        }
    }

    /// Publish only the primary document.
    pub fn primary_only() -> Self {
        Self {
            filelists: false,
            other: false,
        }
    }

    /// Enable or disable the filelists document.
    pub fn with_filelists(mut self, enabled: bool) -> Self {
        self.filelists = enabled;
        self
    }

    /// Enable or disable the other document.
    pub fn with_other(mut self, enabled: bool) -> Self {
        self.other = enabled;
        self
    }

    /// Whether the given document kind is published.
    pub fn contains(&self, kind: DocumentKind) -> bool {
        match kind {
            DocumentKind::Primary => true,
            DocumentKind::Filelists => self.filelists,
            DocumentKind::Other => self.other,
        }
    }

    /// The published document kinds, in manifest order.
    pub fn iter(self) -> impl Iterator<Item = DocumentKind> {
        DocumentKind::all()
            .iter()
            .copied()
            .filter(move |kind| self.contains(*kind))
    }
}

impl Default for DocumentSet {
    fn default() -> Self {
        Self::all()
    }
}

/// Compression format configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CompressionConfig {
    /// No compression.
    None,
    /// Gzip compression.
    Gzip,
    /// Bzip2 compression.
    Bzip2,
}

impl From<CompressionConfig> for Compression {
    fn from(config: CompressionConfig) -> Self {
        match config {
            CompressionConfig::None => Compression::None,
            CompressionConfig::Gzip => Compression::Gzip,
            CompressionConfig::Bzip2 => Compression::Bzip2,
        }
    }
}

/// Repository update configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Documents to publish.
    pub documents: DocumentSet,
    /// Compression applied to published documents.
    pub compression: CompressionConfig,
    /// Digest algorithm for package ids, checksums and document naming.
    pub digest: Digest,
    /// Naming policy for published documents.
    pub naming: NamingPolicy,
    /// Fail a batch on the first bad package instead of skipping it.
    pub fail_fast: bool,
    /// Maximum packages read and parsed concurrently.
    pub max_concurrent: usize,
}

impl UpdateConfig {
    /// The compression as the format library's type.
    pub fn compression(&self) -> Compression {
        self.compression.clone().into()
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            documents: DocumentSet::all(),
            compression: CompressionConfig::Gzip,
            digest: Digest::Sha256,
            naming: NamingPolicy::default(),
            fail_fast: true,
            max_concurrent: num_cpus::get(),
        }
    }
}
