//! # RPM Repository Library
//!
//! A Rust library for creating and parsing RPM repository metadata. This
//! library reads the metadata a package manager needs out of `.rpm` files
//! and renders the standard repodata documents (`primary.xml`,
//! `filelists.xml`, `other.xml`) together with the `repomd.xml` manifest
//! that references them.
//!
//! ## Features
//!
//! - Parse RPM package files (lead, signature and main header sections)
//! - Generate primary, filelists and other metadata documents
//! - Generate and parse the `repomd.xml` manifest
//! - Support for multiple compression formats (gzip, bzip2, uncompressed)
//! - Cryptographic hashing (MD5, SHA1, SHA256)
//! - Digest-prefixed document naming for atomic metadata switches
//!
//! ## Example
//!
//! ```rust
//! use rpm_repository::{Compression, DocumentKind, DocumentWriter, PackageReader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reader = PackageReader::default();
//! // let metadata = reader.read(&std::fs::read("nginx.rpm")?)?;
//!
//! let mut primary = DocumentWriter::new(DocumentKind::Primary);
//! // primary.append(&metadata, "packages/nginx.rpm");
//! let sealed = primary.seal(Compression::Gzip)?;
//! assert!(sealed.size() > 0);
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod digest;
pub mod document;
pub mod error;
pub mod filelists;
pub mod header;
pub mod naming;
pub mod other;
pub mod package;
pub mod primary;
pub mod repomd;
pub mod xml;

/// Test utilities for building synthetic package files.
pub mod test_utils;

pub use compression::Compression;
pub use digest::{Digest, Hasher};
pub use document::{
    DocumentKind, DocumentWriter, ExistingDocument, ExistingRecord, RecordIdentity,
    SealedDocument,
};
pub use error::{Result, RpmRepositoryError};
pub use filelists::FilelistsRecord;
pub use header::{Header, Lead, Value};
pub use naming::NamingPolicy;
pub use other::OtherRecord;
pub use package::{
    ChangelogEntry, Evr, FileEntry, FileKind, PackageMetadata, PackageReader, Relation,
};
pub use primary::PrimaryRecord;
pub use repomd::{RepoMd, RepoMdEntry, REPOMD_NAME};

/// Directory the metadata documents live in, below the repository base.
pub const REPODATA_DIR: &str = "repodata";

/// Compression formats a repository may publish documents with.
pub const SUPPORTED_COMPRESSIONS: &[Compression] =
    &[Compression::None, Compression::Gzip, Compression::Bzip2];

/// Digest algorithms supported for checksums and document naming.
pub const SUPPORTED_DIGESTS: &[Digest] = &[Digest::Md5, Digest::Sha1, Digest::Sha256];
