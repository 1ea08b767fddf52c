//! Metadata document assembly, sealing and re-parsing.
//!
//! A [`DocumentWriter`] accumulates rendered package records for one
//! document kind; sealing wraps them in the document envelope and applies
//! compression. [`ExistingDocument`] goes the other way: it splits a
//! previously published document back into per-package fragments so an
//! incremental update can retain records for packages it did not touch.

use crate::compression::Compression;
use crate::filelists::FilelistsRecord;
use crate::other::OtherRecord;
use crate::package::PackageMetadata;
use crate::primary::PrimaryRecord;
use crate::xml::{attr_value, element_text, tag_body};
use crate::{Result, RpmRepositoryError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three metadata document kinds of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// Per-package summary, sizes and dependency relations.
    Primary,
    /// Per-package file lists.
    Filelists,
    /// Per-package changelogs.
    Other,
}

impl DocumentKind {
    /// The kind name used in manifest `type` attributes.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Primary => "primary",
            DocumentKind::Filelists => "filelists",
            DocumentKind::Other => "other",
        }
    }

    /// The uncompressed file name of this document kind.
    pub fn plain_name(&self) -> &'static str {
        match self {
            DocumentKind::Primary => "primary.xml",
            DocumentKind::Filelists => "filelists.xml",
            DocumentKind::Other => "other.xml",
        }
    }

    /// All document kinds, in manifest order.
    pub fn all() -> &'static [DocumentKind] {
        &[
            DocumentKind::Primary,
            DocumentKind::Filelists,
            DocumentKind::Other,
        ]
    }

    fn root(&self) -> &'static str {
        match self {
            DocumentKind::Primary => "metadata",
            DocumentKind::Filelists => "filelists",
            DocumentKind::Other => "otherdata",
        }
    }

    fn open_tag(&self, count: usize) -> String {
        match self {
            DocumentKind::Primary => format!(
                "<metadata xmlns=\"http://linux.duke.edu/metadata/common\" \
                 xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"{}\">",
                count
            ),
            DocumentKind::Filelists => format!(
                "<filelists xmlns=\"http://linux.duke.edu/metadata/filelists\" packages=\"{}\">",
                count
            ),
            DocumentKind::Other => format!(
                "<otherdata xmlns=\"http://linux.duke.edu/metadata/other\" packages=\"{}\">",
                count
            ),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of one package record, as carried by every document kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordIdentity {
    /// Package name.
    pub name: String,
    /// Target architecture.
    pub arch: String,
    /// Package epoch, as rendered.
    pub epoch: String,
    /// Package version.
    pub version: String,
    /// Package release.
    pub release: String,
    /// Content digest of the package file.
    pub pkgid: String,
}

impl RecordIdentity {
    /// The identity of a freshly read package.
    pub fn of(metadata: &PackageMetadata) -> Self {
        Self {
            name: metadata.name.clone(),
            arch: metadata.arch.clone(),
            epoch: metadata.epoch.to_string(),
            version: metadata.version.clone(),
            release: metadata.release.clone(),
            pkgid: metadata.digest_hex.clone(),
        }
    }

    /// Whether two records name the same package version, regardless of
    /// the digest of the backing file.
    pub fn same_package(&self, other: &RecordIdentity) -> bool {
        self.name == other.name
            && self.arch == other.arch
            && self.epoch == other.epoch
            && self.version == other.version
            && self.release == other.release
    }

    /// The identity as `name-epoch:version-release.arch`.
    pub fn nevra(&self) -> String {
        format!(
            "{}-{}:{}-{}.{}",
            self.name, self.epoch, self.version, self.release, self.arch
        )
    }
}

/// Accumulates package records for one document kind.
///
/// Records are rendered at append time and only the rendered fragments are
/// held; the declared package count of the sealed document is the number
/// of fragments, so the two cannot disagree.
#[derive(Debug)]
pub struct DocumentWriter {
    kind: DocumentKind,
    fragments: Vec<String>,
}

impl DocumentWriter {
    /// Create an empty writer for the given document kind.
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            fragments: Vec::new(),
        }
    }

    /// The document kind this writer produces.
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Render and append the record for one package. `location` is the
    /// storage key the package is published under.
    pub fn append(&mut self, metadata: &PackageMetadata, location: &str) {
        let fragment = match self.kind {
            DocumentKind::Primary => PrimaryRecord::new(metadata, location).to_xml(),
            DocumentKind::Filelists => FilelistsRecord::new(metadata).to_xml(),
            DocumentKind::Other => OtherRecord::new(metadata).to_xml(),
        };
        self.fragments.push(fragment);
    }

    /// Append an already rendered record fragment, as produced by
    /// [`ExistingDocument`].
    pub fn append_fragment(&mut self, mut fragment: String) {
        if !fragment.ends_with('\n') {
            fragment.push('\n');
        }
        self.fragments.push(fragment);
    }

    /// Number of records appended so far.
    pub fn count(&self) -> usize {
        self.fragments.len()
    }

    /// Whether no records have been appended.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Close the document envelope and produce the final bytes.
    pub fn seal(self, compression: Compression) -> Result<SealedDocument> {
        let mut open = String::new();
        open.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        open.push_str(&self.kind.open_tag(self.fragments.len()));
        open.push('\n');
        for fragment in &self.fragments {
            open.push_str(fragment);
        }
        open.push_str(&format!("</{}>\n", self.kind.root()));

        let open_bytes = open.into_bytes();
        let bytes = compression.compress(&open_bytes)?;
        Ok(SealedDocument {
            kind: self.kind,
            compression,
            bytes,
            open_bytes,
        })
    }
}

/// A sealed metadata document: final stored bytes plus the uncompressed
/// form both checksums are taken over.
#[derive(Debug, Clone)]
pub struct SealedDocument {
    /// The document kind.
    pub kind: DocumentKind,
    /// Compression applied to the stored bytes.
    pub compression: Compression,
    /// The bytes to store, compression applied.
    pub bytes: Vec<u8>,
    /// The uncompressed document bytes.
    pub open_bytes: Vec<u8>,
}

impl SealedDocument {
    /// Size of the stored bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Size of the uncompressed bytes.
    pub fn open_size(&self) -> u64 {
        self.open_bytes.len() as u64
    }

    /// The plain file name of this document, extension included.
    pub fn plain_name(&self) -> String {
        format!("{}{}", self.kind.plain_name(), self.compression.extension())
    }
}

/// One record recovered from a previously published document.
#[derive(Debug, Clone)]
pub struct ExistingRecord {
    /// The record's package identity.
    pub identity: RecordIdentity,
    /// The record's XML fragment, unchanged.
    pub fragment: String,
}

/// A previously published document split back into records.
#[derive(Debug)]
pub struct ExistingDocument {
    kind: DocumentKind,
    records: Vec<ExistingRecord>,
}

impl ExistingDocument {
    /// Parse an uncompressed document of the given kind.
    pub fn parse(kind: DocumentKind, content: &str) -> Result<Self> {
        let root_open = format!("<{}", kind.root());
        let root_at = content.find(&root_open).ok_or_else(|| {
            RpmRepositoryError::invalid_document(format!(
                "not a {} document: no <{}> element",
                kind,
                kind.root()
            ))
        })?;
        let root_tag_end = content[root_at..].find('>').map(|i| root_at + i).ok_or_else(
            || RpmRepositoryError::invalid_document(format!("unterminated <{}>", kind.root())),
        )?;
        let declared = attr_value(&content[root_at..root_tag_end], "packages")
            .and_then(|v| v.parse::<usize>().ok());

        let mut records = Vec::new();
        let mut pos = root_tag_end;
        while let Some(start) = content[pos..].find("<package") {
            let start = pos + start;
            let end = content[start..].find("</package>").ok_or_else(|| {
                RpmRepositoryError::invalid_document(format!(
                    "{}: unterminated package record",
                    kind
                ))
            })?;
            let end = start + end + "</package>".len();
            let fragment = &content[start..end];
            records.push(ExistingRecord {
                identity: record_identity(kind, fragment)?,
                fragment: format!("{}\n", fragment),
            });
            pos = end;
        }

        if let Some(declared) = declared {
            if declared != records.len() {
                return Err(RpmRepositoryError::invalid_document(format!(
                    "{}: declares {} packages but contains {}",
                    kind,
                    declared,
                    records.len()
                )));
            }
        }

        Ok(Self { kind, records })
    }

    /// The document kind.
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// The recovered records, in document order.
    pub fn records(&self) -> &[ExistingRecord] {
        &self.records
    }

    /// Consume the document, yielding its records.
    pub fn into_records(self) -> Vec<ExistingRecord> {
        self.records
    }

    /// Number of records in the document.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the document holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn record_identity(kind: DocumentKind, fragment: &str) -> Result<RecordIdentity> {
    let missing = |what: &str| {
        RpmRepositoryError::invalid_document(format!("{} record without {}", kind, what))
    };

    let version_tag = tag_body(fragment, "version").ok_or_else(|| missing("version element"))?;
    let epoch = attr_value(version_tag, "epoch").ok_or_else(|| missing("version epoch"))?;
    let version = attr_value(version_tag, "ver").ok_or_else(|| missing("version ver"))?;
    let release = attr_value(version_tag, "rel").ok_or_else(|| missing("version rel"))?;

    match kind {
        DocumentKind::Primary => Ok(RecordIdentity {
            name: element_text(fragment, "name").ok_or_else(|| missing("name element"))?,
            arch: element_text(fragment, "arch").ok_or_else(|| missing("arch element"))?,
            epoch,
            version,
            release,
            pkgid: element_text(fragment, "checksum")
                .ok_or_else(|| missing("checksum element"))?,
        }),
        DocumentKind::Filelists | DocumentKind::Other => {
            let open_end = fragment.find('>').ok_or_else(|| missing("opening tag"))?;
            let open_tag = &fragment[..open_end];
            Ok(RecordIdentity {
                name: attr_value(open_tag, "name").ok_or_else(|| missing("name attribute"))?,
                arch: attr_value(open_tag, "arch").ok_or_else(|| missing("arch attribute"))?,
                epoch,
                version,
                release,
                pkgid: attr_value(open_tag, "pkgid")
                    .ok_or_else(|| missing("pkgid attribute"))?,
            })
        }
    }
}
