//! The repository manifest, `repomd.xml`.
//!
//! The manifest is the fetch entry point of a repository: it names each
//! published metadata document together with checksums of both its stored
//! and uncompressed bytes, so clients can locate and verify the documents
//! without listing storage.

use crate::digest::Digest;
use crate::document::DocumentKind;
use crate::xml::{attr_value, element_text, escape_attr, tag_body};
use crate::{Result, RpmRepositoryError};
use serde::{Deserialize, Serialize};

/// File name of the manifest. Unlike the documents it references, the
/// manifest never gets a digest-derived name.
pub const REPOMD_NAME: &str = "repomd.xml";

/// One document reference within the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMdEntry {
    /// Document kind this entry describes.
    pub kind: DocumentKind,
    /// Digest algorithm both checksums were taken with.
    pub checksum_type: Digest,
    /// Checksum of the stored (possibly compressed) bytes.
    pub checksum: String,
    /// Checksum of the uncompressed bytes.
    pub open_checksum: String,
    /// Storage location relative to the repository base.
    pub location: String,
    /// Unix timestamp the document was produced at.
    pub timestamp: i64,
    /// Size of the stored bytes.
    pub size: u64,
    /// Size of the uncompressed bytes.
    pub open_size: u64,
}

/// The parsed or under-construction contents of `repomd.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMd {
    /// Repository revision, a unix timestamp.
    pub revision: i64,
    entries: Vec<RepoMdEntry>,
}

impl RepoMd {
    /// Create an empty manifest with the given revision.
    pub fn new(revision: i64) -> Self {
        Self {
            revision,
            entries: Vec::new(),
        }
    }

    /// Add an entry, replacing any previous entry of the same kind.
    pub fn add_entry(&mut self, entry: RepoMdEntry) {
        self.entries.retain(|e| e.kind != entry.kind);
        self.entries.push(entry);
    }

    /// The entry for the given document kind, if present.
    pub fn entry(&self, kind: DocumentKind) -> Option<&RepoMdEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }

    /// All entries, in manifest order.
    pub fn entries(&self) -> impl Iterator<Item = &RepoMdEntry> {
        DocumentKind::all().iter().filter_map(|kind| self.entry(*kind))
    }

    /// The locations of all referenced documents, in manifest order.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.entries().map(|e| e.location.as_str())
    }

    /// Render the manifest document.
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(
            "<repomd xmlns=\"http://linux.duke.edu/metadata/repo\" \
             xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\">\n",
        );
        xml.push_str(&format!("  <revision>{}</revision>\n", self.revision));
        for entry in self.entries() {
            xml.push_str(&format!("  <data type=\"{}\">\n", entry.kind));
            xml.push_str(&format!(
                "    <checksum type=\"{}\">{}</checksum>\n",
                entry.checksum_type, entry.checksum
            ));
            xml.push_str(&format!(
                "    <open-checksum type=\"{}\">{}</open-checksum>\n",
                entry.checksum_type, entry.open_checksum
            ));
            xml.push_str(&format!(
                "    <location href=\"{}\"/>\n",
                escape_attr(&entry.location)
            ));
            xml.push_str(&format!("    <timestamp>{}</timestamp>\n", entry.timestamp));
            xml.push_str(&format!("    <size>{}</size>\n", entry.size));
            xml.push_str(&format!("    <open-size>{}</open-size>\n", entry.open_size));
            xml.push_str("  </data>\n");
        }
        xml.push_str("</repomd>\n");
        xml
    }

    /// Parse a manifest document. Entries of unrecognized data types
    /// (createrepo adds e.g. `primary_db`) are skipped.
    pub fn from_str(content: &str) -> Result<Self> {
        if !content.contains("<repomd") {
            return Err(RpmRepositoryError::invalid_document(
                "not a repomd document: no <repomd> element",
            ));
        }
        let revision_text = element_text(content, "revision")
            .ok_or_else(|| RpmRepositoryError::invalid_document("repomd without revision"))?;
        let revision = revision_text
            .parse::<i64>()
            .map_err(|_| RpmRepositoryError::invalid_field("revision", &revision_text))?;

        let mut manifest = RepoMd::new(revision);
        let mut pos = 0;
        while let Some(start) = content[pos..].find("<data ") {
            let start = pos + start;
            let end = content[start..].find("</data>").ok_or_else(|| {
                RpmRepositoryError::invalid_document("unterminated data entry in repomd")
            })?;
            let end = start + end + "</data>".len();
            let block = &content[start..end];
            pos = end;

            let open_end = block
                .find('>')
                .ok_or_else(|| RpmRepositoryError::invalid_document("malformed data entry"))?;
            let kind = match attr_value(&block[..open_end], "type") {
                Some(value) => match value.as_str() {
                    "primary" => DocumentKind::Primary,
                    "filelists" => DocumentKind::Filelists,
                    "other" => DocumentKind::Other,
                    _ => continue,
                },
                None => continue,
            };
            manifest.add_entry(parse_entry(kind, block)?);
        }
        Ok(manifest)
    }
}

fn parse_entry(kind: DocumentKind, block: &str) -> Result<RepoMdEntry> {
    let missing = |what: &str| {
        RpmRepositoryError::invalid_document(format!("repomd {} entry without {}", kind, what))
    };

    let checksum_type = tag_body(block, "checksum")
        .and_then(|tag| attr_value(tag, "type"))
        .ok_or_else(|| missing("checksum type"))?
        .parse::<Digest>()?;
    let checksum = element_text(block, "checksum").ok_or_else(|| missing("checksum"))?;
    let open_checksum =
        element_text(block, "open-checksum").ok_or_else(|| missing("open-checksum"))?;
    let location = tag_body(block, "location")
        .and_then(|tag| attr_value(tag, "href"))
        .ok_or_else(|| missing("location"))?;
    let timestamp_text = element_text(block, "timestamp").ok_or_else(|| missing("timestamp"))?;
    let timestamp = timestamp_text
        .parse::<i64>()
        .map_err(|_| RpmRepositoryError::invalid_field("timestamp", &timestamp_text))?;
    let size_text = element_text(block, "size").ok_or_else(|| missing("size"))?;
    let size = size_text
        .parse::<u64>()
        .map_err(|_| RpmRepositoryError::invalid_field("size", &size_text))?;
    let open_size_text = element_text(block, "open-size").ok_or_else(|| missing("open-size"))?;
    let open_size = open_size_text
        .parse::<u64>()
        .map_err(|_| RpmRepositoryError::invalid_field("open-size", &open_size_text))?;

    Ok(RepoMdEntry {
        kind,
        checksum_type,
        checksum,
        open_checksum,
        location,
        timestamp,
        size,
        open_size,
    })
}
