//! Package metadata extraction from RPM files.

use crate::digest::Digest;
use crate::header::{align8, sigtags, tags, Header, Lead, LEAD_SIZE};
use crate::{Result, RpmRepositoryError};
use serde::{Deserialize, Serialize};

/// Comparison bit in a relation's flags: less than.
pub const SENSE_LESS: u32 = 0x02;
/// Comparison bit in a relation's flags: greater than.
pub const SENSE_GREATER: u32 = 0x04;
/// Comparison bit in a relation's flags: equal.
pub const SENSE_EQUAL: u32 = 0x08;

/// Flag bits marking a requirement as needed before installation: legacy
/// prereq plus pre and post scriptlet requirements.
const SENSE_PREREQ_MASK: u32 = 64 | 512 | 1024;

/// Per-file flag bit marking a ghost entry.
const FILE_GHOST: u64 = 64;

/// File mode format bits identifying a directory.
const MODE_FORMAT_MASK: u64 = 0xf000;
const MODE_DIRECTORY: u64 = 0x4000;

/// The kind of a file entry in a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// A regular file or symlink.
    File,
    /// A directory.
    Dir,
    /// A ghost entry: named by the package but not shipped in it.
    Ghost,
}

impl FileKind {
    /// The `type` attribute value for file-list entries, if any.
    pub fn as_attr(&self) -> Option<&'static str> {
        match self {
            FileKind::File => None,
            FileKind::Dir => Some("dir"),
            FileKind::Ghost => Some("ghost"),
        }
    }
}

/// A single file shipped (or named) by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute path of the file.
    pub path: String,
    /// What kind of entry this is.
    pub kind: FileKind,
}

/// Epoch, version and release parts of a relation's version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evr {
    /// Epoch; zero when not stated.
    pub epoch: String,
    /// Upstream version.
    pub version: String,
    /// Release, when stated.
    pub release: Option<String>,
}

/// A dependency relation: a named capability with optional version bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Capability name.
    pub name: String,
    /// Raw sense flags from the header.
    pub flags: u32,
    /// Version bound, when the relation is versioned.
    pub version: Option<String>,
}

impl Relation {
    /// The comparison operator for this relation, if any version bound
    /// applies. Values match the `flags` attribute of entry elements.
    pub fn op(&self) -> Option<&'static str> {
        match self.flags & (SENSE_LESS | SENSE_GREATER | SENSE_EQUAL) {
            0 => None,
            SENSE_EQUAL => Some("EQ"),
            SENSE_LESS => Some("LT"),
            SENSE_GREATER => Some("GT"),
            f if f == SENSE_LESS | SENSE_EQUAL => Some("LE"),
            f if f == SENSE_GREATER | SENSE_EQUAL => Some("GE"),
            _ => None,
        }
    }

    /// Split the version bound into epoch, version and release parts.
    pub fn evr(&self) -> Option<Evr> {
        let raw = self.version.as_deref()?;
        if raw.is_empty() {
            return None;
        }
        let (epoch, rest) = match raw.split_once(':') {
            Some((e, rest)) => (e.to_string(), rest),
            None => ("0".to_string(), raw),
        };
        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v.to_string(), Some(r.to_string())),
            None => (rest.to_string(), None),
        };
        Some(Evr {
            epoch,
            version,
            release,
        })
    }

    /// Whether this requirement must be satisfied before installation.
    pub fn is_prereq(&self) -> bool {
        self.flags & SENSE_PREREQ_MASK != 0
    }
}

/// One changelog entry of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    /// Author line of the entry.
    pub author: String,
    /// Timestamp of the entry, seconds since the epoch.
    pub date: i64,
    /// Text of the entry.
    pub text: String,
}

/// Metadata extracted from one package file. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package name.
    pub name: String,
    /// Package epoch; zero when the header has none.
    pub epoch: u32,
    /// Package version.
    pub version: String,
    /// Package release.
    pub release: String,
    /// Target architecture.
    pub arch: String,
    /// One-line summary.
    pub summary: String,
    /// Long description.
    pub description: String,
    /// Packager contact.
    pub packager: Option<String>,
    /// Upstream URL.
    pub url: Option<String>,
    /// Vendor name.
    pub vendor: Option<String>,
    /// License string.
    pub license: Option<String>,
    /// Package group.
    pub group: Option<String>,
    /// Host the package was built on.
    pub buildhost: Option<String>,
    /// Name of the source RPM this package was built from.
    pub sourcerpm: Option<String>,
    /// Build timestamp, seconds since the epoch.
    pub build_time: i64,
    /// Size of the package file in bytes.
    pub package_size: u64,
    /// Installed size in bytes.
    pub installed_size: u64,
    /// Uncompressed payload size in bytes.
    pub archive_size: u64,
    /// Offset of the main header within the package file.
    pub header_start: u64,
    /// Offset just past the main header, where the payload begins.
    pub header_end: u64,
    /// Hex digest of the package file bytes.
    pub digest_hex: String,
    /// Algorithm `digest_hex` was computed with.
    pub digest: Digest,
    /// Files shipped by the package, in header order.
    pub files: Vec<FileEntry>,
    /// Provided capabilities.
    pub provides: Vec<Relation>,
    /// Required capabilities.
    pub requires: Vec<Relation>,
    /// Conflicting capabilities.
    pub conflicts: Vec<Relation>,
    /// Obsoleted capabilities.
    pub obsoletes: Vec<Relation>,
    /// Changelog entries, in header order.
    pub changelogs: Vec<ChangelogEntry>,
}

impl PackageMetadata {
    /// The package identity as `name-epoch:version-release.arch`.
    pub fn nevra(&self) -> String {
        format!(
            "{}-{}:{}-{}.{}",
            self.name, self.epoch, self.version, self.release, self.arch
        )
    }
}

/// Parses package files into [`PackageMetadata`].
///
/// The content digest is computed over the exact input bytes during the
/// same read, so the value can be used for content addressing of the file
/// as stored.
#[derive(Debug, Clone, Copy)]
pub struct PackageReader {
    digest: Digest,
}

impl PackageReader {
    /// Create a reader computing content digests with the given algorithm.
    pub fn new(digest: Digest) -> Self {
        Self { digest }
    }

    /// The digest algorithm this reader uses.
    pub fn digest(&self) -> Digest {
        self.digest
    }

    /// Parse a package file into its metadata record.
    pub fn read(&self, data: &[u8]) -> Result<PackageMetadata> {
        Lead::parse(data)?;
        let (signature, signature_end) = Header::parse(data, LEAD_SIZE)?;
        let header_start = align8(signature_end);
        let (header, header_end) = Header::parse(data, header_start)?;

        let name = required_string(&header, tags::NAME, "name")?;
        let version = required_string(&header, tags::VERSION, "version")?;
        let release = required_string(&header, tags::RELEASE, "release")?;
        let arch = required_string(&header, tags::ARCH, "arch")?;

        let archive_size = header
            .int(tags::ARCHIVESIZE)
            .or_else(|| signature.int(sigtags::PAYLOADSIZE))
            .unwrap_or(0);

        Ok(PackageMetadata {
            name,
            epoch: header.int(tags::EPOCH).unwrap_or(0) as u32,
            version,
            release,
            arch,
            summary: header.string(tags::SUMMARY).unwrap_or("").to_string(),
            description: header.string(tags::DESCRIPTION).unwrap_or("").to_string(),
            packager: header.string(tags::PACKAGER).map(String::from),
            url: header.string(tags::URL).map(String::from),
            vendor: header.string(tags::VENDOR).map(String::from),
            license: header.string(tags::LICENSE).map(String::from),
            group: header.string(tags::GROUP).map(String::from),
            buildhost: header.string(tags::BUILDHOST).map(String::from),
            sourcerpm: header.string(tags::SOURCERPM).map(String::from),
            build_time: header.int(tags::BUILDTIME).unwrap_or(0) as i64,
            package_size: data.len() as u64,
            installed_size: header.int(tags::SIZE).unwrap_or(0),
            archive_size,
            header_start: header_start as u64,
            header_end: header_end as u64,
            digest_hex: self.digest.hex(data),
            digest: self.digest,
            files: file_entries(&header)?,
            provides: relations(
                &header,
                tags::PROVIDENAME,
                tags::PROVIDEFLAGS,
                tags::PROVIDEVERSION,
            )?,
            requires: relations(
                &header,
                tags::REQUIRENAME,
                tags::REQUIREFLAGS,
                tags::REQUIREVERSION,
            )?,
            conflicts: relations(
                &header,
                tags::CONFLICTNAME,
                tags::CONFLICTFLAGS,
                tags::CONFLICTVERSION,
            )?,
            obsoletes: relations(
                &header,
                tags::OBSOLETENAME,
                tags::OBSOLETEFLAGS,
                tags::OBSOLETEVERSION,
            )?,
            changelogs: changelogs(&header)?,
        })
    }
}

impl Default for PackageReader {
    fn default() -> Self {
        Self::new(Digest::default())
    }
}

fn required_string(header: &Header, tag: u32, what: &str) -> Result<String> {
    header
        .string(tag)
        .map(String::from)
        .ok_or_else(|| RpmRepositoryError::missing_tag(what))
}

fn file_entries(header: &Header) -> Result<Vec<FileEntry>> {
    let basenames = match header.string_array(tags::BASENAMES) {
        Some(names) => names,
        None => return Ok(Vec::new()),
    };
    let dirnames = header.string_array(tags::DIRNAMES).ok_or_else(|| {
        RpmRepositoryError::invalid_package("basenames present without dirnames")
    })?;
    let dirindexes = header.int_array(tags::DIRINDEXES).ok_or_else(|| {
        RpmRepositoryError::invalid_package("basenames present without dirindexes")
    })?;
    if dirindexes.len() != basenames.len() {
        return Err(RpmRepositoryError::invalid_package(format!(
            "{} basenames but {} dirindexes",
            basenames.len(),
            dirindexes.len()
        )));
    }
    let modes = header.int_array(tags::FILEMODES);
    let flags = header.int_array(tags::FILEFLAGS);
    if let Some(ref modes) = modes {
        if modes.len() != basenames.len() {
            return Err(RpmRepositoryError::invalid_package(format!(
                "{} basenames but {} file modes",
                basenames.len(),
                modes.len()
            )));
        }
    }
    if let Some(ref flags) = flags {
        if flags.len() != basenames.len() {
            return Err(RpmRepositoryError::invalid_package(format!(
                "{} basenames but {} file flags",
                basenames.len(),
                flags.len()
            )));
        }
    }

    let mut entries = Vec::with_capacity(basenames.len());
    for (i, base) in basenames.iter().enumerate() {
        let dir = dirnames
            .get(dirindexes[i] as usize)
            .ok_or_else(|| {
                RpmRepositoryError::invalid_package(format!(
                    "dirindex {} out of range for {} dirnames",
                    dirindexes[i],
                    dirnames.len()
                ))
            })?;
        let kind = if flags
            .as_ref()
            .map(|f| f[i] & FILE_GHOST != 0)
            .unwrap_or(false)
        {
            FileKind::Ghost
        } else if modes
            .as_ref()
            .map(|m| m[i] & MODE_FORMAT_MASK == MODE_DIRECTORY)
            .unwrap_or(false)
        {
            FileKind::Dir
        } else {
            FileKind::File
        };
        entries.push(FileEntry {
            path: format!("{}{}", dir, base),
            kind,
        });
    }
    Ok(entries)
}

fn relations(header: &Header, name_tag: u32, flags_tag: u32, version_tag: u32) -> Result<Vec<Relation>> {
    let names = match header.string_array(name_tag) {
        Some(names) => names,
        None => return Ok(Vec::new()),
    };
    let flags = header.int_array(flags_tag).unwrap_or_default();
    let versions = header.string_array(version_tag).unwrap_or(&[]);
    if !flags.is_empty() && flags.len() != names.len() {
        return Err(RpmRepositoryError::invalid_package(format!(
            "tag {}: {} names but {} flags",
            name_tag,
            names.len(),
            flags.len()
        )));
    }
    if !versions.is_empty() && versions.len() != names.len() {
        return Err(RpmRepositoryError::invalid_package(format!(
            "tag {}: {} names but {} versions",
            name_tag,
            names.len(),
            versions.len()
        )));
    }

    Ok(names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let version = versions.get(i).filter(|v| !v.is_empty()).cloned();
            Relation {
                name: name.clone(),
                flags: flags.get(i).copied().unwrap_or(0) as u32,
                version,
            }
        })
        .collect())
}

fn changelogs(header: &Header) -> Result<Vec<ChangelogEntry>> {
    let authors = match header.string_array(tags::CHANGELOGNAME) {
        Some(authors) => authors,
        None => return Ok(Vec::new()),
    };
    let times = header.int_array(tags::CHANGELOGTIME).unwrap_or_default();
    let texts = header.string_array(tags::CHANGELOGTEXT).unwrap_or(&[]);
    if times.len() != authors.len() || texts.len() != authors.len() {
        return Err(RpmRepositoryError::invalid_package(format!(
            "changelog arrays disagree: {} authors, {} times, {} texts",
            authors.len(),
            times.len(),
            texts.len()
        )));
    }

    Ok(authors
        .iter()
        .enumerate()
        .map(|(i, author)| ChangelogEntry {
            author: author.clone(),
            date: times[i] as i64,
            text: texts[i].clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FixtureRpm, HeaderBuilder};

    #[test]
    fn test_read_fixture_fields() {
        let data = FixtureRpm::nginx().build();
        let metadata = PackageReader::new(Digest::Sha256).read(&data).unwrap();

        assert_eq!(metadata.name, "nginx");
        assert_eq!(metadata.version, "1.16.1");
        assert_eq!(metadata.release, "1.el8.ngx");
        assert_eq!(metadata.arch, "x86_64");
        assert_eq!(metadata.epoch, 1);
        assert_eq!(metadata.summary, "High performance web server");
        assert_eq!(metadata.license.as_deref(), Some("2-clause BSD-like license"));
        assert_eq!(metadata.vendor.as_deref(), Some("Nginx, Inc."));
        assert_eq!(metadata.installed_size, 1_500_000);
        assert_eq!(metadata.build_time, 1_565_024_137);
        assert_eq!(metadata.package_size, data.len() as u64);
    }

    #[test]
    fn test_read_digest_matches_reference() {
        let data = FixtureRpm::nginx().build();
        let metadata = PackageReader::new(Digest::Sha256).read(&data).unwrap();
        assert_eq!(metadata.digest_hex, Digest::Sha256.hex(&data));
        assert_eq!(metadata.digest, Digest::Sha256);
    }

    #[test]
    fn test_read_header_range() {
        let data = FixtureRpm::nginx().build();
        let metadata = PackageReader::default().read(&data).unwrap();
        assert!(metadata.header_start >= 96);
        assert_eq!(metadata.header_start % 8, 0);
        assert!(metadata.header_end > metadata.header_start);
        assert!(metadata.header_end <= data.len() as u64);
    }

    #[test]
    fn test_read_files() {
        let data = FixtureRpm::nginx().build();
        let metadata = PackageReader::default().read(&data).unwrap();
        let paths: Vec<&str> = metadata.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/usr/sbin/nginx",
                "/etc/nginx",
                "/etc/nginx/nginx.conf",
                "/var/log/nginx/error.log",
            ]
        );
        assert_eq!(metadata.files[0].kind, FileKind::File);
        assert_eq!(metadata.files[1].kind, FileKind::Dir);
        assert_eq!(metadata.files[3].kind, FileKind::Ghost);
    }

    #[test]
    fn test_read_relations() {
        let data = FixtureRpm::nginx().build();
        let metadata = PackageReader::default().read(&data).unwrap();

        assert_eq!(metadata.provides.len(), 2);
        assert_eq!(metadata.provides[0].name, "nginx");
        assert_eq!(metadata.provides[0].op(), Some("EQ"));
        let evr = metadata.provides[0].evr().unwrap();
        assert_eq!(evr.epoch, "1");
        assert_eq!(evr.version, "1.16.1");
        assert_eq!(evr.release.as_deref(), Some("1.el8.ngx"));
        assert_eq!(metadata.provides[1].op(), None);

        assert_eq!(metadata.requires.len(), 2);
        assert!(metadata.requires[1].is_prereq());
        assert!(!metadata.requires[0].is_prereq());
    }

    #[test]
    fn test_read_changelogs() {
        let data = FixtureRpm::nginx().build();
        let metadata = PackageReader::default().read(&data).unwrap();
        assert_eq!(metadata.changelogs.len(), 1);
        assert_eq!(
            metadata.changelogs[0].author,
            "Sergey Budnevitch <sb@nginx.com> - 1.16.1-1"
        );
        assert_eq!(metadata.changelogs[0].date, 1_565_024_000);
    }

    #[test]
    fn test_read_missing_name() {
        let mut fixture = FixtureRpm::nginx();
        fixture.drop_tag(crate::header::tags::NAME);
        let err = PackageReader::default().read(&fixture.build()).unwrap_err();
        assert!(matches!(err, RpmRepositoryError::MissingTag(ref t) if t == "name"));
    }

    #[test]
    fn test_read_epoch_defaults_to_zero() {
        let mut fixture = FixtureRpm::nginx();
        fixture.drop_tag(crate::header::tags::EPOCH);
        let metadata = PackageReader::default().read(&fixture.build()).unwrap();
        assert_eq!(metadata.epoch, 0);
    }

    #[test]
    fn test_archive_size_falls_back_to_signature() {
        let mut fixture = FixtureRpm::nginx();
        fixture.drop_tag(crate::header::tags::ARCHIVESIZE);
        let metadata = PackageReader::default().read(&fixture.build()).unwrap();
        assert_eq!(metadata.archive_size, 1_800_000);
    }

    #[test]
    fn test_read_rejects_garbage() {
        let err = PackageReader::default().read(b"not an rpm").unwrap_err();
        assert!(matches!(err, RpmRepositoryError::InvalidPackageData(_)));
    }

    #[test]
    fn test_read_rejects_mismatched_file_arrays() {
        let mut builder = HeaderBuilder::new();
        builder.string(tags::NAME, "broken");
        builder.string(tags::VERSION, "1.0");
        builder.string(tags::RELEASE, "1");
        builder.string(tags::ARCH, "noarch");
        builder.string_array(tags::BASENAMES, &["a", "b"]);
        builder.string_array(tags::DIRNAMES, &["/usr/"]);
        builder.int32(tags::DIRINDEXES, &[0]);
        let data = FixtureRpm::with_header(builder).build();
        let err = PackageReader::default().read(&data).unwrap_err();
        assert!(matches!(err, RpmRepositoryError::InvalidPackageData(_)));
    }

    #[test]
    fn test_relation_evr_without_epoch() {
        let relation = Relation {
            name: "openssl".to_string(),
            flags: SENSE_GREATER | SENSE_EQUAL,
            version: Some("1.1.1".to_string()),
        };
        assert_eq!(relation.op(), Some("GE"));
        let evr = relation.evr().unwrap();
        assert_eq!(evr.epoch, "0");
        assert_eq!(evr.version, "1.1.1");
        assert_eq!(evr.release, None);
    }

    #[test]
    fn test_nevra() {
        let data = FixtureRpm::nginx().build();
        let metadata = PackageReader::default().read(&data).unwrap();
        assert_eq!(metadata.nevra(), "nginx-1:1.16.1-1.el8.ngx.x86_64");
    }
}
