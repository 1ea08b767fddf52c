//! Helpers for building synthetic package files in tests.
//!
//! Real packages are large and awkward to ship as fixtures; these builders
//! assemble byte-exact lead, signature and header structures with known
//! tag values so parser behavior can be asserted precisely.

use crate::digest::Digest;
use crate::header::{sigtags, tags, LEAD_SIZE};
use crate::package::{ChangelogEntry, FileEntry, FileKind, PackageMetadata, Relation};

const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];

/// A fully populated metadata record with known values, for asserting
/// rendered document output without parsing a binary package first.
pub fn sample_metadata() -> PackageMetadata {
    PackageMetadata {
        name: "nginx".to_string(),
        epoch: 1,
        version: "1.16.1".to_string(),
        release: "1.el8.ngx".to_string(),
        arch: "x86_64".to_string(),
        summary: "High performance web server".to_string(),
        description: "nginx <engine x> & more".to_string(),
        packager: Some("Nginx Packaging <pkg@nginx.com>".to_string()),
        url: Some("https://nginx.org/".to_string()),
        vendor: Some("Nginx, Inc.".to_string()),
        license: Some("BSD".to_string()),
        group: Some("System Environment/Daemons".to_string()),
        buildhost: Some("buildhost.nginx.com".to_string()),
        sourcerpm: Some("nginx-1.16.1-1.el8.ngx.src.rpm".to_string()),
        build_time: 1_565_024_137,
        package_size: 981_596,
        installed_size: 1_500_000,
        archive_size: 1_750_000,
        header_start: 280,
        header_end: 136_216,
        digest_hex: "a".repeat(64),
        digest: Digest::Sha256,
        files: vec![
            FileEntry {
                path: "/usr/sbin/nginx".to_string(),
                kind: FileKind::File,
            },
            FileEntry {
                path: "/etc/nginx".to_string(),
                kind: FileKind::Dir,
            },
            FileEntry {
                path: "/var/log/nginx/error.log".to_string(),
                kind: FileKind::Ghost,
            },
        ],
        provides: vec![Relation {
            name: "nginx".to_string(),
            flags: 8,
            version: Some("1:1.16.1-1.el8.ngx".to_string()),
        }],
        requires: vec![
            Relation {
                name: "libc.so.6()(64bit)".to_string(),
                flags: 0,
                version: None,
            },
            Relation {
                name: "/bin/sh".to_string(),
                flags: 1536,
                version: None,
            },
        ],
        conflicts: Vec::new(),
        obsoletes: vec![Relation {
            name: "nginx-old".to_string(),
            flags: 2,
            version: Some("1.14.0".to_string()),
        }],
        changelogs: vec![ChangelogEntry {
            author: "Sergey Budnevitch <sb@nginx.com> - 1.16.1-1".to_string(),
            date: 1_565_024_000,
            text: "- 1.16.1\n- upstream bugfix release".to_string(),
        }],
    }
}

struct Entry {
    tag: u32,
    kind: u32,
    offset: u32,
    count: u32,
}

/// Builds the raw bytes of one header structure.
pub struct HeaderBuilder {
    entries: Vec<Entry>,
    store: Vec<u8>,
}

impl HeaderBuilder {
    /// Create an empty header builder.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            store: Vec::new(),
        }
    }

    fn align_store(&mut self, alignment: usize) {
        while self.store.len() % alignment != 0 {
            self.store.push(0);
        }
    }

    /// Add a single NUL-terminated string tag.
    pub fn string(&mut self, tag: u32, value: &str) {
        let offset = self.store.len() as u32;
        self.store.extend_from_slice(value.as_bytes());
        self.store.push(0);
        self.entries.push(Entry {
            tag,
            kind: 6,
            offset,
            count: 1,
        });
    }

    /// Add a localized string tag with one entry per locale.
    pub fn i18n_string(&mut self, tag: u32, values: &[&str]) {
        let offset = self.store.len() as u32;
        for value in values {
            self.store.extend_from_slice(value.as_bytes());
            self.store.push(0);
        }
        self.entries.push(Entry {
            tag,
            kind: 9,
            offset,
            count: values.len() as u32,
        });
    }

    /// Add a string array tag.
    pub fn string_array(&mut self, tag: u32, values: &[&str]) {
        let offset = self.store.len() as u32;
        for value in values {
            self.store.extend_from_slice(value.as_bytes());
            self.store.push(0);
        }
        self.entries.push(Entry {
            tag,
            kind: 8,
            offset,
            count: values.len() as u32,
        });
    }

    /// Add a 16-bit integer array tag.
    pub fn int16(&mut self, tag: u32, values: &[u16]) {
        self.align_store(2);
        let offset = self.store.len() as u32;
        for value in values {
            self.store.extend_from_slice(&value.to_be_bytes());
        }
        self.entries.push(Entry {
            tag,
            kind: 3,
            offset,
            count: values.len() as u32,
        });
    }

    /// Add a 32-bit integer array tag.
    pub fn int32(&mut self, tag: u32, values: &[u32]) {
        self.align_store(4);
        let offset = self.store.len() as u32;
        for value in values {
            self.store.extend_from_slice(&value.to_be_bytes());
        }
        self.entries.push(Entry {
            tag,
            kind: 4,
            offset,
            count: values.len() as u32,
        });
    }

    /// Remove a previously added tag.
    pub fn drop_tag(&mut self, tag: u32) {
        self.entries.retain(|e| e.tag != tag);
    }

    /// Assemble the header bytes: preamble, index entries, data store.
    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&HEADER_MAGIC);
        data.push(0x01);
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        data.extend_from_slice(&(self.store.len() as u32).to_be_bytes());
        for entry in &self.entries {
            data.extend_from_slice(&entry.tag.to_be_bytes());
            data.extend_from_slice(&entry.kind.to_be_bytes());
            data.extend_from_slice(&entry.offset.to_be_bytes());
            data.extend_from_slice(&entry.count.to_be_bytes());
        }
        data.extend_from_slice(&self.store);
        data
    }
}

impl Default for HeaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A complete synthetic package file: lead, signature header, main header
/// and an opaque payload.
pub struct FixtureRpm {
    lead_name: String,
    signature: HeaderBuilder,
    header: HeaderBuilder,
    payload: Vec<u8>,
}

impl FixtureRpm {
    /// A fixture mirroring the nginx 1.16.1 package, with files, relations
    /// and a changelog entry.
    pub fn nginx() -> Self {
        let mut signature = HeaderBuilder::new();
        signature.int32(sigtags::PAYLOADSIZE, &[1_800_000]);

        let mut header = HeaderBuilder::new();
        header.string(tags::NAME, "nginx");
        header.string(tags::VERSION, "1.16.1");
        header.string(tags::RELEASE, "1.el8.ngx");
        header.string(tags::ARCH, "x86_64");
        header.int32(tags::EPOCH, &[1]);
        header.i18n_string(tags::SUMMARY, &["High performance web server"]);
        header.i18n_string(
            tags::DESCRIPTION,
            &["nginx [engine x] is an HTTP and reverse proxy server"],
        );
        header.int32(tags::BUILDTIME, &[1_565_024_137]);
        header.string(tags::BUILDHOST, "buildhost.nginx.com");
        header.int32(tags::SIZE, &[1_500_000]);
        header.string(tags::VENDOR, "Nginx, Inc.");
        header.string(tags::LICENSE, "2-clause BSD-like license");
        header.string(tags::PACKAGER, "Nginx Packaging <pkg@nginx.com>");
        header.string(tags::GROUP, "System Environment/Daemons");
        header.string(tags::URL, "https://nginx.org/");
        header.string(tags::SOURCERPM, "nginx-1.16.1-1.el8.ngx.src.rpm");
        header.int32(tags::ARCHIVESIZE, &[1_750_000]);

        header.string_array(
            tags::BASENAMES,
            &["nginx", "nginx", "nginx.conf", "error.log"],
        );
        header.string_array(
            tags::DIRNAMES,
            &["/usr/sbin/", "/etc/", "/etc/nginx/", "/var/log/nginx/"],
        );
        header.int32(tags::DIRINDEXES, &[0, 1, 2, 3]);
        header.int16(tags::FILEMODES, &[0o100755, 0o040755, 0o100644, 0o100644]);
        header.int32(tags::FILEFLAGS, &[0, 0, 1, 64]);

        header.string_array(tags::PROVIDENAME, &["nginx", "webserver"]);
        header.int32(tags::PROVIDEFLAGS, &[8, 0]);
        header.string_array(tags::PROVIDEVERSION, &["1:1.16.1-1.el8.ngx", ""]);

        header.string_array(tags::REQUIRENAME, &["libc.so.6()(64bit)", "/bin/sh"]);
        header.int32(tags::REQUIREFLAGS, &[0, 1536]);
        header.string_array(tags::REQUIREVERSION, &["", ""]);

        header.int32(tags::CHANGELOGTIME, &[1_565_024_000]);
        header.string_array(
            tags::CHANGELOGNAME,
            &["Sergey Budnevitch <sb@nginx.com> - 1.16.1-1"],
        );
        header.string_array(tags::CHANGELOGTEXT, &["- 1.16.1\n- upstream bugfix release"]);

        Self {
            lead_name: "nginx-1.16.1-1.el8.ngx".to_string(),
            signature,
            header,
            payload: vec![0xaa; 256],
        }
    }

    /// A fixture around a caller-built main header, with a minimal
    /// signature header and payload.
    pub fn with_header(header: HeaderBuilder) -> Self {
        let mut signature = HeaderBuilder::new();
        signature.int32(sigtags::PAYLOADSIZE, &[0]);
        Self {
            lead_name: "fixture".to_string(),
            signature,
            header,
            payload: vec![0xaa; 64],
        }
    }

    /// Remove a tag from the main header.
    pub fn drop_tag(&mut self, tag: u32) {
        self.header.drop_tag(tag);
    }

    /// Mutable access to the main header builder.
    pub fn header_mut(&mut self) -> &mut HeaderBuilder {
        &mut self.header
    }

    /// Assemble the package file bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(LEAD_SIZE + 512);

        data.extend_from_slice(&LEAD_MAGIC);
        data.push(3);
        data.push(0);
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        let mut name = self.lead_name.as_bytes().to_vec();
        name.truncate(65);
        name.resize(66, 0);
        data.extend_from_slice(&name);
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&5u16.to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        debug_assert_eq!(data.len(), LEAD_SIZE);

        data.extend_from_slice(&self.signature.build());
        while data.len() % 8 != 0 {
            data.push(0);
        }
        data.extend_from_slice(&self.header.build());
        data.extend_from_slice(&self.payload);
        data
    }
}
