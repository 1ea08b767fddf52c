//! Binary parsing for the RPM lead and header structures.
//!
//! An RPM file starts with a fixed 96-byte lead, followed by a signature
//! header, padding to an 8-byte boundary, and the main header. Both headers
//! share the same layout: an 8-byte preamble (magic, version, reserved),
//! an entry count and a store size, then the 16-byte index entries and the
//! data store they point into.

use crate::{Result, RpmRepositoryError};
use std::collections::HashMap;

/// Size of the lead block at the start of every package file.
pub const LEAD_SIZE: usize = 96;

const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];
const HEADER_VERSION: u8 = 0x01;

/// Bytes of preamble before the index entries: magic, version, reserved,
/// entry count, store size.
const PREAMBLE_SIZE: usize = 16;
const ENTRY_SIZE: usize = 16;

/// Well-known tag numbers of the main header.
pub mod tags {
    /// Package name.
    pub const NAME: u32 = 1000;
    /// Package version.
    pub const VERSION: u32 = 1001;
    /// Package release.
    pub const RELEASE: u32 = 1002;
    /// Package epoch; absent means zero.
    pub const EPOCH: u32 = 1003;
    /// One-line summary.
    pub const SUMMARY: u32 = 1004;
    /// Long description.
    pub const DESCRIPTION: u32 = 1005;
    /// Build timestamp, seconds since the epoch.
    pub const BUILDTIME: u32 = 1006;
    /// Host the package was built on.
    pub const BUILDHOST: u32 = 1007;
    /// Installed size in bytes.
    pub const SIZE: u32 = 1009;
    /// Vendor name.
    pub const VENDOR: u32 = 1011;
    /// License string.
    pub const LICENSE: u32 = 1014;
    /// Packager contact.
    pub const PACKAGER: u32 = 1015;
    /// Package group.
    pub const GROUP: u32 = 1016;
    /// Upstream URL.
    pub const URL: u32 = 1020;
    /// Target architecture.
    pub const ARCH: u32 = 1022;
    /// Per-file sizes.
    pub const FILESIZES: u32 = 1028;
    /// Per-file mode bits.
    pub const FILEMODES: u32 = 1030;
    /// Per-file flags (ghost, config, doc).
    pub const FILEFLAGS: u32 = 1037;
    /// Name of the source RPM.
    pub const SOURCERPM: u32 = 1044;
    /// Uncompressed payload size in bytes.
    pub const ARCHIVESIZE: u32 = 1046;
    /// Names of provided capabilities.
    pub const PROVIDENAME: u32 = 1047;
    /// Comparison flags for required capabilities.
    pub const REQUIREFLAGS: u32 = 1048;
    /// Names of required capabilities.
    pub const REQUIRENAME: u32 = 1049;
    /// Versions of required capabilities.
    pub const REQUIREVERSION: u32 = 1050;
    /// Comparison flags for conflicting capabilities.
    pub const CONFLICTFLAGS: u32 = 1053;
    /// Names of conflicting capabilities.
    pub const CONFLICTNAME: u32 = 1054;
    /// Versions of conflicting capabilities.
    pub const CONFLICTVERSION: u32 = 1055;
    /// Changelog entry timestamps.
    pub const CHANGELOGTIME: u32 = 1080;
    /// Changelog entry authors.
    pub const CHANGELOGNAME: u32 = 1081;
    /// Changelog entry texts.
    pub const CHANGELOGTEXT: u32 = 1082;
    /// Names of obsoleted capabilities.
    pub const OBSOLETENAME: u32 = 1090;
    /// Comparison flags for provided capabilities.
    pub const PROVIDEFLAGS: u32 = 1112;
    /// Versions of provided capabilities.
    pub const PROVIDEVERSION: u32 = 1113;
    /// Comparison flags for obsoleted capabilities.
    pub const OBSOLETEFLAGS: u32 = 1114;
    /// Versions of obsoleted capabilities.
    pub const OBSOLETEVERSION: u32 = 1115;
    /// Per-file index into the directory name table.
    pub const DIRINDEXES: u32 = 1116;
    /// Per-file base names.
    pub const BASENAMES: u32 = 1117;
    /// Directory name table.
    pub const DIRNAMES: u32 = 1118;
}

/// Well-known tag numbers of the signature header. These share numeric
/// values with unrelated main-header tags; the two tag spaces are distinct.
pub mod sigtags {
    /// Uncompressed payload size in bytes.
    pub const PAYLOADSIZE: u32 = 1007;
}

/// A decoded tag value from a header store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// No data.
    Null,
    /// Raw characters.
    Char(Vec<u8>),
    /// 8-bit integers.
    Int8(Vec<u8>),
    /// 16-bit integers.
    Int16(Vec<u16>),
    /// 32-bit integers.
    Int32(Vec<u32>),
    /// 64-bit integers.
    Int64(Vec<u64>),
    /// A single NUL-terminated string.
    String(String),
    /// Opaque binary data.
    Bin(Vec<u8>),
    /// An array of NUL-terminated strings.
    StringArray(Vec<String>),
    /// Localized strings; the first entry is the default locale.
    I18nString(Vec<String>),
}

impl Value {
    /// The value as a single string, if it is string-typed.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::I18nString(v) | Value::StringArray(v) => v.first().map(|s| s.as_str()),
            _ => None,
        }
    }

    /// The value as a list of strings, if it is string-typed.
    pub fn as_str_array(&self) -> Option<&[String]> {
        match self {
            Value::StringArray(v) | Value::I18nString(v) => Some(v),
            _ => None,
        }
    }

    /// The first element as an unsigned integer, widened to 64 bits.
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Value::Int8(v) => v.first().map(|&n| n as u64),
            Value::Int16(v) => v.first().map(|&n| n as u64),
            Value::Int32(v) => v.first().map(|&n| n as u64),
            Value::Int64(v) => v.first().copied(),
            _ => None,
        }
    }

    /// All elements as unsigned integers, widened to 64 bits.
    pub fn as_int_array(&self) -> Option<Vec<u64>> {
        match self {
            Value::Int8(v) => Some(v.iter().map(|&n| n as u64).collect()),
            Value::Int16(v) => Some(v.iter().map(|&n| n as u64).collect()),
            Value::Int32(v) => Some(v.iter().map(|&n| n as u64).collect()),
            Value::Int64(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// The fixed-size lead block identifying a file as an RPM package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lead {
    /// Format version, major then minor.
    pub version: (u8, u8),
    /// Package type: 0 for binary, 1 for source.
    pub pkg_type: u16,
    /// Architecture code.
    pub archnum: u16,
    /// NUL-padded package label.
    pub name: String,
    /// Operating system code.
    pub osnum: u16,
    /// Signature block type that follows the lead.
    pub signature_type: u16,
}

impl Lead {
    /// Parse the lead from the start of a package file.
    pub fn parse(data: &[u8]) -> Result<Lead> {
        let block = data.get(..LEAD_SIZE).ok_or_else(|| {
            RpmRepositoryError::invalid_package(format!(
                "file too short for lead: {} bytes",
                data.len()
            ))
        })?;
        if block[..4] != LEAD_MAGIC {
            return Err(RpmRepositoryError::invalid_package(format!(
                "bad lead magic: {:02x?}",
                &block[..4]
            )));
        }
        let name_bytes = &block[10..76];
        let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(66);
        Ok(Lead {
            version: (block[4], block[5]),
            pkg_type: u16::from_be_bytes([block[6], block[7]]),
            archnum: u16::from_be_bytes([block[8], block[9]]),
            name: String::from_utf8_lossy(&name_bytes[..name_end]).into_owned(),
            osnum: u16::from_be_bytes([block[76], block[77]]),
            signature_type: u16::from_be_bytes([block[78], block[79]]),
        })
    }
}

/// A parsed header: the tag values of either the signature or main header.
#[derive(Debug, Clone, Default)]
pub struct Header {
    values: HashMap<u32, Value>,
}

impl Header {
    /// Parse a header starting at `pos`. Returns the header and the offset
    /// of the first byte past its data store.
    pub fn parse(data: &[u8], pos: usize) -> Result<(Header, usize)> {
        let preamble = data.get(pos..pos + PREAMBLE_SIZE).ok_or_else(|| {
            RpmRepositoryError::invalid_package(format!("truncated header preamble at {}", pos))
        })?;
        if preamble[..3] != HEADER_MAGIC || preamble[3] != HEADER_VERSION {
            return Err(RpmRepositoryError::invalid_package(format!(
                "bad header magic at {}: {:02x?}",
                pos,
                &preamble[..4]
            )));
        }
        let nindex = u32::from_be_bytes([preamble[8], preamble[9], preamble[10], preamble[11]])
            as usize;
        let hsize = u32::from_be_bytes([preamble[12], preamble[13], preamble[14], preamble[15]])
            as usize;

        let index_start = pos + PREAMBLE_SIZE;
        let index_len = nindex.checked_mul(ENTRY_SIZE).ok_or_else(|| {
            RpmRepositoryError::invalid_package(format!("header entry count overflow: {}", nindex))
        })?;
        let store_start = index_start + index_len;
        let store_end = store_start.checked_add(hsize).ok_or_else(|| {
            RpmRepositoryError::invalid_package(format!("header store size overflow: {}", hsize))
        })?;
        if data.len() < store_end {
            return Err(RpmRepositoryError::invalid_package(format!(
                "truncated header: need {} bytes, have {}",
                store_end,
                data.len()
            )));
        }
        let store = &data[store_start..store_end];

        let mut values = HashMap::with_capacity(nindex);
        for i in 0..nindex {
            let entry = &data[index_start + i * ENTRY_SIZE..index_start + (i + 1) * ENTRY_SIZE];
            let tag = u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]);
            let kind = u32::from_be_bytes([entry[4], entry[5], entry[6], entry[7]]);
            let offset =
                u32::from_be_bytes([entry[8], entry[9], entry[10], entry[11]]) as usize;
            let count =
                u32::from_be_bytes([entry[12], entry[13], entry[14], entry[15]]) as usize;
            let value = parse_value(store, tag, kind, offset, count)?;
            values.insert(tag, value);
        }

        Ok((Header { values }, store_end))
    }

    /// Look up a raw tag value.
    pub fn get(&self, tag: u32) -> Option<&Value> {
        self.values.get(&tag)
    }

    /// Whether the header carries the given tag.
    pub fn has(&self, tag: u32) -> bool {
        self.values.contains_key(&tag)
    }

    /// A string-typed tag value.
    pub fn string(&self, tag: u32) -> Option<&str> {
        self.values.get(&tag).and_then(Value::as_str)
    }

    /// A string-array-typed tag value.
    pub fn string_array(&self, tag: u32) -> Option<&[String]> {
        self.values.get(&tag).and_then(Value::as_str_array)
    }

    /// A scalar integer tag value, widened to 64 bits.
    pub fn int(&self, tag: u32) -> Option<u64> {
        self.values.get(&tag).and_then(Value::as_int)
    }

    /// An integer-array tag value, widened to 64 bits.
    pub fn int_array(&self, tag: u32) -> Option<Vec<u64>> {
        self.values.get(&tag).and_then(Value::as_int_array)
    }
}

fn parse_value(store: &[u8], tag: u32, kind: u32, offset: usize, count: usize) -> Result<Value> {
    let overrun = || {
        RpmRepositoryError::invalid_package(format!(
            "tag {} data out of bounds: offset {} count {} in {}-byte store",
            tag,
            offset,
            count,
            store.len()
        ))
    };
    match kind {
        0 => Ok(Value::Null),
        1 => {
            let bytes = store.get(offset..offset + count).ok_or_else(overrun)?;
            Ok(Value::Char(bytes.to_vec()))
        }
        2 => {
            let bytes = store.get(offset..offset + count).ok_or_else(overrun)?;
            Ok(Value::Int8(bytes.to_vec()))
        }
        3 => {
            let bytes = store.get(offset..offset + count * 2).ok_or_else(overrun)?;
            Ok(Value::Int16(
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            ))
        }
        4 => {
            let bytes = store.get(offset..offset + count * 4).ok_or_else(overrun)?;
            Ok(Value::Int32(
                bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ))
        }
        5 => {
            let bytes = store.get(offset..offset + count * 8).ok_or_else(overrun)?;
            Ok(Value::Int64(
                bytes
                    .chunks_exact(8)
                    .map(|c| u64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ))
        }
        6 => Ok(Value::String(read_string(store, tag, offset)?.0)),
        7 => {
            let bytes = store.get(offset..offset + count).ok_or_else(overrun)?;
            Ok(Value::Bin(bytes.to_vec()))
        }
        8 | 9 => {
            let mut strings = Vec::with_capacity(count);
            let mut cursor = offset;
            for _ in 0..count {
                let (s, raw_len) = read_string(store, tag, cursor)?;
                cursor += raw_len + 1;
                strings.push(s);
            }
            if kind == 8 {
                Ok(Value::StringArray(strings))
            } else {
                Ok(Value::I18nString(strings))
            }
        }
        other => Err(RpmRepositoryError::invalid_package(format!(
            "tag {} has unknown type {}",
            tag, other
        ))),
    }
}

fn read_string(store: &[u8], tag: u32, offset: usize) -> Result<(String, usize)> {
    let tail = store.get(offset..).ok_or_else(|| {
        RpmRepositoryError::invalid_package(format!(
            "tag {} string offset {} out of bounds",
            tag, offset
        ))
    })?;
    let end = tail.iter().position(|&b| b == 0).ok_or_else(|| {
        RpmRepositoryError::invalid_package(format!("tag {} string is not NUL-terminated", tag))
    })?;
    // Header strings are read leniently; invalid UTF-8 is replaced rather
    // than rejected, matching how package tools treat legacy encodings.
    // The returned length counts the raw bytes before the NUL, not the
    // decoded bytes, which replacement characters can widen.
    Ok((String::from_utf8_lossy(&tail[..end]).into_owned(), end))
}

/// Round an offset up to the next 8-byte boundary. The signature header is
/// padded so the main header starts aligned.
pub fn align8(pos: usize) -> usize {
    (pos + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_header(entries: &[(u32, u32, &[u8], u32)], store: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&HEADER_MAGIC);
        data.push(HEADER_VERSION);
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        data.extend_from_slice(&(store.len() as u32).to_be_bytes());
        for (tag, kind, offset_bytes, count) in entries {
            data.extend_from_slice(&tag.to_be_bytes());
            data.extend_from_slice(&kind.to_be_bytes());
            data.extend_from_slice(offset_bytes);
            data.extend_from_slice(&count.to_be_bytes());
        }
        data.extend_from_slice(store);
        data
    }

    #[test]
    fn test_lead_too_short() {
        assert!(Lead::parse(&[0xed, 0xab]).is_err());
    }

    #[test]
    fn test_lead_bad_magic() {
        let data = vec![0u8; LEAD_SIZE];
        assert!(Lead::parse(&data).is_err());
    }

    #[test]
    fn test_lead_parse() {
        let mut data = vec![0u8; LEAD_SIZE];
        data[..4].copy_from_slice(&LEAD_MAGIC);
        data[4] = 3;
        data[5] = 0;
        data[7] = 0;
        data[10..15].copy_from_slice(b"nginx");
        let lead = Lead::parse(&data).unwrap();
        assert_eq!(lead.version, (3, 0));
        assert_eq!(lead.pkg_type, 0);
        assert_eq!(lead.name, "nginx");
    }

    #[test]
    fn test_header_string_tag() {
        let store = b"nginx\0";
        let data = raw_header(&[(tags::NAME, 6, &0u32.to_be_bytes(), 1)], store);
        let (header, end) = Header::parse(&data, 0).unwrap();
        assert_eq!(end, data.len());
        assert_eq!(header.string(tags::NAME), Some("nginx"));
    }

    #[test]
    fn test_header_int_tags() {
        let mut store = Vec::new();
        store.extend_from_slice(&1234u32.to_be_bytes());
        store.extend_from_slice(&[0x41, 0xed]);
        let data = raw_header(
            &[
                (tags::SIZE, 4, &0u32.to_be_bytes(), 1),
                (tags::FILEMODES, 3, &4u32.to_be_bytes(), 1),
            ],
            &store,
        );
        let (header, _) = Header::parse(&data, 0).unwrap();
        assert_eq!(header.int(tags::SIZE), Some(1234));
        assert_eq!(header.int_array(tags::FILEMODES), Some(vec![0x41ed]));
    }

    #[test]
    fn test_header_string_array() {
        let store = b"/usr/bin/\0/etc/\0";
        let data = raw_header(&[(tags::DIRNAMES, 8, &0u32.to_be_bytes(), 2)], store);
        let (header, _) = Header::parse(&data, 0).unwrap();
        assert_eq!(
            header.string_array(tags::DIRNAMES),
            Some(&["/usr/bin/".to_string(), "/etc/".to_string()][..])
        );
    }

    #[test]
    fn test_header_i18n_takes_first() {
        let store = b"web server\0serveur web\0";
        let data = raw_header(&[(tags::SUMMARY, 9, &0u32.to_be_bytes(), 2)], store);
        let (header, _) = Header::parse(&data, 0).unwrap();
        assert_eq!(header.string(tags::SUMMARY), Some("web server"));
    }

    #[test]
    fn test_header_string_array_legacy_encoding() {
        // A Latin-1 byte decodes to a replacement character that is wider
        // than the raw byte; the entries after it must still line up.
        let store = b"Bj\xf6rn A <b@x.se>\0Sergey Budnevitch <sb@nginx.com>\0";
        let data = raw_header(&[(tags::CHANGELOGNAME, 8, &0u32.to_be_bytes(), 2)], store);
        let (header, _) = Header::parse(&data, 0).unwrap();
        let names = header.string_array(tags::CHANGELOGNAME).unwrap();
        assert_eq!(names[0], "Bj\u{fffd}rn A <b@x.se>");
        assert_eq!(names[1], "Sergey Budnevitch <sb@nginx.com>");
    }

    #[test]
    fn test_header_bad_magic() {
        let mut data = raw_header(&[], b"");
        data[0] = 0xff;
        assert!(Header::parse(&data, 0).is_err());
    }

    #[test]
    fn test_header_truncated_store() {
        let store = b"nginx\0";
        let mut data = raw_header(&[(tags::NAME, 6, &0u32.to_be_bytes(), 1)], store);
        data.truncate(data.len() - 3);
        assert!(Header::parse(&data, 0).is_err());
    }

    #[test]
    fn test_header_offset_out_of_bounds() {
        let data = raw_header(&[(tags::NAME, 6, &100u32.to_be_bytes(), 1)], b"x\0");
        assert!(Header::parse(&data, 0).is_err());
    }

    #[test]
    fn test_header_unterminated_string() {
        let data = raw_header(&[(tags::NAME, 6, &0u32.to_be_bytes(), 1)], b"nginx");
        assert!(Header::parse(&data, 0).is_err());
    }

    #[test]
    fn test_header_unknown_type() {
        let data = raw_header(&[(tags::NAME, 99, &0u32.to_be_bytes(), 1)], b"\0");
        assert!(Header::parse(&data, 0).is_err());
    }

    #[test]
    fn test_align8() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(9), 16);
        assert_eq!(align8(96), 96);
    }
}
