//! File-list document records.

use crate::package::PackageMetadata;
use crate::xml::{escape_attr, escape_text};

/// Renders one package's entry for the file-list document.
#[derive(Debug)]
pub struct FilelistsRecord<'a> {
    metadata: &'a PackageMetadata,
}

impl<'a> FilelistsRecord<'a> {
    /// Create a record for the given package.
    pub fn new(metadata: &'a PackageMetadata) -> Self {
        Self { metadata }
    }

    /// Render the record as an XML fragment.
    pub fn to_xml(&self) -> String {
        let m = self.metadata;
        let mut xml = String::new();

        xml.push_str(&format!(
            "<package pkgid=\"{}\" name=\"{}\" arch=\"{}\">\n",
            escape_attr(&m.digest_hex),
            escape_attr(&m.name),
            escape_attr(&m.arch)
        ));
        xml.push_str(&format!(
            "  <version epoch=\"{}\" ver=\"{}\" rel=\"{}\"/>\n",
            m.epoch,
            escape_attr(&m.version),
            escape_attr(&m.release)
        ));
        for file in &m.files {
            match file.kind.as_attr() {
                Some(kind) => xml.push_str(&format!(
                    "  <file type=\"{}\">{}</file>\n",
                    kind,
                    escape_text(&file.path)
                )),
                None => {
                    xml.push_str(&format!("  <file>{}</file>\n", escape_text(&file.path)))
                }
            }
        }
        xml.push_str("</package>\n");
        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_metadata as metadata;

    #[test]
    fn test_record_attributes() {
        let m = metadata();
        let xml = FilelistsRecord::new(&m).to_xml();
        assert!(xml.starts_with(&format!(
            "<package pkgid=\"{}\" name=\"nginx\" arch=\"x86_64\">\n",
            "a".repeat(64)
        )));
        assert!(xml.contains("<version epoch=\"1\" ver=\"1.16.1\" rel=\"1.el8.ngx\"/>"));
        assert!(xml.ends_with("</package>\n"));
    }

    #[test]
    fn test_record_file_kinds() {
        let m = metadata();
        let xml = FilelistsRecord::new(&m).to_xml();
        assert!(xml.contains("  <file>/usr/sbin/nginx</file>\n"));
        assert!(xml.contains("  <file type=\"dir\">/etc/nginx</file>\n"));
        assert!(xml.contains("  <file type=\"ghost\">/var/log/nginx/error.log</file>\n"));
    }

    #[test]
    fn test_record_without_files() {
        let mut m = metadata();
        m.files.clear();
        let xml = FilelistsRecord::new(&m).to_xml();
        assert!(!xml.contains("<file"));
    }
}
