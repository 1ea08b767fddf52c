//! Changelog document records.

use crate::package::PackageMetadata;
use crate::xml::{escape_attr, escape_text};

/// Renders one package's entry for the changelog document.
#[derive(Debug)]
pub struct OtherRecord<'a> {
    metadata: &'a PackageMetadata,
}

impl<'a> OtherRecord<'a> {
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
        for entry in &m.changelogs {
            xml.push_str(&format!(
                "  <changelog author=\"{}\" date=\"{}\">{}</changelog>\n",
                escape_attr(&entry.author),
                entry.date,
                escape_text(&entry.text)
            ));
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
        let xml = OtherRecord::new(&m).to_xml();
        assert!(xml.starts_with(&format!(
            "<package pkgid=\"{}\" name=\"nginx\" arch=\"x86_64\">\n",
            "a".repeat(64)
        )));
        assert!(xml.contains("<version epoch=\"1\" ver=\"1.16.1\" rel=\"1.el8.ngx\"/>"));
    }

    #[test]
    fn test_record_changelog_entries() {
        let m = metadata();
        let xml = OtherRecord::new(&m).to_xml();
        assert!(xml.contains(
            "  <changelog author=\"Sergey Budnevitch &lt;sb@nginx.com&gt; - 1.16.1-1\" date=\"1565024000\">- 1.16.1\n- upstream bugfix release</changelog>\n"
        ));
    }

    #[test]
    fn test_record_without_changelog() {
        let mut m = metadata();
        m.changelogs.clear();
        let xml = OtherRecord::new(&m).to_xml();
        assert!(!xml.contains("<changelog"));
    }
}
