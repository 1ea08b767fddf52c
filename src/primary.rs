//! Primary document records: the per-package summary entries.

use crate::package::{PackageMetadata, Relation};
use crate::xml::{escape_attr, escape_text};

/// Renders one package's entry for the primary document.
///
/// Borrows the metadata; the rendered fragment carries the storage
/// location the package was ingested under as its `location` element.
#[derive(Debug)]
pub struct PrimaryRecord<'a> {
    metadata: &'a PackageMetadata,
    location: &'a str,
}

impl<'a> PrimaryRecord<'a> {
    /// Create a record for a package stored at `location`.
    pub fn new(metadata: &'a PackageMetadata, location: &'a str) -> Self {
        Self { metadata, location }
    }

    /// Render the record as an XML fragment.
    pub fn to_xml(&self) -> String {
        let m = self.metadata;
        let mut xml = String::new();

        xml.push_str("<package type=\"rpm\">\n");
        xml.push_str(&format!("  <name>{}</name>\n", escape_text(&m.name)));
        xml.push_str(&format!("  <arch>{}</arch>\n", escape_text(&m.arch)));
        xml.push_str(&format!(
            "  <version epoch=\"{}\" ver=\"{}\" rel=\"{}\"/>\n",
            m.epoch,
            escape_attr(&m.version),
            escape_attr(&m.release)
        ));
        xml.push_str(&format!(
            "  <checksum type=\"{}\" pkgid=\"YES\">{}</checksum>\n",
            m.digest.as_str(),
            m.digest_hex
        ));
        xml.push_str(&format!(
            "  <summary>{}</summary>\n",
            escape_text(&m.summary)
        ));
        xml.push_str(&format!(
            "  <description>{}</description>\n",
            escape_text(&m.description)
        ));
        if let Some(ref packager) = m.packager {
            xml.push_str(&format!(
                "  <packager>{}</packager>\n",
                escape_text(packager)
            ));
        }
        if let Some(ref url) = m.url {
            xml.push_str(&format!("  <url>{}</url>\n", escape_text(url)));
        }
        xml.push_str(&format!(
            "  <time file=\"{}\" build=\"{}\"/>\n",
            m.build_time, m.build_time
        ));
        xml.push_str(&format!(
            "  <size package=\"{}\" installed=\"{}\" archive=\"{}\"/>\n",
            m.package_size, m.installed_size, m.archive_size
        ));
        xml.push_str(&format!(
            "  <location href=\"{}\"/>\n",
            escape_attr(self.location)
        ));

        xml.push_str("  <format>\n");
        if let Some(ref license) = m.license {
            xml.push_str(&format!(
                "    <rpm:license>{}</rpm:license>\n",
                escape_text(license)
            ));
        }
        if let Some(ref vendor) = m.vendor {
            xml.push_str(&format!(
                "    <rpm:vendor>{}</rpm:vendor>\n",
                escape_text(vendor)
            ));
        }
        if let Some(ref group) = m.group {
            xml.push_str(&format!(
                "    <rpm:group>{}</rpm:group>\n",
                escape_text(group)
            ));
        }
        if let Some(ref buildhost) = m.buildhost {
            xml.push_str(&format!(
                "    <rpm:buildhost>{}</rpm:buildhost>\n",
                escape_text(buildhost)
            ));
        }
        if let Some(ref sourcerpm) = m.sourcerpm {
            xml.push_str(&format!(
                "    <rpm:sourcerpm>{}</rpm:sourcerpm>\n",
                escape_text(sourcerpm)
            ));
        }
        xml.push_str(&format!(
            "    <rpm:header-range start=\"{}\" end=\"{}\"/>\n",
            m.header_start, m.header_end
        ));
        render_relations(&mut xml, "provides", &m.provides);
        render_relations(&mut xml, "requires", &m.requires);
        render_relations(&mut xml, "conflicts", &m.conflicts);
        render_relations(&mut xml, "obsoletes", &m.obsoletes);
        xml.push_str("  </format>\n");

        xml.push_str("</package>\n");
        xml
    }
}

fn render_relations(xml: &mut String, kind: &str, relations: &[Relation]) {
    if relations.is_empty() {
        return;
    }
    xml.push_str(&format!("    <rpm:{}>\n", kind));
    for relation in relations {
        xml.push_str(&format!(
            "      <rpm:entry name=\"{}\"",
            escape_attr(&relation.name)
        ));
        if let (Some(op), Some(evr)) = (relation.op(), relation.evr()) {
            xml.push_str(&format!(
                " flags=\"{}\" epoch=\"{}\" ver=\"{}\"",
                op,
                escape_attr(&evr.epoch),
                escape_attr(&evr.version)
            ));
            if let Some(ref release) = evr.release {
                xml.push_str(&format!(" rel=\"{}\"", escape_attr(release)));
            }
        }
        if kind == "requires" && relation.is_prereq() {
            xml.push_str(" pre=\"1\"");
        }
        xml.push_str("/>\n");
    }
    xml.push_str(&format!("    </rpm:{}>\n", kind));
}
