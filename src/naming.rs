//! Naming policy for published metadata documents.

use crate::digest::Digest;
use serde::{Deserialize, Serialize};

/// How published documents are named under `repodata/`.
///
/// Digest-prefixed names make every published document unique, so a
/// client that fetched an older manifest keeps resolving the documents
/// it references while a newer revision is being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamingPolicy {
    /// Keep the plain name, e.g. `primary.xml.gz`.
    Plain,
    /// Prefix the plain name with a digest of the final bytes,
    /// e.g. `<hex>-primary.xml.gz`.
    HashPrefixed(Digest),
}

impl NamingPolicy {
    /// The published file name for a document with the given plain name
    /// and final bytes.
    pub fn filename(&self, plain: &str, data: &[u8]) -> String {
        match self {
            NamingPolicy::Plain => plain.to_string(),
            NamingPolicy::HashPrefixed(digest) => {
                format!("{}-{}", digest.hex(data), plain)
            }
        }
    }
}

impl Default for NamingPolicy {
    fn default() -> Self {
        NamingPolicy::HashPrefixed(Digest::Sha256)
    }
}
