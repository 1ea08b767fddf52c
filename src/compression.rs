//! Compression support for repository metadata documents.

use crate::Result;
use std::io::{Read, Write};

/// Supported compression formats for metadata documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression.
    None,
    /// Gzip compression.
    Gzip,
    /// Bzip2 compression.
    Bzip2,
}

impl Compression {
    /// Get the file extension for this compression format.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Bzip2 => ".bz2",
        }
    }

    /// Detect the compression format from a file name or storage key.
    pub fn from_path(path: &str) -> Compression {
        if path.ends_with(".gz") {
            Compression::Gzip
        } else if path.ends_with(".bz2") {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }

    /// Compress data using this compression format.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut compressed = Vec::new();
                let mut encoder =
                    flate2::write::GzEncoder::new(&mut compressed, flate2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?;
                Ok(compressed)
            }
            Compression::Bzip2 => {
                let mut compressed = Vec::new();
                let mut encoder =
                    bzip2::write::BzEncoder::new(&mut compressed, bzip2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?;
                Ok(compressed)
            }
        }
    }

    /// Decompress data using this compression format.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut decompressed = Vec::new();
                let mut decoder = flate2::read::GzDecoder::new(data);
                decoder.read_to_end(&mut decompressed)?;
                Ok(decompressed)
            }
            Compression::Bzip2 => {
                let mut decompressed = Vec::new();
                let mut decoder = bzip2::read::BzDecoder::new(data);
                decoder.read_to_end(&mut decompressed)?;
                Ok(decompressed)
            }
        }
    }

    /// Get all supported compression formats.
    pub fn all() -> &'static [Compression] {
        &[Compression::None, Compression::Gzip, Compression::Bzip2]
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Bzip2 => write!(f, "bzip2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_extensions() {
        assert_eq!(Compression::None.extension(), "");
        assert_eq!(Compression::Gzip.extension(), ".gz");
        assert_eq!(Compression::Bzip2.extension(), ".bz2");
    }

    #[test]
    fn test_from_path() {
        assert_eq!(
            Compression::from_path("repodata/primary.xml.gz"),
            Compression::Gzip
        );
        assert_eq!(
            Compression::from_path("repodata/filelists.xml.bz2"),
            Compression::Bzip2
        );
        assert_eq!(
            Compression::from_path("repodata/other.xml"),
            Compression::None
        );
    }

    #[test]
    fn test_no_compression_roundtrip() -> Result<()> {
        let data = b"<metadata packages=\"0\"/>";
        let compressed = Compression::None.compress(data)?;
        assert_eq!(compressed, data);
        assert_eq!(Compression::None.decompress(&compressed)?, data);
        Ok(())
    }

    #[test]
    fn test_gzip_roundtrip() -> Result<()> {
        let data = b"<metadata packages=\"0\"/>";
        let compressed = Compression::Gzip.compress(data)?;
        assert_ne!(compressed.as_slice(), data.as_slice());
        assert_eq!(Compression::Gzip.decompress(&compressed)?, data);
        Ok(())
    }

    #[test]
    fn test_gzip_deterministic() -> Result<()> {
        let data = b"<metadata packages=\"2\"/>";
        let first = Compression::Gzip.compress(data)?;
        let second = Compression::Gzip.compress(data)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_bzip2_roundtrip() -> Result<()> {
        let data = b"<metadata packages=\"0\"/>";
        let compressed = Compression::Bzip2.compress(data)?;
        assert_ne!(compressed.as_slice(), data.as_slice());
        assert_eq!(Compression::Bzip2.decompress(&compressed)?, data);
        Ok(())
    }

    #[test]
    fn test_all_compressions() {
        assert_eq!(Compression::all().len(), 3);
    }
}
