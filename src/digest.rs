//! Cryptographic digest support for RPM repository metadata.

use crate::{Result, RpmRepositoryError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Supported digest algorithms for repository metadata.
///
/// The string representations are the `type` attribute values used in
/// checksum elements of the generated documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Digest {
    /// MD5 hash algorithm.
    Md5,
    /// SHA-1 hash algorithm.
    Sha1,
    /// SHA-256 hash algorithm.
    Sha256,
}

impl Digest {
    /// Get the string representation used in checksum elements.
    pub fn as_str(&self) -> &'static str {
        match self {
            Digest::Md5 => "md5",
            Digest::Sha1 => "sha1",
            Digest::Sha256 => "sha256",
        }
    }

    /// Get all supported digest algorithms.
    pub fn all() -> &'static [Digest] {
        &[Digest::Md5, Digest::Sha1, Digest::Sha256]
    }

    /// Compute the hex-encoded digest of the given bytes.
    pub fn hex(&self, data: &[u8]) -> String {
        let mut hasher = Hasher::new(*self);
        hasher.update(data);
        hasher.finalize()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Digest::Sha256
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Digest {
    type Err = RpmRepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "md5" => Ok(Digest::Md5),
            "sha1" | "sha" => Ok(Digest::Sha1),
            "sha256" => Ok(Digest::Sha256),
            other => Err(RpmRepositoryError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// An incremental digest calculator for a single algorithm.
pub struct Hasher {
    state: HasherState,
    size: u64,
}

enum HasherState {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

impl Hasher {
    /// Create a new hasher for the given algorithm.
    pub fn new(algorithm: Digest) -> Self {
        let state = match algorithm {
            Digest::Md5 => HasherState::Md5(md5::Context::new()),
            Digest::Sha1 => {
                use sha1::Digest;
                HasherState::Sha1(sha1::Sha1::new())
            }
            Digest::Sha256 => {
                use sha2::Digest;
                HasherState::Sha256(sha2::Sha256::new())
            }
        };
        Self { state, size: 0 }
    }

    /// Update the digest with the given data.
    pub fn update(&mut self, data: &[u8]) {
        self.size += data.len() as u64;
        match self.state {
            HasherState::Md5(ref mut ctx) => ctx.consume(data),
            HasherState::Sha1(ref mut ctx) => {
                use sha1::Digest;
                ctx.update(data);
            }
            HasherState::Sha256(ref mut ctx) => {
                use sha2::Digest;
                ctx.update(data);
            }
        }
    }

    /// Finalize the digest and return the hex-encoded result.
    pub fn finalize(self) -> String {
        match self.state {
            HasherState::Md5(ctx) => format!("{:x}", ctx.compute()),
            HasherState::Sha1(ctx) => {
                use sha1::Digest;
                hex::encode(ctx.finalize())
            }
            HasherState::Sha256(ctx) => {
                use sha2::Digest;
                hex::encode(ctx.finalize())
            }
        }
    }

    /// Get the number of bytes consumed so far.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_str() {
        assert_eq!(Digest::Md5.as_str(), "md5");
        assert_eq!(Digest::Sha1.as_str(), "sha1");
        assert_eq!(Digest::Sha256.as_str(), "sha256");
    }

    #[test]
    fn test_digest_from_str() {
        assert_eq!("md5".parse::<Digest>().unwrap(), Digest::Md5);
        assert_eq!("sha1".parse::<Digest>().unwrap(), Digest::Sha1);
        assert_eq!("sha256".parse::<Digest>().unwrap(), Digest::Sha256);
        assert!("sha512".parse::<Digest>().is_err());
        assert!("".parse::<Digest>().is_err());
    }

    #[test]
    fn test_default_is_sha256() {
        assert_eq!(Digest::default(), Digest::Sha256);
    }

    #[test]
    fn test_known_vectors() {
        let data = b"hello world";
        assert_eq!(Digest::Md5.hex(data), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(
            Digest::Sha1.hex(data),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(
            Digest::Sha256.hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(Digest::Md5.hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            Digest::Sha256.hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = Hasher::new(Digest::Sha256);
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.size(), 11);
        assert_eq!(hasher.finalize(), Digest::Sha256.hex(b"hello world"));
    }

    #[test]
    fn test_hasher_write() {
        let mut hasher = Hasher::new(Digest::Md5);
        std::io::copy(&mut &b"hello world"[..], &mut hasher).unwrap();
        assert_eq!(hasher.finalize(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }
}
