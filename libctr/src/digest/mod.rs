//! OCI Content Digest validation and computation.
//!
//! This module provides a wrapper around the `oci_spec::image::Digest` type
//! to integrate with libctr's error handling, plus the streaming sha256
//! hasher used when content is written to the store.

use crate::error::{CtrError, Result};
use oci_spec::image::Digest as OciDigest;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;


/// Represents a validated content digest such as `sha256:<hex>`.
///
/// Parsing goes through `oci_spec::image::Digest`, the string form is kept so
/// digests can be hashed, ordered and used as map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl FromStr for Digest {
    type Err = CtrError;

    fn from_str(s: &str) -> Result<Self> {
        let oci_digest = OciDigest::from_str(s).map_err(|e| {
            CtrError::validation_with_source(format!("invalid digest {:?}", s), e)
        })?;
        Ok(Digest(oci_digest.to_string()))
    }
}

impl TryFrom<String> for Digest {
    type Error = CtrError;

    fn try_from(s: String) -> Result<Self> {
        Digest::from_str(&s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.0
    }
}

impl From<&OciDigest> for Digest {
    fn from(d: &OciDigest) -> Self {
        Digest(d.to_string())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Digest {
    /// Computes the sha256 digest of `data`.
    ///
    /// # Examples
    ///
    /// ```
    /// use libctr::Digest;
    ///
    /// let d = Digest::sha256_of(b"");
    /// assert_eq!(
    ///     d.to_string(),
    ///     "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    /// );
    /// ```
    pub fn sha256_of(data: &[u8]) -> Self {
        Self::from_sha256_bytes(&Sha256::digest(data))
    }

    fn from_sha256_bytes(bytes: &[u8]) -> Self {
        Digest(format!("sha256:{}", hex::encode(bytes)))
    }

    /// Returns the algorithm part (`sha256`).
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(alg, _)| alg).unwrap_or_default()
    }

    /// Returns the hex encoded part.
    pub fn encoded(&self) -> &str {
        self.0.split_once(':').map(|(_, hex)| hex).unwrap_or_default()
    }

    /// Converts into the `oci_spec` digest used by descriptors.
    pub fn to_oci(&self) -> Result<OciDigest> {
        OciDigest::from_str(&self.0).map_err(|e| {
            CtrError::validation_with_source(format!("invalid digest {:?}", self.0), e)
        })
    }
}

/// Streaming sha256 hasher that also counts bytes.
///
/// Implements [`Write`] so it can sit behind `io::copy` or be teed with a
/// file writer.
#[derive(Default)]
pub struct Digester {
    hasher: Sha256,
    size: u64,
}

impl Digester {
    /// Creates an empty digester.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `data` into the hash.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.size += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Consumes the digester and returns the digest.
    pub fn finish(self) -> Digest {
        Digest::from_sha256_bytes(&self.hasher.finalize())
    }
}

impl Write for Digester {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Digester").field("size", &self.size).finish()
    }
}
