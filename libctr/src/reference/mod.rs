//! Image reference parsing and normalization.
//!
//! This module provides a wrapper around the `oci_spec::distribution::Reference`
//! type to integrate with libctr's error handling. It is used to turn the
//! familiar names found in `docker save` archives (`busybox`,
//! `user/app:1.0`) into fully qualified image names.

use crate::error::{CtrError, Result};
use oci_spec::distribution::Reference as OciReference;
use std::fmt;
use std::str::FromStr;


const DEFAULT_TAG: &str = "latest";

/// Represents an image reference, wrapping `oci_spec::distribution::Reference`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference(OciReference);

impl FromStr for Reference {
    type Err = CtrError;

    fn from_str(s: &str) -> Result<Self> {
        let oci_reference = OciReference::from_str(s).map_err(|e| {
            CtrError::validation_with_source(format!("invalid image reference {:?}", s), e)
        })?;
        Ok(Reference(oci_reference))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl Reference {
    /// Returns the registry part of the reference.
    pub fn registry(&self) -> &str {
        self.0.registry()
    }

    /// Returns the repository part of the reference.
    pub fn repository(&self) -> &str {
        self.0.repository()
    }

    /// Returns the tag, `latest` when neither tag nor digest was given.
    pub fn tag(&self) -> Option<&str> {
        match (self.0.tag(), self.0.digest()) {
            (Some(tag), _) => Some(tag),
            (None, None) => Some(DEFAULT_TAG),
            (None, Some(_)) => None,
        }
    }

    /// Returns the digest part of the reference, if present.
    pub fn digest(&self) -> Option<&str> {
        self.0.digest()
    }

    /// The fully qualified form: `registry/repository[:tag][@digest]`.
    pub fn normalized(&self) -> String {
        let mut out = format!("{}/{}", self.registry(), self.repository());
        out.push_str(&self.object());
        out
    }

    /// The part after the repository: `tag`, `tag@digest` or `@digest`.
    pub fn object_name(&self) -> String {
        self.object().trim_start_matches(':').to_string()
    }

    fn object(&self) -> String {
        let mut out = String::new();
        if let Some(tag) = self.tag() {
            out.push(':');
            out.push_str(tag);
        }
        if let Some(digest) = self.digest() {
            out.push('@');
            out.push_str(digest);
        }
        out
    }
}

/// Normalizes a familiar image name into its fully qualified form.
///
/// # Examples
///
/// ```
/// use libctr::reference::normalize;
///
/// assert_eq!(normalize("busybox").unwrap(), "docker.io/library/busybox:latest");
/// ```
pub fn normalize(name: &str) -> Result<String> {
    Ok(Reference::from_str(name)?.normalized())
}
