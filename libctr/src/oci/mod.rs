//! OCI specification data structures.
//!
//! This module re-exports the necessary data structures from the `oci-spec`
//! crate to provide a single, consistent source for OCI types within
//! `libctr`, and adds the Docker schema 2 media types images imported from
//! `docker save` archives carry.

pub use oci_spec::image::{Descriptor, DescriptorBuilder, ImageIndex, ImageManifest, MediaType};

use crate::digest::Digest;
use crate::error::{CtrError, Result};
use crate::platform::Platform;
use serde::Deserialize;
use std::collections::HashMap;


/// OCI image index media type
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
/// OCI image manifest media type
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image config media type
pub const MEDIA_TYPE_OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
/// Docker schema 2 manifest list media type
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
/// Docker schema 2 manifest media type
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker image config media type
pub const MEDIA_TYPE_DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
/// Docker uncompressed layer media type
pub const MEDIA_TYPE_DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar";
/// Docker gzip layer media type
pub const MEDIA_TYPE_DOCKER_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Annotation holding the full image name an index entry should be stored as
pub const ANNOTATION_IMAGE_NAME: &str = "io.containerd.image.name";
/// OCI annotation holding the (possibly partial) reference of an index entry
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

/// Returns true for index and manifest list media types.
pub fn is_index(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_OCI_INDEX || media_type == MEDIA_TYPE_DOCKER_MANIFEST_LIST
}

/// Returns true for single platform manifest media types.
pub fn is_manifest(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_OCI_MANIFEST || media_type == MEDIA_TYPE_DOCKER_MANIFEST
}

/// Returns true for image config media types.
pub fn is_config(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_OCI_CONFIG || media_type == MEDIA_TYPE_DOCKER_CONFIG
}

/// Layer compression as encoded in the media type suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain tar
    Uncompressed,
    /// gzip compressed tar
    Gzip,
    /// zstd compressed tar
    Zstd,
}

/// Parsed layer media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerType {
    /// Compression applied to the tar stream
    pub compression: Compression,
    /// Whether the blob is encrypted
    pub encrypted: bool,
}

/// Classifies a layer media type, `None` for anything that is not a layer.
pub fn layer_type(media_type: &str) -> Option<LayerType> {
    let (base, encrypted) = match media_type.strip_suffix("+encrypted") {
        Some(base) => (base, true),
        None => (media_type, false),
    };
    let compression = match base {
        "application/vnd.oci.image.layer.v1.tar"
        | "application/vnd.oci.image.layer.nondistributable.v1.tar"
        | MEDIA_TYPE_DOCKER_LAYER => Compression::Uncompressed,
        "application/vnd.oci.image.layer.v1.tar+gzip"
        | "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip"
        | MEDIA_TYPE_DOCKER_LAYER_GZIP
        | "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip" => Compression::Gzip,
        "application/vnd.oci.image.layer.v1.tar+zstd" => Compression::Zstd,
        _ => return None,
    };
    Some(LayerType {
        compression,
        encrypted,
    })
}

/// Represents either a single-platform image manifest or a multi-platform image index.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ManifestOrIndex {
    /// A single-platform image manifest
    Manifest(ImageManifest),
    /// A multi-platform image index
    Index(ImageIndex),
}

impl ManifestOrIndex {
    /// Parses a blob whose descriptor says it is a manifest or index.
    ///
    /// Returns `Ok(None)` for descriptors of other media types (configs,
    /// layers), which have no children.
    pub fn from_descriptor_bytes(media_type: &str, bytes: &[u8]) -> Result<Option<Self>> {
        if is_index(media_type) {
            let index: ImageIndex = serde_json::from_slice(bytes)
                .map_err(|e| CtrError::validation_with_source("failed to parse image index", e))?;
            Ok(Some(ManifestOrIndex::Index(index)))
        } else if is_manifest(media_type) {
            let manifest: ImageManifest = serde_json::from_slice(bytes).map_err(|e| {
                CtrError::validation_with_source("failed to parse image manifest", e)
            })?;
            Ok(Some(ManifestOrIndex::Manifest(manifest)))
        } else {
            Ok(None)
        }
    }

    /// Parse manifest bytes, automatically detecting whether it's a Manifest or Index.
    ///
    /// Used for documents that arrive without a descriptor, such as the
    /// `index.json` of an OCI layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| CtrError::validation_with_source("failed to parse manifest JSON", e))?;

        let media_type = value
            .get("mediaType")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        if let Some(parsed) = Self::from_descriptor_bytes(media_type, bytes)? {
            return Ok(parsed);
        }

        if value.get("manifests").is_some() {
            let index: ImageIndex = serde_json::from_slice(bytes)
                .map_err(|e| CtrError::validation_with_source("failed to parse image index", e))?;
            Ok(ManifestOrIndex::Index(index))
        } else if value.get("layers").is_some() || value.get("config").is_some() {
            let manifest: ImageManifest = serde_json::from_slice(bytes).map_err(|e| {
                CtrError::validation_with_source("failed to parse image manifest", e)
            })?;
            Ok(ManifestOrIndex::Manifest(manifest))
        } else {
            Err(CtrError::validation(
                "unable to determine if content is a manifest or index",
            ))
        }
    }

    /// Returns the child descriptors: index manifests, or manifest config then layers.
    pub fn children(&self) -> Vec<Descriptor> {
        match self {
            ManifestOrIndex::Index(index) => index.manifests().clone(),
            ManifestOrIndex::Manifest(manifest) => {
                let mut out = Vec::with_capacity(manifest.layers().len() + 1);
                out.push(manifest.config().clone());
                out.extend(manifest.layers().iter().cloned());
                out
            }
        }
    }
}

/// The parts of an image config this crate looks at.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSummary {
    /// Target operating system
    #[serde(default)]
    pub os: String,
    /// Target architecture
    #[serde(default)]
    pub architecture: String,
    /// Architecture variant
    #[serde(default)]
    pub variant: Option<String>,
    /// Root filesystem description
    #[serde(default)]
    pub rootfs: RootFs,
}

/// Root filesystem section of an image config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootFs {
    /// Uncompressed layer digests, bottom layer first
    #[serde(default)]
    pub diff_ids: Vec<String>,
}

impl ConfigSummary {
    /// Parses a config blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CtrError::validation_with_source("failed to parse image config", e))
    }

    /// The normalized platform the config was built for.
    pub fn platform(&self) -> Platform {
        Platform::new(&self.os, &self.architecture, self.variant.as_deref())
    }

    /// The diff ids as validated digests.
    pub fn diff_ids(&self) -> Result<Vec<Digest>> {
        self.rootfs.diff_ids.iter().map(|d| d.parse()).collect()
    }
}

/// Returns the descriptor digest in libctr form.
pub fn descriptor_digest(desc: &Descriptor) -> Digest {
    Digest::from(desc.digest())
}

/// Returns the descriptor media type as a string.
pub fn descriptor_media_type(desc: &Descriptor) -> String {
    desc.media_type().to_string()
}

/// Returns the normalized platform recorded on a descriptor, if any.
pub fn descriptor_platform(desc: &Descriptor) -> Option<Platform> {
    desc.platform().as_ref().map(Platform::from)
}

/// Looks up an annotation on a descriptor.
pub fn annotation<'a>(desc: &'a Descriptor, key: &str) -> Option<&'a str> {
    desc.annotations()
        .as_ref()
        .and_then(|a: &HashMap<String, String>| a.get(key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Returns a copy of `desc` carrying `platform`.
pub fn with_platform(desc: &Descriptor, platform: &Platform) -> Result<Descriptor> {
    let mut value = serde_json::to_value(desc)?;
    let mut spec = serde_json::json!({
        "os": platform.os,
        "architecture": platform.architecture,
    });
    if let Some(variant) = &platform.variant {
        spec["variant"] = serde_json::Value::String(variant.clone());
    }
    value["platform"] = spec;
    Ok(serde_json::from_value(value)?)
}

/// Builds a descriptor from its parts.
pub fn new_descriptor(
    media_type: &str,
    digest: &Digest,
    size: u64,
    annotations: Option<HashMap<String, String>>,
) -> Result<Descriptor> {
    let mut desc = DescriptorBuilder::default()
        .media_type(MediaType::from(media_type))
        .digest(digest.to_oci()?)
        .size(size)
        .build()?;
    desc.set_annotations(annotations);
    Ok(desc)
}
