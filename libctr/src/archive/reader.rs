//! Reading image archives into the content store.
//!
//! Every regular file of the tar stream is written to the content store as
//! it is read. Once the stream ends the layout is recognized from its
//! metadata files and turned into a single index descriptor:
//!
//! * OCI layouts (`oci-layout`, `index.json`, `blobs/<alg>/<hex>`) are used
//!   as is, blob paths are verified against their names.
//! * Docker archives (`manifest.json`) get a Docker schema 2 manifest per
//!   entry and an index listing one descriptor per tag.

use crate::content::{ContentStore, Info, Provider};
use crate::digest::Digest;
use crate::error::{CtrError, Result};
use crate::oci::{self, ConfigSummary, Descriptor};
use crate::reference::Reference;
use flate2::Compression as GzLevel;
use flate2::read::GzEncoder;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Component, Path};
use std::str::FromStr;
use tar::{Archive, EntryType};
use tracing::debug;

const OCI_LAYOUT_FILE: &str = "oci-layout";
const OCI_INDEX_FILE: &str = "index.json";
const DOCKER_MANIFEST_FILE: &str = "manifest.json";
const DOCKER_REPOSITORIES_FILE: &str = "repositories";
const OCI_LAYOUT_VERSION: &str = "1.0.0";
const MAX_SYMLINK_HOPS: usize = 16;

const MEDIA_TYPE_OCI_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";

#[derive(Debug, Deserialize)]
struct OciLayout {
    #[serde(rename = "imageLayoutVersion")]
    version: String,
}

#[derive(Debug, Deserialize)]
struct DockerManifestEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "RepoTags", default)]
    repo_tags: Vec<String>,
    #[serde(rename = "Layers", default)]
    layers: Vec<String>,
}

#[derive(Debug, Default)]
struct ArchiveContents {
    blobs: HashMap<String, Info>,
    symlinks: HashMap<String, String>,
    oci_layout: Option<Vec<u8>>,
    oci_index: Option<Vec<u8>>,
    docker_manifest: Option<Vec<u8>>,
}

/// Reads an archive stream into `content` and returns the descriptor of
/// the index describing it.
pub fn import_index<R: Read>(content: &ContentStore, reader: R, compress: bool) -> Result<Descriptor> {
    let contents = read_archive(content, reader)?;

    if let Some(layout) = &contents.oci_layout {
        let layout: OciLayout = serde_json::from_slice(layout)
            .map_err(|e| CtrError::validation_with_source("failed to parse oci-layout", e))?;
        if layout.version != OCI_LAYOUT_VERSION {
            return Err(CtrError::unsupported(format!(
                "OCI layout version {:?}",
                layout.version
            )));
        }
    }

    match (&contents.docker_manifest, &contents.oci_index) {
        (Some(manifest), _) => import_docker(content, &contents, manifest, compress),
        (None, Some(index)) => import_oci(content, index),
        (None, None) => Err(CtrError::validation(
            "unrecognized image format: neither index.json nor manifest.json found",
        )),
    }
}

fn read_archive<R: Read>(content: &ContentStore, reader: R) -> Result<ArchiveContents> {
    let failed = |e: std::io::Error| CtrError::validation_with_source("failed to read archive", e);
    let mut archive = Archive::new(reader);
    let mut contents = ArchiveContents::default();

    for entry in archive.entries().map_err(failed)? {
        let mut entry = entry.map_err(failed)?;
        let raw = entry.path().map_err(failed)?.into_owned();
        let Some(name) = clean_path(&raw) else {
            debug!("skipping archive entry {}", raw.display());
            continue;
        };

        match entry.header().entry_type() {
            EntryType::Symlink => {
                if let Some(link) = entry.link_name().map_err(failed)? {
                    let parent = Path::new(&name).parent().unwrap_or(Path::new(""));
                    if let Some(target) = clean_path(&parent.join(link)) {
                        contents.symlinks.insert(name, target);
                    }
                }
                continue;
            }
            EntryType::Regular | EntryType::Continuous => {}
            _ => continue,
        }

        let is_metadata = matches!(
            name.as_str(),
            OCI_LAYOUT_FILE | OCI_INDEX_FILE | DOCKER_MANIFEST_FILE | DOCKER_REPOSITORIES_FILE
        );
        if !is_metadata {
            let info = write_entry(content, &name, &mut entry)?;
            contents.blobs.insert(name, info);
            continue;
        }

        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).map_err(failed)?;
        match name.as_str() {
            OCI_LAYOUT_FILE => contents.oci_layout = Some(buf),
            OCI_INDEX_FILE => contents.oci_index = Some(buf),
            DOCKER_MANIFEST_FILE => contents.docker_manifest = Some(buf),
            _ => {}
        }
    }
    Ok(contents)
}

fn write_entry<R: Read>(content: &ContentStore, name: &str, entry: &mut tar::Entry<'_, R>) -> Result<Info> {
    let size = entry.size();
    // blobs/<alg>/<hex> names its own digest
    let expected = name
        .strip_prefix("blobs/")
        .and_then(|rest| rest.split_once('/'))
        .and_then(|(alg, hex)| Digest::from_str(&format!("{}:{}", alg, hex)).ok());
    match &expected {
        Some(digest) => content.write_blob(entry, Some((digest, size))),
        None => content.write_blob(entry, None),
    }
}

/// Normalizes an archive path to `a/b/c`, `None` when it escapes the root
/// or names the root itself.
pub(super) fn clean_path(path: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(p) => parts.push(p.to_string_lossy().to_string()),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn import_oci(content: &ContentStore, index: &[u8]) -> Result<Descriptor> {
    let value: serde_json::Value = serde_json::from_slice(index)
        .map_err(|e| CtrError::validation_with_source("failed to parse index.json", e))?;
    if value.get("manifests").is_none() {
        return Err(CtrError::validation("index.json has no manifests"));
    }
    let media_type = value
        .get("mediaType")
        .and_then(|v| v.as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or(oci::MEDIA_TYPE_OCI_INDEX)
        .to_string();
    let info = content.write_bytes(index)?;
    oci::new_descriptor(&media_type, &info.digest, info.size, None)
}

fn resolve_link<'a>(contents: &'a ArchiveContents, name: &str) -> Option<&'a Info> {
    let mut current = name.to_string();
    for _ in 0..MAX_SYMLINK_HOPS {
        if let Some(info) = contents.blobs.get(&current) {
            return Some(info);
        }
        current = contents.symlinks.get(&current)?.clone();
    }
    None
}

fn import_docker(
    content: &ContentStore,
    contents: &ArchiveContents,
    manifest: &[u8],
    compress: bool,
) -> Result<Descriptor> {
    let entries: Vec<DockerManifestEntry> = serde_json::from_slice(manifest)
        .map_err(|e| CtrError::validation_with_source("failed to parse manifest.json", e))?;

    let mut manifests: Vec<Descriptor> = Vec::new();
    for entry in &entries {
        let config_info = resolve_link(contents, &entry.config).ok_or_else(|| {
            CtrError::not_found("image config", entry.config.clone())
        })?;
        let config = oci::new_descriptor(
            oci::MEDIA_TYPE_DOCKER_CONFIG,
            &config_info.digest,
            config_info.size,
            None,
        )?;

        let mut layers = Vec::with_capacity(entry.layers.len());
        for layer in &entry.layers {
            let info = resolve_link(contents, layer)
                .ok_or_else(|| CtrError::not_found("layer", layer.clone()))?;
            layers.push(layer_descriptor(content, info, compress)?);
        }

        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": oci::MEDIA_TYPE_DOCKER_MANIFEST,
            "config": config,
            "layers": layers,
        });
        let info = content.write_bytes(&serde_json::to_vec(&body)?)?;
        let mut desc = oci::new_descriptor(oci::MEDIA_TYPE_DOCKER_MANIFEST, &info.digest, info.size, None)?;

        let summary = ConfigSummary::from_bytes(&content.read_blob(&config)?)?;
        if !summary.os.is_empty() {
            desc = oci::with_platform(&desc, &summary.platform())?;
        }

        if entry.repo_tags.is_empty() {
            manifests.push(desc);
            continue;
        }
        for tag in &entry.repo_tags {
            let reference = Reference::from_str(tag)?;
            let annotations = HashMap::from([
                (oci::ANNOTATION_IMAGE_NAME.to_string(), reference.normalized()),
                (oci::ANNOTATION_REF_NAME.to_string(), reference.object_name()),
            ]);
            let mut tagged = desc.clone();
            tagged.set_annotations(Some(annotations));
            manifests.push(tagged);
        }
    }

    let index = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": oci::MEDIA_TYPE_OCI_INDEX,
        "manifests": manifests,
    });
    let info = content.write_bytes(&serde_json::to_vec(&index)?)?;
    debug!("converted docker archive with {} manifests", manifests.len());
    oci::new_descriptor(oci::MEDIA_TYPE_OCI_INDEX, &info.digest, info.size, None)
}

fn layer_descriptor(content: &ContentStore, info: &Info, compress: bool) -> Result<Descriptor> {
    let mut magic = [0u8; 4];
    let read = {
        let mut blob = content.open_blob(&info.digest)?;
        let mut filled = 0;
        while filled < magic.len() {
            match blob.read(&mut magic[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    return Err(CtrError::io(
                        "failed to read layer",
                        content.blob_path(&info.digest),
                        e,
                    ));
                }
            }
        }
        filled
    };
    let head = &magic[..read];

    if head.starts_with(&[0x1f, 0x8b]) {
        return oci::new_descriptor(oci::MEDIA_TYPE_DOCKER_LAYER_GZIP, &info.digest, info.size, None);
    }
    if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        return oci::new_descriptor(MEDIA_TYPE_OCI_LAYER_ZSTD, &info.digest, info.size, None);
    }
    if !compress {
        return oci::new_descriptor(oci::MEDIA_TYPE_DOCKER_LAYER, &info.digest, info.size, None);
    }

    let blob = content.open_blob(&info.digest)?;
    let compressed = content.write_blob(GzEncoder::new(blob, GzLevel::default()), None)?;
    debug!("compressed layer {} to {}", info.digest, compressed.digest);
    oci::new_descriptor(
        oci::MEDIA_TYPE_DOCKER_LAYER_GZIP,
        &compressed.digest,
        compressed.size,
        None,
    )
}
