//! Builders for images and archives used across unit tests.

use crate::content::ContentStore;
use crate::digest::Digest;
use crate::oci::{self, Descriptor};
use crate::platform::Platform;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::io::Write;

/// A platform nothing in the test suite runs on.
pub fn foreign_platform() -> Platform {
    Platform::new("plan9", "mips64", None)
}

pub fn tar_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Blobs making up one single platform image.
#[derive(Debug, Clone)]
pub struct ImageBlobs {
    pub config: Vec<u8>,
    pub layers: Vec<Vec<u8>>,
    pub layer_media_type: String,
    pub diff_ids: Vec<Digest>,
    pub manifest: Vec<u8>,
    pub manifest_desc: Descriptor,
}

impl ImageBlobs {
    /// Builds an image whose layers each hold the given files, gzip
    /// compressed.
    pub fn new(platform: &Platform, layers: &[&[(&str, &[u8])]]) -> Self {
        Self::with_layer_type(platform, layers, "application/vnd.oci.image.layer.v1.tar+gzip", true)
    }

    pub fn with_layer_type(
        platform: &Platform,
        layers: &[&[(&str, &[u8])]],
        media_type: &str,
        compress: bool,
    ) -> Self {
        let mut blobs = Vec::new();
        let mut diff_ids = Vec::new();
        for files in layers {
            let tar = tar_of(files);
            diff_ids.push(Digest::sha256_of(&tar));
            blobs.push(if compress { gzip(&tar) } else { tar });
        }
        let config = serde_json::to_vec(&serde_json::json!({
            "os": platform.os,
            "architecture": platform.architecture,
            "rootfs": {
                "type": "layers",
                "diff_ids": diff_ids.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            },
        }))
        .unwrap();
        let config_desc = oci::new_descriptor(
            oci::MEDIA_TYPE_OCI_CONFIG,
            &Digest::sha256_of(&config),
            config.len() as u64,
            None,
        )
        .unwrap();
        let layer_descs: Vec<Descriptor> = blobs
            .iter()
            .map(|b| {
                oci::new_descriptor(media_type, &Digest::sha256_of(b), b.len() as u64, None).unwrap()
            })
            .collect();
        let manifest = serde_json::to_vec(&serde_json::json!({
            "schemaVersion": 2,
            "mediaType": oci::MEDIA_TYPE_OCI_MANIFEST,
            "config": config_desc,
            "layers": layer_descs,
        }))
        .unwrap();
        let manifest_desc = oci::new_descriptor(
            oci::MEDIA_TYPE_OCI_MANIFEST,
            &Digest::sha256_of(&manifest),
            manifest.len() as u64,
            None,
        )
        .unwrap();
        Self {
            config,
            layers: blobs,
            layer_media_type: media_type.to_string(),
            diff_ids,
            manifest,
            manifest_desc,
        }
    }

    /// Manifest descriptor as an index entry for `platform`.
    pub fn entry(&self, platform: &Platform, ref_name: Option<&str>) -> Descriptor {
        let mut desc = oci::with_platform(&self.manifest_desc, platform).unwrap();
        if let Some(name) = ref_name {
            desc.set_annotations(Some(HashMap::from([(
                oci::ANNOTATION_REF_NAME.to_string(),
                name.to_string(),
            )])));
        }
        desc
    }

    /// Writes every blob to the store.
    pub fn store(&self, content: &ContentStore) {
        content.write_bytes(&self.config).unwrap();
        for layer in &self.layers {
            content.write_bytes(layer).unwrap();
        }
        content.write_bytes(&self.manifest).unwrap();
    }

    /// Every blob with its `blobs/sha256/<hex>` archive path.
    pub fn layout_files(&self) -> Vec<(String, Vec<u8>)> {
        let mut out = vec![blob_file(&self.config), blob_file(&self.manifest)];
        out.extend(self.layers.iter().map(|l| blob_file(l)));
        out
    }
}

fn blob_file(data: &[u8]) -> (String, Vec<u8>) {
    let digest = Digest::sha256_of(data);
    (format!("blobs/sha256/{}", digest.encoded()), data.to_vec())
}

pub fn index_bytes(entries: &[Descriptor]) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": oci::MEDIA_TYPE_OCI_INDEX,
        "manifests": entries,
    }))
    .unwrap()
}

/// Writes an index over `entries` and returns its descriptor.
pub fn store_index(content: &ContentStore, entries: &[Descriptor]) -> Descriptor {
    let info = content.write_bytes(&index_bytes(entries)).unwrap();
    oci::new_descriptor(oci::MEDIA_TYPE_OCI_INDEX, &info.digest, info.size, None).unwrap()
}

/// An OCI layout archive holding `images` listed by `entries`.
pub fn oci_archive(images: &[&ImageBlobs], entries: &[Descriptor]) -> Vec<u8> {
    let mut files: Vec<(String, Vec<u8>)> = vec![
        (
            "oci-layout".to_string(),
            br#"{"imageLayoutVersion":"1.0.0"}"#.to_vec(),
        ),
        ("index.json".to_string(), index_bytes(entries)),
    ];
    for image in images {
        files.extend(image.layout_files());
    }
    let refs: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(n, d)| (n.as_str(), d.as_slice()))
        .collect();
    tar_of(&refs)
}

/// A `docker save` style archive with one image.
pub fn docker_archive(platform: &Platform, layer_files: &[(&str, &[u8])], tags: &[&str]) -> Vec<u8> {
    let layer = tar_of(layer_files);
    let diff_id = Digest::sha256_of(&layer);
    let config = serde_json::to_vec(&serde_json::json!({
        "os": platform.os,
        "architecture": platform.architecture,
        "rootfs": { "type": "layers", "diff_ids": [diff_id.to_string()] },
    }))
    .unwrap();
    let config_name = format!("{}.json", Digest::sha256_of(&config).encoded());
    let layer_name = format!("{}/layer.tar", diff_id.encoded());
    let manifest = serde_json::to_vec(&serde_json::json!([{
        "Config": config_name,
        "RepoTags": tags,
        "Layers": [layer_name],
    }]))
    .unwrap();
    tar_of(&[
        (config_name.as_str(), config.as_slice()),
        (layer_name.as_str(), layer.as_slice()),
        ("manifest.json", manifest.as_slice()),
    ])
}
