//! Fixtures for the image command tests.

use crate::config::Config;
use crate::context::{AppContext, VerbosityLevel};
use libctr::archive::add_ref_prefix;
use libctr::{Client, Digest, ImportOptions, Platform};
use std::io::Cursor;
use std::path::Path;

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

/// A `docker save` style archive of a one layer host image.
pub fn docker_archive(tags: &[&str]) -> Vec<u8> {
    let host = Platform::host();
    let layer = tar_of(&[("etc/os-release", b"ID=test\n")]);
    let config = serde_json::to_vec(&serde_json::json!({
        "os": host.os,
        "architecture": host.architecture,
        "rootfs": { "type": "layers", "diff_ids": [Digest::sha256_of(&layer).to_string()] },
    }))
    .unwrap();
    let manifest = serde_json::to_vec(&serde_json::json!([{
        "Config": "config.json",
        "RepoTags": tags,
        "Layers": ["layer.tar"],
    }]))
    .unwrap();
    tar_of(&[
        ("config.json", config.as_slice()),
        ("layer.tar", layer.as_slice()),
        ("manifest.json", manifest.as_slice()),
    ])
}

pub fn test_ctx(root: &Path) -> AppContext {
    let config = Config {
        root: root.to_path_buf(),
        snapshotter: "native".to_string(),
        ..Default::default()
    };
    AppContext::new(config, VerbosityLevel::Normal)
}

/// Opens a client on `root` holding the given tags, already imported.
pub async fn client_with(root: &Path, tags: &[&str]) -> Client {
    let client = test_ctx(root).client().await.unwrap();
    if !tags.is_empty() {
        let opts = ImportOptions {
            ref_translator: Some(add_ref_prefix("test")),
            ..Default::default()
        };
        client
            .import(Cursor::new(docker_archive(tags)), opts)
            .await
            .unwrap();
    }
    client
}

pub fn output(buf: Vec<u8>) -> String {
    String::from_utf8(buf).unwrap()
}
