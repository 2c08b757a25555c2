//! Unpacking image layers into directory snapshots.
//!
//! Each layer becomes one snapshot keyed by its chain id, stacked on the
//! snapshot of the layers below it:
//!
//! ```text
//! <root>/snapshots/<snapshotter>/
//! └── <chain id hex>/
//!     ├── fs/             (the layer's changes)
//!     └── snapshot.json   (parent, layer digest, diff id)
//! ```
//!
//! Snapshots are committed by renaming a fully extracted temp directory, so
//! a snapshot directory with a record is always complete.

use crate::content::{ContentStore, Provider};
use crate::digest::{Digest, Digester};
use crate::encryption::DecryptConfig;
use crate::error::{CtrError, Result};
use crate::images::resolve;
use crate::oci::{self, Compression, ConfigSummary, Descriptor};
use crate::platform::PlatformMatcher;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, info};


/// Snapshotter used when none is configured.
pub const DEFAULT_SNAPSHOTTER: &str = "overlayfs";

const SNAPSHOT_RECORD: &str = "snapshot.json";

/// Computes the chain ids of a layer stack.
///
/// The first chain id is the first diff id; every following one is the
/// sha256 of `"<parent chain id> <diff id>"`.
pub fn chain_ids(diff_ids: &[Digest]) -> Vec<Digest> {
    let mut out: Vec<Digest> = Vec::with_capacity(diff_ids.len());
    for diff_id in diff_ids {
        let next = match out.last() {
            None => diff_id.clone(),
            Some(parent) => Digest::sha256_of(format!("{} {}", parent, diff_id).as_bytes()),
        };
        out.push(next);
    }
    out
}

/// Record stored next to every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Chain id naming the snapshot
    pub chain_id: Digest,
    /// Chain id of the snapshot below, `None` for the base layer
    pub parent: Option<Digest>,
    /// Digest of the layer blob that was applied
    pub layer: Digest,
    /// Digest of the uncompressed layer
    pub diff_id: Digest,
    /// When the snapshot was committed
    pub created_at: DateTime<Utc>,
}

/// A named set of directory snapshots.
#[derive(Debug, Clone)]
pub struct Snapshotter {
    name: String,
    root: PathBuf,
}

impl Snapshotter {
    /// Opens the snapshotter `name` under the snapshots root.
    pub fn open<P: AsRef<Path>>(snapshots_root: P, name: &str) -> Result<Self> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.chars().any(char::is_whitespace)
        {
            return Err(CtrError::invalid_argument(format!(
                "invalid snapshotter name {:?}",
                name
            )));
        }
        let root = snapshots_root.as_ref().join(name);
        fs::create_dir_all(&root)
            .map_err(|e| CtrError::io("failed to create snapshotter directory", &root, e))?;
        Ok(Self {
            name: name.to_string(),
            root,
        })
    }

    /// Snapshotter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory of the snapshot for `chain_id`.
    pub fn path(&self, chain_id: &Digest) -> PathBuf {
        self.root.join(chain_id.encoded())
    }

    /// True when a committed snapshot exists for `chain_id`.
    pub fn exists(&self, chain_id: &Digest) -> bool {
        self.path(chain_id).join(SNAPSHOT_RECORD).is_file()
    }

    /// Reads the record of a committed snapshot.
    pub fn stat(&self, chain_id: &Digest) -> Result<SnapshotInfo> {
        let path = self.path(chain_id).join(SNAPSHOT_RECORD);
        let data = fs::read(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CtrError::not_found("snapshot", chain_id.to_string())
            } else {
                CtrError::io("failed to read snapshot record", &path, e)
            }
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Lists committed snapshots, ordered by chain id.
    pub fn list(&self) -> Result<Vec<SnapshotInfo>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| CtrError::io("failed to read snapshots", &self.root, e))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CtrError::io("failed to read snapshots", &self.root, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(chain_id) = format!("sha256:{}", name).parse::<Digest>() else {
                continue;
            };
            if self.exists(&chain_id) {
                out.push(self.stat(&chain_id)?);
            }
        }
        out.sort_by(|a, b| a.chain_id.cmp(&b.chain_id));
        Ok(out)
    }

    /// Extracts `layer` on top of `parent` and commits it as `chain_id`.
    fn apply(
        &self,
        content: &ContentStore,
        layer: &Descriptor,
        compression: Compression,
        diff_id: &Digest,
        chain_id: &Digest,
        parent: Option<&Digest>,
    ) -> Result<()> {
        let layer_digest = oci::descriptor_digest(layer);
        let tmp = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(&self.root)
            .map_err(|e| CtrError::io("failed to create snapshot directory", &self.root, e))?;
        let fs_dir = tmp.path().join("fs");
        fs::create_dir_all(&fs_dir)
            .map_err(|e| CtrError::io("failed to create snapshot directory", &fs_dir, e))?;

        let blob = content.open_blob(&layer_digest)?;
        let mut reader = DigestReader::new(match compression {
            Compression::Gzip => Box::new(GzDecoder::new(blob)) as Box<dyn Read>,
            Compression::Uncompressed => Box::new(blob),
            Compression::Zstd => {
                return Err(CtrError::unsupported(format!(
                    "layer {}: zstd compressed layers",
                    layer_digest
                )));
            }
        });
        extract(&mut reader, &fs_dir, &layer_digest)?;
        io::copy(&mut reader, &mut io::sink())
            .map_err(|e| CtrError::io("failed to read layer", content.blob_path(&layer_digest), e))?;

        let actual = reader.finish();
        if &actual != diff_id {
            return Err(CtrError::validation(format!(
                "layer {}: uncompressed digest {} does not match diff id {}",
                layer_digest, actual, diff_id
            )));
        }

        let record = SnapshotInfo {
            chain_id: chain_id.clone(),
            parent: parent.cloned(),
            layer: layer_digest,
            diff_id: diff_id.clone(),
            created_at: Utc::now(),
        };
        let record_path = tmp.path().join(SNAPSHOT_RECORD);
        fs::write(&record_path, serde_json::to_vec_pretty(&record)?)
            .map_err(|e| CtrError::io("failed to write snapshot record", &record_path, e))?;

        let target = self.path(chain_id);
        fs::rename(tmp.path(), &target)
            .map_err(|e| CtrError::io("failed to commit snapshot", &target, e))?;
        debug!("committed snapshot {} in {}", chain_id, self.name);
        Ok(())
    }
}

/// Hashes everything read through it.
struct DigestReader<R> {
    inner: R,
    digester: Digester,
}

impl<R: Read> DigestReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            digester: Digester::new(),
        }
    }

    fn finish(self) -> Digest {
        self.digester.finish()
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digester.update(&buf[..n]);
        Ok(n)
    }
}

fn extract<R: Read>(reader: R, dest: &Path, layer: &Digest) -> Result<()> {
    let failed = |e: io::Error| {
        CtrError::validation_with_source(format!("failed to extract layer {}", layer), e)
    };
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    for entry in archive.entries().map_err(failed)? {
        let mut entry = entry.map_err(failed)?;
        let path = entry.path().map_err(failed)?.into_owned();
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(CtrError::validation(format!(
                "layer {}: entry {} escapes the snapshot",
                layer,
                path.display()
            )));
        }
        entry.unpack_in(dest).map_err(failed)?;
    }
    Ok(())
}

/// Options for [`unpack`].
#[derive(Debug, Clone, Default)]
pub struct UnpackOptions {
    /// Key material for encrypted layers
    pub decrypt: DecryptConfig,
}

/// What an unpack did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackReport {
    /// Chain id of the top snapshot, `None` for images without layers
    pub chain_id: Option<Digest>,
    /// Layers extracted by this call
    pub applied: usize,
    /// Layers whose snapshot already existed
    pub skipped: usize,
}

struct Plan {
    layers: Vec<Descriptor>,
    diff_ids: Vec<Digest>,
    chain_ids: Vec<Digest>,
}

fn plan<P: Provider + ?Sized>(
    provider: &P,
    target: &Descriptor,
    matcher: &PlatformMatcher,
) -> Result<Plan> {
    let (_, manifest) = resolve::manifest(provider, target, matcher)?;
    let config = ConfigSummary::from_bytes(&provider.read_blob(manifest.config())?)?;
    let diff_ids = config.diff_ids()?;
    let layers = manifest.layers().clone();
    if layers.len() != diff_ids.len() {
        return Err(CtrError::validation(format!(
            "manifest has {} layers but config lists {} diff ids",
            layers.len(),
            diff_ids.len()
        )));
    }
    let chain_ids = chain_ids(&diff_ids);
    Ok(Plan {
        layers,
        diff_ids,
        chain_ids,
    })
}

/// Extracts every layer of the manifest matching `matcher` into
/// `snapshotter`, skipping layers that are already unpacked.
pub fn unpack(
    content: &ContentStore,
    snapshotter: &Snapshotter,
    target: &Descriptor,
    matcher: &PlatformMatcher,
    opts: &UnpackOptions,
) -> Result<UnpackReport> {
    let plan = plan(content, target, matcher)?;
    let mut report = UnpackReport {
        chain_id: plan.chain_ids.last().cloned(),
        applied: 0,
        skipped: 0,
    };

    for (i, layer) in plan.layers.iter().enumerate() {
        let chain_id = &plan.chain_ids[i];
        if snapshotter.exists(chain_id) {
            report.skipped += 1;
            continue;
        }
        let media_type = oci::descriptor_media_type(layer);
        let layer_type = oci::layer_type(&media_type).ok_or_else(|| {
            CtrError::unsupported(format!("layer media type {}", media_type))
        })?;
        if layer_type.encrypted {
            let digest = oci::descriptor_digest(layer);
            if opts.decrypt.is_empty() {
                return Err(CtrError::failed_precondition(format!(
                    "layer {} is encrypted and no decryption keys were given",
                    digest
                )));
            }
            return Err(CtrError::unsupported(format!(
                "decrypting layer {}",
                digest
            )));
        }
        let parent = i.checked_sub(1).map(|p| &plan.chain_ids[p]);
        snapshotter.apply(
            content,
            layer,
            layer_type.compression,
            &plan.diff_ids[i],
            chain_id,
            parent,
        )?;
        report.applied += 1;
    }

    info!(
        "unpacked {} into {} ({} applied, {} already present)",
        oci::descriptor_digest(target),
        snapshotter.name(),
        report.applied,
        report.skipped
    );
    Ok(report)
}

/// True when the top snapshot of the manifest matching `matcher` exists.
pub fn is_unpacked<P: Provider + ?Sized>(
    provider: &P,
    snapshotter: &Snapshotter,
    target: &Descriptor,
    matcher: &PlatformMatcher,
) -> Result<bool> {
    let plan = plan(provider, target, matcher)?;
    Ok(match plan.chain_ids.last() {
        Some(top) => snapshotter.exists(top),
        None => true,
    })
}
