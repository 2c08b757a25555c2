//! Synchronous garbage collection.
//!
//! Content and snapshots are live when an image in any namespace reaches
//! them. Everything else is removed. Collection only runs when asked for
//! (a synchronous delete); nothing runs in the background.

use crate::content::{ContentStore, GcStats, Provider};
use crate::digest::Digest;
use crate::error::{CtrError, Result};
use crate::images::{all_namespaces_images, resolve};
use crate::oci::ConfigSummary;
use crate::unpack;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info, warn};


/// Outcome of a collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Content store statistics
    pub content: GcStats,
    /// Number of snapshot directories removed
    pub snapshots_removed: u64,
}

/// Removes content and snapshots no image references.
#[derive(Debug, Clone)]
pub struct Collector {
    content: ContentStore,
    metadata_root: PathBuf,
    snapshots_root: PathBuf,
}

impl Collector {
    /// Creates a collector over the given stores.
    pub fn new<M: Into<PathBuf>, S: Into<PathBuf>>(
        content: ContentStore,
        metadata_root: M,
        snapshots_root: S,
    ) -> Self {
        Self {
            content,
            metadata_root: metadata_root.into(),
            snapshots_root: snapshots_root.into(),
        }
    }

    /// Runs one collection pass.
    pub fn collect(&self) -> Result<GcReport> {
        let images = all_namespaces_images(&self.metadata_root)?;
        debug!("gc: {} images across all namespaces", images.len());

        let mut live_content = HashSet::new();
        let mut live_snapshots = HashSet::new();
        for image in &images {
            resolve::reachable(&self.content, &image.target, &mut live_content)?;
            for manifest in resolve::all_manifests(&self.content, &image.target)? {
                let config = match self.content.read_blob(manifest.config()) {
                    Ok(bytes) => bytes,
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e),
                };
                let diff_ids = match ConfigSummary::from_bytes(&config).and_then(|c| c.diff_ids()) {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!("gc: skipping snapshots of {}: {}", image.name, e);
                        continue;
                    }
                };
                live_snapshots.extend(unpack::chain_ids(&diff_ids));
            }
        }

        let content = self.content.garbage_collect(&live_content)?;
        let snapshots_removed = self.collect_snapshots(&live_snapshots)?;
        info!(
            "gc: removed {} blobs and {} snapshots",
            content.removed_count, snapshots_removed
        );
        Ok(GcReport {
            content,
            snapshots_removed,
        })
    }

    fn collect_snapshots(&self, live: &HashSet<Digest>) -> Result<u64> {
        let snapshotters = match fs::read_dir(&self.snapshots_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(CtrError::io(
                    "failed to read snapshots",
                    &self.snapshots_root,
                    e,
                ));
            }
        };
        let mut removed = 0;
        for snapshotter in snapshotters {
            let snapshotter = snapshotter
                .map_err(|e| CtrError::io("failed to read snapshots", &self.snapshots_root, e))?;
            let dir = snapshotter.path();
            if !dir.is_dir() {
                continue;
            }
            let entries =
                fs::read_dir(&dir).map_err(|e| CtrError::io("failed to read snapshots", &dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| CtrError::io("failed to read snapshots", &dir, e))?;
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                let is_live = format!("sha256:{}", name)
                    .parse::<Digest>()
                    .map(|d| live.contains(&d))
                    .unwrap_or(false);
                if is_live || !path.is_dir() {
                    continue;
                }
                fs::remove_dir_all(&path)
                    .map_err(|e| CtrError::io("failed to remove snapshot", &path, e))?;
                debug!("gc: removed snapshot {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }
}
