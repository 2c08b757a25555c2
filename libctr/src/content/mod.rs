//! Content-addressed blob storage.
//!
//! Blobs live under `<root>/blobs/<algorithm>/<hex>`. Writes go to a temp
//! file under `<root>/ingest` while the content is hashed, and are renamed
//! into place only once the digest (and size, when known) has been verified,
//! so a reader never sees a partial blob.
//!
//! ```text
//! <root>/
//! ├── blobs/
//! │   └── sha256/
//! │       ├── 05d6eacd...  (config)
//! │       └── 1111aaaa...  (layer)
//! └── ingest/              (in-flight writes)
//! ```

use crate::digest::{Digest, Digester};
use crate::error::{CtrError, Result};
use crate::oci::{self, Descriptor};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

#[cfg(test)]
mod tests;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Read access to content, the seam image walking code is written against.
pub trait Provider {
    /// Reads the whole blob a descriptor points at.
    fn read_blob(&self, desc: &Descriptor) -> Result<Vec<u8>>;

    /// Returns true when the blob is present.
    fn exists(&self, digest: &Digest) -> Result<bool>;
}

/// Metadata about a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    /// Blob digest
    pub digest: Digest,
    /// Blob size in bytes
    pub size: u64,
}

/// Statistics from a garbage collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of blobs removed
    pub removed_count: u64,
    /// Bytes freed
    pub freed_bytes: u64,
}

/// Filesystem backed content store.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Opens (creating if needed) a content store rooted at `root`.
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        for dir in [root.join("blobs"), root.join("ingest")] {
            fs::create_dir_all(&dir)
                .map_err(|e| CtrError::io("failed to create content directory", &dir, e))?;
        }
        debug!("content store opened at {}", root.display());
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a blob is stored at. The digest is validated, so the path
    /// cannot escape the store.
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join("blobs")
            .join(digest.algorithm())
            .join(digest.encoded())
    }

    /// Returns the size of a stored blob.
    pub fn info(&self, digest: &Digest) -> Result<Info> {
        let path = self.blob_path(digest);
        match fs::metadata(&path) {
            Ok(meta) => Ok(Info {
                digest: digest.clone(),
                size: meta.len(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CtrError::not_found("content digest", digest.to_string()))
            }
            Err(e) => Err(CtrError::io("failed to stat blob", path, e)),
        }
    }

    /// Opens a blob for streaming reads.
    pub fn open_blob(&self, digest: &Digest) -> Result<File> {
        let path = self.blob_path(digest);
        File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CtrError::not_found("content digest", digest.to_string())
            } else {
                CtrError::io("failed to open blob", path, e)
            }
        })
    }

    /// Reads a whole blob into memory.
    pub fn read(&self, digest: &Digest) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let path = self.blob_path(digest);
        self.open_blob(digest)?
            .read_to_end(&mut buf)
            .map_err(|e| CtrError::io("failed to read blob", path, e))?;
        Ok(buf)
    }

    /// Streams `reader` into the store.
    ///
    /// When `expected` is given the computed digest and size must match it,
    /// otherwise the write is discarded with a validation error. A blob that
    /// is already present is left untouched.
    pub fn write_blob<R: Read>(&self, mut reader: R, expected: Option<(&Digest, u64)>) -> Result<Info> {
        let ingest = self.root.join("ingest");
        let mut tmp = tempfile::NamedTempFile::new_in(&ingest)
            .map_err(|e| CtrError::io("failed to create ingest file", &ingest, e))?;
        let mut digester = Digester::new();
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CtrError::io("failed to read content", tmp.path(), e)),
            };
            digester.update(&buf[..n]);
            tmp.write_all(&buf[..n])
                .map_err(|e| CtrError::io("failed to write content", tmp.path(), e))?;
        }
        let size = digester.size();
        let digest = digester.finish();

        if let Some((want, want_size)) = expected {
            if &digest != want {
                return Err(CtrError::validation(format!(
                    "unexpected commit digest {}, expected {}",
                    digest, want
                )));
            }
            if size != want_size {
                return Err(CtrError::validation(format!(
                    "unexpected commit size {}, expected {}",
                    size, want_size
                )));
            }
        }

        let path = self.blob_path(&digest);
        if path.exists() {
            debug!("blob {} already exists", digest);
            return Ok(Info { digest, size });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CtrError::io("failed to create blob directory", parent, e))?;
        }
        tmp.persist(&path)
            .map_err(|e| CtrError::io("failed to commit blob", &path, e.error))?;

        debug!("stored blob {} ({} bytes)", digest, size);
        Ok(Info { digest, size })
    }

    /// Stores an in-memory blob.
    pub fn write_bytes(&self, data: &[u8]) -> Result<Info> {
        self.write_blob(data, None)
    }

    /// Removes a blob.
    pub fn delete(&self, digest: &Digest) -> Result<()> {
        let path = self.blob_path(digest);
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CtrError::not_found("content digest", digest.to_string())
            } else {
                CtrError::io("failed to remove blob", path, e)
            }
        })
    }

    /// Lists the digests of every stored blob.
    pub fn list(&self) -> Result<Vec<Digest>> {
        let blobs = self.root.join("blobs");
        let mut digests = Vec::new();
        for entry in WalkDir::new(&blobs).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| blobs.clone());
                CtrError::io("failed to walk content", path, io::Error::other(e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let alg = entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str());
            let hex = entry.file_name().to_str();
            if let (Some(alg), Some(hex)) = (alg, hex)
                && let Ok(digest) = format!("{}:{}", alg, hex).parse::<Digest>()
            {
                digests.push(digest);
            }
        }
        digests.sort();
        Ok(digests)
    }

    /// Removes every blob not in `referenced`.
    pub fn garbage_collect(&self, referenced: &HashSet<Digest>) -> Result<GcStats> {
        let mut stats = GcStats::default();
        for digest in self.list()? {
            if referenced.contains(&digest) {
                continue;
            }
            let size = self.info(&digest).map(|i| i.size).unwrap_or(0);
            match self.delete(&digest) {
                Ok(()) => {
                    stats.removed_count += 1;
                    stats.freed_bytes += size;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        info!(
            "content gc: removed {} blobs, freed {} bytes",
            stats.removed_count, stats.freed_bytes
        );
        Ok(stats)
    }
}

impl Provider for ContentStore {
    fn read_blob(&self, desc: &Descriptor) -> Result<Vec<u8>> {
        self.read(&oci::descriptor_digest(desc))
    }

    fn exists(&self, digest: &Digest) -> Result<bool> {
        match self.info(digest) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
