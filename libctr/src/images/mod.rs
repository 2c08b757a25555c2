//! Image metadata service.
//!
//! An image is a name pointing at a root descriptor (manifest or index) plus
//! a set of labels. Images are grouped by namespace; each namespace keeps its
//! records in `<root>/<namespace>/images.json`, rewritten atomically on every
//! change.

use crate::digest::Digest;
use crate::error::{CtrError, Result};
use crate::filters::{Adaptor, Filter};
use crate::gc::Collector;
use crate::oci::{self, Descriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod resolve;


/// Name of the namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

const IMAGES_FILE: &str = "images.json";

/// A named image record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Image name, unique within a namespace
    pub name: String,
    /// Free form labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Root descriptor, a manifest or an index
    pub target: Descriptor,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last changed
    pub updated_at: DateTime<Utc>,
}

impl Image {
    /// Creates an unlabeled image record pointing at `target`.
    pub fn new<S: Into<String>>(name: S, target: Descriptor) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            target,
            created_at: now,
            updated_at: now,
        }
    }

    /// Digest of the target descriptor.
    pub fn target_digest(&self) -> Digest {
        oci::descriptor_digest(&self.target)
    }

    /// Media type of the target descriptor.
    pub fn target_media_type(&self) -> String {
        oci::descriptor_media_type(&self.target)
    }
}

impl Adaptor for Image {
    fn field(&self, path: &[String]) -> Option<String> {
        let head = path.first()?;
        match (head.as_str(), path.len()) {
            ("name", 1) => Some(self.name.clone()),
            ("target", 2) => match path[1].as_str() {
                "digest" => Some(self.target_digest().to_string()),
                "mediatype" => Some(self.target_media_type()),
                _ => None,
            },
            ("labels", n) if n > 1 => self.labels.get(&path[1..].join(".")).cloned(),
            _ => None,
        }
    }
}

/// Options for [`ImageService::delete`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Collect unreferenced content and snapshots before returning
    pub synchronous: bool,
}

/// Operations on image records.
pub trait ImageService {
    /// Lists images matching any of `filters`, sorted by name.
    fn list(&self, filters: &[String]) -> Result<Vec<Image>>;

    /// Returns one image by name.
    fn get(&self, name: &str) -> Result<Image>;

    /// Stores a new image; fails when the name is taken.
    fn create(&self, image: Image) -> Result<Image>;

    /// Updates the fields named by `fieldpaths` on an existing image.
    ///
    /// Supported paths are `labels`, `labels.<key>` and `target`; no paths
    /// replaces both labels and target.
    fn update(&self, image: Image, fieldpaths: &[String]) -> Result<Image>;

    /// Removes an image.
    fn delete(&self, name: &str, opts: DeleteOptions) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ImagesFile {
    #[serde(default)]
    images: BTreeMap<String, Image>,
}

/// Filesystem backed [`ImageService`] for one namespace.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    namespace: String,
    collector: Collector,
}

impl ImageStore {
    /// Opens the store for `namespace` under the metadata root `root`.
    pub fn open<P: Into<PathBuf>>(root: P, namespace: &str, collector: Collector) -> Result<Self> {
        validate_namespace(namespace)?;
        let root = root.into();
        let dir = root.join(namespace);
        fs::create_dir_all(&dir)
            .map_err(|e| CtrError::io("failed to create metadata directory", &dir, e))?;
        Ok(Self {
            root,
            namespace: namespace.to_string(),
            collector,
        })
    }

    /// Namespace this store operates in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn file_path(&self) -> PathBuf {
        self.root.join(&self.namespace).join(IMAGES_FILE)
    }

    fn load(&self) -> Result<ImagesFile> {
        load_images_file(&self.file_path())
    }

    fn save(&self, file: &ImagesFile) -> Result<()> {
        let path = self.file_path();
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| CtrError::io("failed to create metadata file", dir, e))?;
        let data = serde_json::to_vec_pretty(file)?;
        tmp.write_all(&data)
            .map_err(|e| CtrError::io("failed to write metadata", tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| CtrError::io("failed to commit metadata", &path, e.error))?;
        Ok(())
    }
}

impl ImageService for ImageStore {
    fn list(&self, filters: &[String]) -> Result<Vec<Image>> {
        let filter = Filter::parse(filters)?;
        let file = self.load()?;
        Ok(file
            .images
            .into_values()
            .filter(|img| filter.matches(img))
            .collect())
    }

    fn get(&self, name: &str) -> Result<Image> {
        self.load()?
            .images
            .remove(name)
            .ok_or_else(|| CtrError::not_found("image", name))
    }

    fn create(&self, mut image: Image) -> Result<Image> {
        validate_image(&image)?;
        let mut file = self.load()?;
        if file.images.contains_key(&image.name) {
            return Err(CtrError::already_exists("image", image.name));
        }
        image.labels.retain(|_, v| !v.is_empty());
        let now = Utc::now();
        image.created_at = now;
        image.updated_at = now;
        file.images.insert(image.name.clone(), image.clone());
        self.save(&file)?;
        debug!(namespace = %self.namespace, "created image {}", image.name);
        Ok(image)
    }

    fn update(&self, image: Image, fieldpaths: &[String]) -> Result<Image> {
        if image.name.is_empty() {
            return Err(CtrError::invalid_argument("image name must not be empty"));
        }
        let mut file = self.load()?;
        let existing = file
            .images
            .get(&image.name)
            .cloned()
            .ok_or_else(|| CtrError::not_found("image", image.name.clone()))?;

        let mut updated = existing.clone();
        if fieldpaths.is_empty() {
            updated.labels = image.labels.clone();
            updated.target = image.target.clone();
        } else {
            for path in fieldpaths {
                if let Some(key) = path.strip_prefix("labels.") {
                    match image.labels.get(key) {
                        Some(v) => {
                            updated.labels.insert(key.to_string(), v.clone());
                        }
                        None => {
                            updated.labels.remove(key);
                        }
                    }
                    continue;
                }
                match path.as_str() {
                    "labels" => updated.labels = image.labels.clone(),
                    "target" => updated.target = image.target.clone(),
                    other => {
                        return Err(CtrError::invalid_argument(format!(
                            "cannot update {:?} field on image {:?}",
                            other, image.name
                        )));
                    }
                }
            }
        }
        updated.labels.retain(|_, v| !v.is_empty());
        validate_image(&updated)?;
        updated.created_at = existing.created_at;
        updated.updated_at = Utc::now();

        file.images.insert(updated.name.clone(), updated.clone());
        self.save(&file)?;
        debug!(namespace = %self.namespace, "updated image {}", updated.name);
        Ok(updated)
    }

    fn delete(&self, name: &str, opts: DeleteOptions) -> Result<()> {
        let mut file = self.load()?;
        if file.images.remove(name).is_none() {
            return Err(CtrError::not_found("image", name));
        }
        self.save(&file)?;
        info!(namespace = %self.namespace, "deleted image {}", name);

        if opts.synchronous {
            self.collector.collect()?;
        }
        Ok(())
    }
}

/// Loads every image in every namespace under the metadata root.
pub(crate) fn all_namespaces_images(root: &Path) -> Result<Vec<Image>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CtrError::io("failed to read metadata root", root, e)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CtrError::io("failed to read metadata root", root, e))?;
        if entry.path().is_dir() {
            let file = load_images_file(&entry.path().join(IMAGES_FILE))?;
            out.extend(file.images.into_values());
        }
    }
    Ok(out)
}

fn load_images_file(path: &Path) -> Result<ImagesFile> {
    match fs::read(path) {
        Ok(data) => serde_json::from_slice(&data).map_err(|e| {
            CtrError::validation_with_source(
                format!("corrupt image metadata in {}", path.display()),
                e,
            )
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ImagesFile::default()),
        Err(e) => Err(CtrError::io("failed to read metadata", path, e)),
    }
}

/// Namespaces follow the containerd identifier rules: lowercase
/// alphanumerics separated by single `.`, `_` or `-`, at most 76 bytes.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let invalid = || {
        CtrError::invalid_argument(format!(
            "namespace {:?} must match [a-z0-9]+([._-][a-z0-9]+)* and be at most 76 characters",
            namespace
        ))
    };
    if namespace.is_empty() || namespace.len() > 76 {
        return Err(invalid());
    }
    let mut prev_sep = true;
    for c in namespace.chars() {
        match c {
            'a'..='z' | '0'..='9' => prev_sep = false,
            '.' | '_' | '-' if !prev_sep => prev_sep = true,
            _ => return Err(invalid()),
        }
    }
    if prev_sep {
        return Err(invalid());
    }
    Ok(())
}

fn validate_image(image: &Image) -> Result<()> {
    if image.name.is_empty() {
        return Err(CtrError::invalid_argument("image name must not be empty"));
    }
    if image.name.chars().any(char::is_whitespace) {
        return Err(CtrError::invalid_argument(format!(
            "image name {:?} must not contain whitespace",
            image.name
        )));
    }
    if image.target_media_type().is_empty() {
        return Err(CtrError::invalid_argument(format!(
            "image {:?}: target media type must be set",
            image.name
        )));
    }
    Ok(())
}
