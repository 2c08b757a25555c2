//! High-level API for libctr.
//!
//! [`Client`] ties the content store, the image metadata of one namespace
//! and the snapshotters under a single root directory together:
//!
//! ```text
//! <root>/
//! ├── content/     blobs, see [`ContentStore`]
//! ├── metadata/    <namespace>/images.json
//! └── snapshots/   <snapshotter>/<chain id>/
//! ```
//!
//! Store operations are synchronous filesystem work; the client runs them on
//! the blocking thread pool so it can be driven from async code.
//!
//! # Examples
//!
//! ```no_run
//! use libctr::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .root("/var/lib/ctr")
//!         .namespace("default")
//!         .build()
//!         .await?;
//!
//!     for image in client.list_images(&[]).await? {
//!         println!("{}", image.name);
//!     }
//!     Ok(())
//! }
//! ```

use crate::archive::{self, ImportOptions};
use crate::content::ContentStore;
use crate::error::{CtrError, Result};
use crate::gc::Collector;
use crate::images::resolve::{self, CheckResult, SizeReport};
use crate::images::{DEFAULT_NAMESPACE, DeleteOptions, Image, ImageService, ImageStore};
use crate::platform::{Platform, PlatformMatcher};
use crate::unpack::{self, Snapshotter, UnpackOptions, UnpackReport};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;


/// Default root directory.
pub const DEFAULT_ROOT: &str = "/var/lib/ctr";

/// Handle on a local image store.
#[derive(Debug, Clone)]
pub struct Client {
    root: PathBuf,
    content: ContentStore,
    images: ImageStore,
}

/// Runs blocking store work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CtrError::internal(format!("blocking task failed: {}", e)))?
}

impl Client {
    /// Create a builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Namespace image operations act on.
    pub fn namespace(&self) -> &str {
        self.images.namespace()
    }

    /// The image metadata service for the client namespace.
    pub fn image_service(&self) -> &ImageStore {
        &self.images
    }

    /// The content store, shared by all namespaces.
    pub fn content_store(&self) -> &ContentStore {
        &self.content
    }

    /// Opens the snapshotter `name`.
    pub fn snapshotter(&self, name: &str) -> Result<Snapshotter> {
        Snapshotter::open(self.root.join("snapshots"), name)
    }

    /// Lists images matching any of `filters`.
    pub async fn list_images(&self, filters: &[String]) -> Result<Vec<Image>> {
        let images = self.images.clone();
        let filters = filters.to_vec();
        blocking(move || images.list(&filters)).await
    }

    /// Returns one image by name.
    pub async fn get_image(&self, name: &str) -> Result<Image> {
        let images = self.images.clone();
        let name = name.to_string();
        blocking(move || images.get(&name)).await
    }

    /// Updates the given fields of an image.
    pub async fn update_image(&self, image: Image, fieldpaths: &[String]) -> Result<Image> {
        let images = self.images.clone();
        let fieldpaths = fieldpaths.to_vec();
        blocking(move || images.update(image, &fieldpaths)).await
    }

    /// Deletes an image.
    pub async fn delete_image(&self, name: &str, opts: DeleteOptions) -> Result<()> {
        let images = self.images.clone();
        let name = name.to_string();
        blocking(move || images.delete(&name, opts)).await
    }

    /// Imports a tar archive; see [`archive::import`].
    pub async fn import<R>(&self, reader: R, opts: ImportOptions) -> Result<Vec<Image>>
    where
        R: Read + Send + 'static,
    {
        let content = self.content.clone();
        let images = self.images.clone();
        blocking(move || archive::import(&content, &images, reader, &opts)).await
    }

    /// Unpacks the image into `snapshotter`.
    pub async fn unpack(
        &self,
        image: &Image,
        matcher: &PlatformMatcher,
        snapshotter: &str,
        opts: UnpackOptions,
    ) -> Result<UnpackReport> {
        let content = self.content.clone();
        let snapshotter = self.snapshotter(snapshotter)?;
        let target = image.target.clone();
        let matcher = matcher.clone();
        debug!("unpacking {} into {}", image.name, snapshotter.name());
        blocking(move || unpack::unpack(&content, &snapshotter, &target, &matcher, &opts)).await
    }

    /// True when the image is fully unpacked into `snapshotter`.
    pub async fn is_unpacked(
        &self,
        image: &Image,
        matcher: &PlatformMatcher,
        snapshotter: &str,
    ) -> Result<bool> {
        let content = self.content.clone();
        let snapshotter = self.snapshotter(snapshotter)?;
        let target = image.target.clone();
        let matcher = matcher.clone();
        blocking(move || unpack::is_unpacked(&content, &snapshotter, &target, &matcher)).await
    }

    /// Checks which content of the image is present.
    pub async fn check(&self, image: &Image, matcher: &PlatformMatcher) -> Result<CheckResult> {
        let content = self.content.clone();
        let target = image.target.clone();
        let matcher = matcher.clone();
        blocking(move || resolve::check(&content, &target, &matcher)).await
    }

    /// Size of the image content for the platform, possibly partial.
    pub async fn size(&self, image: &Image, matcher: &PlatformMatcher) -> SizeReport {
        let content = self.content.clone();
        let target = image.target.clone();
        let matcher = matcher.clone();
        match blocking(move || Ok(resolve::size(&content, &target, &matcher))).await {
            Ok(report) => report,
            Err(e) => SizeReport {
                size: 0,
                error: Some(e),
            },
        }
    }

    /// Platforms the image provides.
    pub async fn platforms(&self, image: &Image) -> Result<Vec<Platform>> {
        let content = self.content.clone();
        let target = image.target.clone();
        blocking(move || resolve::platforms(&content, &target)).await
    }
}

/// Builder for creating a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    root: PathBuf,
    namespace: String,
}

impl ClientBuilder {
    /// Create a new builder with the default root and namespace.
    pub fn new() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Set the root directory.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the namespace.
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Opens the stores, creating the directory layout if needed.
    pub async fn build(self) -> Result<Client> {
        blocking(move || {
            let content = ContentStore::open(self.root.join("content"))?;
            let metadata = self.root.join("metadata");
            let collector = Collector::new(content.clone(), &metadata, self.root.join("snapshots"));
            let images = ImageStore::open(&metadata, &self.namespace, collector)?;
            debug!(
                "opened client at {} (namespace {})",
                self.root.display(),
                self.namespace
            );
            Ok(Client {
                root: self.root,
                content,
                images,
            })
        })
        .await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
