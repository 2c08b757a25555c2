//! Importing images from tar archives.
//!
//! [`import`] reads an OCI layout or `docker save` archive into the content
//! store, then creates one image per named index entry. How entries are
//! named is controlled by the translators in [`ImportOptions`]:
//!
//! ```text
//! index.json entry                    add_ref_prefix("foo/bar")
//! ref.name = "latest"          ->     foo/bar:latest
//! ref.name = "ghcr.io/x/y:1"   ->     ghcr.io/x/y:1
//! image.name = "docker.io/..." ->     docker.io/...   (used as is)
//! ```

use crate::content::ContentStore;
use crate::digest::Digest;
use crate::error::{CtrError, Result};
use crate::images::{Image, ImageService, resolve};
use crate::oci::{self, Descriptor, ManifestOrIndex};
use crate::platform::PlatformMatcher;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info};

mod reader;

pub use reader::import_index;


/// Maps an archive reference name to an image name, empty to skip it.
pub type RefTranslator = Arc<dyn Fn(&str) -> String + Send + Sync>;
/// Maps a manifest digest to an image name, empty to skip it.
pub type DigestTranslator = Arc<dyn Fn(&Digest) -> String + Send + Sync>;
/// Decides, from the translated name, whether to skip the digest image.
pub type SkipDigestRef = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Translator that prefixes bare tags with `prefix` and keeps full
/// references unchanged.
pub fn add_ref_prefix(prefix: &str) -> RefTranslator {
    let prefix = prefix.to_string();
    Arc::new(move |name: &str| translate_ref(&prefix, name, false))
}

/// Like [`add_ref_prefix`] but drops full references outside `prefix`.
pub fn filter_ref_prefix(prefix: &str) -> RefTranslator {
    let prefix = prefix.to_string();
    Arc::new(move |name: &str| translate_ref(&prefix, name, true))
}

/// Translator naming images `prefix@digest`.
pub fn digest_translator(prefix: &str) -> DigestTranslator {
    let prefix = prefix.to_string();
    Arc::new(move |digest: &Digest| format!("{}@{}", prefix, digest))
}

fn translate_ref(prefix: &str, name: &str, check_prefix: bool) -> String {
    if prefix.is_empty() {
        return String::new();
    }
    if name.contains(['/', ':', '@']) {
        if check_prefix && !is_image_prefix(name, prefix) {
            return String::new();
        }
        return name.to_string();
    }
    format!("{}:{}", prefix, name)
}

/// True when `name` starts with `prefix` followed by the end or a
/// reference separator, so `foo/bar` does not match `foo/barista`.
fn is_image_prefix(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => matches!(rest.chars().next(), None | Some('/' | ':' | '@')),
        None => false,
    }
}

/// Options for [`import`].
#[derive(Clone, Default)]
pub struct ImportOptions {
    /// Names index entries from their `ref.name` annotation
    pub ref_translator: Option<RefTranslator>,
    /// Additionally names every index entry by digest
    pub digest_ref: Option<DigestTranslator>,
    /// Skips digest names for some entries
    pub skip_digest_ref: Option<SkipDigestRef>,
    /// Also stores the top index under this name
    pub index_name: Option<String>,
    /// Keeps content for every platform
    pub all_platforms: bool,
    /// Platforms to keep, the host's by default
    pub platform: Option<PlatformMatcher>,
    /// Gzip uncompressed Docker layers
    pub compress_blobs: bool,
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("ref_translator", &self.ref_translator.is_some())
            .field("digest_ref", &self.digest_ref.is_some())
            .field("skip_digest_ref", &self.skip_digest_ref.is_some())
            .field("index_name", &self.index_name)
            .field("all_platforms", &self.all_platforms)
            .field("platform", &self.platform)
            .field("compress_blobs", &self.compress_blobs)
            .finish()
    }
}

impl ImportOptions {
    /// The matcher the walk is filtered with.
    pub fn matcher(&self) -> PlatformMatcher {
        if self.all_platforms {
            PlatformMatcher::All
        } else {
            self.platform.clone().unwrap_or(PlatformMatcher::Default)
        }
    }
}

/// Name of an index entry: the full image name annotation as is, otherwise
/// the translated OCI ref name.
fn image_name(desc: &Descriptor, translator: Option<&RefTranslator>) -> String {
    if let Some(name) = oci::annotation(desc, oci::ANNOTATION_IMAGE_NAME) {
        return name.to_string();
    }
    match (oci::annotation(desc, oci::ANNOTATION_REF_NAME), translator) {
        (Some(name), Some(translate)) => translate(name),
        (Some(name), None) => name.to_string(),
        (None, _) => String::new(),
    }
}

fn filter_platforms(descs: Vec<Descriptor>, matcher: &PlatformMatcher) -> Vec<Descriptor> {
    descs
        .into_iter()
        .filter(|d| oci::descriptor_platform(d).is_none_or(|p| matcher.matches(&p)))
        .collect()
}

fn walk(content: &ContentStore, desc: &Descriptor, matcher: &PlatformMatcher) -> Result<()> {
    for child in filter_platforms(resolve::children(content, desc)?, matcher) {
        walk(content, &child, matcher)?;
    }
    Ok(())
}

/// Imports an archive and creates or retargets its images.
///
/// Content for every platform is stored; the walk that verifies the
/// imported manifests is restricted to the requested platforms and fails
/// when nothing is left.
pub fn import<R, S>(
    content: &ContentStore,
    images: &S,
    reader: R,
    opts: &ImportOptions,
) -> Result<Vec<Image>>
where
    R: Read,
    S: ImageService + ?Sized,
{
    let index = import_index(content, reader, opts.compress_blobs)?;
    let index_digest = oci::descriptor_digest(&index);
    debug!("archive index {}", index_digest);

    let entries = match ManifestOrIndex::from_descriptor_bytes(
        &oci::descriptor_media_type(&index),
        &content.read(&index_digest)?,
    )? {
        Some(ManifestOrIndex::Index(idx)) => idx.manifests().clone(),
        _ => return Err(CtrError::validation("archive index is not an image index")),
    };

    let mut imgs = Vec::new();
    for entry in &entries {
        let name = image_name(entry, opts.ref_translator.as_ref());
        if !name.is_empty() {
            imgs.push(Image::new(name.clone(), entry.clone()));
        }
        if opts.skip_digest_ref.as_ref().is_some_and(|skip| skip(&name)) {
            continue;
        }
        if let Some(translate) = &opts.digest_ref {
            let name = translate(&oci::descriptor_digest(entry));
            if !name.is_empty() {
                imgs.push(Image::new(name, entry.clone()));
            }
        }
    }

    let matcher = opts.matcher();
    let selected = filter_platforms(entries, &matcher);
    if selected.is_empty() {
        return Err(CtrError::not_found(
            "manifest",
            format!("no manifests match the requested platform {}", matcher),
        ));
    }
    for desc in &selected {
        walk(content, desc, &matcher)?;
    }

    if let Some(name) = opts.index_name.as_deref().filter(|n| !n.is_empty()) {
        imgs.push(Image::new(name, index.clone()));
    }

    let target_path = vec!["target".to_string()];
    let mut out = Vec::with_capacity(imgs.len());
    for img in imgs {
        let stored = match images.update(img.clone(), &target_path) {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => images.create(img)?,
            Err(e) => return Err(e),
        };
        info!("imported {} ({})", stored.name, stored.target_digest());
        out.push(stored);
    }
    Ok(out)
}
