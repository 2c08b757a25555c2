//! Walking image content: resolving manifests, checking completeness,
//! computing sizes and discovering platforms.
//!
//! Everything here is written against [`Provider`] so it works on any
//! content source, not just the local store.

use crate::content::Provider;
use crate::digest::Digest;
use crate::error::{CtrError, Result};
use crate::oci::{self, ConfigSummary, Descriptor, ImageManifest, ManifestOrIndex};
use crate::platform::{Platform, PlatformMatcher};
use std::collections::HashSet;

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;

/// Returns the direct children of `desc`.
///
/// Indexes yield their manifests, manifests yield config then layers, every
/// other media type is a leaf.
pub fn children<P: Provider + ?Sized>(provider: &P, desc: &Descriptor) -> Result<Vec<Descriptor>> {
    let media_type = oci::descriptor_media_type(desc);
    if !oci::is_index(&media_type) && !oci::is_manifest(&media_type) {
        return Ok(Vec::new());
    }
    let bytes = provider.read_blob(desc)?;
    Ok(ManifestOrIndex::from_descriptor_bytes(&media_type, &bytes)?
        .map(|parsed| parsed.children())
        .unwrap_or_default())
}

/// Orders index entries by platform preference, dropping non-matching ones.
///
/// Entries without a platform are kept and sort last.
fn filter_and_sort(manifests: Vec<Descriptor>, matcher: &PlatformMatcher) -> Vec<Descriptor> {
    let mut ranked: Vec<(Option<usize>, Descriptor)> = manifests
        .into_iter()
        .filter_map(|d| match oci::descriptor_platform(&d) {
            Some(p) => matcher.rank(&p).map(|r| (Some(r), d)),
            None => Some((None, d)),
        })
        .collect();
    ranked.sort_by_key(|(rank, _)| rank.unwrap_or(usize::MAX));
    ranked.into_iter().map(|(_, d)| d).collect()
}

/// Resolves `target` to the single manifest best matching `matcher`.
///
/// Returns the manifest descriptor alongside the parsed manifest. Fails with
/// NotFound when content is missing or no manifest matches.
pub fn manifest<P: Provider + ?Sized>(
    provider: &P,
    target: &Descriptor,
    matcher: &PlatformMatcher,
) -> Result<(Descriptor, ImageManifest)> {
    let root_digest = oci::descriptor_digest(target);
    let mut current = target.clone();
    let mut limited = false;
    loop {
        let media_type = oci::descriptor_media_type(&current);
        let digest = oci::descriptor_digest(&current);
        if oci::is_manifest(&media_type) {
            let bytes = provider.read_blob(&current)?;
            let manifest: ImageManifest = match ManifestOrIndex::from_descriptor_bytes(&media_type, &bytes)? {
                Some(ManifestOrIndex::Manifest(m)) => m,
                _ => return Err(CtrError::validation(format!("{} is not a manifest", digest))),
            };
            if digest != root_digest && oci::descriptor_platform(&current).is_none() {
                let config = ConfigSummary::from_bytes(&provider.read_blob(manifest.config())?)?;
                if !matcher.matches(&config.platform()) {
                    break;
                }
            }
            return Ok((current, manifest));
        } else if oci::is_index(&media_type) {
            let children = children(provider, &current)?;
            let total = children.len();
            let candidates = filter_and_sort(children, matcher);
            limited = total > 1;
            match candidates.into_iter().next() {
                Some(next) => current = next,
                None => break,
            }
        } else {
            return Err(CtrError::not_found(
                "manifest",
                format!("unexpected media type {} for {}", media_type, digest),
            ));
        }
    }
    if limited {
        Err(CtrError::not_found(
            "manifest",
            format!("{}: platform {}", root_digest, matcher),
        ))
    } else {
        Err(CtrError::not_found("manifest", root_digest.to_string()))
    }
}

/// Result of checking an image for local completeness.
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    /// Whether the manifest itself could be resolved
    pub available: bool,
    /// Config and layers the manifest needs
    pub required: Vec<Descriptor>,
    /// Required descriptors that are present
    pub present: Vec<Descriptor>,
    /// Required descriptors that are missing
    pub missing: Vec<Descriptor>,
}

impl CheckResult {
    /// Sum of required sizes.
    pub fn required_size(&self) -> u64 {
        self.required.iter().map(|d| d.size()).sum()
    }

    /// Sum of present sizes.
    pub fn present_size(&self) -> u64 {
        self.present.iter().map(|d| d.size()).sum()
    }

    /// True when the manifest resolved and nothing is missing.
    pub fn is_complete(&self) -> bool {
        self.available && self.missing.is_empty()
    }
}

/// Checks that the content of the manifest matching `matcher` is present.
pub fn check<P: Provider + ?Sized>(
    provider: &P,
    target: &Descriptor,
    matcher: &PlatformMatcher,
) -> Result<CheckResult> {
    let manifest = match manifest(provider, target, matcher) {
        Ok((_, m)) => m,
        Err(e) if e.is_not_found() => {
            return Ok(CheckResult {
                available: false,
                required: vec![target.clone()],
                present: Vec::new(),
                missing: vec![target.clone()],
            });
        }
        Err(e) => {
            return Err(CtrError::validation_with_source(
                format!("failed to check image {}", oci::descriptor_digest(target)),
                e,
            ));
        }
    };

    let mut result = CheckResult {
        available: true,
        ..Default::default()
    };
    result.required.push(manifest.config().clone());
    result.required.extend(manifest.layers().iter().cloned());
    for desc in &result.required {
        if provider.exists(&oci::descriptor_digest(desc))? {
            result.present.push(desc.clone());
        } else {
            result.missing.push(desc.clone());
        }
    }
    Ok(result)
}

/// Size computed by [`size`], possibly partial.
#[derive(Debug)]
pub struct SizeReport {
    /// Bytes accounted for
    pub size: u64,
    /// Set when the walk stopped early, `size` is then a lower bound
    pub error: Option<CtrError>,
}

/// Sums the sizes of the target and everything it references for the
/// platform, keeping at most one manifest per index.
pub fn size<P: Provider + ?Sized>(
    provider: &P,
    target: &Descriptor,
    matcher: &PlatformMatcher,
) -> SizeReport {
    let mut total = 0u64;
    let error = size_walk(provider, target, matcher, &mut total).err();
    SizeReport { size: total, error }
}

fn size_walk<P: Provider + ?Sized>(
    provider: &P,
    desc: &Descriptor,
    matcher: &PlatformMatcher,
    total: &mut u64,
) -> Result<()> {
    *total += desc.size();
    let media_type = oci::descriptor_media_type(desc);
    let mut kids = children(provider, desc)?;
    if oci::is_index(&media_type) {
        kids = filter_and_sort(kids, matcher);
        kids.truncate(1);
    }
    for child in &kids {
        size_walk(provider, child, matcher, total)?;
    }
    Ok(())
}

/// Lists the platforms an image provides.
///
/// Descriptors carrying a platform contribute it without being descended
/// into; configs reached otherwise contribute their own os and
/// architecture.
pub fn platforms<P: Provider + ?Sized>(provider: &P, target: &Descriptor) -> Result<Vec<Platform>> {
    let mut out = Vec::new();
    platforms_walk(provider, target, &mut out)?;
    Ok(out)
}

fn platforms_walk<P: Provider + ?Sized>(
    provider: &P,
    desc: &Descriptor,
    out: &mut Vec<Platform>,
) -> Result<()> {
    if let Some(p) = desc.platform() {
        let os = p.os().to_string();
        let arch = p.architecture().to_string();
        if os != "unknown" && arch != "unknown" {
            out.push(Platform::from(p));
        }
        return Ok(());
    }
    let media_type = oci::descriptor_media_type(desc);
    if oci::is_config(&media_type) {
        let config = ConfigSummary::from_bytes(&provider.read_blob(desc)?)?;
        out.push(config.platform());
        return Ok(());
    }
    for child in children(provider, desc)? {
        platforms_walk(provider, &child, out)?;
    }
    Ok(())
}

/// Adds the digest of `target` and everything reachable from it to `seen`.
///
/// Missing content is tolerated: a missing index or manifest simply has no
/// children. Used to find live content for garbage collection.
pub fn reachable<P: Provider + ?Sized>(
    provider: &P,
    target: &Descriptor,
    seen: &mut HashSet<Digest>,
) -> Result<()> {
    if !seen.insert(oci::descriptor_digest(target)) {
        return Ok(());
    }
    let kids = match children(provider, target) {
        Ok(kids) => kids,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e),
    };
    for child in &kids {
        reachable(provider, child, seen)?;
    }
    Ok(())
}

/// All manifests reachable from `target`, regardless of platform.
///
/// Missing content is skipped.
pub fn all_manifests<P: Provider + ?Sized>(
    provider: &P,
    target: &Descriptor,
) -> Result<Vec<ImageManifest>> {
    let mut out = Vec::new();
    let media_type = oci::descriptor_media_type(target);
    let bytes = match provider.read_blob(target) {
        Ok(b) => b,
        Err(e) if e.is_not_found() => return Ok(out),
        Err(e) => return Err(e),
    };
    match ManifestOrIndex::from_descriptor_bytes(&media_type, &bytes)? {
        Some(ManifestOrIndex::Manifest(m)) => out.push(m),
        Some(ManifestOrIndex::Index(idx)) => {
            for child in idx.manifests() {
                out.extend(all_manifests(provider, child)?);
            }
        }
        None => {}
    }
    Ok(out)
}
