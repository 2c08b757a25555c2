use super::*;
use crate::content::ContentStore;
use crate::testutil::{ImageBlobs, foreign_platform, store_index};
use tempfile::{TempDir, tempdir};

fn setup() -> (TempDir, ContentStore) {
    let temp_dir = tempdir().unwrap();
    let content = ContentStore::open(temp_dir.path()).unwrap();
    (temp_dir, content)
}

fn host_image() -> ImageBlobs {
    ImageBlobs::new(&Platform::host(), &[&[("etc/hostname", b"host")]])
}

fn foreign_image() -> ImageBlobs {
    ImageBlobs::new(&foreign_platform(), &[&[("etc/hostname", b"foreign")]])
}

/// Stores both images and an index over them.
fn multi_platform(content: &ContentStore) -> (ImageBlobs, ImageBlobs, Descriptor) {
    let host = host_image();
    let foreign = foreign_image();
    host.store(content);
    foreign.store(content);
    let index = store_index(
        content,
        &[
            foreign.entry(&foreign_platform(), None),
            host.entry(&Platform::host(), None),
        ],
    );
    (host, foreign, index)
}

#[test]
fn test_children_of_manifest_and_index() {
    let (_dir, content) = setup();
    let (host, _, index) = multi_platform(&content);

    let kids = children(&content, &index).unwrap();
    assert_eq!(kids.len(), 2);

    let kids = children(&content, &host.manifest_desc).unwrap();
    assert_eq!(kids.len(), 2);
    assert_eq!(oci::descriptor_media_type(&kids[0]), oci::MEDIA_TYPE_OCI_CONFIG);

    assert!(children(&content, &kids[1]).unwrap().is_empty());
}

#[test]
fn test_manifest_of_single_manifest_target() {
    let (_dir, content) = setup();
    let image = foreign_image();
    image.store(&content);

    // the target itself is never platform filtered
    let (desc, manifest) = manifest(&content, &image.manifest_desc, &PlatformMatcher::Default).unwrap();
    assert_eq!(desc, image.manifest_desc);
    assert_eq!(manifest.layers().len(), 1);
}

#[test]
fn test_manifest_picks_matching_platform() {
    let (_dir, content) = setup();
    let (host, foreign, index) = multi_platform(&content);

    let (desc, _) = manifest(&content, &index, &PlatformMatcher::Default).unwrap();
    assert_eq!(oci::descriptor_digest(&desc), oci::descriptor_digest(&host.manifest_desc));

    let strict = PlatformMatcher::OnlyStrict(foreign_platform());
    let (desc, _) = manifest(&content, &index, &strict).unwrap();
    assert_eq!(oci::descriptor_digest(&desc), oci::descriptor_digest(&foreign.manifest_desc));
}

#[test]
fn test_manifest_no_match_is_not_found() {
    let (_dir, content) = setup();
    let foreign = foreign_image();
    foreign.store(&content);
    let index = store_index(&content, &[foreign.entry(&foreign_platform(), None)]);

    let err = manifest(&content, &index, &PlatformMatcher::Default).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_manifest_without_platform_checks_config() {
    let (_dir, content) = setup();
    let foreign = foreign_image();
    foreign.store(&content);
    let index = store_index(&content, &[foreign.manifest_desc.clone()]);

    assert!(manifest(&content, &index, &PlatformMatcher::Default)
        .unwrap_err()
        .is_not_found());
    assert!(manifest(&content, &index, &PlatformMatcher::All).is_ok());
}

#[test]
fn test_check_complete() {
    let (_dir, content) = setup();
    let (host, _, index) = multi_platform(&content);

    let result = check(&content, &index, &PlatformMatcher::Default).unwrap();
    assert!(result.available);
    assert!(result.is_complete());
    assert_eq!(result.required.len(), 2);
    assert_eq!(result.present.len(), 2);
    assert_eq!(
        result.required_size(),
        (host.config.len() + host.layers[0].len()) as u64
    );
    assert_eq!(result.present_size(), result.required_size());
}

#[test]
fn test_check_incomplete() {
    let (_dir, content) = setup();
    let host = host_image();
    content.write_bytes(&host.config).unwrap();
    content.write_bytes(&host.manifest).unwrap();

    let result = check(&content, &host.manifest_desc, &PlatformMatcher::Default).unwrap();
    assert!(result.available);
    assert!(!result.is_complete());
    assert_eq!(result.present.len(), 1);
    assert_eq!(result.missing.len(), 1);
    assert_eq!(result.present_size(), host.config.len() as u64);
}

#[test]
fn test_check_unavailable() {
    let (_dir, content) = setup();
    let host = host_image();

    let result = check(&content, &host.manifest_desc, &PlatformMatcher::Default).unwrap();
    assert!(!result.available);
    assert_eq!(result.required, vec![host.manifest_desc.clone()]);
    assert_eq!(result.missing, vec![host.manifest_desc.clone()]);
    assert!(result.present.is_empty());
}

#[test]
fn test_size_counts_one_platform() {
    let (_dir, content) = setup();
    let (host, _, index) = multi_platform(&content);

    let report = size(&content, &index, &PlatformMatcher::Default);
    assert!(report.error.is_none());
    let expected = index.size()
        + host.manifest.len() as u64
        + host.config.len() as u64
        + host.layers[0].len() as u64;
    assert_eq!(report.size, expected);
}

#[test]
fn test_size_partial_on_missing_content() {
    let (_dir, content) = setup();
    let host = host_image();
    let index = store_index(&content, &[host.entry(&Platform::host(), None)]);

    let report = size(&content, &index, &PlatformMatcher::Default);
    assert!(report.error.as_ref().is_some_and(CtrError::is_not_found));
    assert_eq!(report.size, index.size() + host.manifest.len() as u64);
}

#[test]
fn test_platforms_from_index_entries() {
    let (_dir, content) = setup();
    let (_, _, index) = multi_platform(&content);

    let mut found = platforms(&content, &index).unwrap();
    found.sort();
    let mut expected = vec![Platform::host(), foreign_platform()];
    expected.sort();
    assert_eq!(found, expected);
}

#[test]
fn test_platforms_from_config() {
    let (_dir, content) = setup();
    let foreign = foreign_image();
    foreign.store(&content);
    assert_eq!(
        platforms(&content, &foreign.manifest_desc).unwrap(),
        vec![foreign_platform()]
    );
}

#[test]
fn test_reachable_tolerates_missing_content() {
    let (_dir, content) = setup();
    let (host, foreign, index) = multi_platform(&content);
    content.delete(&oci::descriptor_digest(&foreign.manifest_desc)).unwrap();

    let mut seen = HashSet::new();
    reachable(&content, &index, &mut seen).unwrap();
    assert!(seen.contains(&oci::descriptor_digest(&index)));
    assert!(seen.contains(&oci::descriptor_digest(&foreign.manifest_desc)));
    assert!(seen.contains(&Digest::sha256_of(&host.config)));
    assert!(seen.contains(&Digest::sha256_of(&host.layers[0])));
    assert!(!seen.contains(&Digest::sha256_of(&foreign.config)));
}

#[test]
fn test_all_manifests() {
    let (_dir, content) = setup();
    let (_, _, index) = multi_platform(&content);
    assert_eq!(all_manifests(&content, &index).unwrap().len(), 2);
}
