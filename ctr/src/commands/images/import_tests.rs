use super::*;
use crate::commands::images::testutil::{client_with, docker_archive, output, test_ctx};
use std::path::Path;
use tempfile::tempdir;

fn write_archive(dir: &Path, tags: &[&str]) -> String {
    let path = dir.join("images.tar");
    std::fs::write(&path, docker_archive(tags)).unwrap();
    path.to_string_lossy().to_string()
}

fn names(images: &[Image]) -> Vec<String> {
    let mut names: Vec<String> = images.iter().map(|i| i.name.clone()).collect();
    names.sort();
    names
}

#[test]
fn test_default_prefix_is_dated() {
    let prefix = default_prefix();
    let date = prefix.strip_prefix("import-").unwrap();
    assert!(chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok());
}

#[test]
fn test_import_options_skip_digest_requires_digests() {
    let args = ImportArgs {
        skip_digest_for_named: true,
        ..Default::default()
    };
    let err = import_options(&args).unwrap_err();
    assert_eq!(
        err.to_string(),
        "--skip-digest-for-named must be specified with --digests option"
    );
}

#[test]
fn test_import_options_platform() {
    let args = ImportArgs {
        platform: Some("linux/arm64/v8".to_string()),
        all_platforms: true,
        compress_blobs: true,
        index_name: Some("bundle".to_string()),
        ..Default::default()
    };
    let (opts, matcher) = import_options(&args).unwrap();
    let expected = PlatformMatcher::OnlyStrict(Platform::new("linux", "arm64", None));
    assert_eq!(matcher, Some(expected.clone()));
    assert_eq!(opts.platform, Some(expected));
    assert!(opts.all_platforms);
    assert!(opts.compress_blobs);
    assert_eq!(opts.index_name.as_deref(), Some("bundle"));
    assert!(opts.digest_ref.is_none());
}

#[test]
fn test_import_options_bad_platform() {
    let args = ImportArgs {
        platform: Some("linux//arm64".to_string()),
        ..Default::default()
    };
    assert!(import_options(&args).is_err());
}

#[tokio::test]
async fn test_handle_import_unpacks() {
    let temp_dir = tempdir().unwrap();
    let ctx = test_ctx(temp_dir.path());
    let client = client_with(temp_dir.path(), &[]).await;

    let args = ImportArgs {
        input: write_archive(temp_dir.path(), &["busybox:latest"]),
        ..Default::default()
    };
    let mut buf = Vec::new();
    let images = handle_import(&ctx, &client, &args, &mut buf).await.unwrap();
    assert_eq!(names(&images), vec!["docker.io/library/busybox:latest"]);

    let expected = format!(
        "unpacking docker.io/library/busybox:latest ({})...done\n",
        images[0].target_digest()
    );
    assert_eq!(output(buf), expected);
    assert!(
        client
            .is_unpacked(&images[0], &PlatformMatcher::Default, "native")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_handle_import_no_unpack_with_digests() {
    let temp_dir = tempdir().unwrap();
    let ctx = test_ctx(temp_dir.path());
    let client = client_with(temp_dir.path(), &[]).await;

    let args = ImportArgs {
        input: write_archive(temp_dir.path(), &["busybox:latest"]),
        base_name: Some("docker.io/library/busybox".to_string()),
        digests: true,
        no_unpack: true,
        ..Default::default()
    };
    let mut buf = Vec::new();
    let images = handle_import(&ctx, &client, &args, &mut buf).await.unwrap();
    assert!(buf.is_empty());

    let names = names(&images);
    assert_eq!(names.len(), 2);
    assert_eq!(names[0], "docker.io/library/busybox:latest");
    assert!(names[1].starts_with("docker.io/library/busybox@sha256:"));
    assert!(
        !client
            .is_unpacked(&images[0], &PlatformMatcher::Default, "native")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_handle_import_skip_digest_for_named() {
    let temp_dir = tempdir().unwrap();
    let ctx = test_ctx(temp_dir.path());
    let client = client_with(temp_dir.path(), &[]).await;

    let args = ImportArgs {
        input: write_archive(temp_dir.path(), &["busybox:latest"]),
        digests: true,
        skip_digest_for_named: true,
        no_unpack: true,
        ..Default::default()
    };
    let mut buf = Vec::new();
    let images = handle_import(&ctx, &client, &args, &mut buf).await.unwrap();
    assert_eq!(names(&images), vec!["docker.io/library/busybox:latest"]);
}

#[tokio::test]
async fn test_handle_import_missing_file() {
    let temp_dir = tempdir().unwrap();
    let ctx = test_ctx(temp_dir.path());
    let client = client_with(temp_dir.path(), &[]).await;

    let args = ImportArgs {
        input: temp_dir.path().join("absent.tar").to_string_lossy().to_string(),
        ..Default::default()
    };
    let mut buf = Vec::new();
    let err = handle_import(&ctx, &client, &args, &mut buf)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("failed to open"));
}

#[tokio::test]
async fn test_handle_import_rejects_bad_key() {
    let temp_dir = tempdir().unwrap();
    let ctx = test_ctx(temp_dir.path());
    let client = client_with(temp_dir.path(), &[]).await;

    let args = ImportArgs {
        input: write_archive(temp_dir.path(), &["busybox:latest"]),
        keys: vec![temp_dir.path().join("no-such.pem").to_string_lossy().to_string()],
        ..Default::default()
    };
    let mut buf = Vec::new();
    assert!(handle_import(&ctx, &client, &args, &mut buf).await.is_err());
    // images are stored before unpacking starts
    assert_eq!(client.list_images(&[]).await.unwrap().len(), 1);
}
