use super::*;
use crate::commands::images::testutil::{client_with, output};
use tempfile::tempdir;

const IMAGE: &str = "docker.io/library/busybox:latest";

fn args(replace_all: bool, labels: &[&str]) -> LabelArgs {
    LabelArgs {
        replace_all,
        name: IMAGE.to_string(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
    }
}

#[test]
fn test_parse_labels() {
    let labels = parse_labels(&[
        "team=infra".to_string(),
        "pinned".to_string(),
        "url=http://x?a=b".to_string(),
        "gone=".to_string(),
    ]);
    assert_eq!(labels["team"], "infra");
    assert_eq!(labels["pinned"], "true");
    assert_eq!(labels["url"], "http://x?a=b");
    assert_eq!(labels["gone"], "");
}

#[test]
fn test_fieldpaths() {
    let labels = parse_labels(&["b=2".to_string(), "a=1".to_string()]);
    assert_eq!(fieldpaths(&labels, false), vec!["labels.a", "labels.b"]);
    assert_eq!(fieldpaths(&labels, true), vec!["labels"]);
    assert_eq!(fieldpaths(&BTreeMap::new(), true), vec!["labels"]);
}

#[tokio::test]
async fn test_handle_label_requires_name() {
    let temp_dir = tempdir().unwrap();
    let client = client_with(temp_dir.path(), &[]).await;
    let mut buf = Vec::new();
    let err = handle_label(&client, &LabelArgs::default(), &mut buf)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "please specify an image");
}

#[tokio::test]
async fn test_handle_label_sets_and_merges() {
    let temp_dir = tempdir().unwrap();
    let client = client_with(temp_dir.path(), &["busybox:latest"]).await;

    let mut buf = Vec::new();
    handle_label(&client, &args(false, &["team=infra"]), &mut buf)
        .await
        .unwrap();
    assert_eq!(output(buf), "team=infra\n");

    let mut buf = Vec::new();
    handle_label(&client, &args(false, &["pinned", "env=prod"]), &mut buf)
        .await
        .unwrap();
    assert_eq!(output(buf), "env=prod,pinned=true,team=infra\n");

    let image = client.get_image(IMAGE).await.unwrap();
    assert_eq!(image.labels.len(), 3);
}

#[tokio::test]
async fn test_handle_label_empty_value_removes() {
    let temp_dir = tempdir().unwrap();
    let client = client_with(temp_dir.path(), &["busybox:latest"]).await;

    let mut buf = Vec::new();
    handle_label(&client, &args(false, &["a=1", "b=2"]), &mut buf)
        .await
        .unwrap();
    let mut buf = Vec::new();
    handle_label(&client, &args(false, &["a="]), &mut buf)
        .await
        .unwrap();
    assert_eq!(output(buf), "b=2\n");
}

#[tokio::test]
async fn test_handle_label_replace_all() {
    let temp_dir = tempdir().unwrap();
    let client = client_with(temp_dir.path(), &["busybox:latest"]).await;

    let mut buf = Vec::new();
    handle_label(&client, &args(false, &["a=1", "b=2"]), &mut buf)
        .await
        .unwrap();
    let mut buf = Vec::new();
    handle_label(&client, &args(true, &["c=3"]), &mut buf)
        .await
        .unwrap();
    assert_eq!(output(buf), "c=3\n");

    let mut buf = Vec::new();
    handle_label(&client, &args(true, &[]), &mut buf).await.unwrap();
    assert_eq!(output(buf), "\n");
    assert!(client.get_image(IMAGE).await.unwrap().labels.is_empty());
}

#[tokio::test]
async fn test_handle_label_without_labels_keeps_existing() {
    let temp_dir = tempdir().unwrap();
    let client = client_with(temp_dir.path(), &["busybox:latest"]).await;

    let mut buf = Vec::new();
    handle_label(&client, &args(false, &["team=infra", "env=prod"]), &mut buf)
        .await
        .unwrap();
    let before = client.get_image(IMAGE).await.unwrap();

    let mut buf = Vec::new();
    let err = handle_label(&client, &args(false, &[]), &mut buf)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "please specify at least one label");
    assert!(buf.is_empty());

    let after = client.get_image(IMAGE).await.unwrap();
    assert_eq!(after.labels, before.labels);
    assert_eq!(after.target_digest(), before.target_digest());
}

#[tokio::test]
async fn test_handle_label_unknown_image() {
    let temp_dir = tempdir().unwrap();
    let client = client_with(temp_dir.path(), &[]).await;
    let mut buf = Vec::new();
    let err = handle_label(&client, &args(false, &["a=1"]), &mut buf)
        .await
        .unwrap_err();
    let err = err.downcast::<libctr::CtrError>().unwrap();
    assert!(err.is_not_found());
}
