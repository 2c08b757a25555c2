use super::*;
use tempfile::tempdir;

#[test]
fn test_write_and_read_blob() {
    let temp_dir = tempdir().unwrap();
    let store = ContentStore::open(temp_dir.path()).unwrap();

    let info = store.write_bytes(b"hello world").unwrap();
    assert_eq!(info.size, 11);
    assert_eq!(info.digest, Digest::sha256_of(b"hello world"));

    assert_eq!(store.read(&info.digest).unwrap(), b"hello world");
    assert!(store.exists(&info.digest).unwrap());
    assert_eq!(store.info(&info.digest).unwrap().size, 11);
}

#[test]
fn test_blob_path_layout() {
    let temp_dir = tempdir().unwrap();
    let store = ContentStore::open(temp_dir.path()).unwrap();
    let digest = Digest::sha256_of(b"x");
    let path = store.blob_path(&digest);
    assert!(path.starts_with(temp_dir.path().join("blobs").join("sha256")));
    assert!(path.ends_with(digest.encoded()));
}

#[test]
fn test_write_verifies_expected_digest() {
    let temp_dir = tempdir().unwrap();
    let store = ContentStore::open(temp_dir.path()).unwrap();

    let wrong = Digest::sha256_of(b"something else");
    let result = store.write_blob(&b"hello world"[..], Some((&wrong, 11)));
    assert!(matches!(result, Err(CtrError::Validation { .. })));
    assert!(!store.exists(&wrong).unwrap());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_write_verifies_expected_size() {
    let temp_dir = tempdir().unwrap();
    let store = ContentStore::open(temp_dir.path()).unwrap();

    let digest = Digest::sha256_of(b"hello world");
    let result = store.write_blob(&b"hello world"[..], Some((&digest, 12)));
    assert!(matches!(result, Err(CtrError::Validation { .. })));
}

#[test]
fn test_write_existing_blob_is_idempotent() {
    let temp_dir = tempdir().unwrap();
    let store = ContentStore::open(temp_dir.path()).unwrap();

    let first = store.write_bytes(b"same").unwrap();
    let second = store.write_bytes(b"same").unwrap();
    assert_eq!(first, second);
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn test_missing_blob_is_not_found() {
    let temp_dir = tempdir().unwrap();
    let store = ContentStore::open(temp_dir.path()).unwrap();
    let digest = Digest::sha256_of(b"absent");

    assert!(store.info(&digest).unwrap_err().is_not_found());
    assert!(store.read(&digest).unwrap_err().is_not_found());
    assert!(store.delete(&digest).unwrap_err().is_not_found());
    assert!(!store.exists(&digest).unwrap());
}

#[test]
fn test_list_and_delete() {
    let temp_dir = tempdir().unwrap();
    let store = ContentStore::open(temp_dir.path()).unwrap();

    let a = store.write_bytes(b"a").unwrap().digest;
    let b = store.write_bytes(b"b").unwrap().digest;
    let mut expected = vec![a.clone(), b.clone()];
    expected.sort();
    assert_eq!(store.list().unwrap(), expected);

    store.delete(&a).unwrap();
    assert_eq!(store.list().unwrap(), vec![b]);
}

#[test]
fn test_garbage_collect_keeps_referenced() {
    let temp_dir = tempdir().unwrap();
    let store = ContentStore::open(temp_dir.path()).unwrap();

    let keep = store.write_bytes(b"keep me").unwrap().digest;
    let drop = store.write_bytes(b"drop me").unwrap().digest;

    let referenced: HashSet<Digest> = [keep.clone()].into_iter().collect();
    let stats = store.garbage_collect(&referenced).unwrap();

    assert_eq!(stats.removed_count, 1);
    assert_eq!(stats.freed_bytes, 7);
    assert!(store.exists(&keep).unwrap());
    assert!(!store.exists(&drop).unwrap());
}

#[test]
fn test_provider_reads_by_descriptor() {
    let temp_dir = tempdir().unwrap();
    let store = ContentStore::open(temp_dir.path()).unwrap();
    let info = store.write_bytes(b"{}").unwrap();
    let desc =
        oci::new_descriptor(oci::MEDIA_TYPE_OCI_CONFIG, &info.digest, info.size, None).unwrap();
    assert_eq!(store.read_blob(&desc).unwrap(), b"{}");
}
