use keygate::ssh::keys::{self, HostKeyError};
use russh::keys::{Algorithm, PrivateKey};
use std::path::Path;
use tempfile::tempdir;

/// Write a freshly generated Ed25519 key to `path` in PKCS#8 PEM form.
fn write_key(path: &Path) -> PrivateKey {
    let key = PrivateKey::random(&mut rand::rngs::OsRng, Algorithm::Ed25519).unwrap();
    let mut buf = Vec::new();
    russh::keys::encode_pkcs8_pem(&key, &mut buf).unwrap();
    std::fs::write(path, &buf).unwrap();
    key
}

#[test]
fn no_paths_yields_empty_identity() {
    assert!(keys::load_host_keys(None).unwrap().is_empty());
    assert!(keys::load_host_keys(Some("")).unwrap().is_empty());
    assert!(keys::load_host_keys(Some(":::")).unwrap().is_empty());
}

#[test]
fn loads_single_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("host_ed25519");
    let original = write_key(&path);

    let loaded = keys::load_host_keys(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].algorithm().is_ed25519());
    assert_eq!(loaded[0].public_key().key_data(), original.public_key().key_data());
}

#[test]
fn loads_keys_in_order_and_skips_empty_segments() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    let key_a = write_key(&a);
    let key_b = write_key(&b);

    let list = format!(":{}::{}:", a.display(), b.display());
    let loaded = keys::load_host_keys(Some(&list)).unwrap();

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].public_key().key_data(), key_a.public_key().key_data());
    assert_eq!(loaded[1].public_key().key_data(), key_b.public_key().key_data());
}

#[test]
fn missing_file_fails_whole_load() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good");
    write_key(&good);
    let missing = dir.path().join("missing");

    let list = format!("{}:{}", good.display(), missing.display());
    let err = keys::load_host_keys(Some(&list)).unwrap_err();
    match err {
        HostKeyError::Read { path, .. } => assert_eq!(path, missing),
        other => panic!("expected read error, got {other:?}"),
    }
}

#[test]
fn undecodable_file_fails_whole_load() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good");
    write_key(&good);
    let junk = dir.path().join("junk");
    std::fs::write(&junk, "-----BEGIN NOTHING-----\nnope\n").unwrap();

    let list = format!("{}:{}", good.display(), junk.display());
    let err = keys::load_host_keys(Some(&list)).unwrap_err();
    assert!(matches!(err, HostKeyError::Decode { .. }), "got {err:?}");
    assert!(err.to_string().contains("junk"));
}

#[test]
fn generated_host_key_is_ed25519() {
    let k1 = keys::generate_host_key().unwrap();
    let k2 = keys::generate_host_key().unwrap();
    assert!(k1.algorithm().is_ed25519());
    assert_ne!(k1.public_key().key_data(), k2.public_key().key_data());
}
