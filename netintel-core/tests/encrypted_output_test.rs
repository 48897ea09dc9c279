/// End-to-end test of the output stage: serialize a report-shaped value,
/// encrypt it, persist plaintext + envelope, then read back and decrypt.
use chrono::Utc;
use netintel_core::crypto::{CryptoManager, EncryptedArtifact, KeyPair};
use netintel_core::persistence::FileSink;
use serde_json::{json, Value};

#[test]
fn report_survives_encrypt_persist_decrypt() {
    let keys_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();

    let crypto = CryptoManager::init(keys_dir.path(), false).unwrap();
    let sink = FileSink::new(output_dir.path()).unwrap();

    let report = json!({
        "status": "success",
        "query": "github.com",
        "analysis": [
            {"domain": "github.com", "ip": "140.82.112.3", "dns_resolved": true}
        ],
        "summary": {"domains_analyzed": 1, "domains_resolved": 1}
    });

    let artifact = crypto.encrypt_value(&report).unwrap();
    assert_eq!(artifact.public_key_reference, "public_key.pem");

    let path = sink
        .save("search_github_com", Utc::now(), &report, Some(&artifact))
        .unwrap();

    // Reload the envelope from disk and decrypt it.
    let document: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let stored: EncryptedArtifact =
        serde_json::from_value(document["encrypted"].clone()).unwrap();

    let plaintext = crypto.decrypt(&stored).unwrap();
    let decrypted: Value = serde_json::from_slice(&plaintext).unwrap();
    assert_eq!(decrypted, report);
    assert_eq!(document["plain"], report);
}

#[test]
fn a_second_manager_with_the_same_keys_can_decrypt() {
    let keys_dir = tempfile::tempdir().unwrap();

    let writer = CryptoManager::init(keys_dir.path(), false).unwrap();
    let artifact = writer.encrypt(b"shared key material").unwrap();

    // Simulates a process restart: keys are loaded, not regenerated.
    let reader = CryptoManager::init(keys_dir.path(), false).unwrap();
    assert_eq!(reader.decrypt(&artifact).unwrap(), b"shared key material");
}

#[test]
fn forced_regeneration_invalidates_old_artifacts() {
    let keys_dir = tempfile::tempdir().unwrap();

    let old = CryptoManager::init(keys_dir.path(), false).unwrap();
    let artifact = old.encrypt(b"before rotation").unwrap();

    let rotated = CryptoManager::new(KeyPair::load_or_generate(keys_dir.path(), true).unwrap());
    assert!(rotated.decrypt(&artifact).is_err());
}
