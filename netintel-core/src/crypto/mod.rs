mod keys;

pub use keys::{KeyPair, KEY_BITS, PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};

use crate::error::{OrchestratorError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::traits::PublicKeyParts;
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

/// OAEP with SHA-256 consumes 2 * hash_len + 2 bytes of every RSA block,
/// leaving 190 plaintext bytes per chunk for a 2048-bit key.
const OAEP_OVERHEAD: usize = 2 * 32 + 2;

/// Transport-safe encrypted envelope. Immutable once created.
///
/// Chunk order is load-bearing: decryption concatenates the decrypted
/// chunks in this exact order to reconstruct the plaintext, and the stored
/// digest is the only thing that catches a scrambled sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedArtifact {
    pub encrypted_data: Vec<String>,
    pub sha256_hash: String,
    pub public_key_reference: String,
}

/// Owns the process key pair and turns serialized reports into chunked
/// RSA-OAEP envelopes, plus the inverse for verification.
pub struct CryptoManager {
    keys: KeyPair,
    key_reference: String,
}

impl CryptoManager {
    pub fn new(keys: KeyPair) -> Self {
        Self {
            keys,
            key_reference: PUBLIC_KEY_FILE.to_string(),
        }
    }

    /// Loads or generates the key pair under `keys_dir` and wraps it.
    pub fn init(keys_dir: &Path, force_new: bool) -> Result<Self> {
        Ok(Self::new(KeyPair::load_or_generate(keys_dir, force_new)?))
    }

    /// Largest plaintext chunk a single RSA operation can carry.
    pub fn max_chunk_len(&self) -> usize {
        self.keys.public.size() - OAEP_OVERHEAD
    }

    /// Digest-then-chunk-then-encrypt. The SHA-256 digest covers the whole
    /// plaintext before chunking; each chunk is encrypted independently and
    /// base64-encoded. Empty plaintext still yields one (empty) chunk so
    /// the artifact round-trips.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedArtifact> {
        let sha256_hash = hex::encode(Sha256::digest(plaintext));
        let mut rng = rand::thread_rng();

        let chunks: Vec<&[u8]> = if plaintext.is_empty() {
            vec![&[][..]]
        } else {
            plaintext.chunks(self.max_chunk_len()).collect()
        };

        let mut encrypted_data = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let ciphertext = self
                .keys
                .public
                .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)?;
            encrypted_data.push(BASE64.encode(ciphertext));
        }

        Ok(EncryptedArtifact {
            encrypted_data,
            sha256_hash,
            public_key_reference: self.key_reference.clone(),
        })
    }

    /// Serializes a JSON value and encrypts the bytes.
    pub fn encrypt_value(&self, value: &Value) -> Result<EncryptedArtifact> {
        self.encrypt(&serde_json::to_vec(value)?)
    }

    /// Decrypts the chunks in artifact order, concatenates them and checks
    /// the reconstructed plaintext against the stored digest.
    pub fn decrypt(&self, artifact: &EncryptedArtifact) -> Result<Vec<u8>> {
        let mut plaintext = Vec::new();
        for chunk in &artifact.encrypted_data {
            let ciphertext = BASE64
                .decode(chunk)
                .map_err(|err| OrchestratorError::Crypto(format!("invalid base64 chunk: {err}")))?;
            let decrypted = self.keys.private.decrypt(Oaep::new::<Sha256>(), &ciphertext)?;
            plaintext.extend(decrypted);
        }

        if hex::encode(Sha256::digest(&plaintext)) != artifact.sha256_hash {
            return Err(OrchestratorError::Integrity);
        }
        Ok(plaintext)
    }

    /// PEM encoding of the public key, for callers that decrypt elsewhere.
    pub fn public_key_pem(&self) -> Result<String> {
        self.keys.public_pem()
    }

    pub fn key_reference(&self) -> &str {
        &self.key_reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    // Key generation dominates test time, so every test shares one pair.
    fn manager() -> &'static CryptoManager {
        static MANAGER: OnceLock<CryptoManager> = OnceLock::new();
        MANAGER.get_or_init(|| CryptoManager::new(KeyPair::generate().unwrap()))
    }

    #[test]
    fn round_trip_reproduces_plaintext() {
        let crypto = manager();
        let plaintext: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let artifact = crypto.encrypt(&plaintext).unwrap();
        assert_eq!(crypto.decrypt(&artifact).unwrap(), plaintext);
    }

    #[test]
    fn chunk_count_is_ceil_of_length_over_budget() {
        let crypto = manager();
        assert_eq!(crypto.max_chunk_len(), 190);

        // 500 bytes with a 190-byte budget: 190 + 190 + 120.
        let artifact = crypto.encrypt(&[7u8; 500]).unwrap();
        assert_eq!(artifact.encrypted_data.len(), 3);

        // Exact multiple does not produce a trailing empty chunk.
        let artifact = crypto.encrypt(&[7u8; 380]).unwrap();
        assert_eq!(artifact.encrypted_data.len(), 2);

        let artifact = crypto.encrypt(&[7u8; 1]).unwrap();
        assert_eq!(artifact.encrypted_data.len(), 1);
    }

    #[test]
    fn empty_plaintext_yields_single_chunk() {
        let crypto = manager();
        let artifact = crypto.encrypt(&[]).unwrap();
        assert_eq!(artifact.encrypted_data.len(), 1);
        assert_eq!(crypto.decrypt(&artifact).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn scrambled_chunk_order_fails_integrity() {
        let crypto = manager();
        let plaintext: Vec<u8> = (0..400u16).map(|i| (i % 251) as u8).collect();
        let mut artifact = crypto.encrypt(&plaintext).unwrap();
        assert_eq!(artifact.encrypted_data.len(), 3);

        artifact.encrypted_data.swap(0, 2);
        assert!(matches!(
            crypto.decrypt(&artifact),
            Err(OrchestratorError::Integrity)
        ));
    }

    #[test]
    fn tampered_digest_fails_integrity() {
        let crypto = manager();
        let mut artifact = crypto.encrypt(b"payload").unwrap();
        artifact.sha256_hash = hex::encode(Sha256::digest(b"other payload"));
        assert!(matches!(
            crypto.decrypt(&artifact),
            Err(OrchestratorError::Integrity)
        ));
    }

    #[test]
    fn malformed_base64_is_a_crypto_error() {
        let crypto = manager();
        let mut artifact = crypto.encrypt(b"payload").unwrap();
        artifact.encrypted_data[0] = "%%% not base64 %%%".to_string();
        assert!(matches!(
            crypto.decrypt(&artifact),
            Err(OrchestratorError::Crypto(_))
        ));
    }

    #[test]
    fn digest_recomputed_after_decrypt_matches_stored() {
        let crypto = manager();
        let plaintext = b"digest check".to_vec();
        let artifact = crypto.encrypt(&plaintext).unwrap();
        let decrypted = crypto.decrypt(&artifact).unwrap();
        assert_eq!(hex::encode(Sha256::digest(&decrypted)), artifact.sha256_hash);
    }
}
