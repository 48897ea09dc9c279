use crate::error::{OrchestratorError, Result};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::Path;

pub const KEY_BITS: usize = 2048;
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";

/// Process-wide RSA key pair. Generated (or loaded) once at startup and
/// read-only afterwards, so concurrent encryption operations share it
/// without locking. The key material itself is never logged.
#[derive(Clone)]
pub struct KeyPair {
    pub(crate) private: RsaPrivateKey,
    pub(crate) public: RsaPublicKey,
}

impl KeyPair {
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, KEY_BITS)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Loads the pair stored under `keys_dir`, generating and persisting a
    /// fresh one when nothing (readable) is there. Regeneration of a valid
    /// stored pair only happens when `force_new` is set.
    pub fn load_or_generate(keys_dir: &Path, force_new: bool) -> Result<Self> {
        std::fs::create_dir_all(keys_dir)?;
        let private_path = keys_dir.join(PRIVATE_KEY_FILE);

        if !force_new && private_path.exists() {
            match RsaPrivateKey::read_pkcs8_pem_file(&private_path) {
                Ok(private) => {
                    tracing::debug!(path = %private_path.display(), "loaded stored key pair");
                    let public = RsaPublicKey::from(&private);
                    return Ok(Self { private, public });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "stored private key unreadable, regenerating");
                }
            }
        }

        tracing::info!("generating RSA-{KEY_BITS} key pair, this can take a moment");
        let pair = Self::generate()?;
        pair.persist(keys_dir)?;
        tracing::info!(dir = %keys_dir.display(), "key pair written");
        Ok(pair)
    }

    pub fn persist(&self, keys_dir: &Path) -> Result<()> {
        self.private
            .write_pkcs8_pem_file(keys_dir.join(PRIVATE_KEY_FILE), LineEnding::LF)
            .map_err(|err| OrchestratorError::Crypto(err.to_string()))?;
        self.public
            .write_public_key_pem_file(keys_dir.join(PUBLIC_KEY_FILE), LineEnding::LF)
            .map_err(|err| OrchestratorError::Crypto(err.to_string()))?;
        Ok(())
    }

    pub fn public_pem(&self) -> Result<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|err| OrchestratorError::Crypto(err.to_string()))
    }
}
