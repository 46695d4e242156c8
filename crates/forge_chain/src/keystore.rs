use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::signer::SuiSigner;

const AES_NONCE_LEN: usize = 12;
const KEY_DERIVATION_SALT: &[u8] = b"forge-deployer-key-v1";

/// An encrypted deployer key on disk.
///
/// Only the address is stored in the clear; the Ed25519 secret is sealed with
/// AES-256-GCM under a password-derived key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerKeystore {
    pub address: String,
    #[serde(with = "hex_bytes")]
    pub encrypted_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl DeployerKeystore {
    /// Seal a hex secret under `password`.
    pub fn seal(secret_hex: &str, password: &str) -> Result<Self> {
        let signer = SuiSigner::from_hex(secret_hex)?;
        let trimmed = secret_hex.trim();
        let raw = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .context("deployer key is not hex")?;
        let encrypted_key = encrypt_key(&raw, password)?;
        Ok(Self {
            address: signer.address().to_string(),
            encrypted_key,
            created_at: Utc::now(),
        })
    }

    /// Decrypt the secret and build a signer, checking it matches the stored
    /// address.
    pub fn unlock(&self, password: &str) -> Result<SuiSigner> {
        let secret = decrypt_key(&self.encrypted_key, password)?;
        let signer = SuiSigner::from_secret_bytes(&secret)?;
        if signer.address() != self.address {
            anyhow::bail!(
                "keystore address mismatch: stored {}, derived {}",
                self.address,
                signer.address()
            );
        }
        Ok(signer)
    }

    /// Persist the keystore to a JSON file readable only by the owner.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("failed to create keystore directory")?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("failed to serialize keystore")?;
        std::fs::write(path, json).context("failed to write keystore file")?;

        // Restrict file permissions to owner-only on Unix (0o600 = rw-------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .context("failed to set keystore file permissions")?;
        }

        info!(path = %path.display(), address = %self.address, "deployer keystore saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read keystore {}", path.display()))?;
        let store: Self = serde_json::from_str(&json).context("failed to parse keystore")?;
        info!(path = %path.display(), address = %store.address, "deployer keystore loaded");
        Ok(store)
    }
}

// ---------------------------------------------------------------------------
// Encryption helpers
// ---------------------------------------------------------------------------

/// Derive a 256-bit AES key from a password using Argon2id.
///
/// Parameters: m=19456 KiB (~19 MB), t=2, p=1.
fn derive_key_from_password(password: &str) -> Result<[u8; 32]> {
    use argon2::{Algorithm, Argon2, Params, Version};

    let params = Params::new(19_456, 2, 1, Some(32))
        .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), KEY_DERIVATION_SALT, &mut key)
        .map_err(|e| anyhow::anyhow!("argon2 key derivation failed: {e}"))?;
    Ok(key)
}

/// Encrypt `plaintext` with AES-256-GCM under a key derived from `password`.
///
/// Returns `nonce || ciphertext` (12-byte nonce, then ciphertext and tag).
pub fn encrypt_key(plaintext: &[u8], password: &str) -> Result<Vec<u8>> {
    let key_bytes = derive_key_from_password(password)?;
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);

    let nonce_bytes: [u8; AES_NONCE_LEN] = rand::random();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;

    let mut result = nonce_bytes.to_vec();
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data produced by [`encrypt_key`].
pub fn decrypt_key(ciphertext: &[u8], password: &str) -> Result<Vec<u8>> {
    if ciphertext.len() < AES_NONCE_LEN {
        anyhow::bail!("ciphertext too short (expected at least {AES_NONCE_LEN} bytes for nonce)");
    }

    let (nonce_bytes, encrypted) = ciphertext.split_at(AES_NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let key_bytes = derive_key_from_password(password)?;
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);

    cipher
        .decrypt(nonce, encrypted)
        .map_err(|e| anyhow::anyhow!("decryption failed: {e}"))
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
