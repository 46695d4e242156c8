use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signer as _, SigningKey};

use crate::error::ForgeError;

type Blake2b256 = Blake2b<U32>;

/// Signature scheme flag for Ed25519.
const ED25519_FLAG: u8 = 0x00;

/// Intent prefix for a transaction: scope TransactionData, version V0, app Sui.
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

const SECRET_KEY_LEN: usize = 32;

/// Ed25519 deployer identity in Sui's address and signature format.
pub struct SuiSigner {
    signing_key: SigningKey,
    address: String,
}

impl std::fmt::Debug for SuiSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiSigner")
            .field("address", &self.address)
            .finish()
    }
}

impl SuiSigner {
    /// Build a signer from a raw 32-byte Ed25519 secret.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, ForgeError> {
        let bytes: [u8; SECRET_KEY_LEN] = secret.try_into().map_err(|_| {
            ForgeError::InvalidKey(format!(
                "expected {SECRET_KEY_LEN} bytes ({} hex characters), got {}",
                SECRET_KEY_LEN * 2,
                secret.len()
            ))
        })?;
        let signing_key = SigningKey::from_bytes(&bytes);
        let address = address_from_public_key(signing_key.verifying_key().as_bytes());
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Build a signer from a hex secret, with or without a `0x` prefix.
    pub fn from_hex(secret_hex: &str) -> Result<Self, ForgeError> {
        let trimmed = secret_hex.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let raw = hex::decode(digits)
            .map_err(|e| ForgeError::InvalidKey(format!("not a hex string: {e}")))?;
        Self::from_secret_bytes(&raw)
    }

    /// The `0x`-prefixed Sui address of this key.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign base64 transaction bytes, returning the base64 serialized
    /// signature `flag || signature || public key`.
    pub fn sign_transaction(&self, tx_bytes_b64: &str) -> Result<String, ForgeError> {
        let tx_bytes = BASE64
            .decode(tx_bytes_b64)
            .map_err(|e| ForgeError::Rpc(format!("transaction bytes are not base64: {e}")))?;
        let digest = intent_digest(&tx_bytes);
        let signature = self.signing_key.sign(&digest);

        let mut serialized = Vec::with_capacity(1 + 64 + 32);
        serialized.push(ED25519_FLAG);
        serialized.extend_from_slice(&signature.to_bytes());
        serialized.extend_from_slice(self.signing_key.verifying_key().as_bytes());
        Ok(BASE64.encode(serialized))
    }
}

/// `0x` + hex(blake2b-256(flag || public key)).
pub fn address_from_public_key(public_key: &[u8; 32]) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update([ED25519_FLAG]);
    hasher.update(public_key);
    format!("0x{}", hex::encode(hasher.finalize()))
}

/// blake2b-256 over the intent-prefixed transaction bytes.
fn intent_digest(tx_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(TRANSACTION_INTENT);
    hasher.update(tx_bytes);
    hasher.finalize().into()
}
