//! Resolves the deployer signer from the environment or the encrypted keystore.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use forge_chain::{DeployerKeystore, SuiSigner};
use forge_core::ForgeConfig;
use forge_core::config::{DEPLOYER_KEY_ENV, KEYSTORE_PASSWORD_ENV};
use tracing::info;

/// Where the deployer key can come from, in priority order.
#[derive(Debug, Default)]
pub struct KeySources {
    pub env_key: Option<String>,
    pub keystore_path: Option<PathBuf>,
    pub password: Option<String>,
}

impl KeySources {
    pub fn from_env(config: &ForgeConfig) -> Self {
        Self {
            env_key: std::env::var(DEPLOYER_KEY_ENV).ok().filter(|k| !k.trim().is_empty()),
            keystore_path: config.keystore_path.clone(),
            password: std::env::var(KEYSTORE_PASSWORD_ENV).ok(),
        }
    }
}

/// The deployer signer, or `None` when no key source is configured.
pub fn resolve_signer(sources: &KeySources) -> Result<Option<SuiSigner>> {
    if let Some(key) = &sources.env_key {
        let signer = SuiSigner::from_hex(key)
            .with_context(|| format!("{DEPLOYER_KEY_ENV} is not a valid Ed25519 secret"))?;
        info!(address = %signer.address(), "deployer key loaded from environment");
        return Ok(Some(signer));
    }

    let Some(path) = sources.keystore_path.as_deref().filter(|p| p.exists()) else {
        return Ok(None);
    };
    let password = sources
        .password
        .as_deref()
        .with_context(|| format!("{KEYSTORE_PASSWORD_ENV} must be set to unlock {}", path.display()))?;
    let signer = DeployerKeystore::load_from_file(path)?.unlock(password)?;
    Ok(Some(signer))
}

/// Seal `secret_hex` into a keystore at `path` and return the deployer address.
pub fn import_key(secret_hex: &str, password: &str, path: &Path) -> Result<String> {
    if password.is_empty() {
        anyhow::bail!("refusing to seal the deployer key with an empty password");
    }
    let store = DeployerKeystore::seal(secret_hex, password)?;
    store.save_to_file(path)?;
    Ok(store.address)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "4ec5a9eefc0bb86027a6f3ba718793c813505acc25ed09447caf6a069accdd4b";

    #[test]
    fn no_sources_means_no_signer() {
        assert!(resolve_signer(&KeySources::default()).unwrap().is_none());
    }

    #[test]
    fn env_key_wins_over_keystore() {
        let sources = KeySources {
            env_key: Some(format!("0x{SECRET}")),
            keystore_path: Some(PathBuf::from("/nonexistent/keystore.json")),
            password: None,
        };
        let signer = resolve_signer(&sources).unwrap().unwrap();
        assert_eq!(signer.address(), SuiSigner::from_hex(SECRET).unwrap().address());
    }

    #[test]
    fn bad_env_key_is_an_error() {
        let sources = KeySources {
            env_key: Some("0x1234".into()),
            ..KeySources::default()
        };
        assert!(resolve_signer(&sources).is_err());
    }

    #[test]
    fn keystore_needs_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployer.json");
        let address = import_key(SECRET, "pw", &path).unwrap();

        let locked = KeySources {
            keystore_path: Some(path.clone()),
            ..KeySources::default()
        };
        let err = resolve_signer(&locked).unwrap_err();
        assert!(err.to_string().contains(KEYSTORE_PASSWORD_ENV));

        let unlocked = KeySources {
            keystore_path: Some(path),
            password: Some("pw".into()),
            ..KeySources::default()
        };
        let signer = resolve_signer(&unlocked).unwrap().unwrap();
        assert_eq!(signer.address(), address);
    }

    #[test]
    fn empty_password_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        assert!(import_key(SECRET, "", &dir.path().join("k.json")).is_err());
    }
}
