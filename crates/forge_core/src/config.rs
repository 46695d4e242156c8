use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Environment variable holding the deployer's Ed25519 secret as hex.
pub const DEPLOYER_KEY_ENV: &str = "FORGE_DEPLOYER_KEY";

/// Environment variable holding the keystore password.
pub const KEYSTORE_PASSWORD_ENV: &str = "FORGE_KEYSTORE_PASSWORD";

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Sui networks with a well-known public fullnode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Devnet,
    Testnet,
    Mainnet,
    Localnet,
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::Devnet,
        Network::Testnet,
        Network::Mainnet,
        Network::Localnet,
    ];

    /// Human-readable label for the network.
    pub fn label(&self) -> &'static str {
        match self {
            Network::Devnet => "Sui Devnet",
            Network::Testnet => "Sui Testnet",
            Network::Mainnet => "Sui Mainnet",
            Network::Localnet => "Sui Localnet",
        }
    }

    /// Public fullnode JSON-RPC endpoint.
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Devnet => "https://fullnode.devnet.sui.io:443",
            Network::Testnet => "https://fullnode.testnet.sui.io:443",
            Network::Mainnet => "https://fullnode.mainnet.sui.io:443",
            Network::Localnet => "http://127.0.0.1:9000",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            "localnet" | "local" => Ok(Network::Localnet),
            other => anyhow::bail!("unknown network: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ForgeConfig
// ---------------------------------------------------------------------------

/// Application configuration stored at `~/.forge/config.json`.
///
/// The deployer secret is **never** part of this file. It is read from
/// [`DEPLOYER_KEY_ENV`] or from the encrypted keystore at `keystore_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    // Ledger
    pub network: Network,
    pub rpc_url: Option<String>,
    pub rpc_timeout_secs: u64,
    pub keystore_path: Option<PathBuf>,
    /// Deployment history file; `~/.forge/deployments.json` when unset.
    pub deployments_path: Option<PathBuf>,

    // Event synchronization
    pub factory_package_id: Option<String>,
    pub factory_module: String,
    pub event_struct: String,
    pub poll_interval_secs: u64,
    pub event_page_size: usize,
    pub recent_event_capacity: usize,

    // Build
    pub compiler_binary: String,
    pub build_timeout_secs: u64,
    pub output_dir: PathBuf,
    pub framework_version: String,

    // Publish
    pub gas_budget: u64,
    pub finality_timeout_secs: u64,
    pub finality_poll_interval_ms: u64,

    // General
    pub log_level: String,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            network: Network::Devnet,
            rpc_url: None,
            rpc_timeout_secs: 30,
            keystore_path: None,
            deployments_path: None,
            factory_package_id: None,
            factory_module: "factory".into(),
            event_struct: "TokenCreationEvent".into(),
            poll_interval_secs: 5,
            event_page_size: 50,
            recent_event_capacity: 100,
            compiler_binary: "sui".into(),
            build_timeout_secs: 60,
            output_dir: PathBuf::from("generated_tokens"),
            framework_version: "1.22.0".into(),
            gas_budget: 100_000_000,
            finality_timeout_secs: 60,
            finality_poll_interval_ms: 500,
            log_level: "info".into(),
        }
    }
}

impl ForgeConfig {
    /// Returns the base config directory: `~/.forge/`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".forge"))
    }

    /// Returns the config file path: `~/.forge/config.json`
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Returns the logs directory: `~/.forge/logs/`
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    /// Deployment history file, from the config or under the base dir.
    pub fn deployments_file(&self) -> Result<PathBuf> {
        match &self.deployments_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::base_dir()?.join("deployments.json")),
        }
    }

    /// Loads config from `~/.forge/config.json`, creating a default one if missing.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from_path(&path)
    }

    /// Load config from a specific file path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Self = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Save config to a specific file path, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Fully-qualified event type to watch, or `None` when no factory package
    /// is configured.
    pub fn watched_event_type(&self) -> Option<String> {
        let package = self.factory_package_id.as_deref()?.trim();
        if package.is_empty() {
            return None;
        }
        Some(format!(
            "{package}::{}::{}",
            self.factory_module, self.event_struct
        ))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn finality_timeout(&self) -> Duration {
        Duration::from_secs(self.finality_timeout_secs)
    }

    pub fn finality_poll_interval(&self) -> Duration {
        Duration::from_millis(self.finality_poll_interval_ms.max(50))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_pipeline() {
        let config = ForgeConfig::default();
        assert_eq!(config.network, Network::Devnet);
        assert_eq!(config.build_timeout(), Duration::from_secs(60));
        assert_eq!(config.recent_event_capacity, 100);
        assert_eq!(config.compiler_binary, "sui");
        assert_eq!(config.framework_version, "1.22.0");
        assert!(config.watched_event_type().is_none());
    }

    #[test]
    fn watched_event_type_is_fully_qualified() {
        let config = ForgeConfig {
            factory_package_id: Some("0xabc".into()),
            ..ForgeConfig::default()
        };
        assert_eq!(
            config.watched_event_type().as_deref(),
            Some("0xabc::factory::TokenCreationEvent")
        );
    }

    #[test]
    fn blank_factory_package_is_unconfigured() {
        let config = ForgeConfig {
            factory_package_id: Some("  ".into()),
            ..ForgeConfig::default()
        };
        assert!(config.watched_event_type().is_none());
    }

    #[test]
    fn load_creates_default_file_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = ForgeConfig::load_from_path(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.event_page_size, 50);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"network":"testnet","gas_budget":5}"#).unwrap();

        let config = ForgeConfig::load_from_path(&path).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.gas_budget, 5);
        assert_eq!(config.factory_module, "factory");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(ForgeConfig::load_from_path(&path).is_err());
    }

    #[test]
    fn deployments_file_prefers_configured_path() {
        let config = ForgeConfig {
            deployments_path: Some(PathBuf::from("/srv/forge/deployments.json")),
            ..ForgeConfig::default()
        };
        assert_eq!(
            config.deployments_file().unwrap(),
            PathBuf::from("/srv/forge/deployments.json")
        );
    }

    #[test]
    fn network_parses_case_insensitively() {
        assert_eq!("TestNet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("local".parse::<Network>().unwrap(), Network::Localnet);
        assert!("moonnet".parse::<Network>().is_err());
    }

    #[test]
    fn network_serde_is_lowercase() {
        let json = serde_json::to_string(&Network::Mainnet).unwrap();
        assert_eq!(json, "\"mainnet\"");
    }
}
