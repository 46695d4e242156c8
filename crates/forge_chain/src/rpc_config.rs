use std::collections::HashMap;
use std::time::Duration;

use forge_core::{ForgeConfig, Network};
use serde::{Deserialize, Serialize};

/// Configuration for a single fullnode endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub network: Network,
    pub url: String,
    pub is_custom: bool,
    pub timeout_secs: u64,
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Per-network fullnode endpoints with custom override support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfigStore {
    configs: HashMap<Network, RpcConfig>,
}

impl RpcConfigStore {
    /// A store holding the public fullnode URL of every [`Network`].
    pub fn with_defaults() -> Self {
        let configs = Network::ALL
            .into_iter()
            .map(|network| (network, default_entry(network, DEFAULT_TIMEOUT_SECS)))
            .collect();
        Self { configs }
    }

    /// Defaults with the config file's timeout and, when set, its custom URL
    /// for the selected network.
    pub fn from_config(config: &ForgeConfig) -> anyhow::Result<Self> {
        let mut store = Self {
            configs: Network::ALL
                .into_iter()
                .map(|network| (network, default_entry(network, config.rpc_timeout_secs)))
                .collect(),
        };
        if let Some(url) = config.rpc_url.as_deref().filter(|u| !u.trim().is_empty()) {
            store.set_custom_rpc(config.network, url.trim().to_string())?;
        }
        Ok(store)
    }

    pub fn get_rpc(&self, network: Network) -> Option<&RpcConfig> {
        self.configs.get(&network)
    }

    /// Override a network's URL with a custom endpoint.
    ///
    /// Returns `Err` if the URL fails validation.
    pub fn set_custom_rpc(&mut self, network: Network, url: String) -> anyhow::Result<()> {
        if !validate_url(&url) {
            anyhow::bail!("invalid RPC URL: {url}");
        }

        let entry = self
            .configs
            .entry(network)
            .or_insert_with(|| default_entry(network, DEFAULT_TIMEOUT_SECS));
        entry.url = url;
        entry.is_custom = true;
        Ok(())
    }

    /// Restore a network's built-in URL, keeping its timeout.
    pub fn reset_to_default(&mut self, network: Network) {
        let entry = self
            .configs
            .entry(network)
            .or_insert_with(|| default_entry(network, DEFAULT_TIMEOUT_SECS));
        entry.url = network.default_rpc_url().to_string();
        entry.is_custom = false;
    }
}

impl Default for RpcConfigStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn default_entry(network: Network, timeout_secs: u64) -> RpcConfig {
    RpcConfig {
        network,
        url: network.default_rpc_url().to_string(),
        is_custom: false,
        timeout_secs,
    }
}

/// Validate that a URL is well-formed and uses HTTP or HTTPS.
pub fn validate_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            (scheme == "http" || scheme == "https") && parsed.host().is_some()
        }
        Err(_) => false,
    }
}
