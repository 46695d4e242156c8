mod deployer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use forge_chain::{
    BuilderOptions, CapabilityTransferManager, DeploymentRecord, DeploymentStore, EventCursor,
    EventSynchronizer, FinalityOptions, LedgerClient, PackageBuilder, PublishOptions,
    PublishResult, Publisher, RpcConfigStore, SuiRpcClient, SuiSigner, SyncOptions, TokenParams,
};
use forge_core::config::{DEPLOYER_KEY_ENV, KEYSTORE_PASSWORD_ENV};
use forge_core::{ForgeConfig, Network, logging};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::deployer::{KeySources, import_key, resolve_signer};

#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "Generate, compile and publish Sui fungible tokens")]
struct Cli {
    /// Config file (default: ~/.forge/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured network (devnet, testnet, mainnet, localnet)
    #[arg(long, global = true)]
    network: Option<Network>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a Move package for a new token
    Generate(TokenArgs),
    /// Compile a generated package and print its bytecode summary
    Build { path: PathBuf },
    /// Compile and publish a package, optionally handing the TreasuryCap over
    Publish {
        path: PathBuf,
        /// Transfer the TreasuryCap to this address after publishing
        #[arg(long)]
        transfer_to: Option<String>,
        /// Delete the package directory after a successful publish
        #[arg(long)]
        cleanup: bool,
    },
    /// Transfer the deployer's TreasuryCap of a published coin
    TransferCap {
        package_id: String,
        module: String,
        recipient: String,
    },
    /// Follow the factory's TokenCreationEvent stream
    Watch {
        /// Factory package id (overrides the config file)
        #[arg(long)]
        package_id: Option<String>,
        /// Resume after this event, as printed on shutdown (<tx_digest>:<event_seq>)
        #[arg(long)]
        from_cursor: Option<EventCursor>,
    },
    /// List tokens published from this machine
    Tokens {
        /// Deployer address (default: the configured deployer key)
        #[arg(long)]
        deployer: Option<String>,
    },
    /// Encrypt the key in FORGE_DEPLOYER_KEY into the keystore file
    ImportKey {
        /// Keystore path (overrides the config file)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Args)]
struct TokenArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    symbol: String,
    #[arg(long, default_value_t = 9)]
    decimals: u8,
    /// Whole-token supply, e.g. "1000000" or "12.5"
    #[arg(long)]
    supply: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "")]
    image_url: String,
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl TokenArgs {
    fn into_params(self, config: &ForgeConfig) -> TokenParams {
        TokenParams {
            name: self.name,
            symbol: self.symbol,
            decimals: self.decimals,
            initial_supply: self.supply,
            description: self.description,
            image_url: self.image_url,
            output_dir: self.output_dir,
            toolchain_version: Some(config.framework_version.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ForgeConfig::load_from_path(path)?,
        None => ForgeConfig::load()?,
    };
    if let Some(network) = cli.network {
        config.network = network;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    let _log_guard = logging::init_logging(&config.log_level)?;
    info!(network = %config.network, "forge starting");

    let result = run(cli.command, &config).await;
    if let Err(e) = &result {
        error!(error = %e, "command failed");
    }
    result
}

async fn run(command: Command, config: &ForgeConfig) -> Result<()> {
    let builder = PackageBuilder::new(BuilderOptions::from(config));

    match command {
        Command::Generate(args) => {
            let params = args.into_params(config);
            let package = builder.create_package(&params).await?;
            print_json(&package)
        }
        Command::Build { path } => {
            let output = builder.build(&path).await?;
            print_json(&output)
        }
        Command::Publish {
            path,
            transfer_to,
            cleanup,
        } => {
            let client = ledger_client(config)?;
            let signer = require_signer(config)?;
            let options = PublishOptions {
                remove_package_after: cleanup,
                ..PublishOptions::from(config)
            };
            let publisher =
                Publisher::new(client.clone(), builder, options).with_signer(signer.clone());
            let published = publisher.publish(&path).await?;
            print_json(&published)?;

            let module = module_of(&path)?;
            record_deployment(config, signer.address(), &module, &path, &published);

            if let Some(recipient) = transfer_to {
                let manager =
                    CapabilityTransferManager::new(client, signer, FinalityOptions::from(config));
                let digest = manager
                    .transfer(&published.package_id, &module, &recipient)
                    .await?;
                print_json(&serde_json::json!({ "transfer_digest": digest }))?;
            }
            Ok(())
        }
        Command::TransferCap {
            package_id,
            module,
            recipient,
        } => {
            let manager = CapabilityTransferManager::new(
                ledger_client(config)?,
                require_signer(config)?,
                FinalityOptions::from(config),
            );
            let digest = manager.transfer(&package_id, &module, &recipient).await?;
            print_json(&serde_json::json!({ "transfer_digest": digest }))
        }
        Command::Watch {
            package_id,
            from_cursor,
        } => {
            let mut config = config.clone();
            if package_id.is_some() {
                config.factory_package_id = package_id;
            }
            watch(&config, from_cursor).await
        }
        Command::Tokens { deployer } => {
            let deployer = match deployer {
                Some(address) => address,
                None => require_signer(config)?.address().to_string(),
            };
            let store = DeploymentStore::new(config.deployments_file()?);
            print_json(&store.by_deployer(&deployer)?)
        }
        Command::ImportKey { path } => {
            let path = path
                .or_else(|| config.keystore_path.clone())
                .context("no keystore path given and none configured")?;
            let secret = std::env::var(DEPLOYER_KEY_ENV)
                .with_context(|| format!("{DEPLOYER_KEY_ENV} is not set"))?;
            let password = std::env::var(KEYSTORE_PASSWORD_ENV)
                .with_context(|| format!("{KEYSTORE_PASSWORD_ENV} is not set"))?;
            let address = import_key(&secret, &password, &path)?;
            print_json(&serde_json::json!({ "address": address, "keystore": path }))
        }
    }
}

async fn watch(config: &ForgeConfig, from_cursor: Option<EventCursor>) -> Result<()> {
    let options = SyncOptions::from(config);
    if options.event_type.is_none() {
        warn!("factory_package_id is not configured, nothing to watch");
        return Ok(());
    }

    let sync = Arc::new(
        EventSynchronizer::new(ledger_client(config)?, options).with_handler(|event| {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to encode event"),
            }
        }),
    );
    if let Some(cursor) = from_cursor {
        info!(cursor = %cursor, "resuming event stream");
        sync.resume_from(Some(cursor));
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = sync.clone().spawn(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(());
    handle.await.context("event synchronizer task panicked")?;

    if let Some(cursor) = sync.cursor() {
        info!(cursor = %cursor, "stopped; pass --from-cursor to resume");
    }
    Ok(())
}

/// Append a successful publish to the local history. The publish already
/// happened, so a write failure is only logged.
fn record_deployment(
    config: &ForgeConfig,
    deployer: &str,
    module: &str,
    package_path: &Path,
    published: &PublishResult,
) {
    let record = DeploymentRecord::new(deployer, module, package_path, published);
    let stored = config
        .deployments_file()
        .and_then(|path| DeploymentStore::new(path).append(record));
    if let Err(e) = stored {
        warn!(package_id = %published.package_id, error = %e, "failed to record deployment");
    }
}

fn ledger_client(config: &ForgeConfig) -> Result<Arc<dyn LedgerClient>> {
    let store = RpcConfigStore::from_config(config)?;
    let rpc = store
        .get_rpc(config.network)
        .with_context(|| format!("no RPC endpoint for {}", config.network))?;
    info!(url = %rpc.url, custom = rpc.is_custom, "using fullnode");
    Ok(Arc::new(SuiRpcClient::from_config(rpc)?))
}

fn require_signer(config: &ForgeConfig) -> Result<Arc<SuiSigner>> {
    let signer = resolve_signer(&KeySources::from_env(config))?.with_context(|| {
        format!("no deployer key: set {DEPLOYER_KEY_ENV} or configure keystore_path")
    })?;
    Ok(Arc::new(signer))
}

/// Generated packages are named after their module.
fn module_of(package_path: &Path) -> Result<String> {
    package_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("cannot infer module name from {}", package_path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
