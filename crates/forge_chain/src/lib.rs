//! Fungible token forge for Sui.
//!
//! Turns a [`TokenParams`] description into a Move package, compiles it with
//! the external `sui` toolchain, publishes it, hands the mint capability to its
//! owner and keeps track of the factory's on-chain creation events.
//!
//! Pipeline, leaf first:
//!
//! - [`sanitize`]: display name to Move module identifier
//! - [`template`]: Move source + `Move.toml` rendering
//! - [`builder`]: package layout on disk and compiler invocation
//! - [`publisher`]: publish transaction, finality, created-object extraction
//! - [`capability`]: TreasuryCap lookup and transfer
//! - [`events`]: cursor-based event synchronizer
//! - [`records`]: local history of published tokens

pub mod builder;
pub mod capability;
pub mod error;
pub mod events;
#[cfg(test)]
mod fake_ledger;
pub mod guard;
pub mod keystore;
pub mod publisher;
pub mod records;
pub mod rpc;
pub mod rpc_config;
pub mod sanitize;
pub mod signer;
pub mod sui_rpc;
pub mod template;
pub mod transaction;

pub use builder::{BuildOutput, BuilderOptions, GeneratedPackageInfo, PackageBuilder};
pub use capability::{CapabilityTransferManager, treasury_cap_type};
pub use error::{ForgeError, PipelineStage};
pub use events::{EventCursor, EventSynchronizer, SyncOptions, TickOutcome, TokenCreationEvent};
pub use guard::{PublishGuard, PublishPermit};
pub use keystore::{DeployerKeystore, decrypt_key, encrypt_key};
pub use publisher::{CreatedObject, PublishOptions, PublishResult, Publisher};
pub use records::{DeploymentRecord, DeploymentStore};
pub use rpc::LedgerClient;
pub use rpc_config::{RpcConfig, RpcConfigStore, validate_url};
pub use sanitize::sanitize_module_name;
pub use signer::SuiSigner;
pub use sui_rpc::SuiRpcClient;
pub use template::{TokenParams, raw_initial_supply, render_contract_source, render_manifest};
pub use transaction::{FinalityOptions, PlanArgument, PlanCommand, TransactionPlan};
