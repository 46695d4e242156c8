use std::path::Path;
use std::sync::Arc;

use forge_core::ForgeConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::builder::{BuildOutput, PackageBuilder};
use crate::error::ForgeError;
use crate::guard::PublishGuard;
use crate::rpc::{LedgerClient, ObjectChange, ResponseOptions, TransactionResponse};
use crate::signer::SuiSigner;
use crate::transaction::{FinalityOptions, TransactionPlan, ensure_success, submit_and_confirm};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An object created by the publish transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedObject {
    pub object_type: String,
    pub object_id: String,
}

/// Outcome of a finalized, successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub package_id: String,
    pub created_objects: Vec<CreatedObject>,
    pub transaction_digest: String,
}

impl PublishResult {
    /// First created object whose type contains `needle`.
    pub fn find_created(&self, needle: &str) -> Option<&CreatedObject> {
        self.created_objects
            .iter()
            .find(|o| o.object_type.contains(needle))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub finality: FinalityOptions,
    /// Delete the generated package directory after a successful publish.
    pub remove_package_after: bool,
}

impl From<&ForgeConfig> for PublishOptions {
    fn from(config: &ForgeConfig) -> Self {
        Self {
            finality: FinalityOptions::from(config),
            remove_package_after: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Compiles a generated package and publishes it from the deployer account.
pub struct Publisher {
    client: Arc<dyn LedgerClient>,
    builder: PackageBuilder,
    signer: Option<Arc<SuiSigner>>,
    options: PublishOptions,
    guard: PublishGuard,
}

impl Publisher {
    pub fn new(client: Arc<dyn LedgerClient>, builder: PackageBuilder, options: PublishOptions) -> Self {
        Self {
            client,
            builder,
            signer: None,
            options,
            guard: PublishGuard::new(),
        }
    }

    pub fn with_signer(mut self, signer: Arc<SuiSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn set_signer(&mut self, signer: Arc<SuiSigner>) {
        self.signer = Some(signer);
    }

    pub fn signer(&self) -> Result<&Arc<SuiSigner>, ForgeError> {
        self.signer.as_ref().ok_or(ForgeError::SignerNotInitialized)
    }

    pub fn guard(&self) -> &PublishGuard {
        &self.guard
    }

    /// Build the package at `package_path` and publish it.
    ///
    /// The UpgradeCap goes to the deployer. Nothing is retried; a failure after
    /// submission may leave the package on-chain (see
    /// [`ForgeError::may_have_reached_ledger`]).
    pub async fn publish(&self, package_path: &Path) -> Result<PublishResult, ForgeError> {
        let signer = self.signer()?;
        let _permit = self.guard.try_acquire(package_path).await?;
        let build = self.builder.build(package_path).await?;
        self.submit(signer, package_path, build).await
    }

    /// Publish bytecode that was already compiled from `package_path`.
    pub async fn publish_compiled(
        &self,
        package_path: &Path,
        build: BuildOutput,
    ) -> Result<PublishResult, ForgeError> {
        let signer = self.signer()?;
        let _permit = self.guard.try_acquire(package_path).await?;
        self.submit(signer, package_path, build).await
    }

    async fn submit(
        &self,
        signer: &SuiSigner,
        package_path: &Path,
        build: BuildOutput,
    ) -> Result<PublishResult, ForgeError> {
        info!(
            path = %package_path.display(),
            deployer = %signer.address(),
            modules = build.modules.len(),
            "publishing package"
        );

        let plan = TransactionPlan::publish(build, signer.address());
        let response = submit_and_confirm(
            self.client.as_ref(),
            signer,
            &plan,
            &self.options.finality,
            ResponseOptions::effects_and_changes(),
        )
        .await?;

        ensure_success(&response)?;
        let result = extract_publish_result(&response)?;
        info!(
            package_id = %result.package_id,
            digest = %result.transaction_digest,
            created = result.created_objects.len(),
            "package published"
        );

        if self.options.remove_package_after {
            if let Err(e) = self.builder.remove_package(package_path).await {
                warn!(path = %package_path.display(), error = %e, "failed to remove published package");
            }
        }
        Ok(result)
    }
}

/// Read the package id and created objects from a successful response.
///
/// Exactly one `published` change is required.
pub fn extract_publish_result(response: &TransactionResponse) -> Result<PublishResult, ForgeError> {
    let mut published = response.object_changes.iter().filter_map(|change| match change {
        ObjectChange::Published { package_id, .. } => Some(package_id),
        _ => None,
    });

    let package_id = match (published.next(), published.next()) {
        (Some(id), None) => id.clone(),
        (None, _) => {
            return Err(ForgeError::PackageIdNotFound {
                digest: response.digest.clone(),
            });
        }
        (Some(_), Some(_)) => {
            warn!(digest = %response.digest, "transaction reports several published packages");
            return Err(ForgeError::PackageIdNotFound {
                digest: response.digest.clone(),
            });
        }
    };

    let created_objects = response
        .object_changes
        .iter()
        .filter_map(|change| match change {
            ObjectChange::Created {
                object_id,
                object_type,
            } => Some(CreatedObject {
                object_type: object_type.clone(),
                object_id: object_id.clone(),
            }),
            _ => None,
        })
        .collect();

    Ok(PublishResult {
        package_id,
        created_objects,
        transaction_digest: response.digest.clone(),
    })
}
