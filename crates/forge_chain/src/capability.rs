use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ForgeError;
use crate::rpc::{LedgerClient, ResponseOptions};
use crate::signer::SuiSigner;
use crate::transaction::{FinalityOptions, TransactionPlan, ensure_success, submit_and_confirm};

/// Package of the Sui framework's `coin` module.
const FRAMEWORK_ADDRESS: &str = "0x2";

/// Fully qualified TreasuryCap type of the coin defined in `module`.
pub fn treasury_cap_type(package_id: &str, module: &str) -> String {
    format!(
        "{FRAMEWORK_ADDRESS}::coin::TreasuryCap<{package_id}::{module}::{}>",
        module.to_uppercase()
    )
}

/// Hands a freshly published coin's TreasuryCap from the deployer to its
/// owner.
pub struct CapabilityTransferManager {
    client: Arc<dyn LedgerClient>,
    signer: Arc<SuiSigner>,
    finality: FinalityOptions,
}

impl CapabilityTransferManager {
    pub fn new(client: Arc<dyn LedgerClient>, signer: Arc<SuiSigner>, finality: FinalityOptions) -> Self {
        Self {
            client,
            signer,
            finality,
        }
    }

    /// Transfer the deployer's TreasuryCap for `{package_id}::{module}` to
    /// `recipient`. Returns the transfer's digest.
    pub async fn transfer(
        &self,
        package_id: &str,
        module: &str,
        recipient: &str,
    ) -> Result<String, ForgeError> {
        let type_tag = treasury_cap_type(package_id, module);
        let deployer = self.signer.address();

        let owned = self.client.owned_objects(deployer, &type_tag).await?;
        let cap = match owned.as_slice() {
            [] => return Err(ForgeError::CapabilityNotFound { type_tag }),
            [only] => only,
            [first, ..] => {
                warn!(
                    type_tag = %type_tag,
                    count = owned.len(),
                    object_id = %first.object_id,
                    "deployer owns several matching capabilities, transferring the first"
                );
                first
            }
        };

        info!(
            object_id = %cap.object_id,
            from = %deployer,
            to = %recipient,
            "transferring treasury capability"
        );

        let plan = TransactionPlan::transfer_object(&cap.object_id, recipient);
        let response = submit_and_confirm(
            self.client.as_ref(),
            &self.signer,
            &plan,
            &self.finality,
            ResponseOptions::effects_only(),
        )
        .await?;
        ensure_success(&response)?;

        info!(digest = %response.digest, "capability transferred");
        Ok(response.digest)
    }
}
