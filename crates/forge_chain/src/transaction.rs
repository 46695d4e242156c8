use std::time::Duration;

use forge_core::ForgeConfig;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::builder::BuildOutput;
use crate::error::ForgeError;
use crate::rpc::{LedgerClient, ResponseOptions, TransactionResponse};
use crate::signer::SuiSigner;

// ---------------------------------------------------------------------------
// Transaction plans
// ---------------------------------------------------------------------------

/// Input to a plan command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanArgument {
    /// The value produced by the command at this index.
    Result(u16),
    /// An existing on-chain object.
    Object(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanCommand {
    Publish {
        modules: Vec<String>,
        dependencies: Vec<String>,
    },
    TransferObjects {
        objects: Vec<PlanArgument>,
        recipient: String,
    },
}

/// An ordered list of commands to run in one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPlan {
    pub commands: Vec<PlanCommand>,
}

impl TransactionPlan {
    /// Publish compiled modules and hand the resulting UpgradeCap to `owner`.
    pub fn publish(build: BuildOutput, owner: &str) -> Self {
        Self {
            commands: vec![
                PlanCommand::Publish {
                    modules: build.modules,
                    dependencies: build.dependencies,
                },
                PlanCommand::TransferObjects {
                    objects: vec![PlanArgument::Result(0)],
                    recipient: owner.to_string(),
                },
            ],
        }
    }

    /// Move one owned object to `recipient`.
    pub fn transfer_object(object_id: &str, recipient: &str) -> Self {
        Self {
            commands: vec![PlanCommand::TransferObjects {
                objects: vec![PlanArgument::Object(object_id.to_string())],
                recipient: recipient.to_string(),
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FinalityOptions {
    pub gas_budget: u64,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for FinalityOptions {
    fn default() -> Self {
        Self {
            gas_budget: 100_000_000,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl From<&ForgeConfig> for FinalityOptions {
    fn from(config: &ForgeConfig) -> Self {
        Self {
            gas_budget: config.gas_budget,
            timeout: config.finality_timeout(),
            poll_interval: config.finality_poll_interval(),
        }
    }
}

/// Build, sign and submit `plan`, then block until the ledger reports it as
/// final. Returns the finalized response; the caller inspects its status.
pub async fn submit_and_confirm(
    client: &dyn LedgerClient,
    signer: &SuiSigner,
    plan: &TransactionPlan,
    options: &FinalityOptions,
    response: ResponseOptions,
) -> Result<TransactionResponse, ForgeError> {
    let unsigned = client
        .build_transaction(signer.address(), plan, options.gas_budget)
        .await?;
    let signature = signer.sign_transaction(&unsigned.tx_bytes)?;

    let submitted = client
        .execute_transaction(&unsigned.tx_bytes, &[signature], response)
        .await?;
    info!(digest = %submitted.digest, "transaction submitted");

    wait_for_finality(client, &submitted.digest, options, response).await
}

/// Poll the ledger until it returns `digest`, or give up after the timeout.
///
/// The transaction is already submitted, so a failed poll comes back as
/// [`ForgeError::FinalityUnknown`].
pub async fn wait_for_finality(
    client: &dyn LedgerClient,
    digest: &str,
    options: &FinalityOptions,
    response: ResponseOptions,
) -> Result<TransactionResponse, ForgeError> {
    let start = Instant::now();
    loop {
        let polled = client
            .get_transaction(digest, response)
            .await
            .map_err(|e| ForgeError::FinalityUnknown {
                digest: digest.to_string(),
                source: Box::new(e),
            })?;
        if let Some(finalized) = polled {
            debug!(
                digest = %digest,
                waited_ms = start.elapsed().as_millis() as u64,
                "transaction finalized"
            );
            return Ok(finalized);
        }
        if start.elapsed() >= options.timeout {
            return Err(ForgeError::FinalityTimeout {
                digest: digest.to_string(),
                waited: start.elapsed(),
            });
        }
        tokio::time::sleep(options.poll_interval).await;
    }
}

/// Fail with [`ForgeError::TransactionFailed`] unless the effects say success.
pub fn ensure_success(response: &TransactionResponse) -> Result<(), ForgeError> {
    match &response.effects {
        Some(effects) if effects.status.is_success() => Ok(()),
        Some(effects) => Err(ForgeError::TransactionFailed {
            reason: effects
                .status
                .error
                .clone()
                .unwrap_or_else(|| format!("status {}", effects.status.status)),
        }),
        None => Err(ForgeError::TransactionFailed {
            reason: format!("ledger returned no effects for {}", response.digest),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{ExecutionStatus, TransactionEffects};

    fn response(status: &str, error: Option<&str>) -> TransactionResponse {
        TransactionResponse {
            digest: "Dx".into(),
            effects: Some(TransactionEffects {
                status: ExecutionStatus {
                    status: status.into(),
                    error: error.map(str::to_string),
                },
            }),
            object_changes: Vec::new(),
        }
    }

    #[test]
    fn publish_plan_keeps_upgrade_cap_with_owner() {
        let build = BuildOutput {
            modules: vec!["AAEC".into()],
            dependencies: vec!["0x1".into(), "0x2".into()],
            digest: None,
        };
        let plan = TransactionPlan::publish(build, "0xdeployer");

        assert_eq!(plan.commands.len(), 2);
        assert!(matches!(
            &plan.commands[0],
            PlanCommand::Publish { modules, dependencies }
                if modules == &["AAEC"] && dependencies.len() == 2
        ));
        assert_eq!(
            plan.commands[1],
            PlanCommand::TransferObjects {
                objects: vec![PlanArgument::Result(0)],
                recipient: "0xdeployer".into(),
            }
        );
    }

    #[test]
    fn transfer_plan_moves_single_object() {
        let plan = TransactionPlan::transfer_object("0xcap", "0xalice");
        assert_eq!(
            plan.commands,
            vec![PlanCommand::TransferObjects {
                objects: vec![PlanArgument::Object("0xcap".into())],
                recipient: "0xalice".into(),
            }]
        );
    }

    #[test]
    fn ensure_success_reports_ledger_error() {
        assert!(ensure_success(&response("success", None)).is_ok());

        let err = ensure_success(&response("failure", Some("MoveAbort(0)"))).unwrap_err();
        match err {
            ForgeError::TransactionFailed { reason } => assert_eq!(reason, "MoveAbort(0)"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_effects_is_failure() {
        let mut r = response("success", None);
        r.effects = None;
        assert!(matches!(
            ensure_success(&r),
            Err(ForgeError::TransactionFailed { .. })
        ));
    }
}
