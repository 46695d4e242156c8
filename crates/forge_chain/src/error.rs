//! Error types for the token pipeline.

use std::path::PathBuf;
use std::time::Duration;

/// The pipeline step an error belongs to.
///
/// Lets callers tell "compiled but never submitted" apart from "submitted but
/// not confirmed" without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Generate,
    Build,
    Sign,
    Submit,
    Finality,
    Extract,
    Query,
}

/// Errors that can occur in the forge_chain crate.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// No deployer keypair is loaded.
    #[error("Deployer signer not initialized")]
    SignerNotInitialized,

    /// The deployer key material could not be decoded.
    #[error("Invalid deployer key: {0}")]
    InvalidKey(String),

    /// Token parameters failed validation.
    #[error("Invalid token parameters: {0}")]
    InvalidParams(String),

    /// The external compiler binary is not reachable.
    #[error("Toolchain missing: {0}")]
    ToolchainMissing(String),

    /// The compiler exited with a non-zero status.
    #[error("Build failed (exit code {code}): {stderr}")]
    BuildFailed { code: i32, stderr: String },

    /// The compiler did not finish within the hard timeout.
    #[error("Build timed out after {0:?}")]
    BuildTimeout(Duration),

    /// The compiler output did not match the expected schema.
    #[error("Malformed build output: {0}")]
    BuildOutputMalformed(String),

    /// Another publish of the same package is still running.
    #[error("Publish already in progress for {}", .0.display())]
    PublishInProgress(PathBuf),

    /// The ledger cannot materialize this transaction shape.
    #[error("Unsupported transaction: {0}")]
    UnsupportedTransaction(String),

    /// The ledger reported a non-success execution status.
    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    /// The transaction was not finalized within the wait window.
    #[error("Transaction {digest} not finalized after {waited:?}")]
    FinalityTimeout { digest: String, waited: Duration },

    /// The ledger accepted the transaction but could not be asked for its
    /// outcome afterwards.
    #[error("Transaction {digest} submitted, outcome unknown: {source}")]
    FinalityUnknown {
        digest: String,
        #[source]
        source: Box<ForgeError>,
    },

    /// A successful publish reported no (or several) published packages.
    #[error("Package id not found in transaction {digest}")]
    PackageIdNotFound { digest: String },

    /// The deployer owns no object of the exact capability type.
    #[error("Capability not found: {type_tag}")]
    CapabilityNotFound { type_tag: String },

    /// JSON-RPC transport or protocol error.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// JSON serialization / deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForgeError {
    /// The pipeline step this error was raised in.
    pub fn stage(&self) -> PipelineStage {
        match self {
            ForgeError::InvalidParams(_) | ForgeError::Io(_) => PipelineStage::Generate,
            ForgeError::ToolchainMissing(_)
            | ForgeError::BuildFailed { .. }
            | ForgeError::BuildTimeout(_)
            | ForgeError::BuildOutputMalformed(_) => PipelineStage::Build,
            ForgeError::SignerNotInitialized | ForgeError::InvalidKey(_) => PipelineStage::Sign,
            ForgeError::PublishInProgress(_)
            | ForgeError::UnsupportedTransaction(_)
            | ForgeError::Rpc(_)
            | ForgeError::Serialization(_) => PipelineStage::Submit,
            ForgeError::TransactionFailed { .. }
            | ForgeError::FinalityTimeout { .. }
            | ForgeError::FinalityUnknown { .. } => PipelineStage::Finality,
            ForgeError::PackageIdNotFound { .. } => PipelineStage::Extract,
            ForgeError::CapabilityNotFound { .. } => PipelineStage::Query,
        }
    }

    /// Whether the ledger may already hold the transaction's effects.
    pub fn may_have_reached_ledger(&self) -> bool {
        matches!(
            self.stage(),
            PipelineStage::Finality | PipelineStage::Extract
        )
    }
}
