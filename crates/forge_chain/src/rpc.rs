//! Ledger RPC surface consumed by the pipeline.
//!
//! [`LedgerClient`] is the seam between the pipeline and the network:
//! [`crate::SuiRpcClient`] speaks Sui JSON-RPC, tests substitute in-memory
//! fakes.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ForgeError;
use crate::transaction::TransactionPlan;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Position of an event in the ledger's ordered event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    #[serde(rename = "txDigest")]
    pub tx_digest: String,
    #[serde(rename = "eventSeq")]
    pub event_seq: String,
}

/// Written as `<tx_digest>:<event_seq>`.
impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_digest, self.event_seq)
    }
}

impl FromStr for EventId {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || ForgeError::InvalidParams(format!("cursor {s:?} is not <tx_digest>:<event_seq>"));
        let (tx_digest, event_seq) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        if tx_digest.is_empty() || event_seq.parse::<u64>().is_err() {
            return Err(invalid());
        }
        Ok(EventId {
            tx_digest: tx_digest.to_string(),
            event_seq: event_seq.to_string(),
        })
    }
}

/// A raw Move event as returned by `suix_queryEvents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: EventId,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(rename = "parsedJson", default)]
    pub parsed_json: serde_json::Value,
    #[serde(rename = "timestampMs", default)]
    pub timestamp_ms: Option<String>,
}

/// One page of events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPage {
    pub data: Vec<LedgerEvent>,
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<EventId>,
    #[serde(rename = "hasNextPage", default)]
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrder {
    Ascending,
    Descending,
}

/// An object owned by an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedObject {
    #[serde(rename = "objectId")]
    pub object_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub digest: String,
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
}

/// Unsigned transaction bytes produced by the ledger's builder endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBytes {
    #[serde(rename = "txBytes")]
    pub tx_bytes: String,
}

/// Which details the ledger should attach to a transaction response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseOptions {
    pub show_effects: bool,
    pub show_object_changes: bool,
}

impl ResponseOptions {
    pub fn effects_and_changes() -> Self {
        Self {
            show_effects: true,
            show_object_changes: true,
        }
    }

    pub fn effects_only() -> Self {
        Self {
            show_effects: true,
            show_object_changes: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEffects {
    pub status: ExecutionStatus,
}

/// An entry of a transaction's object-change list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObjectChange {
    Published {
        #[serde(rename = "packageId")]
        package_id: String,
        #[serde(default)]
        modules: Vec<String>,
    },
    Created {
        #[serde(rename = "objectId")]
        object_id: String,
        #[serde(rename = "objectType")]
        object_type: String,
    },
    Mutated {
        #[serde(rename = "objectId")]
        object_id: String,
    },
    Transferred {
        #[serde(rename = "objectId")]
        object_id: String,
    },
    Deleted {
        #[serde(rename = "objectId")]
        object_id: String,
    },
    Wrapped {
        #[serde(rename = "objectId")]
        object_id: String,
    },
    #[serde(other)]
    Unknown,
}

/// A transaction as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub digest: String,
    #[serde(default)]
    pub effects: Option<TransactionEffects>,
    #[serde(rename = "objectChanges", default)]
    pub object_changes: Vec<ObjectChange>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Everything the pipeline needs from a ledger node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Materialize `plan` into unsigned transaction bytes for `sender`.
    async fn build_transaction(
        &self,
        sender: &str,
        plan: &TransactionPlan,
        gas_budget: u64,
    ) -> Result<TransactionBytes, ForgeError>;

    /// Submit signed transaction bytes.
    async fn execute_transaction(
        &self,
        tx_bytes: &str,
        signatures: &[String],
        options: ResponseOptions,
    ) -> Result<TransactionResponse, ForgeError>;

    /// Look up a transaction by digest. `Ok(None)` means the ledger does not
    /// know it (yet).
    async fn get_transaction(
        &self,
        digest: &str,
        options: ResponseOptions,
    ) -> Result<Option<TransactionResponse>, ForgeError>;

    /// Events of exactly `event_type`, strictly after `cursor`.
    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<&EventId>,
        limit: usize,
        order: EventOrder,
    ) -> Result<EventPage, ForgeError>;

    /// Objects owned by `owner` whose type is exactly `struct_type`.
    async fn owned_objects(
        &self,
        owner: &str,
        struct_type: &str,
    ) -> Result<Vec<OwnedObject>, ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_text_form_round_trips() {
        let id: EventId = "5qJxkP9:3".parse().unwrap();
        assert_eq!(id.tx_digest, "5qJxkP9");
        assert_eq!(id.event_seq, "3");
        assert_eq!(id.to_string(), "5qJxkP9:3");

        for bad in ["", "5qJxkP9", ":3", "5qJxkP9:", "5qJxkP9:x"] {
            assert!(bad.parse::<EventId>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn object_changes_decode_by_tag() {
        let json = serde_json::json!([
            {"type": "published", "packageId": "0xpkg", "version": "1", "digest": "d", "modules": ["coin"]},
            {"type": "created", "objectId": "0xcap", "objectType": "0x2::coin::TreasuryCap<0xpkg::coin::COIN>", "sender": "0xme", "owner": {"AddressOwner": "0xme"}},
            {"type": "mutated", "objectId": "0xgas", "objectType": "0x2::coin::Coin<0x2::sui::SUI>"},
            {"type": "somethingNew", "objectId": "0x9"}
        ]);
        let changes: Vec<ObjectChange> = serde_json::from_value(json).unwrap();
        assert_eq!(
            changes[0],
            ObjectChange::Published {
                package_id: "0xpkg".into(),
                modules: vec!["coin".into()],
            }
        );
        assert!(matches!(&changes[1], ObjectChange::Created { object_id, .. } if object_id == "0xcap"));
        assert!(matches!(changes[2], ObjectChange::Mutated { .. }));
        assert_eq!(changes[3], ObjectChange::Unknown);
    }

    #[test]
    fn transaction_response_defaults_missing_changes() {
        let json = serde_json::json!({
            "digest": "Dx",
            "effects": {"status": {"status": "failure", "error": "InsufficientGas"}}
        });
        let response: TransactionResponse = serde_json::from_value(json).unwrap();
        assert!(response.object_changes.is_empty());
        let status = response.effects.unwrap().status;
        assert!(!status.is_success());
        assert_eq!(status.error.as_deref(), Some("InsufficientGas"));
    }

    #[test]
    fn event_page_decodes_cursor() {
        let json = serde_json::json!({
            "data": [{
                "id": {"txDigest": "T1", "eventSeq": "0"},
                "type": "0xf::factory::TokenCreationEvent",
                "parsedJson": {"creator": "0xabc"},
                "timestampMs": "1700000000000"
            }],
            "nextCursor": {"txDigest": "T1", "eventSeq": "0"},
            "hasNextPage": false
        });
        let page: EventPage = serde_json::from_value(json).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.next_cursor.unwrap().tx_digest, "T1");
    }
}
