use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::ForgeError;
use crate::rpc::{
    EventId, EventOrder, EventPage, LedgerClient, OwnedObject, ResponseOptions, TransactionBytes,
    TransactionResponse,
};
use crate::rpc_config::RpcConfig;
use crate::transaction::{PlanArgument, PlanCommand, TransactionPlan};

/// Error text the fullnode returns for digests it has not (yet) indexed.
const NOT_FOUND_MARKER: &str = "Could not find";

const OWNED_OBJECTS_PAGE: usize = 50;

/// Sui fullnode JSON-RPC client.
pub struct SuiRpcClient {
    url: String,
    http: Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcErrorBody {
    fn into_error(self, method: &str) -> ForgeError {
        ForgeError::Rpc(format!("{method} failed ({}): {}", self.code, self.message))
    }
}

impl SuiRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ForgeError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::Rpc(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &RpcConfig) -> Result<Self, ForgeError> {
        Self::new(config.url.clone(), config.timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn envelope<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<RpcEnvelope<T>, ForgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(url = %self.url, method = %method, id, "rpc call");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::Rpc(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ForgeError::Rpc(format!("{method}: HTTP {status}: {text}")));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ForgeError::Rpc(format!("{method}: invalid response body: {e}")))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ForgeError> {
        unwrap_envelope(method, self.envelope(method, params).await?)
    }
}

fn unwrap_envelope<T>(method: &str, envelope: RpcEnvelope<T>) -> Result<T, ForgeError> {
    if let Some(error) = envelope.error {
        return Err(error.into_error(method));
    }
    envelope
        .result
        .ok_or_else(|| ForgeError::Rpc(format!("{method}: response has no result")))
}

/// Map a plan onto the fullnode's transaction builder endpoints.
///
/// Only the two shapes the pipeline produces are supported.
pub fn plan_request(
    sender: &str,
    plan: &TransactionPlan,
    gas_budget: u64,
) -> Result<(&'static str, Value), ForgeError> {
    let budget = gas_budget.to_string();
    match plan.commands.as_slice() {
        [
            PlanCommand::Publish {
                modules,
                dependencies,
            },
            PlanCommand::TransferObjects { objects, recipient },
        ] if matches!(objects.as_slice(), [PlanArgument::Result(0)]) => {
            if recipient != sender {
                return Err(ForgeError::UnsupportedTransaction(
                    "upgrade capability can only be kept by the sender".into(),
                ));
            }
            Ok((
                "unsafe_publish",
                json!([sender, modules, dependencies, null, budget]),
            ))
        }
        [PlanCommand::TransferObjects { objects, recipient }] => match objects.as_slice() {
            [PlanArgument::Object(object_id)] => Ok((
                "unsafe_transferObject",
                json!([sender, object_id, null, budget, recipient]),
            )),
            _ => Err(ForgeError::UnsupportedTransaction(
                "transfer must move exactly one existing object".into(),
            )),
        },
        _ => Err(ForgeError::UnsupportedTransaction(format!(
            "plan with {} command(s) has no builder endpoint",
            plan.commands.len()
        ))),
    }
}

fn options_json(options: ResponseOptions) -> Value {
    json!({
        "showEffects": options.show_effects,
        "showObjectChanges": options.show_object_changes,
    })
}

#[derive(Debug, Deserialize)]
struct OwnedObjectsPage {
    #[serde(default)]
    data: Vec<OwnedObjectEntry>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
    #[serde(rename = "hasNextPage", default)]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct OwnedObjectEntry {
    #[serde(default)]
    data: Option<OwnedObject>,
}

#[async_trait]
impl LedgerClient for SuiRpcClient {
    async fn build_transaction(
        &self,
        sender: &str,
        plan: &TransactionPlan,
        gas_budget: u64,
    ) -> Result<TransactionBytes, ForgeError> {
        let (method, params) = plan_request(sender, plan, gas_budget)?;
        self.call(method, params).await
    }

    async fn execute_transaction(
        &self,
        tx_bytes: &str,
        signatures: &[String],
        options: ResponseOptions,
    ) -> Result<TransactionResponse, ForgeError> {
        self.call(
            "sui_executeTransactionBlock",
            json!([tx_bytes, signatures, options_json(options), "WaitForLocalExecution"]),
        )
        .await
    }

    async fn get_transaction(
        &self,
        digest: &str,
        options: ResponseOptions,
    ) -> Result<Option<TransactionResponse>, ForgeError> {
        let method = "sui_getTransactionBlock";
        let envelope: RpcEnvelope<TransactionResponse> = self
            .envelope(method, json!([digest, options_json(options)]))
            .await?;
        match envelope.error {
            Some(error) if error.message.contains(NOT_FOUND_MARKER) => Ok(None),
            Some(error) => Err(error.into_error(method)),
            None => Ok(envelope.result),
        }
    }

    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<&EventId>,
        limit: usize,
        order: EventOrder,
    ) -> Result<EventPage, ForgeError> {
        let descending = order == EventOrder::Descending;
        self.call(
            "suix_queryEvents",
            json!([{ "MoveEventType": event_type }, cursor, limit, descending]),
        )
        .await
    }

    async fn owned_objects(
        &self,
        owner: &str,
        struct_type: &str,
    ) -> Result<Vec<OwnedObject>, ForgeError> {
        let query = json!({
            "filter": { "StructType": struct_type },
            "options": { "showType": true },
        });

        let mut objects = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page: OwnedObjectsPage = self
                .call(
                    "suix_getOwnedObjects",
                    json!([owner, query, cursor, OWNED_OBJECTS_PAGE]),
                )
                .await?;
            objects.extend(page.data.into_iter().filter_map(|entry| entry.data));

            match page.next_cursor {
                Some(next) if page.has_next_page => cursor = Some(next),
                _ => break,
            }
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuildOutput;

    fn publish_plan(owner: &str) -> TransactionPlan {
        TransactionPlan::publish(
            BuildOutput {
                modules: vec!["AAEC".into()],
                dependencies: vec!["0x1".into(), "0x2".into()],
                digest: None,
            },
            owner,
        )
    }

    #[test]
    fn publish_plan_maps_to_unsafe_publish() {
        let (method, params) = plan_request("0xme", &publish_plan("0xme"), 100_000_000).unwrap();
        assert_eq!(method, "unsafe_publish");
        assert_eq!(
            params,
            json!(["0xme", ["AAEC"], ["0x1", "0x2"], null, "100000000"])
        );
    }

    #[test]
    fn publish_to_someone_else_is_unsupported() {
        let err = plan_request("0xme", &publish_plan("0xyou"), 1).unwrap_err();
        assert!(matches!(err, ForgeError::UnsupportedTransaction(_)));
    }

    #[test]
    fn transfer_plan_maps_to_unsafe_transfer_object() {
        let plan = TransactionPlan::transfer_object("0xcap", "0xalice");
        let (method, params) = plan_request("0xme", &plan, 5).unwrap();
        assert_eq!(method, "unsafe_transferObject");
        assert_eq!(params, json!(["0xme", "0xcap", null, "5", "0xalice"]));
    }

    #[test]
    fn other_shapes_are_unsupported() {
        let empty = TransactionPlan { commands: Vec::new() };
        assert!(plan_request("0xme", &empty, 1).is_err());

        let two_objects = TransactionPlan {
            commands: vec![PlanCommand::TransferObjects {
                objects: vec![
                    PlanArgument::Object("0xa".into()),
                    PlanArgument::Object("0xb".into()),
                ],
                recipient: "0xalice".into(),
            }],
        };
        assert!(matches!(
            plan_request("0xme", &two_objects, 1),
            Err(ForgeError::UnsupportedTransaction(_))
        ));
    }

    #[test]
    fn envelope_error_becomes_rpc_error() {
        let envelope: RpcEnvelope<Value> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32602, "message": "Invalid params"}
        }))
        .unwrap();
        let err = unwrap_envelope("suix_queryEvents", envelope).unwrap_err();
        assert!(err.to_string().contains("-32602"));
        assert!(err.to_string().contains("suix_queryEvents"));
    }

    #[test]
    fn envelope_without_result_is_an_error() {
        let envelope: RpcEnvelope<Value> =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        assert!(unwrap_envelope("m", envelope).is_err());
    }

    #[test]
    fn owned_objects_page_skips_error_entries() {
        let page: OwnedObjectsPage = serde_json::from_value(json!({
            "data": [
                {"data": {"objectId": "0xcap", "version": "3", "digest": "d", "type": "0x2::coin::TreasuryCap<0xp::m::M>"}},
                {"error": {"code": "deleted"}}
            ],
            "nextCursor": "0xcap",
            "hasNextPage": false
        }))
        .unwrap();
        let objects: Vec<_> = page.data.into_iter().filter_map(|e| e.data).collect();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].object_id, "0xcap");
        assert!(!page.has_next_page);
    }

    #[test]
    fn response_options_serialize_as_flags() {
        assert_eq!(
            options_json(ResponseOptions::effects_and_changes()),
            json!({"showEffects": true, "showObjectChanges": true})
        );
    }

    #[tokio::test]
    async fn unreachable_node_is_rpc_error() {
        let client = SuiRpcClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = client
            .get_transaction("Dx", ResponseOptions::effects_only())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Rpc(_)));
    }
}
