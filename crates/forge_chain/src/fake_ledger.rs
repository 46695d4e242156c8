//! In-memory [`LedgerClient`] used by unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::ForgeError;
use crate::rpc::{
    EventId, EventOrder, EventPage, ExecutionStatus, LedgerClient, ObjectChange, OwnedObject,
    ResponseOptions, TransactionBytes, TransactionEffects, TransactionResponse,
};
use crate::transaction::TransactionPlan;

/// base64("tx")
pub const TX_BYTES: &str = "dHg=";

#[derive(Default)]
pub struct FakeLedger {
    pub built: Mutex<Vec<(String, TransactionPlan, u64)>>,
    pub executed: Mutex<Vec<Vec<String>>>,
    /// What `get_transaction` eventually returns; `None` never finalizes.
    pub finalized: Mutex<Option<TransactionResponse>>,
    /// Number of `get_transaction` calls answered with `None` first.
    pub pending_polls: AtomicUsize,
    pub polls: AtomicUsize,
    /// When set, every `get_transaction` fails with this RPC error.
    pub poll_failure: Mutex<Option<String>>,
    /// Scripted `query_events` answers, consumed front to back.
    pub pages: Mutex<VecDeque<Result<EventPage, ForgeError>>>,
    /// `(cursor, limit, order)` of every `query_events` call.
    pub event_queries: Mutex<Vec<(Option<EventId>, usize, EventOrder)>>,
    pub owned: Mutex<Vec<OwnedObject>>,
    pub owned_queries: Mutex<Vec<(String, String)>>,
    /// When set, `execute_transaction` waits for a notification.
    pub execute_gate: Option<Arc<Notify>>,
}

impl FakeLedger {
    pub fn finalizing(response: TransactionResponse) -> Self {
        Self {
            finalized: Mutex::new(Some(response)),
            ..Self::default()
        }
    }

    pub fn push_page(&self, page: Result<EventPage, ForgeError>) {
        self.pages.lock().push_back(page);
    }
}

pub fn success(digest: &str, object_changes: Vec<ObjectChange>) -> TransactionResponse {
    TransactionResponse {
        digest: digest.into(),
        effects: Some(TransactionEffects {
            status: ExecutionStatus {
                status: "success".into(),
                error: None,
            },
        }),
        object_changes,
    }
}

pub fn failure(digest: &str, error: &str) -> TransactionResponse {
    TransactionResponse {
        digest: digest.into(),
        effects: Some(TransactionEffects {
            status: ExecutionStatus {
                status: "failure".into(),
                error: Some(error.into()),
            },
        }),
        object_changes: Vec::new(),
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn build_transaction(
        &self,
        sender: &str,
        plan: &TransactionPlan,
        gas_budget: u64,
    ) -> Result<TransactionBytes, ForgeError> {
        self.built
            .lock()
            .push((sender.to_string(), plan.clone(), gas_budget));
        Ok(TransactionBytes {
            tx_bytes: TX_BYTES.into(),
        })
    }

    async fn execute_transaction(
        &self,
        _tx_bytes: &str,
        signatures: &[String],
        _options: ResponseOptions,
    ) -> Result<TransactionResponse, ForgeError> {
        if let Some(gate) = &self.execute_gate {
            gate.notified().await;
        }
        self.executed.lock().push(signatures.to_vec());
        let digest = self
            .finalized
            .lock()
            .as_ref()
            .map(|r| r.digest.clone())
            .unwrap_or_else(|| "Dpending".into());
        Ok(TransactionResponse {
            digest,
            effects: None,
            object_changes: Vec::new(),
        })
    }

    async fn get_transaction(
        &self,
        _digest: &str,
        _options: ResponseOptions,
    ) -> Result<Option<TransactionResponse>, ForgeError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.poll_failure.lock().clone() {
            return Err(ForgeError::Rpc(message));
        }
        let pending = self.pending_polls.load(Ordering::SeqCst);
        if pending > 0 {
            self.pending_polls.store(pending - 1, Ordering::SeqCst);
            return Ok(None);
        }
        Ok(self.finalized.lock().clone())
    }

    async fn query_events(
        &self,
        _event_type: &str,
        cursor: Option<&EventId>,
        limit: usize,
        order: EventOrder,
    ) -> Result<EventPage, ForgeError> {
        self.event_queries
            .lock()
            .push((cursor.cloned(), limit, order));
        self.pages
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(EventPage::default()))
    }

    async fn owned_objects(
        &self,
        owner: &str,
        struct_type: &str,
    ) -> Result<Vec<OwnedObject>, ForgeError> {
        self.owned_queries
            .lock()
            .push((owner.to_string(), struct_type.to_string()));
        Ok(self
            .owned
            .lock()
            .iter()
            .filter(|o| o.object_type.as_deref() == Some(struct_type))
            .cloned()
            .collect())
    }
}
