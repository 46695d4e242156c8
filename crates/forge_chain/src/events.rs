//! Cursor-based synchronizer for the factory's `TokenCreationEvent`s.
//!
//! Each [`EventSynchronizer::tick`] fetches one page of events after the
//! stored cursor, decodes them, appends unseen ones to a bounded buffer and
//! then moves the cursor forward. A failed tick leaves the cursor where it
//! was so the next tick retries the same page.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use forge_core::ForgeConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::rpc::{EventId, EventOrder, EventPage, LedgerClient, LedgerEvent};

/// Opaque position in the ledger's event stream.
pub type EventCursor = EventId;

/// Callback run for every event newly added to the buffer.
pub type EventHandler = Box<dyn Fn(&TokenCreationEvent) + Send + Sync>;

// ---------------------------------------------------------------------------
// Event decoding
// ---------------------------------------------------------------------------

/// A decoded factory creation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCreationEvent {
    pub id: EventCursor,
    pub creator: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub initial_supply: String,
    pub timestamp: String,
    pub metadata_uri: String,
}

impl TokenCreationEvent {
    /// Decode the event's `parsedJson`. Move `vector<u8>` fields arrive as
    /// number arrays (or occasionally strings) and are read as UTF-8; large
    /// integers may arrive as numbers or strings and are kept as decimal text.
    pub fn from_ledger(event: &LedgerEvent) -> Result<Self, String> {
        let fields = event
            .parsed_json
            .as_object()
            .ok_or_else(|| "parsedJson is not an object".to_string())?;
        let field = |key: &str| fields.get(key).ok_or_else(|| format!("missing field `{key}`"));

        let decimals_text = decimal_text(field("decimals")?, "decimals")?;
        let decimals = decimals_text
            .parse::<u8>()
            .map_err(|_| format!("`decimals` out of range: {decimals_text}"))?;

        Ok(Self {
            id: event.id.clone(),
            creator: field("creator")?
                .as_str()
                .ok_or_else(|| "`creator` is not a string".to_string())?
                .to_string(),
            name: byte_text(field("name")?, "name")?,
            symbol: byte_text(field("symbol")?, "symbol")?,
            decimals,
            initial_supply: decimal_text(field("initial_supply")?, "initial_supply")?,
            timestamp: decimal_text(field("timestamp")?, "timestamp")?,
            metadata_uri: byte_text(field("metadata_uri")?, "metadata_uri")?,
        })
    }
}

fn byte_text(value: &Value, key: &str) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) => {
            let bytes = items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| format!("`{key}` contains a non-byte element"))
                })
                .collect::<Result<Vec<u8>, _>>()?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Err(format!("`{key}` is neither bytes nor a string")),
    }
}

fn decimal_text(value: &Value, key: &str) -> Result<String, String> {
    match value {
        Value::Number(n) if n.is_u64() => Ok(n.to_string()),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => Ok(s.clone()),
        _ => Err(format!("`{key}` is not an unsigned integer")),
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// `<package>::<module>::<struct>`; `None` disables polling.
    pub event_type: Option<String>,
    pub page_size: usize,
    pub capacity: usize,
    pub poll_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            event_type: None,
            page_size: 50,
            capacity: 100,
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl From<&ForgeConfig> for SyncOptions {
    fn from(config: &ForgeConfig) -> Self {
        Self {
            event_type: config.watched_event_type(),
            page_size: config.event_page_size,
            capacity: config.recent_event_capacity,
            poll_interval: config.poll_interval(),
        }
    }
}

/// What one [`EventSynchronizer::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No event type configured; nothing was queried.
    Unconfigured,
    /// Another tick was still running.
    Busy,
    Polled { received: usize, appended: usize },
    /// The query failed; the cursor is unchanged.
    Failed(String),
}

#[derive(Debug, Default)]
struct SyncState {
    cursor: Option<EventCursor>,
    recent: VecDeque<TokenCreationEvent>,
}

pub struct EventSynchronizer {
    client: Arc<dyn LedgerClient>,
    options: SyncOptions,
    state: Mutex<SyncState>,
    in_flight: AtomicBool,
    handler: Option<EventHandler>,
}

impl EventSynchronizer {
    pub fn new(client: Arc<dyn LedgerClient>, options: SyncOptions) -> Self {
        Self {
            client,
            options,
            state: Mutex::new(SyncState::default()),
            in_flight: AtomicBool::new(false),
            handler: None,
        }
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TokenCreationEvent) + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn cursor(&self) -> Option<EventCursor> {
        self.state.lock().cursor.clone()
    }

    /// Continue from an externally stored cursor. `None` restarts from the
    /// beginning of the stream.
    pub fn resume_from(&self, cursor: Option<EventCursor>) {
        self.state.lock().cursor = cursor;
    }

    /// Up to `n` most recent events, oldest first.
    pub fn recent_events(&self, n: usize) -> Vec<TokenCreationEvent> {
        let state = self.state.lock();
        let skip = state.recent.len().saturating_sub(n);
        state.recent.iter().skip(skip).cloned().collect()
    }

    /// Poll one page of events.
    pub async fn tick(&self) -> TickOutcome {
        let Some(event_type) = self.options.event_type.as_deref() else {
            return TickOutcome::Unconfigured;
        };
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("previous tick still running, skipping");
            return TickOutcome::Busy;
        }
        let _in_flight = InFlight(&self.in_flight);

        let cursor = self.cursor();
        let page = self
            .client
            .query_events(
                event_type,
                cursor.as_ref(),
                self.options.page_size,
                EventOrder::Ascending,
            )
            .await;

        match page {
            Ok(page) => self.apply_page(page),
            Err(e) => {
                warn!(event_type = %event_type, error = %e, "event poll failed, keeping cursor");
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    fn apply_page(&self, page: EventPage) -> TickOutcome {
        let received = page.data.len();
        let decoded: Vec<TokenCreationEvent> = page
            .data
            .iter()
            .filter_map(|event| match TokenCreationEvent::from_ledger(event) {
                Ok(decoded) => Some(decoded),
                Err(reason) => {
                    warn!(
                        tx_digest = %event.id.tx_digest,
                        event_seq = %event.id.event_seq,
                        reason = %reason,
                        "skipping undecodable event"
                    );
                    None
                }
            })
            .collect();

        let mut appended = Vec::new();
        {
            let mut state = self.state.lock();
            for event in decoded {
                if state.recent.iter().any(|kept| kept.id == event.id) {
                    continue;
                }
                state.recent.push_back(event.clone());
                while state.recent.len() > self.options.capacity {
                    state.recent.pop_front();
                }
                appended.push(event);
            }
            if let Some(next) = page.next_cursor {
                state.cursor = Some(next);
            }
        }

        for event in &appended {
            info!(
                creator = %event.creator,
                name = %event.name,
                symbol = %event.symbol,
                "token creation event"
            );
            if let Some(handler) = &self.handler {
                handler(event);
            }
        }

        TickOutcome::Polled {
            received,
            appended: appended.len(),
        }
    }

    /// Run [`tick`](Self::tick) every poll interval until `shutdown` fires.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.options.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                event_type = ?self.options.event_type,
                interval_ms = self.options.poll_interval.as_millis() as u64,
                "event synchronizer started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    _ = shutdown.recv() => {
                        info!("event synchronizer stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Clears the in-flight flag when a tick ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
