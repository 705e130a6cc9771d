use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a queue row, assigned monotonically by the store.
pub type ItemId = i64;

/// Identifier of a dead-letter row.
pub type DeadLetterId = i64;

/// A queue row that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub destination: String,
    pub event_name: String,
    /// Serialized JSON object
    pub payload: String,
    pub created_at: u64,
}

/// A pending event waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub destination: String,
    pub event_name: String,
    /// Serialized JSON object, stored byte for byte as enqueued
    pub payload: String,
    pub attempts: u32,
    /// Epoch seconds; zero means eligible immediately
    pub next_attempt_at: u64,
    pub created_at: u64,
}

impl QueueItem {
    #[must_use]
    pub const fn is_ready(&self, now: u64) -> bool {
        self.next_attempt_at == 0 || self.next_attempt_at <= now
    }

    /// The payload as a JSON object. A payload that is not an object yields an empty map.
    #[must_use]
    pub fn document(&self) -> Map<String, Value> {
        parse_document(&self.payload)
    }

    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.payload, max_chars)
    }
}

/// An event that exhausted its retries and awaits operator action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterItem {
    pub id: DeadLetterId,
    pub destination: String,
    pub event_name: String,
    pub payload: String,
    pub failure_message: String,
    pub failed_at: u64,
}

impl DeadLetterItem {
    #[must_use]
    pub fn document(&self) -> Map<String, Value> {
        parse_document(&self.payload)
    }

    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.payload, max_chars)
    }
}

fn parse_document(payload: &str) -> Map<String, Value> {
    serde_json::from_str(payload).unwrap_or_default()
}

fn preview(payload: &str, max_chars: usize) -> String {
    let mut chars = payload.chars();
    let mut out: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        out.push('…');
    }
    out
}
