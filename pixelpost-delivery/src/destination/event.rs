//! The destination-neutral view of a queued event.

use pixelpost_store::{ItemId, QueueItem};
use serde_json::{Map, Value};

/// Keys that may carry unhashed personal data. They are removed from every
/// level of a payload before any adapter sees it.
const RAW_PII_KEYS: [&str; 2] = ["email", "phone"];

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub item_id: ItemId,
    pub destination: String,
    /// Name recorded on the queue row
    pub event_name: String,
    pub payload: Map<String, Value>,
}

impl OutboundEvent {
    #[must_use]
    pub fn new(item_id: ItemId, destination: &str, event_name: &str, mut payload: Map<String, Value>) -> Self {
        strip_raw_pii(&mut payload);
        Self {
            item_id,
            destination: destination.to_string(),
            event_name: event_name.to_string(),
            payload,
        }
    }

    #[must_use]
    pub fn from_item(item: &QueueItem) -> Self {
        Self::new(item.id, &item.destination, &item.event_name, item.document())
    }

    fn string_field(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// `event_name` from the payload, then `event`, then the queue row's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.string_field("event_name")
            .or_else(|| self.string_field("event"))
            .unwrap_or(&self.event_name)
    }

    /// The payload's `event_time` as epoch seconds, or `now`.
    #[must_use]
    pub fn event_time(&self, now: u64) -> u64 {
        match self.payload.get("event_time") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(now),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(now),
            _ => now,
        }
    }

    /// The payload's `event_id`, or a fresh `{prefix}{ulid}` token.
    #[must_use]
    pub fn event_id(&self, prefix: &str) -> String {
        match self.payload.get("event_id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("{prefix}{}", ulid::Ulid::new().to_string().to_lowercase()),
        }
    }

    #[must_use]
    pub fn custom_data(&self) -> Map<String, Value> {
        self.object("custom_data")
    }

    /// The payload's `user_data` object. Raw identifiers were already removed.
    #[must_use]
    pub fn user_data(&self) -> Map<String, Value> {
        self.object("user_data")
    }

    fn object(&self, key: &str) -> Map<String, Value> {
        self.payload
            .get(key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Pre-hashed e-mail address, if supplied.
    #[must_use]
    pub fn email_hash(&self) -> Option<String> {
        hashed(&self.user_data(), "email_hash")
    }

    /// Pre-hashed phone number, if supplied.
    #[must_use]
    pub fn phone_hash(&self) -> Option<String> {
        hashed(&self.user_data(), "phone_hash")
    }

    /// `event_source_url`, then `source_url`, then `custom_data.source_url`.
    #[must_use]
    pub fn source_url(&self) -> Option<String> {
        self.string_field("event_source_url")
            .or_else(|| self.string_field("source_url"))
            .map(ToString::to_string)
            .or_else(|| {
                self.custom_data()
                    .get("source_url")
                    .and_then(Value::as_str)
                    .filter(|url| !url.is_empty())
                    .map(ToString::to_string)
            })
    }

    /// `custom_data.value`, passed through untouched.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.custom_data().get("value").filter(|v| !v.is_null()).cloned()
    }

    /// `custom_data.currency`, trimmed. Codes are not otherwise validated.
    #[must_use]
    pub fn currency(&self) -> Option<String> {
        self.custom_data()
            .get("currency")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(ToString::to_string)
    }
}

fn hashed(user_data: &Map<String, Value>, key: &str) -> Option<String> {
    user_data
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Rename hashed identifiers to the short keys most ad platforms expect
/// (`email_hash` to `em`, `phone_hash` to `ph`); everything else passes through.
#[must_use]
pub fn hashed_user_data(user_data: Map<String, Value>) -> Map<String, Value> {
    user_data
        .into_iter()
        .map(|(key, value)| match key.as_str() {
            "email_hash" => ("em".to_string(), value),
            "phone_hash" => ("ph".to_string(), value),
            _ => (key, value),
        })
        .collect()
}

/// Remove raw `email` and `phone` keys from `document` and every nested object.
pub fn strip_raw_pii(document: &mut Map<String, Value>) {
    for key in RAW_PII_KEYS {
        if document.remove(key).is_some() {
            tracing::trace!(key, "Dropped raw identifier from payload");
        }
    }

    for value in document.values_mut() {
        strip_value(value);
    }
}

fn strip_value(value: &mut Value) {
    match value {
        Value::Object(map) => strip_raw_pii(map),
        Value::Array(items) => items.iter_mut().for_each(strip_value),
        _ => {}
    }
}
