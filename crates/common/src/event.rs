//! The event envelope shared by every subject on the bus.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while building or reading an event's payload.
#[derive(Debug, Error)]
pub enum EventDataError {
    /// The bytes or the data map could not be (de)serialized.
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A payload serialized to something other than a JSON object.
    #[error("Event data for '{0}' must be a JSON object")]
    NotAnObject(String),
}

/// An immutable fact broadcast on the subject equal to its type.
///
/// Wire format: `{id, type, source, data, timestamp}` with an optional
/// `correlation_id` linking every event of one order's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique per publish.
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Name of the producing service.
    pub source: String,

    #[serde(default)]
    pub data: Map<String, Value>,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Event {
    /// Creates an event with a fresh id and the current timestamp.
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            source: source.into(),
            data,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Creates an event whose data map is the serialized form of `payload`.
    pub fn from_payload<T: Serialize>(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: &T,
    ) -> Result<Self, EventDataError> {
        let event_type = event_type.into();
        match serde_json::to_value(payload)? {
            Value::Object(data) => Ok(Self::new(event_type, source, data)),
            _ => Err(EventDataError::NotAnObject(event_type)),
        }
    }

    /// Sets the correlation id.
    pub fn with_correlation_id(mut self, correlation_id: Option<impl Into<String>>) -> Self {
        self.correlation_id = correlation_id.map(Into::into);
        self
    }

    /// Decodes the data map into a typed payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EventDataError> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EventDataError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventDataError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
