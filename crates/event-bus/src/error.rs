use std::time::Duration;

use common::EventDataError;
use thiserror::Error;

/// Errors surfaced by a message bus transport.
#[derive(Debug, Error)]
pub enum BusError {
    /// No reply arrived within the caller's deadline.
    #[error("Request on '{subject}' timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },

    /// Nobody is subscribed to the subject, or the responder went away
    /// without replying.
    #[error("No responders for subject '{0}'")]
    NoResponders(String),

    /// The bus has been shut down.
    #[error("Message bus is closed")]
    Closed,

    /// A message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport refused the operation.
    #[error("Message bus unavailable: {0}")]
    Unavailable(String),
}

impl BusError {
    /// Returns true for the failures a caller may retry later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BusError::Timeout { .. } | BusError::NoResponders(_) | BusError::Unavailable(_)
        )
    }
}

impl From<EventDataError> for BusError {
    fn from(e: EventDataError) -> Self {
        match e {
            EventDataError::Malformed(inner) => BusError::Serialization(inner),
            EventDataError::NotAnObject(event_type) => BusError::Serialization(
                <serde_json::Error as serde::ser::Error>::custom(format!(
                    "event data for '{event_type}' must be a JSON object"
                )),
            ),
        }
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
