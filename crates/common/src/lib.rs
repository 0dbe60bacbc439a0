//! Shared types for the order fulfillment services.
//!
//! Everything that crosses a service boundary lives here: identifiers,
//! money, the event envelope, the subject names, and the typed payloads
//! carried inside `Event::data`.

pub mod event;
pub mod payloads;
pub mod subjects;
pub mod types;

pub use event::{Event, EventDataError};
pub use types::{Address, Money, OrderId, PaymentId, ProductId, SagaId, UserId};
