//! Subject-based messaging for the fulfillment services.
//!
//! The [`MessageBus`] trait is the transport seam: fire-and-forget
//! `publish`, fan-out `subscribe` and bounded `request`/reply. Delivery is
//! at-most-once, so consumers pair it with [`ProcessedEvents`] to absorb
//! redeliveries coming from retries.

pub mod bus;
pub mod dedup;
pub mod error;
pub mod memory;
pub mod message;

pub use bus::{MessageBus, MessageBusExt, MessageHandler, Subscription, handler_fn};
pub use dedup::ProcessedEvents;
pub use error::{BusError, Result};
pub use memory::InMemoryEventBus;
pub use message::Message;
