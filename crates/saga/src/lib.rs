//! Order fulfillment saga runtime.
//!
//! The saga is choreographed: the order, inventory and payment services
//! each react to the others' events on a shared bus, and compensations
//! (stock release, refund) are triggered by `order.cancelled`.
//!
//! ```text
//! create_order ─► stock.check (request/reply)
//!              ─► stock.reserve ─────────► inventory
//!              ─► order.created ─────────► payment ─► payment.processed ─► order
//! cancelled    ─► order.cancelled ───────► inventory (release), payment (refund)
//! ```

pub mod error;
pub mod runtime;

pub use error::{Result, SagaError};
pub use runtime::{FulfillmentServices, Inventory, Orders, Payments, SagaConfig};
