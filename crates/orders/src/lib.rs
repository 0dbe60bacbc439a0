//! Order saga coordinator.
//!
//! Owns the order lifecycle: creation behind a synchronous stock check, the
//! status state machine applied through compare-and-swap, and a
//! transactional outbox that carries every event the saga depends on.
//!
//! # Example
//!
//! ```ignore
//! use orders::{InMemoryOrderRepository, NewOrder, OrderConfig, OrderItem, OrderService};
//!
//! let service = OrderService::new(InMemoryOrderRepository::new(), bus, OrderConfig::default());
//! let order = service
//!     .create_order(NewOrder::new("user-1", address).with_item(item))
//!     .await?;
//! service.cancel_order(order.id()).await?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod order;
pub mod outbox;
pub mod repository;
pub mod service;

pub use config::OrderConfig;
pub use error::{OrderError, Result};
pub use handlers::OrderEventHandler;
pub use order::{NewOrder, Order, OrderItem, OrderStatus};
pub use outbox::{DispatchReport, OutboxDispatcher, OutboxRecord};
pub use repository::{InMemoryOrderRepository, OrderRepository, OrderStoreError};
pub use service::OrderService;
