//! Inventory reservation engine.
//!
//! Owns product stock. Stock only changes through signed deltas that the
//! store applies atomically and refuses when they would go negative.
//! Order-driven reservations go through a per-order ledger so redelivered
//! or reordered saga events cannot move stock twice.

pub mod error;
pub mod handlers;
pub mod product;
pub mod repository;
pub mod service;

pub use error::{InventoryError, Result};
pub use handlers::InventoryEventHandler;
pub use product::{NewProduct, Product, ReleaseOutcome, ReservationOutcome, StockChange};
pub use repository::{InMemoryProductRepository, ProductRepository, ProductStoreError};
pub use service::{InventoryService, StockLevel};
