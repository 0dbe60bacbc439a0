//! Saga runtime error types.

use event_bus::BusError;
use inventory::InventoryError;
use orders::OrderError;
use payment::PaymentError;
use thiserror::Error;

/// Errors raised while starting or driving the fulfillment services.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Order service error: {0}")]
    Order(#[from] OrderError),

    #[error("Inventory service error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Payment service error: {0}")]
    Payment(#[from] PaymentError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
