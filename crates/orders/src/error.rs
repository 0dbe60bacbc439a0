use common::{EventDataError, OrderId, ProductId};
use event_bus::BusError;
use thiserror::Error;

use crate::order::OrderStatus;
use crate::repository::OrderStoreError;

/// Errors returned by the order service.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order {order_id} cannot be cancelled in status {status}")]
    OrderNotCancellable {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// Another writer moved the order first.
    #[error("Order {order_id} changed concurrently: expected {expected}, found {actual}")]
    ConcurrentStateChange {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error("Product {product_id} is out of stock: {reason}")]
    OutOfStock {
        product_id: ProductId,
        reason: String,
    },

    /// The stock service did not answer in time, or nobody was listening.
    #[error("Transport timeout: {0}")]
    TransportTimeout(String),

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<OrderStoreError> for OrderError {
    fn from(e: OrderStoreError) -> Self {
        match e {
            OrderStoreError::NotFound(id) => OrderError::NotFound(id),
            OrderStoreError::StatusConflict {
                order_id,
                expected,
                actual,
            } => OrderError::ConcurrentStateChange {
                order_id,
                expected,
                actual,
            },
            OrderStoreError::AlreadyExists(id) => {
                OrderError::Store(format!("order {id} already exists"))
            }
            OrderStoreError::OutboxRecordNotFound(id) => {
                OrderError::Store(format!("outbox record {id} not found"))
            }
            OrderStoreError::Unavailable(reason) => OrderError::Store(reason),
        }
    }
}

impl From<EventDataError> for OrderError {
    fn from(e: EventDataError) -> Self {
        OrderError::Bus(e.into())
    }
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;
