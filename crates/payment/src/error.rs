use common::PaymentId;
use event_bus::BusError;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::payment::PaymentStatus;
use crate::repository::PaymentStoreError;

/// Errors returned by the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The order already has a payment.
    #[error("Duplicate payment: {0}")]
    DuplicatePayment(String),

    #[error("Payment {payment_id} cannot be refunded while {status}")]
    InvalidRefundState {
        payment_id: PaymentId,
        status: PaymentStatus,
    },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<PaymentStoreError> for PaymentError {
    fn from(e: PaymentStoreError) -> Self {
        match e {
            PaymentStoreError::NotFound(id) => PaymentError::NotFound(format!("payment {id}")),
            PaymentStoreError::NotFoundForOrder(order_id) => {
                PaymentError::NotFound(format!("payment for order {order_id}"))
            }
            PaymentStoreError::DuplicateOrder(order_id) => {
                PaymentError::DuplicatePayment(format!("order {order_id} already has a payment"))
            }
            other @ (PaymentStoreError::StatusConflict { .. }
            | PaymentStoreError::Unavailable(_)) => PaymentError::Store(other.to_string()),
        }
    }
}

/// Result type for payment operations.
pub type Result<T> = std::result::Result<T, PaymentError>;
