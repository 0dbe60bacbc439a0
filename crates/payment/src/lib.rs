//! Payment processor.
//!
//! Charges orders through a [`PaymentGateway`], refunds completed payments
//! and reacts to the order lifecycle on the bus. One payment exists per
//! order.

pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod payment;
pub mod processor;
pub mod repository;

pub use config::PaymentConfig;
pub use error::{PaymentError, Result};
pub use gateway::{GatewayError, MockPaymentGateway, PaymentGateway};
pub use handlers::PaymentEventHandler;
pub use payment::{Payment, PaymentMethod, PaymentRequest, PaymentStatus};
pub use processor::PaymentProcessor;
pub use repository::{InMemoryPaymentRepository, PaymentRepository, PaymentStoreError};
