//! External payment gateway seam.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::Money;
use thiserror::Error;

use crate::payment::Payment;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Charge declined: {0}")]
    Declined(String),

    #[error("Refund rejected: {0}")]
    RefundRejected(String),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// Charges and refunds settled by an external provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges the payment and returns the provider's transaction id.
    async fn charge(&self, payment: &Payment) -> Result<String, GatewayError>;

    async fn refund(&self, transaction_id: &str, amount: Money) -> Result<(), GatewayError>;
}

#[derive(Debug, Default)]
struct MockState {
    fail_on_charge: AtomicBool,
    fail_on_refund: AtomicBool,
    latency_ms: AtomicU64,
    sequence: AtomicU64,
    charges: AtomicUsize,
    refunds: AtomicUsize,
}

/// Deterministic gateway for tests and local runs.
///
/// Transaction ids look like `TXN_<unix seconds>_<sequence>`.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentGateway {
    state: Arc<MockState>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fixed delay to every charge and refund.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.state.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Configures the gateway to decline charges.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.fail_on_charge.store(fail, Ordering::SeqCst);
    }

    /// Configures the gateway to reject refunds.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.fail_on_refund.store(fail, Ordering::SeqCst);
    }

    /// Number of charge attempts that reached the gateway.
    pub fn charge_count(&self) -> usize {
        self.state.charges.load(Ordering::SeqCst)
    }

    /// Number of refund attempts that reached the gateway.
    pub fn refund_count(&self) -> usize {
        self.state.refunds.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let millis = self.state.latency_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(&self, payment: &Payment) -> Result<String, GatewayError> {
        self.state.charges.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.state.fail_on_charge.load(Ordering::SeqCst) {
            return Err(GatewayError::Declined(format!(
                "charge of {} declined",
                payment.amount
            )));
        }

        let sequence = self.state.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("TXN_{}_{}", Utc::now().timestamp(), sequence))
    }

    async fn refund(&self, transaction_id: &str, amount: Money) -> Result<(), GatewayError> {
        self.state.refunds.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.state.fail_on_refund.load(Ordering::SeqCst) {
            return Err(GatewayError::RefundRejected(format!(
                "refund of {amount} for {transaction_id} rejected"
            )));
        }
        Ok(())
    }
}
