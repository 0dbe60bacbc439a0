//! Payment persistence contract and its in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, PaymentId};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::payment::{Payment, PaymentStatus};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentStoreError {
    #[error("Payment not found: {0}")]
    NotFound(PaymentId),

    #[error("No payment for order {0}")]
    NotFoundForOrder(OrderId),

    /// A payment already exists for the order.
    #[error("Order {0} already has a payment")]
    DuplicateOrder(OrderId),

    /// The stored status no longer matches the expected one.
    #[error("Payment {payment_id} is {actual}, expected {expected}")]
    StatusConflict {
        payment_id: PaymentId,
        expected: PaymentStatus,
        actual: PaymentStatus,
    },

    #[error("Payment store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, PaymentStoreError>;

/// Storage for payments, unique per order id.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: Payment) -> StoreResult<()>;

    async fn get_by_id(&self, id: PaymentId) -> StoreResult<Payment>;

    async fn get_by_order_id(&self, order_id: OrderId) -> StoreResult<Payment>;

    /// Compare-and-swap on the payment status.
    ///
    /// A `transaction_id` of `Some` replaces the stored one.
    async fn set_status(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        new: PaymentStatus,
        transaction_id: Option<String>,
    ) -> StoreResult<Payment>;

    /// Payments ordered by creation time, newest first.
    async fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<Payment>>;
}

#[derive(Debug, Default)]
struct PaymentState {
    payments: HashMap<PaymentId, Payment>,
    by_order: HashMap<OrderId, PaymentId>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentRepository {
    state: Arc<RwLock<PaymentState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentStoreError::Unavailable(
                "payment store offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn create(&self, payment: Payment) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.by_order.contains_key(&payment.order_id) {
            return Err(PaymentStoreError::DuplicateOrder(payment.order_id));
        }
        state.by_order.insert(payment.order_id, payment.id);
        state.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get_by_id(&self, id: PaymentId) -> StoreResult<Payment> {
        self.check_available()?;
        self.state
            .read()
            .await
            .payments
            .get(&id)
            .cloned()
            .ok_or(PaymentStoreError::NotFound(id))
    }

    async fn get_by_order_id(&self, order_id: OrderId) -> StoreResult<Payment> {
        self.check_available()?;
        let state = self.state.read().await;
        state
            .by_order
            .get(&order_id)
            .and_then(|id| state.payments.get(id))
            .cloned()
            .ok_or(PaymentStoreError::NotFoundForOrder(order_id))
    }

    async fn set_status(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        new: PaymentStatus,
        transaction_id: Option<String>,
    ) -> StoreResult<Payment> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(&id)
            .ok_or(PaymentStoreError::NotFound(id))?;

        if payment.status != expected {
            return Err(PaymentStoreError::StatusConflict {
                payment_id: id,
                expected,
                actual: payment.status,
            });
        }

        payment.status = new;
        if transaction_id.is_some() {
            payment.transaction_id = transaction_id;
        }
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<Payment>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut payments: Vec<_> = state.payments.values().cloned().collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments.into_iter().skip(offset).take(limit).collect())
    }
}
