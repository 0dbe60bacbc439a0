//! Order persistence contract and its in-memory implementation.
//!
//! Every write that changes an order also takes the events it produced, so the
//! store can persist the state change and its outbox entries together.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{Event, OrderId, UserId};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::order::{Order, OrderStatus};
use crate::outbox::OutboxRecord;

const DEFAULT_DISPATCHED_RETENTION: usize = 1_000;

/// Errors raised by an order store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderStoreError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),

    /// The stored status no longer matches the one the caller read.
    #[error("Status conflict on {order_id}: expected {expected}, found {actual}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error("Outbox record not found: {0}")]
    OutboxRecordNotFound(String),

    #[error("Order store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, OrderStoreError>;

/// Storage for orders and their outbox.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new order together with its outbound events.
    async fn create(&self, order: Order, outbox: Vec<Event>) -> StoreResult<()>;

    async fn get_by_id(&self, id: OrderId) -> StoreResult<Order>;

    /// Moves the order from `expected` to `new` and enqueues `outbox`, or
    /// does nothing and reports the status actually stored.
    async fn compare_and_swap_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        outbox: Vec<Event>,
    ) -> StoreResult<Order>;

    /// Newest first.
    async fn list_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Order>>;

    /// Newest first.
    async fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<Order>>;

    /// Enqueues events that are not tied to a status change.
    async fn append_outbox(&self, events: Vec<Event>) -> StoreResult<()>;

    /// Undispatched records in the order they were written.
    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxRecord>>;

    async fn mark_outbox_dispatched(&self, record_id: &str) -> StoreResult<()>;

    async fn record_outbox_failure(&self, record_id: &str, error: String) -> StoreResult<()>;
}

#[derive(Debug, Default)]
struct OrderState {
    orders: HashMap<OrderId, Order>,
    /// Insertion order, for stable listing of orders created in the same instant.
    sequence: Vec<OrderId>,
    outbox: Vec<OutboxRecord>,
}

impl OrderState {
    fn enqueue(&mut self, events: Vec<Event>) {
        let now = Utc::now();
        self.outbox
            .extend(events.into_iter().map(|event| OutboxRecord::new(event, now)));
    }

    /// Drops the oldest dispatched records beyond `retain`.
    fn prune_dispatched(&mut self, retain: usize) {
        let dispatched = self.outbox.iter().filter(|r| r.is_dispatched()).count();
        let mut excess = dispatched.saturating_sub(retain);
        if excess == 0 {
            return;
        }
        self.outbox.retain(|record| {
            if excess > 0 && record.is_dispatched() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    fn outbox_record(&mut self, record_id: &str) -> StoreResult<&mut OutboxRecord> {
        self.outbox
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| OrderStoreError::OutboxRecordNotFound(record_id.to_string()))
    }

    fn newest_first<'a>(
        &'a self,
        filter: impl Fn(&Order) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Order> + 'a {
        self.sequence
            .iter()
            .rev()
            .filter_map(|id| self.orders.get(id))
            .filter(move |order| filter(order))
    }
}

/// In-memory order store.
///
/// Orders and the outbox share one lock so a status change and its events
/// become visible together. Only the most recent dispatched outbox records
/// are retained.
#[derive(Debug, Clone)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<OrderState>>,
    unavailable: Arc<AtomicBool>,
    dispatched_retention: usize,
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::with_outbox_retention(DEFAULT_DISPATCHED_RETENTION)
    }
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that keeps at most `retain` dispatched outbox records.
    pub fn with_outbox_retention(retain: usize) -> Self {
        Self {
            state: Arc::default(),
            unavailable: Arc::default(),
            dispatched_retention: retain,
        }
    }

    /// Makes every operation fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Number of outbox records still waiting for dispatch.
    pub async fn pending_outbox_count(&self) -> usize {
        self.state
            .read()
            .await
            .outbox
            .iter()
            .filter(|record| !record.is_dispatched())
            .count()
    }

    /// Every retained outbox record, dispatched or not.
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.state.read().await.outbox.clone()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OrderStoreError::Unavailable(
                "order store offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: Order, outbox: Vec<Event>) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id()) {
            return Err(OrderStoreError::AlreadyExists(order.id()));
        }
        state.sequence.push(order.id());
        state.orders.insert(order.id(), order);
        state.enqueue(outbox);
        Ok(())
    }

    async fn get_by_id(&self, id: OrderId) -> StoreResult<Order> {
        self.check_available()?;
        self.state
            .read()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or(OrderStoreError::NotFound(id))
    }

    async fn compare_and_swap_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
        outbox: Vec<Event>,
    ) -> StoreResult<Order> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(OrderStoreError::NotFound(id))?;

        if order.status() != expected {
            return Err(OrderStoreError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status(),
            });
        }

        order.apply_status(new, Utc::now());
        let updated = order.clone();
        state.enqueue(outbox);
        Ok(updated)
    }

    async fn list_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Order>> {
        self.check_available()?;
        let state = self.state.read().await;
        let user_id = user_id.clone();
        Ok(state
            .newest_first(move |order| order.user_id() == &user_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list(&self, limit: usize, offset: usize) -> StoreResult<Vec<Order>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .newest_first(|_| true)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn append_outbox(&self, events: Vec<Event>) -> StoreResult<()> {
        self.check_available()?;
        self.state.write().await.enqueue(events);
        Ok(())
    }

    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxRecord>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .await
            .outbox
            .iter()
            .filter(|record| !record.is_dispatched())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_outbox_dispatched(&self, record_id: &str) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let record = state.outbox_record(record_id)?;
        record.attempts += 1;
        record.dispatched_at = Some(Utc::now());
        state.prune_dispatched(self.dispatched_retention);
        Ok(())
    }

    async fn record_outbox_failure(&self, record_id: &str, error: String) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let record = state.outbox_record(record_id)?;
        record.attempts += 1;
        record.last_error = Some(error);
        Ok(())
    }
}
