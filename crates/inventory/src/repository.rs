//! Product persistence contract and its in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, ProductId};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::product::{Product, ReleaseOutcome, ReservationOutcome, StockChange};

/// Errors raised by a product store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProductStoreError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error("Product already exists: {0}")]
    AlreadyExists(ProductId),

    /// Applying the delta would drive stock negative.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("Product store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, ProductStoreError>;

/// Storage for products and the per-order reservation ledger.
///
/// Every stock mutation is atomic: the guard `stock + delta >= 0` is
/// evaluated and applied in one step.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create(&self, product: Product) -> StoreResult<()>;

    async fn get_by_id(&self, id: &ProductId) -> StoreResult<Product>;

    /// Active products in registration order, optionally limited to one
    /// category.
    async fn list(
        &self,
        limit: usize,
        offset: usize,
        category: Option<&str>,
    ) -> StoreResult<Vec<Product>>;

    /// Soft-deletes a product. Its stock and reservations are kept.
    async fn deactivate(&self, id: &ProductId) -> StoreResult<Product>;

    /// Applies a signed delta to a product's stock.
    async fn adjust_stock(&self, id: &ProductId, delta: i64) -> StoreResult<StockChange>;

    /// Decrements stock for an order unless the order already reserved this
    /// product or was released.
    async fn reserve_for_order(
        &self,
        order_id: OrderId,
        id: &ProductId,
        quantity: u32,
    ) -> StoreResult<ReservationOutcome>;

    /// Restores whatever the order reserved for this product and marks the
    /// pair released.
    async fn release_for_order(&self, order_id: OrderId, id: &ProductId)
    -> StoreResult<ReleaseOutcome>;
}

#[derive(Debug, Default)]
struct InventoryState {
    products: HashMap<ProductId, Product>,
    sequence: Vec<ProductId>,
    reservations: HashMap<(OrderId, ProductId), u32>,
    released: HashSet<(OrderId, ProductId)>,
}

impl InventoryState {
    fn apply_delta(&mut self, id: &ProductId, delta: i64) -> StoreResult<StockChange> {
        let product = self
            .products
            .get_mut(id)
            .ok_or_else(|| ProductStoreError::NotFound(id.clone()))?;

        let new_stock = product.stock + delta;
        if new_stock < 0 {
            return Err(ProductStoreError::InsufficientStock {
                product_id: id.clone(),
                available: product.stock,
                requested: -delta,
            });
        }

        let old_stock = product.stock;
        product.stock = new_stock;
        product.updated_at = Utc::now();
        Ok(StockChange {
            product_id: id.clone(),
            old_stock,
            new_stock,
        })
    }
}

/// In-memory product store.
///
/// Products and the ledger share one lock so a reservation and its ledger
/// entry are written together.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductRepository {
    state: Arc<RwLock<InventoryState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the quantity an order currently holds for a product.
    pub async fn reserved_quantity(&self, order_id: OrderId, id: &ProductId) -> Option<u32> {
        self.state
            .read()
            .await
            .reservations
            .get(&(order_id, id.clone()))
            .copied()
    }

    pub async fn product_count(&self) -> usize {
        self.state.read().await.products.len()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProductStoreError::Unavailable(
                "product store offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn create(&self, product: Product) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.products.contains_key(&product.id) {
            return Err(ProductStoreError::AlreadyExists(product.id));
        }
        state.sequence.push(product.id.clone());
        state.products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn get_by_id(&self, id: &ProductId) -> StoreResult<Product> {
        self.check_available()?;
        self.state
            .read()
            .await
            .products
            .get(id)
            .cloned()
            .ok_or_else(|| ProductStoreError::NotFound(id.clone()))
    }

    async fn list(
        &self,
        limit: usize,
        offset: usize,
        category: Option<&str>,
    ) -> StoreResult<Vec<Product>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .sequence
            .iter()
            .filter_map(|id| state.products.get(id))
            .filter(|p| p.active)
            .filter(|p| category.is_none_or(|c| p.category == c))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn deactivate(&self, id: &ProductId) -> StoreResult<Product> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(id)
            .ok_or_else(|| ProductStoreError::NotFound(id.clone()))?;
        product.active = false;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn adjust_stock(&self, id: &ProductId, delta: i64) -> StoreResult<StockChange> {
        self.check_available()?;
        self.state.write().await.apply_delta(id, delta)
    }

    async fn reserve_for_order(
        &self,
        order_id: OrderId,
        id: &ProductId,
        quantity: u32,
    ) -> StoreResult<ReservationOutcome> {
        self.check_available()?;
        let key = (order_id, id.clone());
        let mut state = self.state.write().await;

        if state.released.contains(&key) {
            return Ok(ReservationOutcome::OrderReleased);
        }
        if state.reservations.contains_key(&key) {
            return Ok(ReservationOutcome::AlreadyReserved);
        }

        let change = state.apply_delta(id, -i64::from(quantity))?;
        state.reservations.insert(key, quantity);
        Ok(ReservationOutcome::Applied(change))
    }

    async fn release_for_order(
        &self,
        order_id: OrderId,
        id: &ProductId,
    ) -> StoreResult<ReleaseOutcome> {
        self.check_available()?;
        let key = (order_id, id.clone());
        let mut state = self.state.write().await;

        if state.released.contains(&key) {
            return Ok(ReleaseOutcome::AlreadyReleased);
        }

        let outcome = match state.reservations.get(&key).copied() {
            Some(quantity) => {
                let change = state.apply_delta(id, i64::from(quantity))?;
                state.reservations.remove(&key);
                ReleaseOutcome::Restored(change)
            }
            None => ReleaseOutcome::NothingReserved,
        };
        state.released.insert(key);
        Ok(outcome)
    }
}
