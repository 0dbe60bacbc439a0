//! Inventory service: stock queries, reservations and compensations.

use chrono::Utc;
use common::payloads::{ProductCreated, StockUpdated};
use common::{Event, OrderId, ProductId, subjects};
use event_bus::{MessageBus, MessageBusExt};
use serde::Serialize;

use crate::error::{InventoryError, Result};
use crate::product::{NewProduct, Product, ReleaseOutcome, ReservationOutcome, StockChange};
use crate::repository::ProductRepository;

/// Answer to a stock query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub available: bool,
    pub current_stock: i64,
}

/// Service owning product stock.
///
/// Stock-change notifications are best effort: a failed publish is logged
/// and never undoes the stock change that was already applied.
pub struct InventoryService<R: ProductRepository, B: MessageBus> {
    repo: R,
    bus: B,
}

impl<R: ProductRepository, B: MessageBus> InventoryService<R, B> {
    pub fn new(repo: R, bus: B) -> Self {
        Self { repo, bus }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Registers a product and announces it on `product.created`.
    #[tracing::instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let errors = product.validation_errors();
        if !errors.is_empty() {
            return Err(InventoryError::Validation(errors.join("; ")));
        }

        let product = product.into_product(Utc::now());
        self.repo.create(product.clone()).await?;

        let payload = ProductCreated {
            product_id: product.id.clone(),
            name: product.name.clone(),
            price: product.price.to_decimal(),
            price_cents: Some(product.price.cents()),
            stock: product.stock,
            category: product.category.clone(),
            created_at: product.created_at,
        };
        self.publish(subjects::PRODUCT_CREATED, &payload, None).await;

        tracing::info!(stock = product.stock, "Product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: &ProductId) -> Result<Product> {
        Ok(self.repo.get_by_id(product_id).await?)
    }

    /// Lists active products, optionally in one category.
    #[tracing::instrument(skip(self))]
    pub async fn list_products(
        &self,
        limit: usize,
        offset: usize,
        category: Option<&str>,
    ) -> Result<Vec<Product>> {
        Ok(self.repo.list(limit, offset, category).await?)
    }

    /// Withdraws a product from sale.
    ///
    /// Stock already reserved by orders can still be released.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_product(&self, product_id: &ProductId) -> Result<Product> {
        let product = self.repo.deactivate(product_id).await?;
        tracing::info!("Product deactivated");
        Ok(product)
    }

    /// Reports whether `quantity` units are on hand. Inactive products are
    /// never available.
    #[tracing::instrument(skip(self))]
    pub async fn check_stock(&self, product_id: &ProductId, quantity: u32) -> Result<StockLevel> {
        let product = self.repo.get_by_id(product_id).await?;
        Ok(StockLevel {
            available: product.active && product.stock >= i64::from(quantity),
            current_stock: product.stock,
        })
    }

    /// Decrements stock after re-checking availability.
    ///
    /// The store's guarded delta rejects the decrement if availability was
    /// lost between the check and the write.
    #[tracing::instrument(skip(self))]
    pub async fn reserve_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        correlation_id: Option<&str>,
    ) -> Result<StockChange> {
        validate_quantity(quantity)?;

        let product = self.repo.get_by_id(product_id).await?;
        if !product.active {
            return Err(InventoryError::Validation(format!(
                "product {product_id} is inactive"
            )));
        }
        if product.stock < i64::from(quantity) {
            metrics::counter!("stock_reservations_total", "outcome" => "insufficient").increment(1);
            return Err(InventoryError::InsufficientStock {
                product_id: product_id.clone(),
                available: product.stock,
                requested: i64::from(quantity),
            });
        }

        let change = self
            .repo
            .adjust_stock(product_id, -i64::from(quantity))
            .await
            .inspect_err(|_| {
                metrics::counter!("stock_reservations_total", "outcome" => "insufficient")
                    .increment(1);
            })?;
        metrics::counter!("stock_reservations_total", "outcome" => "applied").increment(1);

        self.publish_stock_updated(&change, None, correlation_id).await;
        Ok(change)
    }

    /// Puts units back.
    #[tracing::instrument(skip(self))]
    pub async fn restore_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        correlation_id: Option<&str>,
    ) -> Result<StockChange> {
        validate_quantity(quantity)?;

        let change = self
            .repo
            .adjust_stock(product_id, i64::from(quantity))
            .await?;
        self.publish_stock_updated(&change, None, correlation_id)
            .await;
        Ok(change)
    }

    /// Ledger-guarded reservation for one line of an order.
    #[tracing::instrument(skip(self))]
    pub async fn reserve_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
        correlation_id: Option<&str>,
    ) -> Result<ReservationOutcome> {
        validate_quantity(quantity)?;

        let outcome = match self
            .repo
            .reserve_for_order(order_id, product_id, quantity)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::counter!("stock_reservations_total", "outcome" => "insufficient")
                    .increment(1);
                return Err(e.into());
            }
        };

        match &outcome {
            ReservationOutcome::Applied(change) => {
                metrics::counter!("stock_reservations_total", "outcome" => "applied").increment(1);
                self.publish_stock_updated(change, Some(order_id), correlation_id)
                    .await;
            }
            ReservationOutcome::AlreadyReserved => {
                tracing::debug!("Reservation already applied");
            }
            ReservationOutcome::OrderReleased => {
                metrics::counter!("stock_reservations_total", "outcome" => "skipped").increment(1);
                tracing::info!("Order already released, skipping reservation");
            }
        }
        Ok(outcome)
    }

    /// Compensates an order's reservation for one product.
    #[tracing::instrument(skip(self))]
    pub async fn release_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        correlation_id: Option<&str>,
    ) -> Result<ReleaseOutcome> {
        let outcome = self.repo.release_for_order(order_id, product_id).await?;
        if let ReleaseOutcome::Restored(change) = &outcome {
            metrics::counter!("stock_reservations_total", "outcome" => "released").increment(1);
            self.publish_stock_updated(change, Some(order_id), correlation_id)
                .await;
        }
        Ok(outcome)
    }

    async fn publish_stock_updated(
        &self,
        change: &StockChange,
        order_id: Option<OrderId>,
        correlation_id: Option<&str>,
    ) {
        let payload = StockUpdated {
            product_id: change.product_id.clone(),
            old_stock: change.old_stock,
            new_stock: change.new_stock,
            updated_at: Utc::now(),
            order_id,
        };
        self.publish(subjects::PRODUCT_STOCK_UPDATED, &payload, correlation_id)
            .await;
    }

    async fn publish<T: Serialize>(
        &self,
        subject: &str,
        payload: &T,
        correlation_id: Option<&str>,
    ) {
        let event = match Event::from_payload(subject, subjects::PRODUCT_SERVICE, payload) {
            Ok(event) => event.with_correlation_id(correlation_id),
            Err(e) => {
                tracing::error!(subject, error = %e, "Failed to encode event");
                return;
            }
        };
        if let Err(e) = self.bus.publish_event(&event).await {
            tracing::warn!(subject, event_id = %event.id, error = %e, "Failed to publish event");
        }
    }
}

fn validate_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(InventoryError::Validation(
            "quantity must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryProductRepository;
    use common::Money;
    use event_bus::InMemoryEventBus;

    async fn setup(stock: i64) -> (
        InventoryService<InMemoryProductRepository, InMemoryEventBus>,
        InMemoryEventBus,
        ProductId,
    ) {
        let bus = InMemoryEventBus::new();
        let service = InventoryService::new(InMemoryProductRepository::new(), bus.clone());
        let product = service
            .create_product(NewProduct::new(
                "SKU-1",
                "Widget",
                Money::from_cents(1000),
                stock,
            ))
            .await
            .unwrap();
        (service, bus, product.id)
    }

    #[tokio::test]
    async fn test_create_product_publishes_event() {
        let (_service, bus, id) = setup(5).await;
        let events = bus.events_on(subjects::PRODUCT_CREATED).await;
        assert_eq!(events.len(), 1);
        let payload: ProductCreated = events[0].decode().unwrap();
        assert_eq!(payload.product_id, id);
        assert_eq!(payload.price_cents, Some(1000));
        assert_eq!(events[0].source, subjects::PRODUCT_SERVICE);
    }

    #[tokio::test]
    async fn test_create_product_validates() {
        let (service, _bus, _id) = setup(5).await;
        let result = service
            .create_product(NewProduct::new("SKU-2", "", Money::zero(), 1))
            .await;
        assert!(matches!(result, Err(InventoryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_check_stock() {
        let (service, _bus, id) = setup(5).await;
        let level = service.check_stock(&id, 5).await.unwrap();
        assert_eq!(
            level,
            StockLevel {
                available: true,
                current_stock: 5
            }
        );
        assert!(!service.check_stock(&id, 6).await.unwrap().available);

        let missing = service.check_stock(&ProductId::new("nope"), 1).await;
        assert!(matches!(missing, Err(InventoryError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_deactivated_product_is_unavailable_and_unlisted() {
        let (service, _bus, id) = setup(5).await;
        service
            .create_product(
                NewProduct::new("SKU-2", "Gadget", Money::from_cents(500), 3).with_category("toys"),
            )
            .await
            .unwrap();

        let product = service.deactivate_product(&id).await.unwrap();
        assert!(!product.active);

        let level = service.check_stock(&id, 1).await.unwrap();
        assert_eq!(
            level,
            StockLevel {
                available: false,
                current_stock: 5
            }
        );
        assert!(matches!(
            service.reserve_stock(&id, 1, None).await,
            Err(InventoryError::Validation(msg)) if msg.contains("inactive")
        ));

        let listed = service.list_products(10, 0, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, ProductId::new("SKU-2"));
        assert!(service.list_products(10, 0, Some("general")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deactivated_product_can_still_be_released() {
        let (service, _bus, id) = setup(5).await;
        let order_id = OrderId::new();
        service.reserve_for_order(order_id, &id, 2, None).await.unwrap();
        service.deactivate_product(&id).await.unwrap();

        let outcome = service.release_for_order(order_id, &id, None).await.unwrap();
        assert!(matches!(outcome, ReleaseOutcome::Restored(ref c) if c.new_stock == 5));
    }

    #[tokio::test]
    async fn test_deactivate_unknown_product() {
        let (service, _bus, _id) = setup(5).await;
        assert!(matches!(
            service.deactivate_product(&ProductId::new("nope")).await,
            Err(InventoryError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reserve_then_restore_round_trip() {
        let (service, bus, id) = setup(10).await;

        let reserved = service.reserve_stock(&id, 3, Some("saga-1")).await.unwrap();
        assert_eq!(reserved.new_stock, 7);
        let restored = service.restore_stock(&id, 3, None).await.unwrap();
        assert_eq!(restored.new_stock, 10);

        let updates = bus.events_on(subjects::PRODUCT_STOCK_UPDATED).await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].correlation_id.as_deref(), Some("saga-1"));
        let first: StockUpdated = updates[0].decode().unwrap();
        assert_eq!((first.old_stock, first.new_stock), (10, 7));
    }

    #[tokio::test]
    async fn test_reserve_insufficient_stock() {
        let (service, bus, id) = setup(2).await;
        let result = service.reserve_stock(&id, 3, None).await;
        assert!(matches!(
            result,
            Err(InventoryError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            })
        ));
        assert_eq!(service.get_product(&id).await.unwrap().stock, 2);
        assert!(bus.events_on(subjects::PRODUCT_STOCK_UPDATED).await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected() {
        let (service, _bus, id) = setup(2).await;
        assert!(matches!(
            service.reserve_stock(&id, 0, None).await,
            Err(InventoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_stock_change() {
        let (service, bus, id) = setup(4).await;
        bus.set_fail_on_publish(true);

        let change = service.reserve_stock(&id, 1, None).await.unwrap();
        assert_eq!(change.new_stock, 3);
        assert_eq!(service.get_product(&id).await.unwrap().stock, 3);
    }

    #[tokio::test]
    async fn test_order_reservation_publishes_order_id() {
        let (service, bus, id) = setup(4).await;
        let order_id = OrderId::new();

        let outcome = service
            .reserve_for_order(order_id, &id, 2, None)
            .await
            .unwrap();
        assert!(matches!(outcome, ReservationOutcome::Applied(_)));
        let again = service
            .reserve_for_order(order_id, &id, 2, None)
            .await
            .unwrap();
        assert_eq!(again, ReservationOutcome::AlreadyReserved);

        let updates = bus.events_on(subjects::PRODUCT_STOCK_UPDATED).await;
        assert_eq!(updates.len(), 1);
        let payload: StockUpdated = updates[0].decode().unwrap();
        assert_eq!(payload.order_id, Some(order_id));
    }
}
