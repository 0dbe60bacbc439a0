//! Bus handlers for the subjects the product service consumes.

use std::sync::Arc;

use async_trait::async_trait;
use common::payloads::{OrderCancelled, StockCheckReply, StockCheckRequest, StockReserve};
use common::{Event, subjects};
use event_bus::{Message, MessageBus, MessageHandler, ProcessedEvents, Subscription};

use crate::error::{InventoryError, Result};
use crate::repository::ProductRepository;
use crate::service::InventoryService;

const CONSUMER: &str = "product-service";

/// Reacts to stock queries, reservations and order cancellations.
pub struct InventoryEventHandler<R: ProductRepository, B: MessageBus> {
    service: InventoryService<R, B>,
    processed: ProcessedEvents,
}

impl<R, B> InventoryEventHandler<R, B>
where
    R: ProductRepository + 'static,
    B: MessageBus + 'static,
{
    pub fn new(service: InventoryService<R, B>, processed: ProcessedEvents) -> Self {
        Self { service, processed }
    }

    pub fn service(&self) -> &InventoryService<R, B> {
        &self.service
    }

    /// Subscribes to `stock.check`, `stock.reserve` and `order.cancelled`.
    pub async fn start_listening(self: Arc<Self>, bus: &B) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        for subject in [
            subjects::STOCK_CHECK,
            subjects::STOCK_RESERVE,
            subjects::ORDER_CANCELLED,
        ] {
            let handler: Arc<dyn MessageHandler> = self.clone();
            subscriptions.push(bus.subscribe(subject, handler).await?);
        }
        tracing::info!(consumer = CONSUMER, "Inventory handlers listening");
        Ok(subscriptions)
    }

    async fn handle_stock_check(&self, message: &Message) {
        let reply = match message.decode::<StockCheckRequest>() {
            Ok(request) => match self
                .service
                .check_stock(&request.product_id, request.quantity)
                .await
            {
                Ok(level) => serde_json::to_vec(&StockCheckReply {
                    available: level.available,
                    current_stock: Some(level.current_stock),
                })
                .unwrap_or_else(|e| e.to_string().into_bytes()),
                Err(e) => e.to_string().into_bytes(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Malformed stock check request");
                format!("invalid stock check request: {e}").into_bytes()
            }
        };

        if !message.respond(reply) {
            tracing::debug!("Stock check requester no longer waiting");
        }
    }

    async fn handle_stock_reserve(&self, event: &Event) -> Result<()> {
        let reserve: StockReserve = event
            .decode()
            .map_err(|e| InventoryError::Validation(e.to_string()))?;
        let correlation_id = event.correlation_id.as_deref();

        match reserve.order_id {
            Some(order_id) => {
                self.service
                    .reserve_for_order(
                        order_id,
                        &reserve.product_id,
                        reserve.quantity,
                        correlation_id,
                    )
                    .await?;
            }
            None => {
                self.service
                    .reserve_stock(&reserve.product_id, reserve.quantity, correlation_id)
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_order_cancelled(&self, event: &Event) -> Result<()> {
        let cancelled: OrderCancelled = event
            .decode()
            .map_err(|e| InventoryError::Validation(e.to_string()))?;
        let correlation_id = event.correlation_id.as_deref();

        let mut failure = None;
        for item in &cancelled.items {
            if let Err(e) = self
                .service
                .release_for_order(cancelled.order_id, &item.product_id, correlation_id)
                .await
            {
                tracing::error!(
                    order_id = %cancelled.order_id,
                    product_id = %item.product_id,
                    error = %e,
                    "Failed to release reservation"
                );
                failure = Some(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl<R, B> MessageHandler for InventoryEventHandler<R, B>
where
    R: ProductRepository + 'static,
    B: MessageBus + 'static,
{
    async fn handle(&self, message: Message) {
        if message.subject == subjects::STOCK_CHECK {
            self.handle_stock_check(&message).await;
            return;
        }

        let event = match message.event() {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(subject = %message.subject, error = %e, "Dropping malformed event");
                return;
            }
        };
        if !self.processed.claim(CONSUMER, &event.id).await {
            tracing::debug!(event_id = %event.id, "Duplicate delivery ignored");
            return;
        }

        let result = match message.subject.as_str() {
            subjects::STOCK_RESERVE => self.handle_stock_reserve(&event).await,
            subjects::ORDER_CANCELLED => self.handle_order_cancelled(&event).await,
            other => {
                tracing::warn!(subject = other, "No inventory handler for subject");
                Ok(())
            }
        };

        match result {
            Ok(()) => {}
            Err(InventoryError::Store(reason)) => {
                // Unclaimed so a redelivery can retry.
                self.processed.release(CONSUMER, &event.id).await;
                tracing::error!(
                    event_id = %event.id,
                    reason = %reason,
                    "Store failure handling event"
                );
            }
            Err(e) => {
                tracing::warn!(
                    subject = %message.subject,
                    event_id = %event.id,
                    correlation_id = event.correlation_id.as_deref().unwrap_or(""),
                    error = %e,
                    "Event handling failed"
                );
            }
        }
    }
}
