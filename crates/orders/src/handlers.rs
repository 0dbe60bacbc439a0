//! Bus handlers for the payment outcomes the order service reacts to.

use std::sync::Arc;

use async_trait::async_trait;
use common::payloads::{PaymentFailed, PaymentOutcome, PaymentProcessed};
use common::{Event, OrderId, PaymentId, subjects};
use event_bus::{Message, MessageBus, MessageHandler, ProcessedEvents, Subscription};

use crate::error::{OrderError, Result};
use crate::order::OrderStatus;
use crate::repository::OrderRepository;
use crate::service::OrderService;

const CONSUMER: &str = "order-service";

/// Confirms paid orders and cancels orders whose payment failed.
pub struct OrderEventHandler<R: OrderRepository, B: MessageBus> {
    service: OrderService<R, B>,
    processed: ProcessedEvents,
}

impl<R, B> OrderEventHandler<R, B>
where
    R: OrderRepository + Clone + 'static,
    B: MessageBus + Clone + 'static,
{
    pub fn new(service: OrderService<R, B>, processed: ProcessedEvents) -> Self {
        Self { service, processed }
    }

    pub fn service(&self) -> &OrderService<R, B> {
        &self.service
    }

    /// Subscribes to `payment.processed` and `payment.failed`.
    pub async fn start_listening(self: Arc<Self>, bus: &B) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        for subject in [subjects::PAYMENT_PROCESSED, subjects::PAYMENT_FAILED] {
            let handler: Arc<dyn MessageHandler> = self.clone();
            subscriptions.push(bus.subscribe(subject, handler).await?);
        }
        tracing::info!(consumer = CONSUMER, "Order handlers listening");
        Ok(subscriptions)
    }

    async fn handle_payment_processed(&self, event: &Event) -> Result<()> {
        let processed: PaymentProcessed = event
            .decode()
            .map_err(|e| OrderError::Validation(e.to_string()))?;

        match processed.status {
            PaymentOutcome::Completed => {
                self.confirm_or_refund(processed.order_id, processed.payment_id)
                    .await
            }
            PaymentOutcome::Failed => {
                let reason = processed.error.as_deref().unwrap_or("payment declined");
                self.cancel_for_payment(processed.order_id, reason).await
            }
        }
    }

    async fn handle_payment_failed(&self, event: &Event) -> Result<()> {
        let failed: PaymentFailed = event
            .decode()
            .map_err(|e| OrderError::Validation(e.to_string()))?;
        self.cancel_for_payment(failed.order_id, &failed.reason)
            .await
    }

    /// Confirms the order, or asks for a refund if it was cancelled while
    /// the charge was in flight.
    async fn confirm_or_refund(&self, order_id: OrderId, payment_id: PaymentId) -> Result<()> {
        let order = self.service.get_order(order_id).await?;
        if order.status() == OrderStatus::Cancelled {
            tracing::info!(%order_id, %payment_id, "Payment completed for a cancelled order");
            return self.service.request_refund(order_id, payment_id).await;
        }

        match self
            .service
            .update_order_status(order_id, OrderStatus::Confirmed)
            .await
        {
            Ok(_) => Ok(()),
            Err(OrderError::ConcurrentStateChange {
                actual: OrderStatus::Cancelled,
                ..
            }) => {
                tracing::info!(%order_id, %payment_id, "Order cancelled during confirmation");
                self.service.request_refund(order_id, payment_id).await
            }
            Err(OrderError::InvalidTransition { from, to }) => {
                tracing::info!(%order_id, %from, %to, "Confirmation not applicable");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn cancel_for_payment(&self, order_id: OrderId, reason: &str) -> Result<()> {
        match self
            .service
            .update_order_status(order_id, OrderStatus::Cancelled)
            .await
        {
            Ok(_) => {
                tracing::info!(%order_id, reason, "Order cancelled after payment failure");
                Ok(())
            }
            Err(OrderError::InvalidTransition { from, .. }) => {
                tracing::info!(%order_id, status = %from, "Order no longer cancellable");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<R, B> MessageHandler for OrderEventHandler<R, B>
where
    R: OrderRepository + Clone + 'static,
    B: MessageBus + Clone + 'static,
{
    async fn handle(&self, message: Message) {
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
            subjects::PAYMENT_PROCESSED => self.handle_payment_processed(&event).await,
            subjects::PAYMENT_FAILED => self.handle_payment_failed(&event).await,
            other => {
                tracing::warn!(subject = other, "No order handler for subject");
                Ok(())
            }
        };

        match result {
            Ok(()) => {}
            Err(e @ (OrderError::Store(_) | OrderError::ConcurrentStateChange { .. })) => {
                // Unclaimed so a redelivery can retry.
                self.processed.release(CONSUMER, &event.id).await;
                tracing::error!(
                    event_id = %event.id,
                    correlation_id = event.correlation_id.as_deref().unwrap_or(""),
                    error = %e,
                    "Transient failure handling event"
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
