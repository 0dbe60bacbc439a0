//! Bus handlers for the subjects the payment service consumes.

use std::sync::Arc;

use async_trait::async_trait;
use common::payloads::{OrderCancelled, OrderCreated, RefundRequested};
use common::{Event, subjects};
use event_bus::{Message, MessageBus, MessageHandler, ProcessedEvents, Subscription};

use crate::error::{PaymentError, Result};
use crate::gateway::PaymentGateway;
use crate::payment::PaymentStatus;
use crate::processor::PaymentProcessor;
use crate::repository::PaymentRepository;

const CONSUMER: &str = "payment-service";

/// Charges new orders and refunds cancelled ones.
pub struct PaymentEventHandler<R: PaymentRepository, G: PaymentGateway, B: MessageBus> {
    processor: PaymentProcessor<R, G, B>,
    processed: ProcessedEvents,
}

impl<R, G, B> PaymentEventHandler<R, G, B>
where
    R: PaymentRepository + 'static,
    G: PaymentGateway + 'static,
    B: MessageBus + 'static,
{
    pub fn new(processor: PaymentProcessor<R, G, B>, processed: ProcessedEvents) -> Self {
        Self {
            processor,
            processed,
        }
    }

    pub fn processor(&self) -> &PaymentProcessor<R, G, B> {
        &self.processor
    }

    /// Subscribes to `order.created`, `order.cancelled` and `refund.requested`.
    pub async fn start_listening(self: Arc<Self>, bus: &B) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        for subject in [
            subjects::ORDER_CREATED,
            subjects::ORDER_CANCELLED,
            subjects::REFUND_REQUESTED,
        ] {
            let handler: Arc<dyn MessageHandler> = self.clone();
            subscriptions.push(bus.subscribe(subject, handler).await?);
        }
        tracing::info!(consumer = CONSUMER, "Payment handlers listening");
        Ok(subscriptions)
    }

    async fn handle_order_created(&self, event: &Event) -> Result<()> {
        let created: OrderCreated = event
            .decode()
            .map_err(|e| PaymentError::Validation(e.to_string()))?;
        let correlation_id = event.correlation_id.as_deref();

        if let Ok(existing) = self.processor.get_payment_by_order(created.order_id).await {
            tracing::info!(
                order_id = %created.order_id,
                payment_id = %existing.id,
                "Payment already exists for order"
            );
            return Ok(());
        }

        let amount = created.total();
        let request =
            self.processor
                .default_request(created.order_id, created.user_id.clone(), amount);

        match self.processor.process_payment(request, correlation_id).await {
            Ok(_) | Err(PaymentError::Gateway(_)) => Ok(()),
            Err(PaymentError::DuplicatePayment(reason)) => {
                tracing::debug!(reason = %reason, "Payment created by a concurrent delivery");
                Ok(())
            }
            Err(e) => {
                self.processor
                    .publish_payment_failed(
                        created.order_id,
                        created.user_id,
                        amount,
                        e.to_string(),
                        correlation_id,
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn handle_order_cancelled(&self, event: &Event) -> Result<()> {
        let cancelled: OrderCancelled = event
            .decode()
            .map_err(|e| PaymentError::Validation(e.to_string()))?;

        let payment = match self.processor.get_payment_by_order(cancelled.order_id).await {
            Ok(payment) => payment,
            Err(PaymentError::NotFound(_)) => {
                tracing::info!(order_id = %cancelled.order_id, "No payment to refund");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if payment.status != PaymentStatus::Completed {
            tracing::info!(
                order_id = %cancelled.order_id,
                status = %payment.status,
                "Payment not refundable, nothing to compensate"
            );
            return Ok(());
        }

        self.processor
            .refund_payment(payment.id, event.correlation_id.as_deref())
            .await?;
        Ok(())
    }

    async fn handle_refund_requested(&self, event: &Event) -> Result<()> {
        let requested: RefundRequested = event
            .decode()
            .map_err(|e| PaymentError::Validation(e.to_string()))?;

        match self
            .processor
            .refund_payment(requested.payment_id, event.correlation_id.as_deref())
            .await
        {
            Ok(_) => Ok(()),
            Err(PaymentError::InvalidRefundState { status, .. }) => {
                tracing::info!(
                    payment_id = %requested.payment_id,
                    status = %status,
                    "Refund request ignored"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<R, G, B> MessageHandler for PaymentEventHandler<R, G, B>
where
    R: PaymentRepository + 'static,
    G: PaymentGateway + 'static,
    B: MessageBus + 'static,
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
            subjects::ORDER_CREATED => self.handle_order_created(&event).await,
            subjects::ORDER_CANCELLED => self.handle_order_cancelled(&event).await,
            subjects::REFUND_REQUESTED => self.handle_refund_requested(&event).await,
            other => {
                tracing::warn!(subject = other, "No payment handler for subject");
                Ok(())
            }
        };

        match result {
            Ok(()) => {}
            Err(PaymentError::Store(reason)) => {
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
