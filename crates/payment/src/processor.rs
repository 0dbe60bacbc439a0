//! Charging and refunding payments.

use chrono::Utc;
use common::payloads::{PaymentFailed, PaymentOutcome, PaymentProcessed, PaymentRefunded};
use common::{Event, Money, OrderId, PaymentId, UserId, subjects};
use event_bus::{MessageBus, MessageBusExt};
use serde::Serialize;

use crate::config::PaymentConfig;
use crate::error::{PaymentError, Result};
use crate::gateway::PaymentGateway;
use crate::payment::{Payment, PaymentRequest, PaymentStatus};
use crate::repository::{PaymentRepository, PaymentStoreError};

/// Processes payments against a gateway and announces the outcome.
pub struct PaymentProcessor<R: PaymentRepository, G: PaymentGateway, B: MessageBus> {
    repo: R,
    gateway: G,
    bus: B,
    config: PaymentConfig,
}

impl<R, G, B> PaymentProcessor<R, G, B>
where
    R: PaymentRepository,
    G: PaymentGateway,
    B: MessageBus,
{
    pub fn new(repo: R, gateway: G, bus: B, config: PaymentConfig) -> Self {
        Self {
            repo,
            gateway,
            bus,
            config,
        }
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Builds a request with the configured currency and method.
    pub fn default_request(
        &self,
        order_id: OrderId,
        user_id: UserId,
        amount: Money,
    ) -> PaymentRequest {
        PaymentRequest {
            order_id,
            user_id,
            amount,
            currency: self.config.default_currency.clone(),
            method: self.config.default_method,
        }
    }

    /// Records a pending payment and charges it.
    ///
    /// The outcome is published on `payment.processed` either way. A
    /// declined charge leaves the payment `failed` and returns `Gateway`;
    /// it is not retried.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn process_payment(
        &self,
        request: PaymentRequest,
        correlation_id: Option<&str>,
    ) -> Result<Payment> {
        let errors = request.validation_errors();
        if !errors.is_empty() {
            return Err(PaymentError::Validation(errors.join("; ")));
        }

        let payment = request.into_pending(Utc::now());
        self.repo.create(payment.clone()).await?;
        tracing::info!(payment_id = %payment.id, amount = %payment.amount, "Payment recorded");

        let started = std::time::Instant::now();
        let charge = self.gateway.charge(&payment).await;
        metrics::histogram!("payment_gateway_seconds").record(started.elapsed().as_secs_f64());

        match charge {
            Ok(transaction_id) => {
                let payment = self
                    .repo
                    .set_status(
                        payment.id,
                        PaymentStatus::Pending,
                        PaymentStatus::Completed,
                        Some(transaction_id.clone()),
                    )
                    .await?;
                metrics::counter!("payments_processed_total", "status" => "completed")
                    .increment(1);
                tracing::info!(
                    payment_id = %payment.id,
                    transaction_id = %transaction_id,
                    "Payment completed"
                );

                let payload = processed_payload(&payment, PaymentOutcome::Completed, None);
                self.publish(subjects::PAYMENT_PROCESSED, &payload, correlation_id)
                    .await;
                Ok(payment)
            }
            Err(e) => {
                let payment = self
                    .repo
                    .set_status(
                        payment.id,
                        PaymentStatus::Pending,
                        PaymentStatus::Failed,
                        None,
                    )
                    .await?;
                metrics::counter!("payments_processed_total", "status" => "failed").increment(1);
                tracing::warn!(payment_id = %payment.id, error = %e, "Payment failed");

                let payload =
                    processed_payload(&payment, PaymentOutcome::Failed, Some(e.to_string()));
                self.publish(subjects::PAYMENT_PROCESSED, &payload, correlation_id)
                    .await;
                Err(PaymentError::Gateway(e))
            }
        }
    }

    /// Refunds a completed payment in full.
    ///
    /// The status moves to `refunded` before the gateway is called, so only
    /// one of several concurrent refunds reaches the gateway. A gateway
    /// rejection moves it back to `completed`.
    #[tracing::instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        payment_id: PaymentId,
        correlation_id: Option<&str>,
    ) -> Result<Payment> {
        let payment = self.repo.get_by_id(payment_id).await?;
        if !payment.status.can_refund() {
            return Err(PaymentError::InvalidRefundState {
                payment_id,
                status: payment.status,
            });
        }

        let refunded = match self
            .repo
            .set_status(
                payment_id,
                PaymentStatus::Completed,
                PaymentStatus::Refunded,
                None,
            )
            .await
        {
            Ok(refunded) => refunded,
            Err(PaymentStoreError::StatusConflict { actual, .. }) => {
                return Err(PaymentError::InvalidRefundState {
                    payment_id,
                    status: actual,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let transaction_id = refunded.transaction_id.clone().unwrap_or_default();
        if let Err(e) = self.gateway.refund(&transaction_id, refunded.amount).await {
            tracing::warn!(error = %e, "Gateway rejected refund, restoring completed status");
            if let Err(revert) = self
                .repo
                .set_status(
                    payment_id,
                    PaymentStatus::Refunded,
                    PaymentStatus::Completed,
                    None,
                )
                .await
            {
                tracing::error!(error = %revert, "Failed to restore payment status");
            }
            return Err(PaymentError::Gateway(e));
        }

        metrics::counter!("payments_processed_total", "status" => "refunded").increment(1);
        tracing::info!(order_id = %refunded.order_id, "Payment refunded");

        let payload = PaymentRefunded {
            payment_id,
            order_id: refunded.order_id,
            user_id: refunded.user_id.clone(),
            original_amount: refunded.amount.to_decimal(),
            refund_amount: refunded.amount.to_decimal(),
            refund_amount_cents: Some(refunded.amount.cents()),
            refunded_at: Utc::now(),
        };
        self.publish(subjects::PAYMENT_REFUNDED, &payload, correlation_id)
            .await;
        Ok(refunded)
    }

    /// Announces that a payment could not even be attempted for an order.
    pub async fn publish_payment_failed(
        &self,
        order_id: OrderId,
        user_id: UserId,
        amount: Money,
        reason: String,
        correlation_id: Option<&str>,
    ) {
        metrics::counter!("payments_processed_total", "status" => "rejected").increment(1);
        let payload = PaymentFailed {
            order_id,
            user_id,
            amount: amount.to_decimal(),
            amount_cents: Some(amount.cents()),
            reason,
            failed_at: Utc::now(),
        };
        self.publish(subjects::PAYMENT_FAILED, &payload, correlation_id)
            .await;
    }

    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        Ok(self.repo.get_by_id(payment_id).await?)
    }

    pub async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Payment> {
        Ok(self.repo.get_by_order_id(order_id).await?)
    }

    pub async fn list_payments(&self, limit: usize, offset: usize) -> Result<Vec<Payment>> {
        Ok(self.repo.list(limit, offset).await?)
    }

    async fn publish<T: Serialize>(
        &self,
        subject: &str,
        payload: &T,
        correlation_id: Option<&str>,
    ) {
        let event = match Event::from_payload(subject, subjects::PAYMENT_SERVICE, payload) {
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

fn processed_payload(
    payment: &Payment,
    status: PaymentOutcome,
    error: Option<String>,
) -> PaymentProcessed {
    PaymentProcessed {
        payment_id: payment.id,
        order_id: payment.order_id,
        user_id: Some(payment.user_id.clone()),
        amount: payment.amount.to_decimal(),
        amount_cents: Some(payment.amount.cents()),
        currency: payment.currency.clone(),
        method: payment.method.to_string(),
        status,
        transaction_id: payment.transaction_id.clone(),
        error,
    }
}
