//! Order service: creation with a synchronous stock check, status changes
//! through compare-and-swap, and outbox-backed event emission.

use std::sync::Arc;
use std::time::Instant;

use common::payloads::{StockCheckReply, StockCheckRequest};
use common::{OrderId, PaymentId, UserId, subjects};
use event_bus::{BusError, MessageBus, MessageBusExt};

use crate::config::OrderConfig;
use crate::error::{OrderError, Result};
use crate::events;
use crate::order::{NewOrder, Order, OrderItem, OrderStatus};
use crate::outbox::OutboxDispatcher;
use crate::repository::OrderRepository;

/// Service for managing orders.
///
/// Every write stores its events in the outbox together with the state
/// change and then flushes the outbox right away. A flush that fails leaves
/// the records for the background dispatcher.
pub struct OrderService<R: OrderRepository, B: MessageBus> {
    repo: R,
    bus: B,
    config: OrderConfig,
    outbox: Arc<OutboxDispatcher<R, B>>,
}

impl<R, B> OrderService<R, B>
where
    R: OrderRepository + Clone,
    B: MessageBus + Clone,
{
    pub fn new(repo: R, bus: B, config: OrderConfig) -> Self {
        let outbox = Arc::new(OutboxDispatcher::new(
            repo.clone(),
            bus.clone(),
            config.outbox_batch_size,
        ));
        Self {
            repo,
            bus,
            config,
            outbox,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    /// The dispatcher draining this service's outbox.
    pub fn outbox(&self) -> Arc<OutboxDispatcher<R, B>> {
        self.outbox.clone()
    }

    /// Validates, stock-checks every item and persists the order as
    /// `pending`.
    ///
    /// Nothing is written if any check fails: an unavailable item yields
    /// `OutOfStock`, no reply in time yields `TransportTimeout`.
    #[tracing::instrument(skip(self, new_order), fields(user_id = %new_order.user_id))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<Order> {
        let order = Order::place(new_order)?;

        for item in order.items() {
            self.check_stock(item).await?;
        }

        let mut outbox = events::stock_reservations(&order)?;
        outbox.push(events::order_created(&order)?);
        self.repo.create(order.clone(), outbox).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id(),
            correlation_id = %order.saga_id(),
            total = %order.total(),
            "Order created"
        );

        self.flush().await;
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.repo.get_by_id(order_id).await?)
    }

    /// Newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, limit: usize, offset: usize) -> Result<Vec<Order>> {
        Ok(self.repo.list(limit, offset).await?)
    }

    /// Newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>> {
        Ok(self.repo.list_by_user(user_id, limit, offset).await?)
    }

    /// Moves an order to `new_status` if the state machine allows it.
    ///
    /// The write is a compare-and-swap on the status read here; losing the
    /// race yields `ConcurrentStateChange` with the status that won.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Result<Order> {
        let current = self.repo.get_by_id(order_id).await?;
        let old_status = current.status();
        if !old_status.can_transition_to(new_status) {
            return Err(OrderError::InvalidTransition {
                from: old_status,
                to: new_status,
            });
        }

        let outbox = events::status_changed(&current, old_status, new_status, chrono::Utc::now())?;
        let updated = self
            .repo
            .compare_and_swap_status(order_id, old_status, new_status, outbox)
            .await?;

        metrics::counter!(
            "order_status_transitions_total",
            "from" => old_status.as_str(),
            "to" => new_status.as_str()
        )
        .increment(1);
        tracing::info!(
            correlation_id = %updated.saga_id(),
            from = %old_status,
            to = %new_status,
            "Order status updated"
        );

        self.flush().await;
        Ok(updated)
    }

    /// Cancels an order, triggering stock release and refund downstream.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        match self
            .update_order_status(order_id, OrderStatus::Cancelled)
            .await
        {
            Err(OrderError::InvalidTransition { from, .. }) => {
                Err(OrderError::OrderNotCancellable {
                    order_id,
                    status: from,
                })
            }
            other => other,
        }
    }

    /// Asks the payment service to refund a charge that completed after the
    /// order was cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn request_refund(&self, order_id: OrderId, payment_id: PaymentId) -> Result<()> {
        let order = self.repo.get_by_id(order_id).await?;
        let event = events::refund_requested(&order, payment_id)?;
        self.repo.append_outbox(vec![event]).await?;

        tracing::info!(correlation_id = %order.saga_id(), "Refund requested");
        self.flush().await;
        Ok(())
    }

    async fn check_stock(&self, item: &OrderItem) -> Result<()> {
        let request = StockCheckRequest {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
        };

        let started = Instant::now();
        let reply = self
            .bus
            .request_json(
                subjects::STOCK_CHECK,
                &request,
                self.config.stock_check_timeout,
            )
            .await;
        metrics::histogram!("saga_stock_check_seconds").record(started.elapsed().as_secs_f64());

        let bytes = match reply {
            Ok(bytes) => bytes,
            Err(e @ (BusError::Timeout { .. } | BusError::NoResponders(_))) => {
                tracing::warn!(product_id = %item.product_id, error = %e, "Stock check got no reply");
                return Err(OrderError::TransportTimeout(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<StockCheckReply>(&bytes) {
            Ok(reply) if reply.available => Ok(()),
            Ok(reply) => Err(OrderError::OutOfStock {
                product_id: item.product_id.clone(),
                reason: match reply.current_stock {
                    Some(stock) => format!("requested {}, available {stock}", item.quantity),
                    None => format!("requested {}, not available", item.quantity),
                },
            }),
            // Non-JSON replies carry the responder's error text.
            Err(_) => Err(OrderError::OutOfStock {
                product_id: item.product_id.clone(),
                reason: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }

    async fn flush(&self) {
        if let Err(e) = self.outbox.dispatch_pending().await {
            tracing::warn!(error = %e, "Outbox flush failed, leaving records for the dispatcher");
        }
    }
}
