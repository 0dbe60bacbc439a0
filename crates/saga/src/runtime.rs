//! Runs the three fulfillment services against one bus.

use std::sync::Arc;

use event_bus::{MessageBus, ProcessedEvents, Subscription};
use inventory::{InMemoryProductRepository, InventoryEventHandler, InventoryService};
use orders::{
    InMemoryOrderRepository, OrderConfig, OrderEventHandler, OrderService, OutboxDispatcher,
};
use payment::{
    InMemoryPaymentRepository, MockPaymentGateway, PaymentConfig, PaymentEventHandler,
    PaymentProcessor,
};

use crate::error::Result;

/// Per-service settings.
#[derive(Debug, Clone, Default)]
pub struct SagaConfig {
    pub order: OrderConfig,
    pub payment: PaymentConfig,
}

pub type Orders<B> = OrderService<InMemoryOrderRepository, B>;
pub type Inventory<B> = InventoryService<InMemoryProductRepository, B>;
pub type Payments<B> = PaymentProcessor<InMemoryPaymentRepository, MockPaymentGateway, B>;

/// The order, inventory and payment services with their handlers
/// subscribed.
///
/// The services never call each other; every interaction goes over the bus.
pub struct FulfillmentServices<B: MessageBus + Clone + 'static> {
    orders: Arc<OrderEventHandler<InMemoryOrderRepository, B>>,
    inventory: Arc<InventoryEventHandler<InMemoryProductRepository, B>>,
    payments: Arc<PaymentEventHandler<InMemoryPaymentRepository, MockPaymentGateway, B>>,
    gateway: MockPaymentGateway,
    subscriptions: Vec<Subscription>,
}

impl<B: MessageBus + Clone + 'static> FulfillmentServices<B> {
    /// Builds every service on in-memory stores and subscribes its handlers.
    #[tracing::instrument(skip_all)]
    pub async fn start(bus: B, config: SagaConfig, gateway: MockPaymentGateway) -> Result<Self> {
        let processed = ProcessedEvents::new();

        let inventory = Arc::new(InventoryEventHandler::new(
            InventoryService::new(InMemoryProductRepository::new(), bus.clone()),
            processed.clone(),
        ));
        let payments = Arc::new(PaymentEventHandler::new(
            PaymentProcessor::new(
                InMemoryPaymentRepository::new(),
                gateway.clone(),
                bus.clone(),
                config.payment,
            ),
            processed.clone(),
        ));
        let orders = Arc::new(OrderEventHandler::new(
            OrderService::new(InMemoryOrderRepository::new(), bus.clone(), config.order),
            processed,
        ));

        let mut subscriptions = inventory.clone().start_listening(&bus).await?;
        subscriptions.extend(payments.clone().start_listening(&bus).await?);
        subscriptions.extend(orders.clone().start_listening(&bus).await?);

        tracing::info!(
            subscriptions = subscriptions.len(),
            "Fulfillment services started"
        );
        Ok(Self {
            orders,
            inventory,
            payments,
            gateway,
            subscriptions,
        })
    }

    pub fn orders(&self) -> &Orders<B> {
        self.orders.service()
    }

    pub fn inventory(&self) -> &Inventory<B> {
        self.inventory.service()
    }

    pub fn payments(&self) -> &Payments<B> {
        self.payments.processor()
    }

    pub fn gateway(&self) -> &MockPaymentGateway {
        &self.gateway
    }

    /// The order outbox dispatcher, for the background dispatch loop.
    pub fn outbox(&self) -> Arc<OutboxDispatcher<InMemoryOrderRepository, B>> {
        self.orders().outbox()
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Stops every handler. In-flight handler tasks run to completion.
    pub fn shutdown(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        tracing::info!("Fulfillment services stopped");
    }
}
