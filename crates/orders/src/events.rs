//! Builders for the events the order service writes to its outbox.
//!
//! Every event is stamped with the order's saga id as correlation id.

use chrono::{DateTime, Utc};
use common::payloads::{
    ItemPayload, OrderCancelled, OrderCreated, OrderUpdated, RefundRequested, StockReserve,
};
use common::{Event, EventDataError, PaymentId, subjects};
use serde::Serialize;

use crate::order::{Order, OrderItem, OrderStatus};

type Result<T> = std::result::Result<T, EventDataError>;

fn build<T: Serialize>(subject: &str, order: &Order, payload: &T) -> Result<Event> {
    Ok(Event::from_payload(subject, subjects::ORDER_SERVICE, payload)?
        .with_correlation_id(Some(order.saga_id().to_string())))
}

fn items(order: &Order) -> Vec<ItemPayload> {
    order.items().iter().map(OrderItem::to_payload).collect()
}

pub fn order_created(order: &Order) -> Result<Event> {
    let payload = OrderCreated {
        order_id: order.id(),
        user_id: order.user_id().clone(),
        total: order.total().to_decimal(),
        total_cents: Some(order.total().cents()),
        status: order.status().to_string(),
        items: items(order),
        address: order.address().clone(),
        created_at: order.created_at(),
    };
    build(subjects::ORDER_CREATED, order, &payload)
}

/// One `stock.reserve` per line item.
pub fn stock_reservations(order: &Order) -> Result<Vec<Event>> {
    order
        .items()
        .iter()
        .map(|item| {
            let payload = StockReserve {
                order_id: Some(order.id()),
                product_id: item.product_id.clone(),
                quantity: item.quantity,
            };
            build(subjects::STOCK_RESERVE, order, &payload)
        })
        .collect()
}

pub fn order_updated(
    order: &Order,
    old_status: OrderStatus,
    new_status: OrderStatus,
    at: DateTime<Utc>,
) -> Result<Event> {
    let payload = OrderUpdated {
        order_id: order.id(),
        user_id: order.user_id().clone(),
        old_status: old_status.to_string(),
        new_status: new_status.to_string(),
        total: order.total().to_decimal(),
        total_cents: Some(order.total().cents()),
        updated_at: at,
    };
    build(subjects::ORDER_UPDATED, order, &payload)
}

pub fn order_cancelled(order: &Order, at: DateTime<Utc>) -> Result<Event> {
    let payload = OrderCancelled {
        order_id: order.id(),
        user_id: order.user_id().clone(),
        total: order.total().to_decimal(),
        total_cents: Some(order.total().cents()),
        items: items(order),
        cancelled_at: at,
    };
    build(subjects::ORDER_CANCELLED, order, &payload)
}

pub fn refund_requested(order: &Order, payment_id: PaymentId) -> Result<Event> {
    let payload = RefundRequested {
        payment_id,
        order_id: Some(order.id()),
    };
    build(subjects::REFUND_REQUESTED, order, &payload)
}

/// Events for a status change: `order.updated`, plus `order.cancelled` when
/// the order lands in `cancelled`.
pub fn status_changed(
    order: &Order,
    old_status: OrderStatus,
    new_status: OrderStatus,
    at: DateTime<Utc>,
) -> Result<Vec<Event>> {
    let mut events = vec![order_updated(order, old_status, new_status, at)?];
    if new_status == OrderStatus::Cancelled {
        events.push(order_cancelled(order, at)?);
    }
    Ok(events)
}
