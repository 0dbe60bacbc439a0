//! The order aggregate.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{Address, Money, OrderId, SagaId, UserId};
use serde::{Deserialize, Serialize};

use super::{NewOrder, OrderItem, OrderStatus};
use crate::error::OrderError;

/// A customer's order.
///
/// The total always equals the sum of `price * quantity` over the items;
/// there is no way to set it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    items: Vec<OrderItem>,
    total: Money,
    status: OrderStatus,
    address: Address,
    saga_id: SagaId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Validates the input and builds a `pending` order with a fresh id
    /// and saga id.
    pub fn place(new_order: NewOrder) -> Result<Self, OrderError> {
        let errors = validation_errors(&new_order);
        if !errors.is_empty() {
            return Err(OrderError::Validation(errors.join("; ")));
        }

        let total = order_total(&new_order.items)
            .ok_or_else(|| OrderError::Validation("order total overflows".to_string()))?;

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            user_id: new_order.user_id,
            items: new_order.items,
            total,
            status: OrderStatus::Pending,
            address: new_order.address,
            saga_id: SagaId::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Correlation id stamped on every event of this order's lifecycle.
    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Overwrites the status without checking the state machine.
    ///
    /// For stores applying an already validated compare-and-swap.
    pub fn apply_status(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
    }
}

fn validation_errors(new_order: &NewOrder) -> Vec<String> {
    let mut errors = Vec::new();

    if new_order.user_id.is_blank() {
        errors.push("user id is required".to_string());
    }
    for field in new_order.address.missing_fields() {
        errors.push(format!("address {field} is required"));
    }
    if new_order.items.is_empty() {
        errors.push("order must contain at least one item".to_string());
    }

    let mut seen = HashSet::new();
    for (index, item) in new_order.items.iter().enumerate() {
        if item.product_id.is_blank() {
            errors.push(format!("item {index}: product id is required"));
        } else if !seen.insert(item.product_id.clone()) {
            errors.push(format!("item {index}: duplicate product {}", item.product_id));
        }
        if !item.price.is_positive() {
            errors.push(format!("item {index}: price must be positive"));
        }
        if item.quantity == 0 {
            errors.push(format!("item {index}: quantity must be positive"));
        }
    }

    errors
}

fn order_total(items: &[OrderItem]) -> Option<Money> {
    items
        .iter()
        .try_fold(Money::zero(), |acc, item| acc.checked_add(item.total_price()?))
}
