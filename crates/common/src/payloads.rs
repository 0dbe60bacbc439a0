//! Typed payloads carried in `Event::data`, one per subject.
//!
//! Amounts travel twice: an integer cents field, which readers prefer, and
//! the decimal field older consumers read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Address, Money, OrderId, PaymentId, ProductId, UserId};

fn prefer_cents(cents: Option<i64>, decimal: f64) -> Money {
    cents
        .map(Money::from_cents)
        .unwrap_or_else(|| Money::from_decimal(decimal))
}

/// One ordered line as carried by order events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPayload {
    pub product_id: ProductId,
    #[serde(default)]
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<i64>,
    pub quantity: u32,
}

impl ItemPayload {
    pub fn unit_price(&self) -> Money {
        prefer_cents(self.price_cents, self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cents: Option<i64>,
    pub status: String,
    pub items: Vec<ItemPayload>,
    pub address: Address,
    pub created_at: DateTime<Utc>,
}

impl OrderCreated {
    pub fn total(&self) -> Money {
        prefer_cents(self.total_cents, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdated {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub old_status: String,
    pub new_status: String,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cents: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cents: Option<i64>,
    pub items: Vec<ItemPayload>,
    pub cancelled_at: DateTime<Utc>,
}

impl OrderCancelled {
    pub fn total(&self) -> Money {
        prefer_cents(self.total_cents, self.total)
    }
}

/// Asynchronous instruction to decrement stock for one ordered line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReserve {
    /// Absent on reservations not tied to an order; those bypass the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockCheckRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockCheckReply {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stock: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockUpdated {
    pub product_id: ProductId,
    pub old_stock: i64,
    pub new_stock: i64,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<i64>,
    pub stock: i64,
    #[serde(default)]
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a charge attempt as reported on `payment.processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProcessed {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    pub currency: String,
    pub method: String,
    pub status: PaymentOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentProcessed {
    pub fn amount(&self) -> Money {
        prefer_cents(self.amount_cents, self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRefunded {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub original_amount: f64,
    pub refund_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_amount_cents: Option<i64>,
    pub refunded_at: DateTime<Utc>,
}

/// Published when a payment could not even be attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequested {
    pub payment_id: PaymentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cents_field_wins_over_decimal() {
        let item: ItemPayload = serde_json::from_value(json!({
            "product_id": "SKU-1",
            "name": "Widget",
            "price": 10.0,
            "price_cents": 999,
            "quantity": 1
        }))
        .unwrap();
        assert_eq!(item.unit_price().cents(), 999);
    }

    #[test]
    fn decimal_is_used_when_cents_are_absent() {
        let item: ItemPayload = serde_json::from_value(json!({
            "product_id": "SKU-1",
            "price": 19.99,
            "quantity": 2
        }))
        .unwrap();
        assert_eq!(item.unit_price().cents(), 1999);
        assert_eq!(item.name, "");
    }

    #[test]
    fn payment_outcome_is_lowercase_on_the_wire() {
        assert_eq!(
            serde_json::to_value(PaymentOutcome::Completed).unwrap(),
            json!("completed")
        );
        let parsed: PaymentOutcome = serde_json::from_value(json!("failed")).unwrap();
        assert_eq!(parsed, PaymentOutcome::Failed);
    }

    #[test]
    fn stock_reserve_without_order_id() {
        let reserve: StockReserve =
            serde_json::from_value(json!({"product_id": "SKU-1", "quantity": 3})).unwrap();
        assert!(reserve.order_id.is_none());
        assert_eq!(reserve.quantity, 3);
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let result: Result<StockCheckRequest, _> =
            serde_json::from_value(json!({"product_id": "SKU-1", "quantity": -1}));
        assert!(result.is_err());
    }
}
