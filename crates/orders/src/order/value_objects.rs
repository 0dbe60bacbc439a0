//! Value objects for the order domain.

use common::payloads::ItemPayload;
use common::{Address, Money, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// A line item in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    /// Unit price.
    pub price: Money,
    pub quantity: u32,
}

impl OrderItem {
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            price,
            quantity,
        }
    }

    /// Returns the total price for this line item (unit price * quantity),
    /// or `None` if it does not fit in a `Money`.
    pub fn total_price(&self) -> Option<Money> {
        self.price.checked_multiply(self.quantity)
    }

    pub fn to_payload(&self) -> ItemPayload {
        ItemPayload {
            product_id: self.product_id.clone(),
            name: self.name.clone(),
            price: self.price.to_decimal(),
            price_cents: Some(self.price.cents()),
            quantity: self.quantity,
        }
    }
}

/// Input for placing an order.
///
/// Carries no total: it is always computed from the items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub address: Address,
}

impl NewOrder {
    pub fn new(user_id: impl Into<UserId>, address: Address) -> Self {
        Self {
            user_id: user_id.into(),
            items: Vec::new(),
            address,
        }
    }

    pub fn with_item(mut self, item: OrderItem) -> Self {
        self.items.push(item);
        self
    }
}
