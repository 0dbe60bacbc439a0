use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A sellable product and its on-hand stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    /// Units on hand. Never negative.
    pub stock: i64,
    pub category: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a product.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i64,
    pub category: String,
}

impl NewProduct {
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            price,
            stock,
            category: "general".to_string(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns a description of every invalid field, empty when valid.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.id.is_blank() {
            errors.push("product id is required".to_string());
        }
        if self.name.trim().is_empty() {
            errors.push("name is required".to_string());
        }
        if self.category.trim().is_empty() {
            errors.push("category is required".to_string());
        }
        if !self.price.is_positive() {
            errors.push(format!("price must be positive, got {}", self.price));
        }
        if self.stock < 0 {
            errors.push(format!("stock must not be negative, got {}", self.stock));
        }
        errors
    }

    pub(crate) fn into_product(self, now: DateTime<Utc>) -> Product {
        Product {
            id: self.id,
            name: self.name,
            description: self.description,
            price: self.price,
            stock: self.stock,
            category: self.category,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stock before and after an applied delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: ProductId,
    pub old_stock: i64,
    pub new_stock: i64,
}

impl StockChange {
    pub fn delta(&self) -> i64 {
        self.new_stock - self.old_stock
    }
}

/// Result of a ledger-guarded reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Stock was decremented.
    Applied(StockChange),
    /// This order already holds a reservation for the product.
    AlreadyReserved,
    /// The order was compensated before the reservation arrived.
    OrderReleased,
}

/// Result of releasing an order's reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The reserved quantity was put back.
    Restored(StockChange),
    /// Nothing was reserved yet; later reservations for the order are skipped.
    NothingReserved,
    AlreadyReleased,
}
