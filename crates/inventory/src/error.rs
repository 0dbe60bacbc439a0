use common::ProductId;
use event_bus::BusError;
use thiserror::Error;

use crate::repository::ProductStoreError;

/// Errors returned by the inventory service.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<ProductStoreError> for InventoryError {
    fn from(e: ProductStoreError) -> Self {
        match e {
            ProductStoreError::NotFound(id) => InventoryError::ProductNotFound(id),
            ProductStoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => InventoryError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            ProductStoreError::AlreadyExists(id) => {
                InventoryError::Validation(format!("product {id} already exists"))
            }
            ProductStoreError::Unavailable(reason) => InventoryError::Store(reason),
        }
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
