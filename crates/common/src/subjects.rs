//! Subject names and producing-service names.
//!
//! An event is always published on the subject equal to its type.

pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_UPDATED: &str = "order.updated";
pub const ORDER_CANCELLED: &str = "order.cancelled";

pub const PAYMENT_PROCESSED: &str = "payment.processed";
pub const PAYMENT_REFUNDED: &str = "payment.refunded";
pub const PAYMENT_FAILED: &str = "payment.failed";
pub const REFUND_REQUESTED: &str = "refund.requested";

pub const PRODUCT_CREATED: &str = "product.created";
pub const PRODUCT_STOCK_UPDATED: &str = "product.stock.updated";

/// Request/reply subject answered by the product service.
pub const STOCK_CHECK: &str = "stock.check";
pub const STOCK_RESERVE: &str = "stock.reserve";

pub const ORDER_SERVICE: &str = "order-service";
pub const PRODUCT_SERVICE: &str = "product-service";
pub const PAYMENT_SERVICE: &str = "payment-service";
