use std::time::Duration;

/// Tuning for the order service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfig {
    /// How long to wait for each `stock.check` reply before failing closed.
    pub stock_check_timeout: Duration,
    /// Records published per outbox read.
    pub outbox_batch_size: usize,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            stock_check_timeout: Duration::from_secs(5),
            outbox_batch_size: 100,
        }
    }
}

impl OrderConfig {
    pub fn with_stock_check_timeout(mut self, timeout: Duration) -> Self {
        self.stock_check_timeout = timeout;
        self
    }
}
