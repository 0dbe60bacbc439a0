use crate::payment::PaymentMethod;

/// Defaults applied to payments synthesized from `order.created`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    pub default_currency: String,
    pub default_method: PaymentMethod,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            default_method: PaymentMethod::Card,
        }
    }
}

impl PaymentConfig {
    pub fn new(default_currency: impl Into<String>, default_method: PaymentMethod) -> Self {
        Self {
            default_currency: default_currency.into(),
            default_method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PaymentConfig::default();
        assert_eq!(config.default_currency, "USD");
        assert_eq!(config.default_method, PaymentMethod::Card);
    }
}
