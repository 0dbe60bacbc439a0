//! Application configuration loaded from environment variables.

use std::time::Duration;

use orders::OrderConfig;
use payment::{MockPaymentGateway, PaymentConfig, PaymentMethod};
use saga::SagaConfig;
use thiserror::Error;

/// A variable was set to something that does not parse.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value '{value}' for {name}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `STOCK_CHECK_TIMEOUT_MS`: stock check reply deadline (default `5000`)
/// - `OUTBOX_DISPATCH_INTERVAL_MS`: background outbox pass interval (default `500`)
/// - `PAYMENT_CURRENCY`: currency of synthesized payments (default `USD`)
/// - `PAYMENT_METHOD`: `card`, `paypal` or `bank` (default `card`)
/// - `GATEWAY_LATENCY_MS`: simulated gateway delay (default `0`)
/// - `BUS_HISTORY_CAPACITY`: published messages kept by the bus, `0` to disable (default `1000`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub stock_check_timeout: Duration,
    pub outbox_dispatch_interval: Duration,
    pub payment_currency: String,
    pub payment_method: PaymentMethod,
    pub gateway_latency: Duration,
    pub bus_history_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse(&var, "PORT")?.unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT") {
                None => defaults.log_format,
                Some(v) => match v.to_ascii_lowercase().as_str() {
                    "text" => LogFormat::Text,
                    "json" => LogFormat::Json,
                    _ => {
                        return Err(ConfigError {
                            name: "LOG_FORMAT",
                            value: v,
                            reason: "expected 'text' or 'json'".to_string(),
                        });
                    }
                },
            },
            stock_check_timeout: parse(&var, "STOCK_CHECK_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.stock_check_timeout),
            outbox_dispatch_interval: parse(&var, "OUTBOX_DISPATCH_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_dispatch_interval),
            payment_currency: var("PAYMENT_CURRENCY")
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or(defaults.payment_currency),
            payment_method: parse(&var, "PAYMENT_METHOD")?.unwrap_or(defaults.payment_method),
            gateway_latency: parse(&var, "GATEWAY_LATENCY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.gateway_latency),
            bus_history_capacity: parse(&var, "BUS_HISTORY_CAPACITY")?
                .unwrap_or(defaults.bus_history_capacity),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            order: OrderConfig::default().with_stock_check_timeout(self.stock_check_timeout),
            payment: PaymentConfig::new(self.payment_currency.clone(), self.payment_method),
        }
    }

    pub fn gateway(&self) -> MockPaymentGateway {
        MockPaymentGateway::new().with_latency(self.gateway_latency)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            stock_check_timeout: Duration::from_millis(5000),
            outbox_dispatch_interval: Duration::from_millis(500),
            payment_currency: "USD".to_string(),
            payment_method: PaymentMethod::Card,
            gateway_latency: Duration::ZERO,
            bus_history_capacity: 1000,
        }
    }
}

fn parse<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError {
                name,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.stock_check_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("STOCK_CHECK_TIMEOUT_MS", "250"),
            ("OUTBOX_DISPATCH_INTERVAL_MS", "1000"),
            ("PAYMENT_CURRENCY", "eur"),
            ("PAYMENT_METHOD", "paypal"),
            ("GATEWAY_LATENCY_MS", "20"),
            ("BUS_HISTORY_CAPACITY", "0"),
        ])
        .unwrap();

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.stock_check_timeout, Duration::from_millis(250));
        assert_eq!(config.outbox_dispatch_interval, Duration::from_secs(1));
        assert_eq!(config.payment_currency, "EUR");
        assert_eq!(config.payment_method, PaymentMethod::Paypal);
        assert_eq!(config.gateway_latency, Duration::from_millis(20));
        assert_eq!(config.bus_history_capacity, 0);
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config_from(&[("PORT", "  "), ("HOST", "")]).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.name, "PORT");
        assert_eq!(err.value, "eighty");

        let err = config_from(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert_eq!(err.name, "LOG_FORMAT");

        let err = config_from(&[("PAYMENT_METHOD", "cash")]).unwrap_err();
        assert_eq!(err.name, "PAYMENT_METHOD");
    }

    #[test]
    fn test_saga_config_carries_settings() {
        let config = config_from(&[("STOCK_CHECK_TIMEOUT_MS", "100"), ("PAYMENT_METHOD", "bank")])
            .unwrap();
        let saga = config.saga_config();
        assert_eq!(saga.order.stock_check_timeout, Duration::from_millis(100));
        assert_eq!(saga.payment.default_method, PaymentMethod::Bank);
        assert_eq!(saga.payment.default_currency, "USD");
    }
}
