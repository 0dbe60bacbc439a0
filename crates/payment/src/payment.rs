use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Recorded, charge not settled yet.
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Card,
    Paypal,
    Bank,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Bank => "bank",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "paypal" => Ok(PaymentMethod::Paypal),
            "bank" => Ok(PaymentMethod::Bank),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// A charge against one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Set by the gateway on a successful charge.
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`crate::PaymentProcessor::process_payment`].
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMethod,
}

impl PaymentRequest {
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.user_id.is_blank() {
            errors.push("user id is required".to_string());
        }
        if !self.amount.is_positive() {
            errors.push(format!("amount must be positive, got {}", self.amount));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            errors.push(format!(
                "currency must be a three-letter code, got '{}'",
                self.currency
            ));
        }
        errors
    }

    pub(crate) fn into_pending(self, now: DateTime<Utc>) -> Payment {
        Payment {
            id: PaymentId::new(),
            order_id: self.order_id,
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency,
            method: self.method,
            status: PaymentStatus::Pending,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest {
            order_id: OrderId::new(),
            user_id: UserId::new("user-1"),
            amount: Money::from_cents(2500),
            currency: "USD".to_string(),
            method: PaymentMethod::Card,
        }
    }

    #[test]
    fn test_status_refundability() {
        assert!(PaymentStatus::Completed.can_refund());
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            assert!(!status.can_refund(), "{status} should not be refundable");
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Refunded).unwrap(),
            "\"refunded\""
        );
        assert_eq!(PaymentStatus::Pending.to_string(), "pending");
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("PayPal".parse::<PaymentMethod>(), Ok(PaymentMethod::Paypal));
        assert_eq!("bank".parse::<PaymentMethod>(), Ok(PaymentMethod::Bank));
        assert!("cash".parse::<PaymentMethod>().is_err());
        assert_eq!(PaymentMethod::default(), PaymentMethod::Card);
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validation_errors().is_empty());
    }

    #[test]
    fn test_invalid_request() {
        let mut invalid = request();
        invalid.user_id = UserId::new("");
        invalid.amount = Money::zero();
        invalid.currency = "usd".to_string();
        assert_eq!(invalid.validation_errors().len(), 3);
    }

    #[test]
    fn test_pending_payment_from_request() {
        let payment = request().into_pending(Utc::now());
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.transaction_id.is_none());
        assert_eq!(payment.amount.cents(), 2500);
    }
}
