use crate::gateway::error::GatewayError;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount: String,
    pub currency: String,
}

impl Money {
    pub fn validate_positive(&self, field: &str) -> Result<(), GatewayError> {
        let parsed = self.to_decimal(field)?;
        if parsed <= BigDecimal::from(0) {
            return Err(GatewayError::Validation {
                message: "amount must be greater than zero".to_string(),
                field: Some(field.to_string()),
            });
        }
        if self.currency.trim().is_empty() {
            return Err(GatewayError::Validation {
                message: "currency is required".to_string(),
                field: Some("currency".to_string()),
            });
        }
        Ok(())
    }

    pub fn to_decimal(&self, field: &str) -> Result<BigDecimal, GatewayError> {
        BigDecimal::from_str(&self.amount).map_err(|_| GatewayError::Validation {
            message: format!("invalid decimal amount: {}", self.amount),
            field: Some(field.to_string()),
        })
    }
}

/// Payment status as reported by the gateway itself.
///
/// Anything the gateway reports that is not an explicit success or failure is
/// treated as still pending: an unknown status proves nothing and must not
/// resolve the payment either way.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
}

impl GatewayStatus {
    pub fn from_gateway(value: &str) -> Self {
        match value {
            "success" => GatewayStatus::Success,
            "failed" => GatewayStatus::Failed,
            _ => GatewayStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    pub amount: Money,
    pub payer_email: String,
    pub reference: String,
    pub callback_url: Option<String>,
    pub order_metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializedPayment {
    pub authorization_url: String,
    pub reference: String,
    pub access_code: Option<String>,
    pub raw: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedPayment {
    pub status: GatewayStatus,
    pub transaction_id: Option<String>,
    pub amount: Option<Money>,
    pub paid_at: Option<String>,
    pub gateway_response: Option<String>,
    pub raw: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_type: String,
    pub reference: Option<String>,
    pub status: Option<GatewayStatus>,
    pub transaction_id: Option<String>,
    pub payload: JsonValue,
    pub received_at: String,
}
