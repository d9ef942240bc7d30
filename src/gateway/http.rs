use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::types::{
    GatewayStatus, InitializeRequest, InitializedPayment, Money, VerifiedPayment, WebhookEvent,
    WebhookVerificationResult,
};
use crate::gateway::utils::{verify_hmac_sha512_hex, GatewayHttpClient};
use crate::gateway::PaymentGateway;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: None,
            base_url: "https://api.gateway.example".to_string(),
            timeout_secs: 10,
            max_retries: 2,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let secret_key =
            std::env::var("GATEWAY_SECRET_KEY").map_err(|_| GatewayError::Validation {
                message: "GATEWAY_SECRET_KEY environment variable is required".to_string(),
                field: Some("GATEWAY_SECRET_KEY".to_string()),
            })?;

        let defaults = Self::default();
        Ok(Self {
            webhook_secret: std::env::var("GATEWAY_WEBHOOK_SECRET").ok(),
            base_url: std::env::var("GATEWAY_BASE_URL").unwrap_or(defaults.base_url),
            timeout_secs: std::env::var("GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.timeout_secs),
            max_retries: std::env::var("GATEWAY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(defaults.max_retries),
            secret_key,
        })
    }
}

/// HTTP implementation of the gateway contract. The wire shape follows the
/// common hosted-checkout pattern: an envelope with a boolean `status`, an
/// `initialize` call returning an authorization URL, and a `verify` call
/// returning the transaction state.
pub struct HttpGateway {
    config: GatewayConfig,
    http: GatewayHttpClient,
    email_re: Regex,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let http =
            GatewayHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        let email_re = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_err(|e| {
            GatewayError::Validation {
                message: format!("invalid email pattern: {}", e),
                field: None,
            }
        })?;
        Ok(Self {
            config,
            http,
            email_re,
        })
    }

    pub fn from_env() -> GatewayResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn validate_initialize(&self, request: &InitializeRequest) -> GatewayResult<()> {
        request.amount.validate_positive("amount")?;
        if !self.email_re.is_match(request.payer_email.trim()) {
            return Err(GatewayError::Validation {
                message: "payer_email must be a well-formed email address".to_string(),
                field: Some("payer_email".to_string()),
            });
        }
        if request.reference.trim().is_empty() {
            return Err(GatewayError::Validation {
                message: "reference is required".to_string(),
                field: Some("reference".to_string()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn initialize(&self, request: InitializeRequest) -> GatewayResult<InitializedPayment> {
        self.validate_initialize(&request)?;

        let payload = serde_json::json!({
            "email": request.payer_email,
            "amount": request.amount.amount,
            "currency": request.amount.currency,
            "reference": request.reference,
            "callback_url": request.callback_url,
            "metadata": request.order_metadata,
        });

        let raw: GatewayEnvelope<InitializeData> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/transaction/initialize"),
                Some(&self.config.secret_key),
                Some(&payload),
            )
            .await?;

        if !raw.status {
            return Err(GatewayError::InitializationFailed {
                message: raw.message,
            });
        }
        let data = raw.data;
        info!(reference = %data.reference, "gateway payment initialized");

        Ok(InitializedPayment {
            authorization_url: data.authorization_url,
            reference: data.reference.clone(),
            access_code: data.access_code,
            raw: serde_json::json!({
                "reference": data.reference,
                "message": raw.message,
            }),
        })
    }

    async fn verify(&self, reference: &str) -> GatewayResult<VerifiedPayment> {
        if reference.trim().is_empty() {
            return Err(GatewayError::Validation {
                message: "reference is required".to_string(),
                field: Some("reference".to_string()),
            });
        }

        let raw: GatewayEnvelope<JsonValue> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/transaction/verify/{}", reference)),
                Some(&self.config.secret_key),
                None,
            )
            .await?;
        if !raw.status {
            return Err(GatewayError::Gateway {
                message: raw.message,
                status_code: None,
                retryable: false,
            });
        }

        let data: VerifyData =
            serde_json::from_value(raw.data.clone()).map_err(|e| GatewayError::Gateway {
                message: format!("invalid verify payload: {}", e),
                status_code: None,
                retryable: false,
            })?;

        Ok(VerifiedPayment {
            status: GatewayStatus::from_gateway(&data.status),
            transaction_id: data.id.map(|id| id.to_string()),
            amount: data.amount.map(|amount| Money {
                amount: amount.to_string(),
                currency: data.currency.unwrap_or_default(),
            }),
            paid_at: data.paid_at,
            gateway_response: data.gateway_response,
            raw: raw.data,
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> GatewayResult<WebhookVerificationResult> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .unwrap_or(&self.config.secret_key);
        let valid = verify_hmac_sha512_hex(payload, secret, signature);
        Ok(WebhookVerificationResult {
            valid,
            reason: if valid {
                None
            } else {
                Some("invalid gateway signature".to_string())
            },
        })
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> GatewayResult<WebhookEvent> {
        let parsed: JsonValue =
            serde_json::from_slice(payload).map_err(|e| GatewayError::WebhookVerification {
                message: format!("invalid webhook JSON payload: {}", e),
            })?;

        let event_type = parsed
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let reference = parsed
            .get("data")
            .and_then(|v| v.get("reference"))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());
        let status = parsed
            .get("data")
            .and_then(|v| v.get("status"))
            .and_then(|v| v.as_str())
            .map(GatewayStatus::from_gateway);
        let transaction_id = parsed
            .get("data")
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_i64())
            .map(|id| id.to_string());

        Ok(WebhookEvent {
            event_type,
            reference,
            status,
            transaction_id,
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope<T> {
    status: bool,
    message: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    #[serde(default)]
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    amount: Option<u64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    paid_at: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
}
