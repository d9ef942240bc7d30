use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Payment initialization failed: {message}")]
    InitializationFailed { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Webhook verification failed: {message}")]
    WebhookVerification { message: String },

    #[error("Gateway error: {message}")]
    Gateway {
        message: String,
        status_code: Option<String>,
        retryable: bool,
    },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Validation { .. } => false,
            GatewayError::InitializationFailed { .. } => false,
            GatewayError::Network { .. } => true,
            GatewayError::RateLimit { .. } => true,
            GatewayError::WebhookVerification { .. } => false,
            GatewayError::Gateway { retryable, .. } => *retryable,
        }
    }

    /// Errors on a `verify` call that prove nothing about the payment.
    /// These must never be reported to the user as a declined payment; the
    /// caller retries on the next poll tick instead.
    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self,
            GatewayError::Network { .. }
                | GatewayError::RateLimit { .. }
                | GatewayError::Gateway { .. }
        )
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            GatewayError::Validation { .. } => 400,
            GatewayError::InitializationFailed { .. } => 502,
            GatewayError::Network { .. } => 503,
            GatewayError::RateLimit { .. } => 429,
            GatewayError::WebhookVerification { .. } => 401,
            GatewayError::Gateway { .. } => 502,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Validation { message, .. } => message.clone(),
            GatewayError::InitializationFailed { .. } => {
                "Could not start the payment. Please try again".to_string()
            }
            GatewayError::Network { .. } => {
                "Payment gateway is temporarily unavailable".to_string()
            }
            GatewayError::RateLimit { .. } => {
                "Too many requests to the payment gateway. Please retry shortly".to_string()
            }
            GatewayError::WebhookVerification { .. } => "Invalid webhook signature".to_string(),
            GatewayError::Gateway { .. } => "Payment gateway returned an error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_flags_are_set() {
        assert!(GatewayError::Network {
            message: "timeout".to_string()
        }
        .is_retryable());
        assert!(!GatewayError::InitializationFailed {
            message: "declined".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn network_failures_are_inconclusive_not_failures() {
        assert!(GatewayError::Network {
            message: "connection reset".to_string()
        }
        .is_inconclusive());
        assert!(GatewayError::RateLimit {
            message: "slow down".to_string(),
            retry_after_seconds: Some(30)
        }
        .is_inconclusive());
        assert!(!GatewayError::Validation {
            message: "bad".to_string(),
            field: None
        }
        .is_inconclusive());
    }

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(
            GatewayError::RateLimit {
                message: "limited".to_string(),
                retry_after_seconds: None
            }
            .http_status_code(),
            429
        );
        assert_eq!(
            GatewayError::WebhookVerification {
                message: "bad signature".to_string()
            }
            .http_status_code(),
            401
        );
    }
}
