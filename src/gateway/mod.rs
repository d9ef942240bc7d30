//! Payment gateway integration
//!
//! The gateway is an external, opaque party: we initialize a payment to get a
//! redirect URL, and we verify a reference to learn its status. Both calls are
//! idempotent from our side; `verify` in particular may be repeated any number
//! of times once the gateway has resolved the transaction.

pub mod error;
pub mod http;
pub mod types;
pub mod utils;

pub use error::{GatewayError, GatewayResult};
pub use http::{GatewayConfig, HttpGateway};
pub use types::{
    GatewayStatus, InitializeRequest, InitializedPayment, Money, VerifiedPayment, WebhookEvent,
    WebhookVerificationResult,
};

use async_trait::async_trait;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a hosted payment flow. No local writes happen here; a failure
    /// leaves nothing behind and the caller retries with a fresh reference.
    async fn initialize(&self, request: InitializeRequest) -> GatewayResult<InitializedPayment>;

    /// Ask the gateway directly for the state of a reference.
    async fn verify(&self, reference: &str) -> GatewayResult<VerifiedPayment>;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> GatewayResult<WebhookVerificationResult>;

    fn parse_webhook_event(&self, payload: &[u8]) -> GatewayResult<WebhookEvent>;
}
