//! Webhook ingestion
//!
//! The gateway pushes terminal notifications at arbitrary times: late, never,
//! or more than once. Every delivery funnels into the same conditional write
//! as the reconciliation loop's self-heal, so replays and races are harmless
//! by construction: `AlreadyResolved` is an acknowledgement, not an error.

use crate::database::record_store::{PaymentRecordStore, TerminalStatus, WriteOutcome};
use crate::gateway::{GatewayStatus, PaymentGateway};
use crate::notify::{SignalStatus, StatusChannel};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing signature")]
    MissingSignature,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Unknown payment reference: {0}")]
    UnknownReference(String),
    #[error("Database error: {0}")]
    Database(String),
}

/// What a verified delivery did to the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The delivery's terminal status was written.
    Applied,
    /// Another writer resolved the record first; delivery acknowledged.
    AlreadyResolved,
    /// The event carried no terminal status (or an event type we don't
    /// track); acknowledged and dropped.
    Ignored,
}

pub struct WebhookIngestor {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentRecordStore>,
    signals: StatusChannel,
}

impl WebhookIngestor {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn PaymentRecordStore>,
        signals: StatusChannel,
    ) -> Self {
        Self {
            gateway,
            store,
            signals,
        }
    }

    pub async fn process(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<IngestOutcome, WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;

        let verification = self
            .gateway
            .verify_webhook(body, signature)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        if !verification.valid {
            error!(
                reason = verification.reason.as_deref().unwrap_or("unknown"),
                "webhook signature rejected"
            );
            return Err(WebhookError::InvalidSignature);
        }

        let event = self
            .gateway
            .parse_webhook_event(body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        let reference = event
            .reference
            .as_deref()
            .ok_or_else(|| WebhookError::MalformedPayload("missing reference".to_string()))?;

        let status = match event.status {
            Some(GatewayStatus::Success) => TerminalStatus::Success,
            Some(GatewayStatus::Failed) => TerminalStatus::Failed,
            Some(GatewayStatus::Pending) | None => {
                info!(
                    reference = %reference,
                    event_type = %event.event_type,
                    "webhook carries no terminal status, ignoring"
                );
                return Ok(IngestOutcome::Ignored);
            }
        };

        let outcome = self
            .store
            .write_if_pending(
                reference,
                status,
                event.transaction_id.as_deref(),
                event.payload.clone(),
            )
            .await
            .map_err(|e| WebhookError::Database(e.to_string()))?;

        match outcome {
            WriteOutcome::Applied(record) => {
                info!(
                    reference = %reference,
                    status = %status,
                    event_type = %event.event_type,
                    payload = %event.payload,
                    "webhook resolved payment record"
                );
                let signal = match status {
                    TerminalStatus::Success => SignalStatus::Success,
                    TerminalStatus::Failed => SignalStatus::Failed,
                };
                self.signals.publish(&record.reference, signal);
                Ok(IngestOutcome::Applied)
            }
            WriteOutcome::AlreadyResolved(record) => {
                info!(
                    reference = %reference,
                    stored_status = %record.status,
                    "webhook replay or race: record already resolved"
                );
                Ok(IngestOutcome::AlreadyResolved)
            }
            WriteOutcome::NotFound => {
                warn!(reference = %reference, "webhook for unknown payment reference");
                Err(WebhookError::UnknownReference(reference.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryRecordStore;
    use crate::database::record_store::RecordStatus;
    use crate::gateway::error::GatewayResult;
    use crate::gateway::types::{
        InitializeRequest, InitializedPayment, VerifiedPayment, WebhookEvent,
        WebhookVerificationResult,
    };
    use crate::reference::PaymentReference;
    use async_trait::async_trait;
    use sqlx::types::BigDecimal;

    /// Gateway that accepts the fixed signature `"good"` and parses the
    /// simple `{event, data: {reference, status, id}}` shape.
    struct StubGateway;

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn initialize(
            &self,
            _request: InitializeRequest,
        ) -> GatewayResult<InitializedPayment> {
            unreachable!("ingestion tests never initialize")
        }

        async fn verify(&self, _reference: &str) -> GatewayResult<VerifiedPayment> {
            unreachable!("ingestion tests never verify")
        }

        fn verify_webhook(
            &self,
            _payload: &[u8],
            signature: &str,
        ) -> GatewayResult<WebhookVerificationResult> {
            Ok(WebhookVerificationResult {
                valid: signature == "good",
                reason: None,
            })
        }

        fn parse_webhook_event(&self, payload: &[u8]) -> GatewayResult<WebhookEvent> {
            let parsed: serde_json::Value = serde_json::from_slice(payload).map_err(|e| {
                crate::gateway::GatewayError::WebhookVerification {
                    message: e.to_string(),
                }
            })?;
            Ok(WebhookEvent {
                event_type: parsed["event"].as_str().unwrap_or("unknown").to_string(),
                reference: parsed["data"]["reference"].as_str().map(|v| v.to_string()),
                status: parsed["data"]["status"]
                    .as_str()
                    .map(crate::gateway::GatewayStatus::from_gateway),
                transaction_id: parsed["data"]["id"].as_i64().map(|id| id.to_string()),
                payload: parsed,
                received_at: chrono::Utc::now().to_rfc3339(),
            })
        }
    }

    async fn ingestor_with_pending(
        reference: &str,
    ) -> (WebhookIngestor, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .create(
                &PaymentReference::new(reference),
                "ORD-100",
                BigDecimal::from(500),
                serde_json::json!({}),
            )
            .await
            .expect("create should succeed");
        let ingestor = WebhookIngestor::new(
            Arc::new(StubGateway),
            store.clone(),
            StatusChannel::new(),
        );
        (ingestor, store)
    }

    fn success_body(reference: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event": "charge.success",
            "data": {"reference": reference, "status": "success", "id": 9}
        }))
        .expect("serialization should succeed")
    }

    #[tokio::test]
    async fn valid_delivery_resolves_the_record() {
        let (ingestor, store) = ingestor_with_pending("ORD-100-1").await;
        let outcome = ingestor
            .process(Some("good"), &success_body("ORD-100-1"))
            .await
            .expect("processing should succeed");
        assert_eq!(outcome, IngestOutcome::Applied);

        let record = store
            .read("ORD-100-1")
            .await
            .expect("read should succeed")
            .expect("record should exist");
        assert_eq!(record.record_status(), Some(RecordStatus::Success));
        assert_eq!(record.gateway_transaction_id.as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn replayed_delivery_is_acknowledged_as_already_resolved() {
        let (ingestor, _store) = ingestor_with_pending("ORD-100-1").await;
        let body = success_body("ORD-100-1");
        ingestor
            .process(Some("good"), &body)
            .await
            .expect("first delivery should succeed");
        let second = ingestor
            .process(Some("good"), &body)
            .await
            .expect("replay should not error");
        assert_eq!(second, IngestOutcome::AlreadyResolved);
    }

    #[tokio::test]
    async fn missing_or_bad_signature_is_rejected() {
        let (ingestor, store) = ingestor_with_pending("ORD-100-1").await;
        let body = success_body("ORD-100-1");

        assert!(matches!(
            ingestor.process(None, &body).await,
            Err(WebhookError::MissingSignature)
        ));
        assert!(matches!(
            ingestor.process(Some("forged"), &body).await,
            Err(WebhookError::InvalidSignature)
        ));

        let record = store
            .read("ORD-100-1")
            .await
            .expect("read should succeed")
            .expect("record should exist");
        assert_eq!(record.record_status(), Some(RecordStatus::Pending));
    }

    #[tokio::test]
    async fn non_terminal_events_are_ignored() {
        let (ingestor, store) = ingestor_with_pending("ORD-100-1").await;
        let body = serde_json::to_vec(&serde_json::json!({
            "event": "charge.pending",
            "data": {"reference": "ORD-100-1", "status": "pending"}
        }))
        .expect("serialization should succeed");

        let outcome = ingestor
            .process(Some("good"), &body)
            .await
            .expect("processing should succeed");
        assert_eq!(outcome, IngestOutcome::Ignored);

        let record = store
            .read("ORD-100-1")
            .await
            .expect("read should succeed")
            .expect("record should exist");
        assert_eq!(record.record_status(), Some(RecordStatus::Pending));
    }

    #[tokio::test]
    async fn unknown_reference_is_surfaced() {
        let (ingestor, _store) = ingestor_with_pending("ORD-100-1").await;
        let result = ingestor
            .process(Some("good"), &success_body("ORD-999-1"))
            .await;
        assert!(matches!(result, Err(WebhookError::UnknownReference(_))));
    }
}
