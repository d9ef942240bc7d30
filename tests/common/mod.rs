#![allow(dead_code)]

use async_trait::async_trait;
use payconfirm_backend::database::memory::MemoryRecordStore;
use payconfirm_backend::gateway::error::{GatewayError, GatewayResult};
use payconfirm_backend::gateway::types::{
    GatewayStatus, InitializeRequest, InitializedPayment, VerifiedPayment, WebhookEvent,
    WebhookVerificationResult,
};
use payconfirm_backend::gateway::PaymentGateway;
use payconfirm_backend::notify::StatusChannel;
use payconfirm_backend::reconcile::ReconcilePolicy;
use payconfirm_backend::services::checkout::CheckoutService;
use payconfirm_backend::services::finalizer::{FinalizedOrder, OrderFinalizer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Gateway double whose `verify` answers are scripted per call. Once the
/// script is down to its last entry, that entry keeps repeating.
pub struct ScriptedGateway {
    verify_calls: AtomicUsize,
    verify_delay: Duration,
    init_error: Option<GatewayError>,
    script: Mutex<VecDeque<GatewayResult<VerifiedPayment>>>,
}

impl ScriptedGateway {
    pub fn new(script: Vec<GatewayResult<VerifiedPayment>>) -> Self {
        Self {
            verify_calls: AtomicUsize::new(0),
            verify_delay: Duration::ZERO,
            init_error: None,
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    pub fn failing_initialization(message: &str) -> Self {
        let mut gateway = Self::new(vec![]);
        gateway.init_error = Some(GatewayError::InitializationFailed {
            message: message.to_string(),
        });
        gateway
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn verified(status: GatewayStatus, transaction_id: Option<&str>) -> VerifiedPayment {
        VerifiedPayment {
            status,
            transaction_id: transaction_id.map(|v| v.to_string()),
            amount: None,
            paid_at: None,
            gateway_response: None,
            raw: serde_json::json!({"source": "direct-verify"}),
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initialize(&self, request: InitializeRequest) -> GatewayResult<InitializedPayment> {
        if let Some(error) = &self.init_error {
            return Err(error.clone());
        }
        request.amount.validate_positive("amount")?;
        Ok(InitializedPayment {
            authorization_url: format!("https://gateway.example/pay/{}", request.reference),
            reference: request.reference.clone(),
            access_code: Some("acc_test".to_string()),
            raw: serde_json::json!({"reference": request.reference}),
        })
    }

    async fn verify(&self, _reference: &str) -> GatewayResult<VerifiedPayment> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if !self.verify_delay.is_zero() {
            tokio::time::sleep(self.verify_delay).await;
        }
        let mut script = self.script.lock().expect("script poisoned");
        if script.len() > 1 {
            script.pop_front().expect("non-empty")
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(Self::verified(GatewayStatus::Pending, None)))
        }
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
        let parsed: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| GatewayError::WebhookVerification {
                message: e.to_string(),
            })?;
        Ok(WebhookEvent {
            event_type: parsed["event"].as_str().unwrap_or("unknown").to_string(),
            reference: parsed["data"]["reference"].as_str().map(|v| v.to_string()),
            status: parsed["data"]["status"]
                .as_str()
                .map(GatewayStatus::from_gateway),
            transaction_id: parsed["data"]["id"].as_i64().map(|id| id.to_string()),
            payload: parsed,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Default)]
pub struct CountingFinalizer {
    calls: Mutex<Vec<FinalizedOrder>>,
}

impl CountingFinalizer {
    pub fn calls(&self) -> Vec<FinalizedOrder> {
        self.calls.lock().expect("calls poisoned").clone()
    }
}

#[async_trait]
impl OrderFinalizer for CountingFinalizer {
    async fn finalize(&self, order: FinalizedOrder) -> anyhow::Result<()> {
        self.calls.lock().expect("calls poisoned").push(order);
        Ok(())
    }
}

pub fn fast_policy() -> ReconcilePolicy {
    ReconcilePolicy {
        poll_interval: Duration::from_millis(10),
        fallback_after_attempts: 3,
        max_attempts: 12,
    }
}

pub struct TestHarness {
    pub store: Arc<MemoryRecordStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub finalizer: Arc<CountingFinalizer>,
    pub signals: StatusChannel,
    pub service: Arc<CheckoutService>,
    // Keep the sender alive so loops stay cancellable for the test's lifetime.
    pub shutdown_tx: watch::Sender<bool>,
}

pub fn harness(gateway: ScriptedGateway, policy: ReconcilePolicy) -> TestHarness {
    let store = Arc::new(MemoryRecordStore::new());
    let gateway = Arc::new(gateway);
    let finalizer = Arc::new(CountingFinalizer::default());
    let signals = StatusChannel::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = Arc::new(CheckoutService::new(
        store.clone(),
        gateway.clone(),
        finalizer.clone(),
        signals.clone(),
        policy,
        shutdown_rx,
    ));
    TestHarness {
        store,
        gateway,
        finalizer,
        signals,
        service,
        shutdown_tx,
    }
}
