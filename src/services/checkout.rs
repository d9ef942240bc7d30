//! Checkout orchestration
//!
//! Owns the happy path from "customer wants to pay" to "reconciliation loop
//! running": generate a fresh reference, initialize the hosted payment with
//! the gateway, persist the pending record, and hand the reference to a
//! reconciliation loop. A failed initialization leaves nothing behind; the
//! customer retries and gets a brand-new reference.

use crate::database::error::DatabaseError;
use crate::database::record_store::{PaymentRecord, PaymentRecordStore, RecordStatus};
use crate::gateway::{GatewayError, InitializeRequest, Money, PaymentGateway};
use crate::logging::mask_email;
use crate::notify::StatusChannel;
use crate::reconcile::{ReconcileOutcome, ReconcilePolicy, ReconciliationLoop};
use crate::reference::{PaymentReference, ReferenceGenerator};
use crate::services::finalizer::OrderFinalizer;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Validation error: {0}")]
    Validation(#[source] GatewayError),
    #[error("Payment initialization failed: {0}")]
    Initialization(#[source] GatewayError),
    #[error("Payment record not found: {reference}")]
    NotFound { reference: String },
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub order_id: String,
    pub amount: Money,
    pub payer_email: String,
    pub callback_url: Option<String>,
    pub metadata: Option<JsonValue>,
}

/// What the caller needs to send the customer to the gateway.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub reference: PaymentReference,
    pub authorization_url: String,
}

/// Result of re-opening reconciliation for an existing reference.
pub enum ResumeOutcome {
    /// The record already reached a terminal status; nothing to reconcile.
    AlreadyResolved(PaymentRecord),
    /// A fresh loop is polling the same reference again.
    Resumed,
}

pub struct CheckoutService {
    store: Arc<dyn PaymentRecordStore>,
    gateway: Arc<dyn PaymentGateway>,
    finalizer: Arc<dyn OrderFinalizer>,
    signals: StatusChannel,
    policy: ReconcilePolicy,
    references: ReferenceGenerator,
    shutdown_rx: watch::Receiver<bool>,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn PaymentRecordStore>,
        gateway: Arc<dyn PaymentGateway>,
        finalizer: Arc<dyn OrderFinalizer>,
        signals: StatusChannel,
        policy: ReconcilePolicy,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            gateway,
            finalizer,
            signals,
            policy,
            references: ReferenceGenerator::new(),
            shutdown_rx,
        }
    }

    /// Initialize a hosted payment and persist the pending record.
    ///
    /// The record is created only after the gateway accepted the
    /// initialization, so `InitializationFailed` never leaves a row behind.
    pub async fn initiate(&self, request: CheckoutRequest) -> Result<CheckoutSession, CheckoutError> {
        let reference = self.references.generate(&request.order_id);
        info!(
            order_id = %request.order_id,
            reference = %reference,
            payer = %mask_email(&request.payer_email),
            amount = %request.amount.amount,
            currency = %request.amount.currency,
            "initiating checkout"
        );

        let amount = request
            .amount
            .to_decimal("amount")
            .map_err(CheckoutError::Validation)?;

        let initialized = self
            .gateway
            .initialize(InitializeRequest {
                amount: request.amount,
                payer_email: request.payer_email,
                reference: reference.to_string(),
                callback_url: request.callback_url,
                order_metadata: request.metadata,
            })
            .await
            .map_err(|e| match e {
                GatewayError::Validation { .. } => CheckoutError::Validation(e),
                other => CheckoutError::Initialization(other),
            })?;

        self.store
            .create(&reference, &request.order_id, amount, initialized.raw)
            .await?;

        Ok(CheckoutSession {
            reference,
            authorization_url: initialized.authorization_url,
        })
    }

    /// Spawn the reconciliation loop for a just-initiated checkout. The loop
    /// is bound to the server-wide shutdown channel.
    pub fn start_reconciliation(
        &self,
        reference: &PaymentReference,
        order_id: &str,
    ) -> JoinHandle<Option<ReconcileOutcome>> {
        self.reconciliation_loop(reference.as_str(), order_id)
            .spawn(self.shutdown_rx.clone())
    }

    /// Re-open reconciliation for a reference whose loop was cancelled (tab
    /// closed, navigation away). Polls the same reference, never a new one.
    pub async fn resume(&self, reference: &str) -> Result<ResumeOutcome, CheckoutError> {
        let record = self.record(reference).await?;
        match record.record_status() {
            Some(RecordStatus::Pending) | None => {
                info!(reference = %reference, "resuming reconciliation for pending record");
                let _loop_task = self
                    .reconciliation_loop(reference, &record.order_id)
                    .spawn(self.shutdown_rx.clone());
                Ok(ResumeOutcome::Resumed)
            }
            Some(_) => {
                warn!(
                    reference = %reference,
                    status = %record.status,
                    "resume requested for an already-resolved record"
                );
                Ok(ResumeOutcome::AlreadyResolved(record))
            }
        }
    }

    pub async fn record(&self, reference: &str) -> Result<PaymentRecord, CheckoutError> {
        self.store
            .read(reference)
            .await?
            .ok_or_else(|| CheckoutError::NotFound {
                reference: reference.to_string(),
            })
    }

    fn reconciliation_loop(&self, reference: &str, order_id: &str) -> ReconciliationLoop {
        ReconciliationLoop::new(
            reference,
            order_id,
            self.store.clone(),
            self.gateway.clone(),
            self.finalizer.clone(),
            self.signals.clone(),
            self.policy.clone(),
        )
    }
}
