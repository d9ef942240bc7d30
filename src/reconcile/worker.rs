use crate::database::record_store::{
    PaymentRecord, PaymentRecordStore, RecordStatus, TerminalStatus, WriteOutcome,
};
use crate::gateway::{GatewayStatus, PaymentGateway, VerifiedPayment};
use crate::notify::{SignalStatus, StatusChannel};
use crate::reconcile::policy::ReconcilePolicy;
use crate::reconcile::state::{ReconcileOutcome, ReconcileState, ReconciliationAttempt};
use crate::services::finalizer::{FinalizedOrder, OrderFinalizer};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Loop handle
// ---------------------------------------------------------------------------

/// Handle to a spawned reconciliation loop. Dropping the handle does not stop
/// the loop; call `stop` for that, or `outcome` to wait for its result.
pub struct ReconcileHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<Option<ReconcileOutcome>>,
}

impl ReconcileHandle {
    /// Cancel the loop and wait for it to wind down. Returns the outcome if
    /// the loop happened to reach a terminal state before the cancel landed.
    pub async fn stop(self) -> Option<ReconcileOutcome> {
        let _ = self.cancel.send(true);
        self.task.await.unwrap_or(None)
    }

    /// Wait for the loop to finish on its own.
    pub async fn outcome(self) -> Option<ReconcileOutcome> {
        self.task.await.unwrap_or(None)
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Session-scoped reconciliation state machine, one instance per payment
/// reference. Polls the record store on a fixed interval; once the fallback
/// threshold is crossed, each still-pending tick also asks the gateway
/// directly and self-heals the record through the conditional write.
///
/// Loops for different references are fully independent; the record store is
/// the only shared state, and `write_if_pending` its only synchronization.
pub struct ReconciliationLoop {
    reference: String,
    order_id: String,
    store: Arc<dyn PaymentRecordStore>,
    gateway: Arc<dyn PaymentGateway>,
    finalizer: Arc<dyn OrderFinalizer>,
    signals: StatusChannel,
    policy: ReconcilePolicy,
    attempt: ReconciliationAttempt,
    state: ReconcileState,
}

impl ReconciliationLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference: impl Into<String>,
        order_id: impl Into<String>,
        store: Arc<dyn PaymentRecordStore>,
        gateway: Arc<dyn PaymentGateway>,
        finalizer: Arc<dyn OrderFinalizer>,
        signals: StatusChannel,
        policy: ReconcilePolicy,
    ) -> Self {
        let reference = reference.into();
        Self {
            attempt: ReconciliationAttempt::new(reference.clone()),
            reference,
            order_id: order_id.into(),
            store,
            gateway,
            finalizer,
            signals,
            policy,
            state: ReconcileState::Initiated,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn attempt(&self) -> &ReconciliationAttempt {
        &self.attempt
    }

    /// Spawn the loop on the runtime, cancellable through the returned handle.
    pub fn start(self) -> ReconcileHandle {
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(cancel_rx));
        ReconcileHandle { cancel, task }
    }

    /// Spawn the loop bound to an externally owned shutdown channel (the
    /// server-wide graceful-shutdown broadcast).
    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<Option<ReconcileOutcome>> {
        tokio::spawn(self.run(shutdown_rx))
    }

    /// Drive the loop to a terminal state.
    ///
    /// Returns `None` when cancelled before resolution: the record simply
    /// stays `pending`, a later webhook is still honored through
    /// `write_if_pending`, and reconciliation can be resumed later against
    /// the same reference.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Option<ReconcileOutcome> {
        info!(
            reference = %self.reference,
            order_id = %self.order_id,
            poll_interval_secs = self.policy.poll_interval.as_secs(),
            fallback_after_attempts = self.policy.fallback_after_attempts,
            max_attempts = self.policy.max_attempts,
            "reconciliation loop started"
        );
        self.state = ReconcileState::Polling;

        let mut signal_rx = self.signals.subscribe();
        let mut shutdown_open = true;
        let mut signals_open = true;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed(), if shutdown_open => {
                    match changed {
                        Ok(()) if *shutdown_rx.borrow() => {
                            info!(
                                reference = %self.reference,
                                attempts = self.attempt.attempt_count,
                                "reconciliation loop cancelled; record stays pending"
                            );
                            return None;
                        }
                        Ok(()) => {}
                        // Sender gone: nobody can cancel us anymore, run to completion.
                        Err(_) => shutdown_open = false,
                    }
                }
                signal = signal_rx.recv(), if signals_open => {
                    match signal {
                        Ok(message) if message.reference == self.reference => {
                            debug!(
                                reference = %self.reference,
                                status = ?message.status,
                                "status signal received, checking evidence"
                            );
                            if let Some(outcome) = self.tick_on_signal().await {
                                return Some(self.finish(outcome).await);
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(
                                reference = %self.reference,
                                skipped,
                                "status signal receiver lagged"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => signals_open = false,
                    }
                }
                _ = tokio::time::sleep(self.policy.poll_interval) => {
                    if let Some(outcome) = self.tick().await {
                        return Some(self.finish(outcome).await);
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Poll ticks
    // -----------------------------------------------------------------------

    /// One timer tick: a single store read and, past the fallback threshold,
    /// at most one direct gateway verification.
    async fn tick(&mut self) -> Option<ReconcileOutcome> {
        self.attempt.attempt_count += 1;
        let attempt = self.attempt.attempt_count;

        match self.store.read(&self.reference).await {
            Ok(Some(record)) => match record.record_status() {
                Some(RecordStatus::Success) | Some(RecordStatus::Failed) => {
                    self.attempt.last_status = record.record_status();
                    return Some(outcome_from_record(&record));
                }
                Some(RecordStatus::Pending) => {
                    self.attempt.last_status = Some(RecordStatus::Pending);
                    if attempt >= self.policy.fallback_after_attempts {
                        if let Some(outcome) = self.direct_verify().await {
                            return Some(outcome);
                        }
                    } else {
                        debug!(
                            reference = %self.reference,
                            attempt,
                            "record still pending, waiting for webhook"
                        );
                    }
                }
                None => {
                    warn!(
                        reference = %self.reference,
                        status = %record.status,
                        "record has unrecognized status, treating as pending"
                    );
                }
            },
            Ok(None) => {
                warn!(reference = %self.reference, "payment record missing during polling");
            }
            Err(e) => {
                // Transient by policy: a flaky store read never fails a payment.
                warn!(reference = %self.reference, error = %e, "store read failed, will retry");
            }
        }

        if attempt >= self.policy.max_attempts {
            warn!(
                reference = %self.reference,
                attempts = attempt,
                "attempt budget exhausted without confirmation"
            );
            return Some(ReconcileOutcome::TimedOut);
        }
        None
    }

    /// A cross-context signal names this reference. The message is a hint
    /// that fresh evidence exists, not evidence itself: re-read the store
    /// and, if it is somehow still pending, verify directly; never resolve
    /// from the message alone. Signal-triggered checks do not consume the
    /// attempt budget.
    async fn tick_on_signal(&mut self) -> Option<ReconcileOutcome> {
        match self.store.read(&self.reference).await {
            Ok(Some(record)) if record.record_status().is_some_and(RecordStatus::is_terminal) => {
                self.attempt.last_status = record.record_status();
                Some(outcome_from_record(&record))
            }
            Ok(Some(_)) => self.direct_verify().await,
            Ok(None) => None,
            Err(e) => {
                warn!(reference = %self.reference, error = %e, "store read failed on signal");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Direct-verification fallback
    // -----------------------------------------------------------------------

    async fn direct_verify(&mut self) -> Option<ReconcileOutcome> {
        info!(
            reference = %self.reference,
            attempt = self.attempt.attempt_count,
            "webhook has not arrived, verifying directly with gateway"
        );

        match self.gateway.verify(&self.reference).await {
            Ok(verified) => match verified.status {
                GatewayStatus::Success => self.self_heal(TerminalStatus::Success, verified).await,
                GatewayStatus::Failed => self.self_heal(TerminalStatus::Failed, verified).await,
                GatewayStatus::Pending => {
                    debug!(reference = %self.reference, "gateway reports payment still pending");
                    None
                }
            },
            // Inconclusive, not failed: the verify call proved nothing about
            // the payment, so keep polling.
            Err(e) => {
                warn!(
                    reference = %self.reference,
                    error = %e,
                    retryable = e.is_retryable(),
                    "direct verification inconclusive, will retry"
                );
                None
            }
        }
    }

    /// Write the directly-verified status through the conditional update. A
    /// concurrent webhook write wins: on `AlreadyResolved` the stored record,
    /// not our verification, is what the loop reports.
    async fn self_heal(
        &mut self,
        status: TerminalStatus,
        verified: VerifiedPayment,
    ) -> Option<ReconcileOutcome> {
        let write = self
            .store
            .write_if_pending(
                &self.reference,
                status,
                verified.transaction_id.as_deref(),
                verified.raw.clone(),
            )
            .await;

        match write {
            Ok(WriteOutcome::Applied(record)) => {
                info!(
                    reference = %self.reference,
                    status = %status,
                    transaction_id = record.gateway_transaction_id.as_deref().unwrap_or(""),
                    payload = %verified.raw,
                    "record self-healed from direct verification"
                );
                self.attempt.last_status = record.record_status();
                Some(outcome_from_record(&record))
            }
            Ok(WriteOutcome::AlreadyResolved(record)) => {
                info!(
                    reference = %self.reference,
                    stored_status = %record.status,
                    verified_status = %status,
                    "another writer resolved first, honoring the stored status"
                );
                self.attempt.last_status = record.record_status();
                Some(outcome_from_record(&record))
            }
            Ok(WriteOutcome::NotFound) => {
                warn!(reference = %self.reference, "self-heal write hit a missing record");
                None
            }
            Err(e) => {
                warn!(reference = %self.reference, error = %e, "self-heal write failed, will retry");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Terminal handling
    // -----------------------------------------------------------------------

    async fn finish(&mut self, outcome: ReconcileOutcome) -> ReconcileOutcome {
        self.state = outcome.state();
        match &outcome {
            ReconcileOutcome::Success { transaction_id } => {
                info!(
                    reference = %self.reference,
                    order_id = %self.order_id,
                    transaction_id = transaction_id.as_deref().unwrap_or(""),
                    attempts = self.attempt.attempt_count,
                    "payment confirmed"
                );
                let order = FinalizedOrder {
                    order_id: self.order_id.clone(),
                    reference: self.reference.clone(),
                    transaction_id: transaction_id.clone(),
                };
                if let Err(e) = self.finalizer.finalize(order).await {
                    error!(
                        reference = %self.reference,
                        order_id = %self.order_id,
                        error = %e,
                        "order finalization failed"
                    );
                }
                self.signals.publish(&self.reference, SignalStatus::Success);
            }
            ReconcileOutcome::Failed { reason } => {
                warn!(
                    reference = %self.reference,
                    reason = reason.as_deref().unwrap_or("gateway reported failure"),
                    "payment failed"
                );
                self.signals.publish(&self.reference, SignalStatus::Failed);
            }
            ReconcileOutcome::TimedOut => {
                // Not a failure: the payment may still resolve after this
                // loop is gone, and a late webhook will be honored.
                warn!(
                    reference = %self.reference,
                    attempts = self.attempt.attempt_count,
                    "could not confirm payment within the interactive window"
                );
            }
        }
        outcome
    }
}

fn outcome_from_record(record: &PaymentRecord) -> ReconcileOutcome {
    match record.record_status() {
        Some(RecordStatus::Failed) => ReconcileOutcome::Failed {
            reason: record
                .raw_payload
                .get("gateway_response")
                .and_then(|v| v.as_str())
                .map(|v| v.to_string()),
        },
        _ => ReconcileOutcome::Success {
            transaction_id: record.gateway_transaction_id.clone(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
