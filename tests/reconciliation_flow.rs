mod common;

use common::{fast_policy, harness, ScriptedGateway};
use payconfirm_backend::database::record_store::{
    PaymentRecordStore, RecordStatus, TerminalStatus, WriteOutcome,
};
use payconfirm_backend::gateway::types::GatewayStatus;
use payconfirm_backend::gateway::Money;
use payconfirm_backend::reconcile::{ReconcileOutcome, ReconcilePolicy};
use payconfirm_backend::services::checkout::{CheckoutError, CheckoutRequest, ResumeOutcome};
use std::time::Duration;

fn checkout_request(order_id: &str, amount: &str) -> CheckoutRequest {
    CheckoutRequest {
        order_id: order_id.to_string(),
        amount: Money {
            amount: amount.to_string(),
            currency: "NGN".to_string(),
        },
        payer_email: "customer@example.com".to_string(),
        callback_url: Some("https://shop.example/checkout/done".to_string()),
        metadata: None,
    }
}

#[tokio::test]
async fn checkout_resolves_through_direct_verification_when_no_webhook_arrives() {
    // Order ORD-100 for 500: no webhook ever arrives, the fallback verify
    // reports success with TXN-9 and the order is finalized exactly once.
    let h = harness(
        ScriptedGateway::new(vec![Ok(ScriptedGateway::verified(
            GatewayStatus::Success,
            Some("TXN-9"),
        ))]),
        fast_policy(),
    );

    let session = h
        .service
        .initiate(checkout_request("ORD-100", "500"))
        .await
        .expect("initiation should succeed");
    assert!(session.reference.as_str().starts_with("ORD-100-"));
    assert!(session
        .authorization_url
        .contains(session.reference.as_str()));

    let outcome = h
        .service
        .start_reconciliation(&session.reference, "ORD-100")
        .await
        .expect("loop task should not panic");
    assert_eq!(
        outcome,
        Some(ReconcileOutcome::Success {
            transaction_id: Some("TXN-9".to_string())
        })
    );
    assert_eq!(h.gateway.verify_calls(), 1);

    let record = h
        .store
        .read(session.reference.as_str())
        .await
        .expect("read should succeed")
        .expect("record should exist");
    assert_eq!(record.record_status(), Some(RecordStatus::Success));
    assert_eq!(record.gateway_transaction_id.as_deref(), Some("TXN-9"));

    let calls = h.finalizer.calls();
    assert_eq!(calls.len(), 1, "finalization must run exactly once");
    assert_eq!(calls[0].order_id, "ORD-100");
    assert_eq!(calls[0].reference, session.reference.as_str());
    assert_eq!(calls[0].transaction_id.as_deref(), Some("TXN-9"));
}

#[tokio::test]
async fn webhook_and_fallback_race_resolves_once_with_first_writer_winning() {
    // The fallback verify is slow; while it is in flight a webhook resolves
    // the record. The self-heal write must come back AlreadyResolved, the
    // loop must report the webhook's transaction id, and finalization must
    // still happen exactly once.
    let policy = ReconcilePolicy {
        poll_interval: Duration::from_millis(10),
        fallback_after_attempts: 1,
        max_attempts: 50,
    };
    let h = harness(
        ScriptedGateway::new(vec![Ok(ScriptedGateway::verified(
            GatewayStatus::Success,
            Some("TXN-FALLBACK"),
        ))])
        .with_verify_delay(Duration::from_millis(80)),
        policy,
    );

    let session = h
        .service
        .initiate(checkout_request("ORD-100", "500"))
        .await
        .expect("initiation should succeed");
    let task = h.service.start_reconciliation(&session.reference, "ORD-100");

    // Let the loop reach its (slow) direct verification, then land the webhook.
    tokio::time::sleep(Duration::from_millis(40)).await;
    let webhook_write = h
        .store
        .write_if_pending(
            session.reference.as_str(),
            TerminalStatus::Success,
            Some("TXN-WEBHOOK"),
            serde_json::json!({"source": "webhook"}),
        )
        .await
        .expect("webhook write should succeed");
    assert!(matches!(webhook_write, WriteOutcome::Applied(_)));

    let outcome = task.await.expect("loop task should not panic");
    assert_eq!(
        outcome,
        Some(ReconcileOutcome::Success {
            transaction_id: Some("TXN-WEBHOOK".to_string())
        }),
        "the stored (webhook) value wins, not the fallback's"
    );

    let record = h
        .store
        .read(session.reference.as_str())
        .await
        .expect("read should succeed")
        .expect("record should exist");
    assert_eq!(record.gateway_transaction_id.as_deref(), Some("TXN-WEBHOOK"));
    assert_eq!(h.finalizer.calls().len(), 1, "no double finalization");
}

#[tokio::test]
async fn fallback_fires_well_before_the_hard_cap() {
    let policy = ReconcilePolicy {
        poll_interval: Duration::from_millis(20),
        fallback_after_attempts: 3,
        max_attempts: 12,
    };
    let h = harness(
        ScriptedGateway::new(vec![Ok(ScriptedGateway::verified(
            GatewayStatus::Success,
            Some("TXN-1"),
        ))]),
        policy.clone(),
    );

    let session = h
        .service
        .initiate(checkout_request("ORD-101", "250"))
        .await
        .expect("initiation should succeed");

    let started = std::time::Instant::now();
    let outcome = h
        .service
        .start_reconciliation(&session.reference, "ORD-101")
        .await
        .expect("loop task should not panic");
    let elapsed = started.elapsed();

    assert!(matches!(outcome, Some(ReconcileOutcome::Success { .. })));
    assert_eq!(h.gateway.verify_calls(), 1);
    assert!(
        elapsed < policy.poll_interval * policy.max_attempts,
        "resolution must not wait for the hard cap (took {:?})",
        elapsed
    );
}

#[tokio::test]
async fn exhausting_the_attempt_budget_times_out_without_failing_the_record() {
    let policy = ReconcilePolicy {
        poll_interval: Duration::from_millis(5),
        fallback_after_attempts: 2,
        max_attempts: 4,
    };
    let h = harness(
        ScriptedGateway::new(vec![Ok(ScriptedGateway::verified(
            GatewayStatus::Pending,
            None,
        ))]),
        policy,
    );

    let session = h
        .service
        .initiate(checkout_request("ORD-102", "100"))
        .await
        .expect("initiation should succeed");
    let outcome = h
        .service
        .start_reconciliation(&session.reference, "ORD-102")
        .await
        .expect("loop task should not panic");

    assert_eq!(outcome, Some(ReconcileOutcome::TimedOut));
    assert!(h.finalizer.calls().is_empty(), "timeout must not finalize");

    let record = h
        .store
        .read(session.reference.as_str())
        .await
        .expect("read should succeed")
        .expect("record should exist");
    assert_eq!(
        record.record_status(),
        Some(RecordStatus::Pending),
        "timed-out checkouts stay pending for later resolution"
    );
}

#[tokio::test]
async fn late_webhook_after_timeout_is_honored_and_resume_sees_it() {
    let policy = ReconcilePolicy {
        poll_interval: Duration::from_millis(5),
        fallback_after_attempts: 2,
        max_attempts: 3,
    };
    let h = harness(
        ScriptedGateway::new(vec![Ok(ScriptedGateway::verified(
            GatewayStatus::Pending,
            None,
        ))]),
        policy,
    );

    let session = h
        .service
        .initiate(checkout_request("ORD-103", "750"))
        .await
        .expect("initiation should succeed");
    let outcome = h
        .service
        .start_reconciliation(&session.reference, "ORD-103")
        .await
        .expect("loop task should not panic");
    assert_eq!(outcome, Some(ReconcileOutcome::TimedOut));

    // The webhook shows up long after the loop gave up.
    let write = h
        .store
        .write_if_pending(
            session.reference.as_str(),
            TerminalStatus::Success,
            Some("TXN-LATE"),
            serde_json::json!({"source": "webhook"}),
        )
        .await
        .expect("late webhook write should succeed");
    assert!(matches!(write, WriteOutcome::Applied(_)));

    match h
        .service
        .resume(session.reference.as_str())
        .await
        .expect("resume should succeed")
    {
        ResumeOutcome::AlreadyResolved(record) => {
            assert_eq!(record.record_status(), Some(RecordStatus::Success));
            assert_eq!(record.gateway_transaction_id.as_deref(), Some("TXN-LATE"));
        }
        ResumeOutcome::Resumed => panic!("resolved record must not spawn a new loop"),
    }
}

#[tokio::test]
async fn resumed_reconciliation_polls_the_same_reference_to_completion() {
    let policy = ReconcilePolicy {
        poll_interval: Duration::from_millis(5),
        fallback_after_attempts: 2,
        max_attempts: 3,
    };
    let h = harness(
        ScriptedGateway::new(vec![Ok(ScriptedGateway::verified(
            GatewayStatus::Pending,
            None,
        ))]),
        policy,
    );

    let session = h
        .service
        .initiate(checkout_request("ORD-104", "300"))
        .await
        .expect("initiation should succeed");
    let outcome = h
        .service
        .start_reconciliation(&session.reference, "ORD-104")
        .await
        .expect("loop task should not panic");
    assert_eq!(outcome, Some(ReconcileOutcome::TimedOut));

    // Re-open reconciliation; the record is still pending.
    match h
        .service
        .resume(session.reference.as_str())
        .await
        .expect("resume should succeed")
    {
        ResumeOutcome::Resumed => {}
        ResumeOutcome::AlreadyResolved(_) => panic!("record should still be pending"),
    }

    // A webhook resolves it while the resumed loop is polling.
    h.store
        .write_if_pending(
            session.reference.as_str(),
            TerminalStatus::Success,
            Some("TXN-RESUMED"),
            serde_json::json!({"source": "webhook"}),
        )
        .await
        .expect("webhook write should succeed");

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if h.finalizer.calls().len() == 1 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "resumed loop should have finalized the order"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        h.finalizer.calls()[0].transaction_id.as_deref(),
        Some("TXN-RESUMED")
    );
}

#[tokio::test]
async fn retried_checkouts_always_get_fresh_references() {
    let h = harness(ScriptedGateway::new(vec![]), fast_policy());

    let first = h
        .service
        .initiate(checkout_request("ORD-105", "100"))
        .await
        .expect("first initiation should succeed");
    let second = h
        .service
        .initiate(checkout_request("ORD-105", "100"))
        .await
        .expect("second initiation should succeed");

    assert_ne!(first.reference, second.reference);
    assert_eq!(h.store.len(), 2, "each attempt gets its own record");
}

#[tokio::test]
async fn failed_initialization_leaves_no_record_behind() {
    let h = harness(
        ScriptedGateway::failing_initialization("gateway rejected the request"),
        fast_policy(),
    );

    let result = h.service.initiate(checkout_request("ORD-106", "100")).await;
    assert!(matches!(result, Err(CheckoutError::Initialization(_))));
    assert!(h.store.is_empty(), "no pending record may exist");
}

#[tokio::test]
async fn invalid_amount_is_rejected_before_touching_the_gateway() {
    let h = harness(ScriptedGateway::new(vec![]), fast_policy());

    let result = h.service.initiate(checkout_request("ORD-107", "0")).await;
    assert!(matches!(result, Err(CheckoutError::Validation(_))));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn unknown_reference_lookup_is_a_not_found_error() {
    let h = harness(ScriptedGateway::new(vec![]), fast_policy());
    let result = h.service.record("ORD-999-1").await;
    assert!(matches!(result, Err(CheckoutError::NotFound { .. })));
}
