//! Payment confirmation reconciliation
//!
//! After a customer is redirected to the gateway, two sources of truth race
//! to resolve the payment: the gateway's webhook (fast but unreliable) and a
//! direct verification call (reliable but rate-limited). The loop here polls
//! the self-healing record store first, and only falls back to the gateway
//! once the webhook has had a fair chance, guaranteeing eventual resolution
//! at the cost of a few seconds of latency.

pub mod policy;
pub mod state;
pub mod worker;

pub use policy::ReconcilePolicy;
pub use state::{ReconcileOutcome, ReconcileState, ReconciliationAttempt};
pub use worker::{ReconcileHandle, ReconciliationLoop};
