//! Services module for business logic and integrations

pub mod checkout;
pub mod finalizer;
pub mod webhook_ingest;

pub use checkout::{
    CheckoutError, CheckoutRequest, CheckoutService, CheckoutSession, ResumeOutcome,
};
pub use finalizer::{FinalizedOrder, LoggingFinalizer, OrderFinalizer};
pub use webhook_ingest::{IngestOutcome, WebhookError, WebhookIngestor};
