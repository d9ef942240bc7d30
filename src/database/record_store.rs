//! Payment record store contract
//!
//! The store holds one row per payment reference and is the single source of
//! truth for everything downstream of checkout. Two independent writers (the
//! webhook ingestor and the reconciliation loop's self-heal) race on the same
//! row; `write_if_pending` is the only synchronization point between them.

use crate::database::error::DatabaseError;
use crate::reference::PaymentReference;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::types::BigDecimal;

/// Reconciled status of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Pending,
    Success,
    Failed,
}

impl RecordStatus {
    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(RecordStatus::Pending),
            "success" => Some(RecordStatus::Success),
            "failed" => Some(RecordStatus::Failed),
            _ => None,
        }
    }

    pub fn to_db_status(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Success => "success",
            RecordStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RecordStatus::Pending)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_status())
    }
}

/// A status `write_if_pending` is allowed to apply. Once written it is never
/// downgraded; the type makes a pending→pending "update" unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Success,
    Failed,
}

impl TerminalStatus {
    pub fn to_record_status(self) -> RecordStatus {
        match self {
            TerminalStatus::Success => RecordStatus::Success,
            TerminalStatus::Failed => RecordStatus::Failed,
        }
    }

    pub fn to_db_status(self) -> &'static str {
        self.to_record_status().to_db_status()
    }
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_status())
    }
}

/// Persisted payment record, the permanent audit trail for one checkout
/// attempt. Never deleted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRecord {
    pub reference: String,
    pub order_id: String,
    pub status: String,
    pub gateway_transaction_id: Option<String>,
    pub amount: BigDecimal,
    pub raw_payload: JsonValue,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl PaymentRecord {
    pub fn record_status(&self) -> Option<RecordStatus> {
        RecordStatus::from_db_status(&self.status)
    }
}

/// Outcome of the conditional terminal write. `AlreadyResolved` is not an
/// error: it is the expected result when another writer got there first, and
/// it carries the winning record so the caller can honor the stored value.
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    Applied(PaymentRecord),
    AlreadyResolved(PaymentRecord),
    NotFound,
}

#[async_trait]
pub trait PaymentRecordStore: Send + Sync {
    /// Insert the `pending` row for a freshly initialized payment. Called
    /// exactly once per reference, immediately after gateway initialization.
    async fn create(
        &self,
        reference: &PaymentReference,
        order_id: &str,
        amount: BigDecimal,
        raw_payload: JsonValue,
    ) -> Result<PaymentRecord, DatabaseError>;

    async fn read(&self, reference: &str) -> Result<Option<PaymentRecord>, DatabaseError>;

    /// Atomic conditional update: applies only while the stored status is
    /// still `pending` ("update where status = pending"). Exactly one
    /// terminal write survives regardless of writer interleaving.
    async fn write_if_pending(
        &self,
        reference: &str,
        status: TerminalStatus,
        transaction_id: Option<&str>,
        raw_payload: JsonValue,
    ) -> Result<WriteOutcome, DatabaseError>;
}
