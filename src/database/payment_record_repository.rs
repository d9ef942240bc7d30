use crate::database::error::DatabaseError;
use crate::database::record_store::{
    PaymentRecord, PaymentRecordStore, TerminalStatus, WriteOutcome,
};
use crate::reference::PaymentReference;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::types::BigDecimal;
use sqlx::PgPool;

const RECORD_COLUMNS: &str = "reference, order_id, status, gateway_transaction_id, amount, \
                              raw_payload, created_at, updated_at";

/// Postgres-backed payment record store.
pub struct PaymentRecordRepository {
    pool: PgPool,
}

impl PaymentRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List records still pending that were created within the given window.
    /// Support tooling uses this to find checkouts the webhook never closed.
    pub async fn find_stale_pending(
        &self,
        window_hours: i32,
        limit: i64,
    ) -> Result<Vec<PaymentRecord>, DatabaseError> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {RECORD_COLUMNS} \
             FROM payment_records \
             WHERE status = 'pending' \
               AND created_at > NOW() - make_interval(hours => $1) \
             ORDER BY created_at ASC \
             LIMIT $2",
        ))
        .bind(window_hours)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// List every record for an order, newest first. Retried checkouts leave
    /// one row per attempted reference.
    pub async fn find_by_order(&self, order_id: &str) -> Result<Vec<PaymentRecord>, DatabaseError> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {RECORD_COLUMNS} \
             FROM payment_records \
             WHERE order_id = $1 \
             ORDER BY created_at DESC",
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl PaymentRecordStore for PaymentRecordRepository {
    async fn create(
        &self,
        reference: &PaymentReference,
        order_id: &str,
        amount: BigDecimal,
        raw_payload: JsonValue,
    ) -> Result<PaymentRecord, DatabaseError> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "INSERT INTO payment_records \
             (reference, order_id, status, amount, raw_payload) \
             VALUES ($1, $2, 'pending', $3, $4) \
             RETURNING {RECORD_COLUMNS}",
        ))
        .bind(reference.as_str())
        .bind(order_id)
        .bind(amount)
        .bind(raw_payload)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn read(&self, reference: &str) -> Result<Option<PaymentRecord>, DatabaseError> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records WHERE reference = $1",
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn write_if_pending(
        &self,
        reference: &str,
        status: TerminalStatus,
        transaction_id: Option<&str>,
        raw_payload: JsonValue,
    ) -> Result<WriteOutcome, DatabaseError> {
        // The WHERE clause is the whole concurrency story: the row flips to a
        // terminal status at most once, no matter how many writers race.
        let applied = sqlx::query_as::<_, PaymentRecord>(&format!(
            "UPDATE payment_records \
             SET status = $2, \
                 gateway_transaction_id = COALESCE($3, gateway_transaction_id), \
                 raw_payload = $4, \
                 updated_at = NOW() \
             WHERE reference = $1 AND status = 'pending' \
             RETURNING {RECORD_COLUMNS}",
        ))
        .bind(reference)
        .bind(status.to_db_status())
        .bind(transaction_id)
        .bind(raw_payload)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some(record) = applied {
            return Ok(WriteOutcome::Applied(record));
        }

        match self.read(reference).await? {
            Some(record) => Ok(WriteOutcome::AlreadyResolved(record)),
            None => Ok(WriteOutcome::NotFound),
        }
    }
}
