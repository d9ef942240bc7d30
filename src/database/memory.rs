//! In-memory payment record store
//!
//! Same contract as the Postgres repository, backed by a mutex-guarded map.
//! Used by the test suites and for local development without a database
//! (`RECORD_STORE=memory`).

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::record_store::{
    PaymentRecord, PaymentRecordStore, RecordStatus, TerminalStatus, WriteOutcome,
};
use crate::reference::PaymentReference;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::types::BigDecimal;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, PaymentRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("record map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PaymentRecordStore for MemoryRecordStore {
    async fn create(
        &self,
        reference: &PaymentReference,
        order_id: &str,
        amount: BigDecimal,
        raw_payload: JsonValue,
    ) -> Result<PaymentRecord, DatabaseError> {
        let mut records = self.records.lock().expect("record map poisoned");
        if records.contains_key(reference.as_str()) {
            return Err(DatabaseError::new(DatabaseErrorKind::Duplicate {
                entity: "payment_records".to_string(),
                id: reference.to_string(),
            }));
        }
        let now = chrono::Utc::now();
        let record = PaymentRecord {
            reference: reference.to_string(),
            order_id: order_id.to_string(),
            status: RecordStatus::Pending.to_db_status().to_string(),
            gateway_transaction_id: None,
            amount,
            raw_payload,
            created_at: now,
            updated_at: now,
        };
        records.insert(record.reference.clone(), record.clone());
        Ok(record)
    }

    async fn read(&self, reference: &str) -> Result<Option<PaymentRecord>, DatabaseError> {
        let records = self.records.lock().expect("record map poisoned");
        Ok(records.get(reference).cloned())
    }

    async fn write_if_pending(
        &self,
        reference: &str,
        status: TerminalStatus,
        transaction_id: Option<&str>,
        raw_payload: JsonValue,
    ) -> Result<WriteOutcome, DatabaseError> {
        let mut records = self.records.lock().expect("record map poisoned");
        match records.get_mut(reference) {
            None => Ok(WriteOutcome::NotFound),
            Some(record) if record.record_status() == Some(RecordStatus::Pending) => {
                record.status = status.to_db_status().to_string();
                if let Some(id) = transaction_id {
                    record.gateway_transaction_id = Some(id.to_string());
                }
                record.raw_payload = raw_payload;
                record.updated_at = chrono::Utc::now();
                Ok(WriteOutcome::Applied(record.clone()))
            }
            Some(record) => Ok(WriteOutcome::AlreadyResolved(record.clone())),
        }
    }
}
