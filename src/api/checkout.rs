use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::database::record_store::PaymentRecord;
use crate::error::AppError;
use crate::gateway::Money;
use crate::services::checkout::{CheckoutRequest, CheckoutService, ResumeOutcome};

#[derive(Clone)]
pub struct CheckoutApiState {
    pub service: Arc<CheckoutService>,
}

#[derive(Debug, Deserialize)]
pub struct InitiateCheckoutBody {
    pub order_id: String,
    pub amount: String,
    pub currency: String,
    pub payer_email: String,
    pub callback_url: Option<String>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
pub struct InitiateCheckoutResponse {
    pub reference: String,
    pub authorization_url: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PaymentRecordResponse {
    pub reference: String,
    pub order_id: String,
    pub status: String,
    pub gateway_transaction_id: Option<String>,
    pub amount: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<PaymentRecord> for PaymentRecordResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            reference: record.reference,
            order_id: record.order_id,
            status: record.status,
            gateway_transaction_id: record.gateway_transaction_id,
            amount: record.amount.to_string(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// POST /api/checkout
///
/// Initializes a hosted payment, persists the pending record, starts the
/// reconciliation loop and hands the redirect URL back to the client.
pub async fn initiate_checkout(
    State(state): State<CheckoutApiState>,
    Json(body): Json<InitiateCheckoutBody>,
) -> Result<impl IntoResponse, AppError> {
    let order_id = body.order_id.clone();
    let session = state
        .service
        .initiate(CheckoutRequest {
            order_id: body.order_id,
            amount: Money {
                amount: body.amount,
                currency: body.currency,
            },
            payer_email: body.payer_email,
            callback_url: body.callback_url,
            metadata: body.metadata,
        })
        .await?;

    let _loop_task = state.service.start_reconciliation(&session.reference, &order_id);

    Ok((
        StatusCode::CREATED,
        Json(InitiateCheckoutResponse {
            reference: session.reference.into_inner(),
            authorization_url: session.authorization_url,
            status: "pending",
        }),
    ))
}

/// GET /api/checkout/{reference}
pub async fn get_checkout(
    State(state): State<CheckoutApiState>,
    Path(reference): Path<String>,
) -> Result<Json<PaymentRecordResponse>, AppError> {
    let record = state.service.record(&reference).await?;
    Ok(Json(record.into()))
}

/// POST /api/checkout/{reference}/reconcile
///
/// Re-opens reconciliation for a record whose loop was cancelled. Returns the
/// stored record directly when it already resolved.
pub async fn resume_checkout(
    State(state): State<CheckoutApiState>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match state.service.resume(&reference).await? {
        ResumeOutcome::Resumed => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"reference": reference, "status": "reconciling"})),
        )
            .into_response()),
        ResumeOutcome::AlreadyResolved(record) => Ok((
            StatusCode::OK,
            Json(PaymentRecordResponse::from(record)),
        )
            .into_response()),
    }
}
