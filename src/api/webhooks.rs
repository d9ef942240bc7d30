use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::services::webhook_ingest::{WebhookError, WebhookIngestor};

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Clone)]
pub struct WebhookState {
    pub ingestor: Arc<WebhookIngestor>,
}

/// POST /webhooks/gateway
///
/// The raw body is verified against the signature header before anything is
/// parsed. Replays and races land on `AlreadyResolved` and are acknowledged
/// with 200 so the gateway stops redelivering; only transient database
/// trouble asks for a retry via 500.
pub async fn handle_gateway_webhook(
    State(state): State<WebhookState>,
    headers: axum::http::HeaderMap,
    body: String,
) -> impl IntoResponse {
    info!("received gateway webhook");

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match state
        .ingestor
        .process(signature.as_deref(), body.as_bytes())
        .await
    {
        Ok(outcome) => {
            info!(outcome = ?outcome, "webhook processed");
            (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
        }
        Err(WebhookError::MissingSignature) => {
            warn!("webhook missing signature header");
            (StatusCode::UNAUTHORIZED, "Missing signature").into_response()
        }
        Err(WebhookError::InvalidSignature) => {
            warn!("webhook signature rejected");
            (StatusCode::UNAUTHORIZED, "Invalid signature").into_response()
        }
        Err(WebhookError::MalformedPayload(reason)) => {
            error!(reason = %reason, "webhook payload rejected");
            (StatusCode::BAD_REQUEST, "Invalid payload").into_response()
        }
        Err(WebhookError::UnknownReference(reference)) => {
            // Redelivery cannot help: no record was ever created for it.
            warn!(reference = %reference, "webhook for unknown reference acknowledged");
            (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
        }
        Err(WebhookError::Database(message)) => {
            error!(error = %message, "webhook processing hit the database, requesting redelivery");
            (StatusCode::INTERNAL_SERVER_ERROR, "Temporary failure").into_response()
        }
    }
}
