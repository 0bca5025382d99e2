//! Payment handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

use crate::{models::Payment, AppState};

/// Request to record a payment reported against a payment request.
#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub payment_request_id: String,
    pub payment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentsQuery {
    pub payment_request_id: Option<String>,
}

/// Record a payment by validating it with the processor, then run a
/// reconciliation pass on the parent request.
pub async fn record_payment(
    State(state): State<AppState>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    tracing::info!(
        request_id = %payload.payment_request_id,
        payment_id = %payload.payment_id,
        "Recording payment"
    );

    let payment = state
        .service
        .record_payment(&payload.payment_request_id, &payload.payment_id)
        .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

/// List payments, optionally filtered by parent request.
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentsQuery>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let payments = state
        .service
        .payments(query.payment_request_id.as_deref())
        .await?;

    Ok(Json(payments))
}

/// Fetch a single payment.
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Payment>, AppError> {
    let payment = state.service.payment(&id).await?;
    Ok(Json(payment))
}
