//! Payment request handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

use crate::{
    middleware::OwnerContext,
    models::{CreatePaymentRequest, PaymentRequest},
    AppState,
};

/// Create a payment request with the processor on behalf of the caller.
pub async fn create_payment_request(
    State(state): State<AppState>,
    owner: OwnerContext,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentRequest>), AppError> {
    tracing::info!(
        user_id = %owner.user_id,
        amount = %payload.amount,
        purpose = %payload.purpose,
        "Creating payment request"
    );

    let request = state
        .service
        .create_payment_request(payload, &owner.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

/// List the caller's payment requests.
pub async fn list_payment_requests(
    State(state): State<AppState>,
    owner: OwnerContext,
) -> Result<Json<Vec<PaymentRequest>>, AppError> {
    let requests = state
        .service
        .payment_requests_for_owner(&owner.user_id)
        .await?;

    Ok(Json(requests))
}

/// Request to enable or disable a payment request.
#[derive(Debug, Deserialize)]
pub struct UpdatePaymentRequest {
    pub is_enabled: bool,
}

/// Enable or disable one of the caller's payment requests.
pub async fn update_payment_request(
    State(state): State<AppState>,
    owner: OwnerContext,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePaymentRequest>,
) -> Result<Json<PaymentRequest>, AppError> {
    tracing::info!(
        user_id = %owner.user_id,
        request_id = %id,
        is_enabled = payload.is_enabled,
        "Updating payment request"
    );

    let request = state
        .service
        .set_request_enabled(&id, &owner.user_id, payload.is_enabled)
        .await?;

    Ok(Json(request))
}

/// Fetch one of the caller's payment requests.
pub async fn get_payment_request(
    State(state): State<AppState>,
    owner: OwnerContext,
    Path(id): Path<String>,
) -> Result<Json<PaymentRequest>, AppError> {
    let request = state.service.payment_request(&id).await?;

    // Requests are owner-scoped; other owners' requests look absent.
    if request.created_by != owner.user_id {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "payment request {} not found",
            id
        )));
    }

    Ok(Json(request))
}
