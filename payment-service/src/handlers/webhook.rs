//! Instamojo webhook handler.

use axum::{extract::State, http::StatusCode, Form};
use service_core::error::AppError;
use std::collections::BTreeMap;

use crate::AppState;

/// Handle a payment webhook from Instamojo.
///
/// The payload is form-encoded payment fields plus a `mac` signed with the
/// merchant salt. Verification happens before any lookup so forged payloads
/// learn nothing about stored state.
pub async fn instamojo_webhook(
    State(state): State<AppState>,
    Form(fields): Form<BTreeMap<String, String>>,
) -> Result<StatusCode, AppError> {
    tracing::info!(
        payment_id = fields.get("payment_id").map(String::as_str).unwrap_or("?"),
        "Received Instamojo webhook"
    );

    state.service.handle_webhook(fields).await?;

    Ok(StatusCode::OK)
}
