//! Merchant configuration handlers.

use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::{
    models::{ConfigurationSummary, NewMerchantConfiguration},
    AppState,
};

/// Register a merchant configuration.
///
/// Activating a configuration while another is active returns a conflict;
/// the constraint lives in storage, not in a check here.
pub async fn create_configuration(
    State(state): State<AppState>,
    Json(payload): Json<NewMerchantConfiguration>,
) -> Result<(StatusCode, Json<ConfigurationSummary>), AppError> {
    let config = state.service.create_configuration(payload).await?;

    Ok((StatusCode::CREATED, Json(config.into())))
}
