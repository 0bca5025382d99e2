//! Instamojo payment provider client.
//!
//! Implements the payment-request API (create, request status, payment
//! status) and webhook MAC verification for payment confirmation.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::models::MerchantConfiguration;

/// Error talking to the Instamojo API.
///
/// Transport failures are distinct from application-level rejections: the
/// former means the request never completed, the latter means Instamojo
/// answered with `success: false`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Api(String),

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Instamojo client scoped to one merchant configuration.
#[derive(Clone)]
pub struct InstamojoClient {
    client: Client,
    api_key: String,
    auth_token: String,
    base_url: String,
    timeout: Duration,
}

/// Request body for creating a payment request.
///
/// Instamojo expects monetary amounts as decimal strings.
#[derive(Debug, Serialize)]
pub struct CreateRequestPayload {
    pub amount: String,
    pub purpose: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub send_email: bool,
    pub send_sms: bool,
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    pub allow_repeated_payments: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Payment request fields returned by the create endpoint.
///
/// Unknown upstream fields are discarded; everything kept here is typed
/// explicitly rather than stringified.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCreatedRequest {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub longurl: Option<String>,
    #[serde(default)]
    pub shorturl: Option<String>,
    #[serde(default)]
    pub sms_status: Option<String>,
    #[serde(default)]
    pub email_status: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Payment request fields returned by the request-status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRequestStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sms_status: Option<String>,
    #[serde(default)]
    pub email_status: Option<String>,
    #[serde(default)]
    pub payments: Vec<RemotePaymentSummary>,
}

/// A payment listed under a request in the status response.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePaymentSummary {
    pub payment_id: String,
}

/// Full payment details from the payment-status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePayment {
    pub payment_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub fees: Option<Decimal>,
    #[serde(default)]
    pub affiliate_commission: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub buyer_email: Option<String>,
    #[serde(default)]
    pub buyer_phone: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub shipping_city: Option<String>,
    #[serde(default)]
    pub shipping_state: Option<String>,
    #[serde(default)]
    pub shipping_country: Option<String>,
    #[serde(default)]
    pub shipping_zip: Option<String>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub instrument_type: Option<String>,
    #[serde(default)]
    pub billing_instrument: Option<String>,
    #[serde(default)]
    pub tax_invoice_id: Option<String>,
    #[serde(default)]
    pub payout: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub failure: Option<RemotePaymentFailure>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePaymentFailure {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: Option<serde_json::Value>,
    // No serde default here: a missing Option field already deserializes to
    // None, and a default attribute would demand T: Default.
    payment_request: Option<T>,
}

impl<T> Envelope<T> {
    fn message_text(&self) -> String {
        match &self.message {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaymentWrapper {
    payment: RemotePayment,
}

/// A parsed API response together with the verbatim body for audit storage.
#[derive(Debug)]
pub struct ApiResult<T> {
    pub data: T,
    pub raw: String,
}

impl InstamojoClient {
    pub fn new(client: Client, config: &MerchantConfiguration, timeout: Duration) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            auth_token: config.auth_token.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Create a new payment request with Instamojo.
    pub async fn create_request(
        &self,
        payload: &CreateRequestPayload,
    ) -> Result<ApiResult<RemoteCreatedRequest>, ClientError> {
        let url = format!("{}/payment-requests/", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .header("X-Auth-Token", &self.auth_token)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = %status, body = %body, "Instamojo create_request response");

        let envelope: Envelope<RemoteCreatedRequest> = serde_json::from_str(&body)?;
        if !envelope.success {
            let message = envelope.message_text();
            tracing::error!(message = %message, "Instamojo payment request creation failed");
            return Err(ClientError::Api(message));
        }

        let data = envelope
            .payment_request
            .ok_or_else(|| ClientError::Api("response missing payment_request".to_string()))?;

        tracing::info!(
            request_id = %data.id,
            status = ?data.status,
            "Instamojo payment request created"
        );

        Ok(ApiResult { data, raw: body })
    }

    /// Fetch the current status of a payment request, including the payments
    /// the external system lists under it.
    pub async fn request_status(
        &self,
        request_id: &str,
    ) -> Result<ApiResult<RemoteRequestStatus>, ClientError> {
        let url = format!("{}/payment-requests/{}/", self.base_url, request_id);

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .header("X-Auth-Token", &self.auth_token)
            .timeout(self.timeout)
            .send()
            .await?;

        let body = response.text().await?;
        let envelope: Envelope<RemoteRequestStatus> = serde_json::from_str(&body)?;
        if !envelope.success {
            return Err(ClientError::Api(envelope.message_text()));
        }

        let data = envelope
            .payment_request
            .ok_or_else(|| ClientError::Api("response missing payment_request".to_string()))?;

        Ok(ApiResult { data, raw: body })
    }

    /// Fetch details of a single payment scoped to its parent request.
    pub async fn payment_status(
        &self,
        request_id: &str,
        payment_id: &str,
    ) -> Result<ApiResult<RemotePayment>, ClientError> {
        let url = format!(
            "{}/payment-requests/{}/{}/",
            self.base_url, request_id, payment_id
        );

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .header("X-Auth-Token", &self.auth_token)
            .timeout(self.timeout)
            .send()
            .await?;

        let body = response.text().await?;
        let envelope: Envelope<PaymentWrapper> = serde_json::from_str(&body)?;
        if !envelope.success {
            return Err(ClientError::Api(envelope.message_text()));
        }

        let data = envelope
            .payment_request
            .ok_or_else(|| ClientError::Api("response missing payment_request".to_string()))?
            .payment;

        Ok(ApiResult { data, raw: body })
    }
}

/// Compute the webhook MAC for a set of posted fields.
///
/// Instamojo signs webhooks with HMAC-SHA1 over the field values sorted by
/// field name and joined with `|`, keyed by the merchant salt. The `mac`
/// field itself is excluded from the digest.
pub fn compute_webhook_mac(salt: &str, fields: &BTreeMap<String, String>) -> String {
    type HmacSha1 = Hmac<Sha1>;

    let payload = fields
        .iter()
        .filter(|(k, _)| k.as_str() != "mac")
        .map(|(_, v)| v.as_str())
        .collect::<Vec<_>>()
        .join("|");

    // HMAC accepts keys of any length.
    let mut mac = HmacSha1::new_from_slice(salt.as_bytes()).expect("HMAC key of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify the MAC posted with a webhook against the merchant salt.
pub fn verify_webhook_mac(salt: &str, fields: &BTreeMap<String, String>, mac: &str) -> bool {
    let expected = compute_webhook_mac(salt, fields);
    let is_valid = expected == mac;

    if !is_valid {
        tracing::warn!("Webhook MAC verification failed");
    }

    is_valid
}
