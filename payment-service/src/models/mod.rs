//! Domain models for payment-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

// ============================================================================
// Merchant Configuration Models
// ============================================================================

/// Credentials and endpoint for one Instamojo merchant account.
///
/// At most one configuration may be active at a time; the storage layer
/// enforces this with a partial unique index on `is_active`.
#[derive(Debug, Clone, FromRow)]
pub struct MerchantConfiguration {
    pub id: Uuid,
    pub api_key: String,
    pub auth_token: String,
    pub salt: String,
    pub is_active: bool,
    pub base_url: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for registering a merchant configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMerchantConfiguration {
    #[validate(length(min = 1))]
    pub api_key: String,
    #[validate(length(min = 1))]
    pub auth_token: String,
    #[validate(length(min = 1))]
    pub salt: String,
    #[serde(default)]
    pub is_active: bool,
    #[validate(url)]
    pub base_url: String,
}

/// Credential-free view of a configuration for API responses.
#[derive(Debug, Serialize)]
pub struct ConfigurationSummary {
    pub id: Uuid,
    pub is_active: bool,
    pub base_url: String,
    pub created_utc: DateTime<Utc>,
}

impl From<MerchantConfiguration> for ConfigurationSummary {
    fn from(config: MerchantConfiguration) -> Self {
        Self {
            id: config.id,
            is_active: config.is_active,
            base_url: config.base_url,
            created_utc: config.created_utc,
        }
    }
}

// ============================================================================
// Payment Request Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Sent,
    Failed,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Sent => "Sent",
            Self::Failed => "Failed",
            Self::Completed => "Completed",
        }
    }
}

/// One purchase intent registered with Instamojo.
///
/// Identity is the processor-assigned request id. `status` is authoritative
/// from the external system and only changes when a reconciliation pass
/// observes a newer external `modified_at`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentRequest {
    pub id: String,
    pub amount: Decimal,
    pub purpose: String,
    pub buyer_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub send_email: bool,
    pub send_sms: bool,
    pub email_status: Option<String>,
    pub sms_status: Option<String>,
    pub redirect_url: String,
    pub webhook_url: Option<String>,
    pub allow_repeated_payments: bool,
    pub longurl: Option<String>,
    pub shorturl: Option<String>,
    pub expires_at: Option<String>,
    pub status: String,
    pub is_enabled: bool,
    pub customer_id: Option<String>,
    pub created_by: String,
    #[serde(skip_serializing)]
    pub configuration_id: Uuid,
    /// Verbatim external JSON response, kept as an audit trail.
    pub raw_response: String,
    /// Creation timestamp assigned by Instamojo.
    pub created_at: Option<DateTime<Utc>>,
    /// Modification timestamp assigned by Instamojo; drives last-writer-wins merges.
    pub modified_at: Option<DateTime<Utc>>,
    /// Whether a completion event has been emitted for the current
    /// transition into the Completed status.
    #[serde(skip_serializing)]
    pub completed_notified: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl PaymentRequest {
    pub fn is_completed(&self) -> bool {
        self.status == RequestStatus::Completed.as_str()
    }
}

/// Input for creating a payment request.
///
/// Delivery channels must be reachable: requesting an SMS needs a phone
/// number and requesting an email needs an address. Both checks run before
/// any external call.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = validate_delivery_channels))]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 255))]
    pub purpose: String,
    pub buyer_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub send_email: bool,
    #[serde(default)]
    pub send_sms: bool,
    #[validate(url)]
    pub redirect_url: String,
    #[validate(url)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_true")]
    pub allow_repeated_payments: bool,
    pub expires_at: Option<String>,
}

fn default_true() -> bool {
    true
}

fn validate_delivery_channels(input: &CreatePaymentRequest) -> Result<(), ValidationError> {
    if input.send_sms && input.phone.as_deref().map_or(true, str::is_empty) {
        return Err(ValidationError::new("phone_required_for_sms"));
    }
    if input.send_email && input.email.as_deref().map_or(true, str::is_empty) {
        return Err(ValidationError::new("email_required_for_email"));
    }
    Ok(())
}

/// Fields merged into a stored request when the external system reports a
/// strictly newer `modified_at`.
#[derive(Debug, Clone)]
pub struct RemoteRequestUpdate {
    pub status: String,
    pub modified_at: DateTime<Utc>,
    pub sms_status: Option<String>,
    pub email_status: Option<String>,
}

// ============================================================================
// Payment Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Credit,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "Credit",
            Self::Failed => "Failed",
        }
    }
}

/// One settlement attempt against a payment request.
///
/// Write-once: no update path is exposed after creation. The primary key is
/// the processor-assigned payment id, which makes concurrent backfills of
/// the same payment collapse into a single row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: String,
    pub payment_request_id: String,
    pub status: String,
    pub amount: Decimal,
    pub fees: Option<Decimal>,
    pub affiliate_commission: Option<Decimal>,
    pub currency: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_email: Option<String>,
    pub buyer_phone: Option<String>,
    pub shipping_address: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_country: Option<String>,
    pub shipping_zip: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub instrument_type: Option<String>,
    pub billing_instrument: Option<String>,
    pub tax_invoice_id: Option<String>,
    pub failure_reason: Option<String>,
    pub failure_message: Option<String>,
    pub payout: Option<String>,
    pub mac: Option<String>,
    pub webhook_verified: bool,
    /// Verbatim external JSON response, kept as an audit trail.
    pub raw_response: String,
    pub created_utc: DateTime<Utc>,
}
