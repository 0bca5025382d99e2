//! Storage abstraction for payment state.
//!
//! The Postgres implementation lives in `repository.rs`; an in-memory
//! implementation in `memory.rs` backs tests that exercise the
//! reconciliation state machine without a database.

use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    MerchantConfiguration, NewMerchantConfiguration, Payment, PaymentRequest, RemoteRequestUpdate,
};

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Register a merchant configuration. Activating a second configuration
    /// while one is active fails with a conflict.
    async fn create_configuration(
        &self,
        input: NewMerchantConfiguration,
    ) -> Result<MerchantConfiguration, AppError>;

    async fn active_configuration(&self) -> Result<Option<MerchantConfiguration>, AppError>;

    async fn configuration(&self, id: Uuid) -> Result<Option<MerchantConfiguration>, AppError>;

    async fn insert_payment_request(&self, request: &PaymentRequest) -> Result<(), AppError>;

    async fn payment_request(&self, id: &str) -> Result<Option<PaymentRequest>, AppError>;

    async fn payment_requests_for_owner(
        &self,
        owner: &str,
    ) -> Result<Vec<PaymentRequest>, AppError>;

    /// Apply externally observed request fields, last writer wins.
    ///
    /// The update applies only when `update.modified_at` is strictly newer
    /// than the stored external timestamp (a NULL stored timestamp always
    /// loses). When it applies, the external snapshot overwrites the stored
    /// status and delivery statuses wholesale, nulls included. Moving off
    /// the Completed status re-arms the completion notification. Returns
    /// whether a row was updated.
    async fn apply_remote_update(
        &self,
        id: &str,
        update: &RemoteRequestUpdate,
    ) -> Result<bool, AppError>;

    /// Enable or disable a payment request. Disabled requests accept no
    /// further payments. Returns whether the request exists.
    async fn set_request_enabled(&self, id: &str, enabled: bool) -> Result<bool, AppError>;

    /// Insert a payment, ignoring duplicates of the processor-assigned id.
    /// Returns false when the payment was already recorded.
    async fn insert_payment(&self, payment: &Payment) -> Result<bool, AppError>;

    async fn payment(&self, id: &str) -> Result<Option<Payment>, AppError>;

    async fn payments(&self, request_id: Option<&str>) -> Result<Vec<Payment>, AppError>;

    /// Claim the completion notification for a request.
    ///
    /// Succeeds at most once per transition into the Completed status; the
    /// caller emits the event only when this returns true.
    async fn claim_completion_notification(&self, request_id: &str) -> Result<bool, AppError>;
}
