//! In-memory payment store.
//!
//! Mirrors the constraints the Postgres schema enforces (single active
//! configuration, write-once payments, conditional request updates) so the
//! reconciliation flow can be exercised without a database.

use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    MerchantConfiguration, NewMerchantConfiguration, Payment, PaymentRequest, RemoteRequestUpdate,
    RequestStatus,
};
use crate::services::store::PaymentStore;

#[derive(Default)]
struct Inner {
    configurations: HashMap<Uuid, MerchantConfiguration>,
    requests: HashMap<String, PaymentRequest>,
    payments: HashMap<String, Payment>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn create_configuration(
        &self,
        input: NewMerchantConfiguration,
    ) -> Result<MerchantConfiguration, AppError> {
        let mut inner = self.inner.write().await;

        if input.is_active && inner.configurations.values().any(|c| c.is_active) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "another configuration is already active"
            )));
        }

        let now = Utc::now();
        let config = MerchantConfiguration {
            id: Uuid::new_v4(),
            api_key: input.api_key,
            auth_token: input.auth_token,
            salt: input.salt,
            is_active: input.is_active,
            base_url: input.base_url,
            created_utc: now,
            updated_utc: now,
        };

        inner.configurations.insert(config.id, config.clone());
        Ok(config)
    }

    async fn active_configuration(&self) -> Result<Option<MerchantConfiguration>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .configurations
            .values()
            .find(|c| c.is_active)
            .cloned())
    }

    async fn configuration(&self, id: Uuid) -> Result<Option<MerchantConfiguration>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.configurations.get(&id).cloned())
    }

    async fn insert_payment_request(&self, request: &PaymentRequest) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;

        if inner.requests.contains_key(&request.id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "payment request {} already exists",
                request.id
            )));
        }

        inner.requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn payment_request(&self, id: &str) -> Result<Option<PaymentRequest>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.requests.get(id).cloned())
    }

    async fn payment_requests_for_owner(
        &self,
        owner: &str,
    ) -> Result<Vec<PaymentRequest>, AppError> {
        let inner = self.inner.read().await;
        let mut requests: Vec<PaymentRequest> = inner
            .requests
            .values()
            .filter(|r| r.created_by == owner)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(requests)
    }

    async fn apply_remote_update(
        &self,
        id: &str,
        update: &RemoteRequestUpdate,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;

        let Some(request) = inner.requests.get_mut(id) else {
            return Ok(false);
        };

        let is_newer = match request.modified_at {
            Some(stored) => stored < update.modified_at,
            None => true,
        };
        if !is_newer {
            return Ok(false);
        }

        request.status = update.status.clone();
        request.modified_at = Some(update.modified_at);
        request.sms_status = update.sms_status.clone();
        request.email_status = update.email_status.clone();
        if request.status != RequestStatus::Completed.as_str() {
            request.completed_notified = false;
        }
        request.updated_utc = Utc::now();

        Ok(true)
    }

    async fn set_request_enabled(&self, id: &str, enabled: bool) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;

        let Some(request) = inner.requests.get_mut(id) else {
            return Ok(false);
        };

        request.is_enabled = enabled;
        request.updated_utc = Utc::now();
        Ok(true)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;

        if inner.payments.contains_key(&payment.id) {
            return Ok(false);
        }

        inner.payments.insert(payment.id.clone(), payment.clone());
        Ok(true)
    }

    async fn payment(&self, id: &str) -> Result<Option<Payment>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.payments.get(id).cloned())
    }

    async fn payments(&self, request_id: Option<&str>) -> Result<Vec<Payment>, AppError> {
        let inner = self.inner.read().await;
        let mut payments: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| request_id.map_or(true, |id| p.payment_request_id == id))
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_utc.cmp(&b.created_utc));
        Ok(payments)
    }

    async fn claim_completion_notification(&self, request_id: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;

        let Some(request) = inner.requests.get_mut(request_id) else {
            return Ok(false);
        };

        if request.is_completed() && !request.completed_notified {
            request.completed_notified = true;
            request.updated_utc = Utc::now();
            return Ok(true);
        }

        Ok(false)
    }
}
