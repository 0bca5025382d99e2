//! Payment lifecycle orchestration.
//!
//! Ties the external client, the store, and the event bus together: request
//! creation, payment recording, the reconciliation pass, and the
//! exactly-once completion notification.

use chrono::Utc;
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::models::{
    CreatePaymentRequest, MerchantConfiguration, NewMerchantConfiguration, Payment, PaymentRequest,
    RemoteRequestUpdate, RequestStatus,
};
use crate::services::events::{EventBus, PaymentEvent};
use crate::services::instamojo::{
    self, ClientError, CreateRequestPayload, InstamojoClient, RemotePayment,
};
use crate::services::store::PaymentStore;

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    http: reqwest::Client,
    events: EventBus,
    request_timeout: Duration,
}

impl PaymentService {
    pub fn new(store: Arc<dyn PaymentStore>, request_timeout: Duration) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            events: EventBus::default(),
            request_timeout,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    async fn active_configuration(&self) -> Result<MerchantConfiguration, AppError> {
        self.store
            .active_configuration()
            .await?
            .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("no active merchant configuration")))
    }

    fn client_for(&self, config: &MerchantConfiguration) -> InstamojoClient {
        InstamojoClient::new(self.http.clone(), config, self.request_timeout)
    }

    pub async fn create_configuration(
        &self,
        input: NewMerchantConfiguration,
    ) -> Result<MerchantConfiguration, AppError> {
        input.validate()?;
        self.store.create_configuration(input).await
    }

    /// Create a payment request with the processor and persist the result.
    ///
    /// Nothing is persisted when the processor rejects the request or cannot
    /// be reached.
    #[instrument(skip(self, input), fields(owner = %owner))]
    pub async fn create_payment_request(
        &self,
        input: CreatePaymentRequest,
        owner: &str,
    ) -> Result<PaymentRequest, AppError> {
        input.validate()?;

        let config = self.active_configuration().await?;
        let client = self.client_for(&config);

        let payload = CreateRequestPayload {
            amount: input.amount.to_string(),
            purpose: input.purpose.clone(),
            buyer_name: input.buyer_name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            send_email: input.send_email,
            send_sms: input.send_sms,
            redirect_url: input.redirect_url.clone(),
            webhook: input.webhook_url.clone(),
            allow_repeated_payments: input.allow_repeated_payments,
            expires_at: input.expires_at.clone(),
        };

        let created = client
            .create_request(&payload)
            .await
            .map_err(map_upstream_error)?;
        let remote = created.data;

        // The processor's response wins for every field it echoes back; the
        // caller's input fills the gaps.
        let now = Utc::now();
        let request = PaymentRequest {
            id: remote.id,
            amount: remote.amount.unwrap_or(input.amount),
            purpose: remote.purpose.unwrap_or(input.purpose),
            buyer_name: remote.buyer_name.or(input.buyer_name),
            email: remote.email.or(input.email),
            phone: remote.phone.or(input.phone),
            send_email: input.send_email,
            send_sms: input.send_sms,
            email_status: remote.email_status,
            sms_status: remote.sms_status,
            redirect_url: input.redirect_url,
            webhook_url: input.webhook_url,
            allow_repeated_payments: input.allow_repeated_payments,
            longurl: remote.longurl,
            shorturl: remote.shorturl,
            expires_at: remote.expires_at.or(input.expires_at),
            status: remote
                .status
                .unwrap_or_else(|| RequestStatus::Pending.as_str().to_string()),
            is_enabled: true,
            customer_id: remote.customer_id,
            created_by: owner.to_string(),
            configuration_id: config.id,
            raw_response: created.raw,
            created_at: remote.created_at,
            modified_at: remote.modified_at,
            completed_notified: false,
            created_utc: now,
            updated_utc: now,
        };

        self.store.insert_payment_request(&request).await?;

        info!(request_id = %request.id, amount = %request.amount, "Payment request created");

        Ok(request)
    }

    /// Record a payment reported against a request, then reconcile.
    #[instrument(skip(self))]
    pub async fn record_payment(
        &self,
        request_id: &str,
        payment_id: &str,
    ) -> Result<Payment, AppError> {
        let request = self.load_request(request_id).await?;
        ensure_enabled(&request)?;
        let config = self.configuration_for(&request).await?;
        let client = self.client_for(&config);

        let payment = self
            .fetch_and_store_payment(&client, &request, payment_id, false, None)
            .await?;

        self.reconcile(request_id).await;

        Ok(payment)
    }

    /// Record a payment announced by an Instamojo webhook.
    ///
    /// The posted MAC is verified against the active configuration's salt
    /// before anything is looked up or stored.
    #[instrument(skip(self, fields))]
    pub async fn handle_webhook(
        &self,
        fields: BTreeMap<String, String>,
    ) -> Result<Payment, AppError> {
        let config = self.active_configuration().await?;

        let mac = fields
            .get("mac")
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("webhook missing mac")))?
            .clone();
        if !instamojo::verify_webhook_mac(&config.salt, &fields, &mac) {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "webhook mac verification failed"
            )));
        }

        let payment_id = fields
            .get("payment_id")
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("webhook missing payment_id")))?;
        let request_id = fields.get("payment_request_id").ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("webhook missing payment_request_id"))
        })?;

        let request = self.load_request(request_id).await?;
        ensure_enabled(&request)?;

        // The MAC was checked against the active salt above; the processor
        // call uses the credentials the request was created under, which may
        // differ after a configuration rotation.
        let request_config = self.configuration_for(&request).await?;
        let client = self.client_for(&request_config);

        let payment = self
            .fetch_and_store_payment(&client, &request, payment_id, true, Some(&mac))
            .await?;

        self.reconcile(request_id).await;

        Ok(payment)
    }

    /// Enable or disable one of the owner's payment requests. Disabled
    /// requests reject new payments on both the record and webhook paths.
    #[instrument(skip(self))]
    pub async fn set_request_enabled(
        &self,
        request_id: &str,
        owner: &str,
        enabled: bool,
    ) -> Result<PaymentRequest, AppError> {
        let request = self.load_request(request_id).await?;
        if request.created_by != owner {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "payment request {} not found",
                request_id
            )));
        }

        self.store.set_request_enabled(request_id, enabled).await?;
        self.load_request(request_id).await
    }

    /// Run a reconciliation pass for a request.
    ///
    /// Failures here are logged and swallowed: the triggering write has
    /// already committed and a later pass will catch up.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, request_id: &str) {
        if let Err(error) = self.reconcile_inner(request_id).await {
            warn!(request_id = %request_id, error = %error, "Reconciliation pass aborted");
        }
    }

    async fn reconcile_inner(&self, request_id: &str) -> Result<(), AppError> {
        let request = self.load_request(request_id).await?;
        let config = self.configuration_for(&request).await?;
        let client = self.client_for(&config);

        let status = client
            .request_status(request_id)
            .await
            .map_err(map_upstream_error)?;
        let remote = status.data;

        if let Some(modified_at) = remote.modified_at {
            let update = RemoteRequestUpdate {
                status: remote.status.unwrap_or_else(|| request.status.clone()),
                modified_at,
                sms_status: remote.sms_status,
                email_status: remote.email_status,
            };
            let applied = self.store.apply_remote_update(request_id, &update).await?;
            if applied {
                info!(request_id = %request_id, status = %update.status, "Applied external request update");
            }
        }

        // Backfill payments the processor knows about but we do not. Each
        // item is isolated: one bad payment must not starve the rest.
        let mut backfilled = 0usize;
        let mut failed = 0usize;
        for summary in &remote.payments {
            match self.store.payment(&summary.payment_id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(error) => {
                    warn!(payment_id = %summary.payment_id, error = %error, "Backfill lookup failed");
                    failed += 1;
                    continue;
                }
            }

            match self
                .fetch_and_store_payment(&client, &request, &summary.payment_id, false, None)
                .await
            {
                Ok(_) => backfilled += 1,
                Err(error) => {
                    warn!(payment_id = %summary.payment_id, error = %error, "Backfill of payment failed");
                    failed += 1;
                }
            }
        }
        if backfilled > 0 || failed > 0 {
            info!(
                request_id = %request_id,
                backfilled = backfilled,
                failed = failed,
                "Payment backfill finished"
            );
        }

        self.notify_if_completed(request_id).await
    }

    async fn notify_if_completed(&self, request_id: &str) -> Result<(), AppError> {
        if self.store.claim_completion_notification(request_id).await? {
            info!(request_id = %request_id, "Payment request completed");
            self.events.publish(PaymentEvent::RequestCompleted {
                request_id: request_id.to_string(),
            });
        }
        Ok(())
    }

    /// Fetch one payment from the processor and store it write-once.
    async fn fetch_and_store_payment(
        &self,
        client: &InstamojoClient,
        request: &PaymentRequest,
        payment_id: &str,
        webhook_verified: bool,
        mac: Option<&str>,
    ) -> Result<Payment, AppError> {
        let fetched = client
            .payment_status(&request.id, payment_id)
            .await
            .map_err(|e| match e {
                ClientError::Api(message) => AppError::BadRequest(anyhow::anyhow!(
                    "could not validate payment: {}",
                    message
                )),
                other => map_upstream_error(other),
            })?;

        let payment = map_remote_payment(fetched.data, fetched.raw, request, webhook_verified, mac)?;

        let inserted = self.store.insert_payment(&payment).await?;
        if !inserted {
            tracing::debug!(payment_id = %payment.id, "Payment already recorded");
        }

        Ok(payment)
    }

    pub async fn payment_request(&self, id: &str) -> Result<PaymentRequest, AppError> {
        self.load_request(id).await
    }

    pub async fn payment_requests_for_owner(
        &self,
        owner: &str,
    ) -> Result<Vec<PaymentRequest>, AppError> {
        self.store.payment_requests_for_owner(owner).await
    }

    pub async fn payment(&self, id: &str) -> Result<Payment, AppError> {
        self.store
            .payment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment {} not found", id)))
    }

    pub async fn payments(&self, request_id: Option<&str>) -> Result<Vec<Payment>, AppError> {
        self.store.payments(request_id).await
    }

    async fn load_request(&self, id: &str) -> Result<PaymentRequest, AppError> {
        self.store
            .payment_request(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment request {} not found", id)))
    }

    async fn configuration_for(
        &self,
        request: &PaymentRequest,
    ) -> Result<MerchantConfiguration, AppError> {
        self.store
            .configuration(request.configuration_id)
            .await?
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "configuration {} for request {} is gone",
                    request.configuration_id,
                    request.id
                ))
            })
    }
}

fn ensure_enabled(request: &PaymentRequest) -> Result<(), AppError> {
    if !request.is_enabled {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "payment request {} is disabled",
            request.id
        )));
    }
    Ok(())
}

fn map_upstream_error(error: ClientError) -> AppError {
    match error {
        ClientError::Transport(e) => {
            AppError::BadGateway(format!("payment processor unreachable: {}", e))
        }
        ClientError::Api(message) => AppError::BadGateway(message),
        ClientError::Malformed(e) => {
            AppError::BadGateway(format!("malformed processor response: {}", e))
        }
    }
}

fn map_remote_payment(
    remote: RemotePayment,
    raw: String,
    request: &PaymentRequest,
    webhook_verified: bool,
    mac: Option<&str>,
) -> Result<Payment, AppError> {
    let status = remote.status.ok_or_else(|| {
        AppError::BadGateway("payment response missing status".to_string())
    })?;
    let amount = remote.amount.ok_or_else(|| {
        AppError::BadGateway("payment response missing amount".to_string())
    })?;

    let (failure_reason, failure_message) = match remote.failure {
        Some(failure) => (failure.reason, failure.message),
        None => (None, None),
    };

    Ok(Payment {
        id: remote.payment_id,
        payment_request_id: request.id.clone(),
        status,
        amount,
        fees: remote.fees,
        affiliate_commission: remote.affiliate_commission,
        currency: remote.currency,
        buyer_name: remote.buyer_name,
        buyer_email: remote.buyer_email,
        buyer_phone: remote.buyer_phone,
        shipping_address: remote.shipping_address,
        shipping_city: remote.shipping_city,
        shipping_state: remote.shipping_state,
        shipping_country: remote.shipping_country,
        shipping_zip: remote.shipping_zip,
        quantity: remote.quantity,
        unit_price: remote.unit_price,
        instrument_type: remote.instrument_type,
        billing_instrument: remote.billing_instrument,
        tax_invoice_id: remote.tax_invoice_id,
        failure_reason,
        failure_message,
        payout: remote.payout,
        mac: mac.map(str::to_string).or(remote.mac),
        webhook_verified,
        raw_response: raw,
        created_utc: Utc::now(),
    })
}
