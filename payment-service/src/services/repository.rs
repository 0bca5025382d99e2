//! Postgres-backed payment store.

use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    MerchantConfiguration, NewMerchantConfiguration, Payment, PaymentRequest, RemoteRequestUpdate,
    RequestStatus,
};
use crate::services::store::PaymentStore;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "payment-service"))]
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        info!(max_connections = max_connections, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

const PAYMENT_REQUEST_COLUMNS: &str = "id, amount, purpose, buyer_name, email, phone, send_email, send_sms, email_status, sms_status, redirect_url, webhook_url, allow_repeated_payments, longurl, shorturl, expires_at, status, is_enabled, customer_id, created_by, configuration_id, raw_response, created_at, modified_at, completed_notified, created_utc, updated_utc";

const PAYMENT_COLUMNS: &str = "id, payment_request_id, status, amount, fees, affiliate_commission, currency, buyer_name, buyer_email, buyer_phone, shipping_address, shipping_city, shipping_state, shipping_country, shipping_zip, quantity, unit_price, instrument_type, billing_instrument, tax_invoice_id, failure_reason, failure_message, payout, mac, webhook_verified, raw_response, created_utc";

#[async_trait]
impl PaymentStore for PaymentRepository {
    #[instrument(skip(self, input))]
    async fn create_configuration(
        &self,
        input: NewMerchantConfiguration,
    ) -> Result<MerchantConfiguration, AppError> {
        let now = Utc::now();

        // The partial unique index on is_active rejects a second active
        // configuration here.
        let config = sqlx::query_as::<_, MerchantConfiguration>(
            r#"
            INSERT INTO merchant_configurations (id, api_key, auth_token, salt, is_active, base_url, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, api_key, auth_token, salt, is_active, base_url, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.api_key)
        .bind(&input.auth_token)
        .bind(&input.salt)
        .bind(input.is_active)
        .bind(&input.base_url)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        info!(configuration_id = %config.id, is_active = config.is_active, "Merchant configuration created");

        Ok(config)
    }

    #[instrument(skip(self))]
    async fn active_configuration(&self) -> Result<Option<MerchantConfiguration>, AppError> {
        let config = sqlx::query_as::<_, MerchantConfiguration>(
            r#"
            SELECT id, api_key, auth_token, salt, is_active, base_url, created_utc, updated_utc
            FROM merchant_configurations
            WHERE is_active
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get active configuration: {}", e))
        })?;

        Ok(config)
    }

    #[instrument(skip(self))]
    async fn configuration(&self, id: Uuid) -> Result<Option<MerchantConfiguration>, AppError> {
        let config = sqlx::query_as::<_, MerchantConfiguration>(
            r#"
            SELECT id, api_key, auth_token, salt, is_active, base_url, created_utc, updated_utc
            FROM merchant_configurations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get configuration: {}", e))
        })?;

        Ok(config)
    }

    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn insert_payment_request(&self, request: &PaymentRequest) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO payment_requests (id, amount, purpose, buyer_name, email, phone, send_email, send_sms, email_status, sms_status, redirect_url, webhook_url, allow_repeated_payments, longurl, shorturl, expires_at, status, is_enabled, customer_id, created_by, configuration_id, raw_response, created_at, modified_at, completed_notified, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
            "#,
        )
        .bind(&request.id)
        .bind(request.amount)
        .bind(&request.purpose)
        .bind(&request.buyer_name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(request.send_email)
        .bind(request.send_sms)
        .bind(&request.email_status)
        .bind(&request.sms_status)
        .bind(&request.redirect_url)
        .bind(&request.webhook_url)
        .bind(request.allow_repeated_payments)
        .bind(&request.longurl)
        .bind(&request.shorturl)
        .bind(&request.expires_at)
        .bind(&request.status)
        .bind(request.is_enabled)
        .bind(&request.customer_id)
        .bind(&request.created_by)
        .bind(request.configuration_id)
        .bind(&request.raw_response)
        .bind(request.created_at)
        .bind(request.modified_at)
        .bind(request.completed_notified)
        .bind(request.created_utc)
        .bind(request.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        info!(request_id = %request.id, status = %request.status, "Payment request persisted");

        Ok(())
    }

    #[instrument(skip(self))]
    async fn payment_request(&self, id: &str) -> Result<Option<PaymentRequest>, AppError> {
        let request = sqlx::query_as::<_, PaymentRequest>(&format!(
            "SELECT {} FROM payment_requests WHERE id = $1",
            PAYMENT_REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get payment request: {}", e))
        })?;

        Ok(request)
    }

    #[instrument(skip(self))]
    async fn payment_requests_for_owner(
        &self,
        owner: &str,
    ) -> Result<Vec<PaymentRequest>, AppError> {
        let requests = sqlx::query_as::<_, PaymentRequest>(&format!(
            "SELECT {} FROM payment_requests WHERE created_by = $1 ORDER BY created_utc DESC",
            PAYMENT_REQUEST_COLUMNS
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list payment requests: {}", e))
        })?;

        Ok(requests)
    }

    #[instrument(skip(self, update), fields(request_id = %id, status = %update.status))]
    async fn apply_remote_update(
        &self,
        id: &str,
        update: &RemoteRequestUpdate,
    ) -> Result<bool, AppError> {
        // Single conditional UPDATE, no read-modify-write. A NULL stored
        // modified_at means the row has never been reconciled and always
        // accepts the external value. The external snapshot wins wholesale,
        // including null delivery statuses.
        let result = sqlx::query(
            r#"
            UPDATE payment_requests
            SET status = $2,
                modified_at = $3,
                sms_status = $4,
                email_status = $5,
                completed_notified = CASE WHEN $2 = $6 THEN completed_notified ELSE FALSE END,
                updated_utc = $7
            WHERE id = $1
              AND (modified_at IS NULL OR modified_at < $3)
            "#,
        )
        .bind(id)
        .bind(&update.status)
        .bind(update.modified_at)
        .bind(&update.sms_status)
        .bind(&update.email_status)
        .bind(RequestStatus::Completed.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to apply remote update: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn set_request_enabled(&self, id: &str, enabled: bool) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_requests
            SET is_enabled = $2, updated_utc = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(enabled)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update payment request: {}", e))
        })?;

        if result.rows_affected() > 0 {
            info!(request_id = %id, is_enabled = enabled, "Payment request enabled flag updated");
        }

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.id))]
    async fn insert_payment(&self, payment: &Payment) -> Result<bool, AppError> {
        // ON CONFLICT DO NOTHING collapses concurrent backfills of the same
        // processor payment id into one row.
        let result = sqlx::query(
            r#"
            INSERT INTO payments (id, payment_request_id, status, amount, fees, affiliate_commission, currency, buyer_name, buyer_email, buyer_phone, shipping_address, shipping_city, shipping_state, shipping_country, shipping_zip, quantity, unit_price, instrument_type, billing_instrument, tax_invoice_id, failure_reason, failure_message, payout, mac, webhook_verified, raw_response, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.payment_request_id)
        .bind(&payment.status)
        .bind(payment.amount)
        .bind(payment.fees)
        .bind(payment.affiliate_commission)
        .bind(&payment.currency)
        .bind(&payment.buyer_name)
        .bind(&payment.buyer_email)
        .bind(&payment.buyer_phone)
        .bind(&payment.shipping_address)
        .bind(&payment.shipping_city)
        .bind(&payment.shipping_state)
        .bind(&payment.shipping_country)
        .bind(&payment.shipping_zip)
        .bind(payment.quantity)
        .bind(payment.unit_price)
        .bind(&payment.instrument_type)
        .bind(&payment.billing_instrument)
        .bind(&payment.tax_invoice_id)
        .bind(&payment.failure_reason)
        .bind(&payment.failure_message)
        .bind(&payment.payout)
        .bind(&payment.mac)
        .bind(payment.webhook_verified)
        .bind(&payment.raw_response)
        .bind(payment.created_utc)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            info!(payment_id = %payment.id, status = %payment.status, "Payment persisted");
        }

        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn payment(&self, id: &str) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn payments(&self, request_id: Option<&str>) -> Result<Vec<Payment>, AppError> {
        let payments = if let Some(request_id) = request_id {
            sqlx::query_as::<_, Payment>(&format!(
                "SELECT {} FROM payments WHERE payment_request_id = $1 ORDER BY created_utc",
                PAYMENT_COLUMNS
            ))
            .bind(request_id)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Payment>(&format!(
                "SELECT {} FROM payments ORDER BY created_utc",
                PAYMENT_COLUMNS
            ))
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        Ok(payments)
    }

    #[instrument(skip(self))]
    async fn claim_completion_notification(&self, request_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_requests
            SET completed_notified = TRUE, updated_utc = $3
            WHERE id = $1 AND status = $2 AND NOT completed_notified
            "#,
        )
        .bind(request_id)
        .bind(RequestStatus::Completed.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to claim completion notification: {}",
                e
            ))
        })?;

        Ok(result.rows_affected() > 0)
    }
}
