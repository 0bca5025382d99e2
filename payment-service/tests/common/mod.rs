use payment_service::services::memory::InMemoryStore;
use payment_service::services::payments::PaymentService;
use payment_service::services::store::PaymentStore;
use payment_service::AppState;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

pub const TEST_USER_ID: &str = "test-user";

pub const TEST_API_KEY: &str = "test-api-key";
pub const TEST_AUTH_TOKEN: &str = "test-auth-token";
pub const TEST_SALT: &str = "test-salt";

/// Test harness: the HTTP router backed by the in-memory store, with a
/// wiremock server standing in for the Instamojo API.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub mock_server: MockServer,
    pub service: PaymentService,
    pub store: Arc<InMemoryStore>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let mock_server = MockServer::start().await;

        let store = Arc::new(InMemoryStore::new());
        let service = PaymentService::new(
            store.clone() as Arc<dyn PaymentStore>,
            Duration::from_secs(5),
        );

        let state = AppState {
            service: service.clone(),
        };
        let router = payment_service::router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener
            .local_addr()
            .expect("Failed to read local address")
            .port();

        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            mock_server,
            service,
            store,
        }
    }

    /// Register an active merchant configuration pointing at the mock server.
    pub async fn create_active_configuration(&self) {
        let response = self
            .client
            .post(format!("{}/configurations", self.address))
            .json(&json!({
                "api_key": TEST_API_KEY,
                "auth_token": TEST_AUTH_TOKEN,
                "salt": TEST_SALT,
                "is_active": true,
                "base_url": self.mock_server.uri(),
            }))
            .send()
            .await
            .expect("Failed to create configuration");

        assert_eq!(response.status(), 201, "configuration setup failed");
    }

    /// POST /requests as the test user.
    pub async fn post_request(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/requests", self.address))
            .header("X-User-ID", TEST_USER_ID)
            .json(&body)
            .send()
            .await
            .expect("Failed to post payment request")
    }

    /// POST /payments.
    pub async fn post_payment(&self, request_id: &str, payment_id: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/payments", self.address))
            .json(&json!({
                "payment_request_id": request_id,
                "payment_id": payment_id,
            }))
            .send()
            .await
            .expect("Failed to post payment")
    }
}

/// A successful create response echoing the given request id. Deliberately
/// omits `amount` so the caller's input has to fill the gap.
pub fn create_response_body(request_id: &str) -> String {
    json!({
        "success": true,
        "payment_request": {
            "id": request_id,
            "status": "Pending",
            "purpose": "Product",
            "longurl": format!("https://test.instamojo.com/@merchant/{}", request_id),
            "created_at": "2024-03-01T10:00:00Z",
            "modified_at": "2024-03-01T10:00:00Z",
        }
    })
    .to_string()
}

/// A request-status response with the given status, timestamp, and payment ids.
pub fn request_status_body(status: &str, modified_at: &str, payment_ids: &[&str]) -> String {
    let payments: Vec<serde_json::Value> = payment_ids
        .iter()
        .map(|id| json!({ "payment_id": id }))
        .collect();

    json!({
        "success": true,
        "payment_request": {
            "status": status,
            "modified_at": modified_at,
            "sms_status": null,
            "email_status": null,
            "payments": payments,
        }
    })
    .to_string()
}

/// A payment-status response for a credited payment.
pub fn payment_status_body(payment_id: &str, status: &str, amount: &str) -> String {
    json!({
        "success": true,
        "payment_request": {
            "payment": {
                "payment_id": payment_id,
                "status": status,
                "amount": amount,
                "currency": "INR",
                "buyer_name": "Test Buyer",
                "instrument_type": "NETBANKING",
            }
        }
    })
    .to_string()
}
