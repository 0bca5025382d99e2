mod common;

use chrono::Utc;
use common::{
    create_response_body, payment_status_body, request_status_body, TestApp, TEST_SALT,
    TEST_USER_ID,
};
use payment_service::models::{NewMerchantConfiguration, PaymentRequest};
use payment_service::services::events::PaymentEvent;
use payment_service::services::instamojo::compute_webhook_mac;
use payment_service::services::store::PaymentStore;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn create_request(app: &TestApp, request_id: &str) {
    Mock::given(method("POST"))
        .and(path("/payment-requests/"))
        .respond_with(ResponseTemplate::new(201).set_body_string(create_response_body(request_id)))
        .up_to_n_times(1)
        .mount(&app.mock_server)
        .await;

    let response = app
        .post_request(json!({
            "amount": "120.00",
            "purpose": "Product",
            "redirect_url": "https://example.com/done",
        }))
        .await;
    assert_eq!(response.status(), 201);
}

fn webhook_fields(request_id: &str, payment_id: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("payment_id".to_string(), payment_id.to_string());
    fields.insert("payment_request_id".to_string(), request_id.to_string());
    fields.insert("amount".to_string(), "120.00".to_string());
    fields.insert("status".to_string(), "Credit".to_string());
    fields
}

#[tokio::test]
async fn verified_webhook_records_payment_and_completes_request() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;
    create_request(&app, "PR600").await;

    Mock::given(method("GET"))
        .and(path("/payment-requests/PR600/MOJO1/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(payment_status_body("MOJO1", "Credit", "120.00")),
        )
        .mount(&app.mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payment-requests/PR600/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(request_status_body(
            "Completed",
            "2024-03-02T10:00:00Z",
            &["MOJO1"],
        )))
        .mount(&app.mock_server)
        .await;

    let mut events = app.service.events().subscribe();

    let mut fields = webhook_fields("PR600", "MOJO1");
    let mac = compute_webhook_mac(TEST_SALT, &fields);
    fields.insert("mac".to_string(), mac.clone());

    let response = app
        .client
        .post(format!("{}/webhook", app.address))
        .form(&fields)
        .send()
        .await
        .expect("Failed to post webhook");
    assert_eq!(response.status(), 200);

    let payment = app
        .service
        .payment("MOJO1")
        .await
        .expect("Payment not recorded");
    assert!(payment.webhook_verified);
    assert_eq!(payment.mac.as_deref(), Some(mac.as_str()));
    assert_eq!(payment.payment_request_id, "PR600");

    // The webhook's reconciliation pass observed Completed: one event.
    assert_eq!(
        events.try_recv().expect("expected completion event"),
        PaymentEvent::RequestCompleted {
            request_id: "PR600".to_string()
        }
    );

    // Replaying the webhook neither duplicates the payment nor re-fires.
    let response = app
        .client
        .post(format!("{}/webhook", app.address))
        .form(&fields)
        .send()
        .await
        .expect("Failed to replay webhook");
    assert_eq!(response.status(), 200);

    let payments = app
        .service
        .payments(Some("PR600"))
        .await
        .expect("Failed to list payments");
    assert_eq!(payments.len(), 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn webhook_with_bad_mac_is_rejected() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;
    create_request(&app, "PR700").await;

    let mut fields = webhook_fields("PR700", "MOJO2");
    fields.insert("mac".to_string(), "0000deadbeef".to_string());

    let response = app
        .client
        .post(format!("{}/webhook", app.address))
        .form(&fields)
        .send()
        .await
        .expect("Failed to post webhook");
    assert_eq!(response.status(), 401);

    let payments = app
        .service
        .payments(Some("PR700"))
        .await
        .expect("Failed to list payments");
    assert!(payments.is_empty());
}

#[tokio::test]
async fn webhook_without_mac_is_rejected() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;
    create_request(&app, "PR800").await;

    let fields = webhook_fields("PR800", "MOJO3");

    let response = app
        .client
        .post(format!("{}/webhook", app.address))
        .form(&fields)
        .send()
        .await
        .expect("Failed to post webhook");
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn webhook_for_disabled_request_is_rejected() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;
    create_request(&app, "PR900").await;

    let response = app
        .client
        .patch(format!("{}/requests/PR900", app.address))
        .header("X-User-ID", TEST_USER_ID)
        .json(&json!({ "is_enabled": false }))
        .send()
        .await
        .expect("Failed to patch request");
    assert_eq!(response.status(), 200);

    let mut fields = webhook_fields("PR900", "MOJO5");
    let mac = compute_webhook_mac(TEST_SALT, &fields);
    fields.insert("mac".to_string(), mac);

    let response = app
        .client
        .post(format!("{}/webhook", app.address))
        .form(&fields)
        .send()
        .await
        .expect("Failed to post webhook");
    assert_eq!(response.status(), 400);

    let payments = app
        .service
        .payments(Some("PR900"))
        .await
        .expect("Failed to list payments");
    assert!(payments.is_empty());
}

#[tokio::test]
async fn webhook_uses_the_requests_own_credentials_after_rotation() {
    let app = TestApp::spawn().await;

    // The credentials the request was created under, now rotated out.
    let old_endpoint = MockServer::start().await;
    let old_config = app
        .store
        .create_configuration(NewMerchantConfiguration {
            api_key: "old-key".to_string(),
            auth_token: "old-token".to_string(),
            salt: "old-salt".to_string(),
            is_active: false,
            base_url: old_endpoint.uri(),
        })
        .await
        .expect("Failed to create old configuration");

    // The currently active credentials sign incoming webhooks.
    app.create_active_configuration().await;

    let now = Utc::now();
    let request = PaymentRequest {
        id: "PR970".to_string(),
        amount: Decimal::new(12000, 2),
        purpose: "Product".to_string(),
        buyer_name: None,
        email: None,
        phone: None,
        send_email: false,
        send_sms: false,
        email_status: None,
        sms_status: None,
        redirect_url: "https://example.com/done".to_string(),
        webhook_url: None,
        allow_repeated_payments: true,
        longurl: None,
        shorturl: None,
        expires_at: None,
        status: "Sent".to_string(),
        is_enabled: true,
        customer_id: None,
        created_by: TEST_USER_ID.to_string(),
        configuration_id: old_config.id,
        raw_response: "{}".to_string(),
        created_at: None,
        modified_at: None,
        completed_notified: false,
        created_utc: now,
        updated_utc: now,
    };
    app.store
        .insert_payment_request(&request)
        .await
        .expect("Failed to insert request");

    // Processor calls must carry the old credentials and hit the old
    // endpoint; the active endpoint must see nothing.
    Mock::given(method("GET"))
        .and(path("/payment-requests/PR970/MOJO7/"))
        .and(header("X-Api-Key", "old-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(payment_status_body("MOJO7", "Credit", "120.00")),
        )
        .expect(1)
        .mount(&old_endpoint)
        .await;
    Mock::given(method("GET"))
        .and(path("/payment-requests/PR970/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(request_status_body(
            "Sent",
            "2024-03-02T10:00:00Z",
            &["MOJO7"],
        )))
        .mount(&old_endpoint)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&app.mock_server)
        .await;

    let mut fields = webhook_fields("PR970", "MOJO7");
    let mac = compute_webhook_mac(TEST_SALT, &fields);
    fields.insert("mac".to_string(), mac);

    let response = app
        .client
        .post(format!("{}/webhook", app.address))
        .form(&fields)
        .send()
        .await
        .expect("Failed to post webhook");
    assert_eq!(response.status(), 200);

    let payment = app
        .service
        .payment("MOJO7")
        .await
        .expect("Payment not recorded");
    assert_eq!(payment.payment_request_id, "PR970");
    assert!(payment.webhook_verified);
}

#[tokio::test]
async fn webhook_for_unknown_request_is_not_found() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;

    let mut fields = webhook_fields("PR-missing", "MOJO4");
    let mac = compute_webhook_mac(TEST_SALT, &fields);
    fields.insert("mac".to_string(), mac);

    let response = app
        .client
        .post(format!("{}/webhook", app.address))
        .form(&fields)
        .send()
        .await
        .expect("Failed to post webhook");
    assert_eq!(response.status(), 404);
}
