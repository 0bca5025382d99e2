mod common;

use common::{create_response_body, TestApp, TEST_API_KEY, TEST_USER_ID};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn create_request_persists_processor_id_and_input_amount() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;

    // The create response omits the amount; the stored row must carry the
    // caller's input amount.
    Mock::given(method("POST"))
        .and(path("/payment-requests/"))
        .and(header("X-Api-Key", TEST_API_KEY))
        .respond_with(ResponseTemplate::new(201).set_body_string(create_response_body("PR123")))
        .expect(1)
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
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["id"], "PR123");
    assert_eq!(body["status"], "Pending");
    assert_eq!(body["amount"], "120.00");
    assert_eq!(body["created_by"], TEST_USER_ID);

    // The verbatim processor response is stored and round-trippable.
    let raw: Value =
        serde_json::from_str(body["raw_response"].as_str().expect("raw_response missing"))
            .expect("raw_response is not valid JSON");
    assert_eq!(raw["success"], true);
    assert_eq!(raw["payment_request"]["id"], "PR123");
}

#[tokio::test]
async fn create_request_with_bad_key_persists_nothing() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;

    Mock::given(method("POST"))
        .and(path("/payment-requests/"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"success": false, "message": "bad key"}"#),
        )
        .mount(&app.mock_server)
        .await;

    let response = app
        .post_request(json!({
            "amount": "120.00",
            "purpose": "Product",
            "redirect_url": "https://example.com/done",
        }))
        .await;

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["error"]
        .as_str()
        .expect("error missing")
        .contains("bad key"));

    let stored = app
        .service
        .payment_requests_for_owner(TEST_USER_ID)
        .await
        .expect("Failed to list requests");
    assert!(stored.is_empty());
}

#[tokio::test]
async fn send_sms_without_phone_fails_before_any_external_call() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;

    Mock::given(method("POST"))
        .and(path("/payment-requests/"))
        .respond_with(ResponseTemplate::new(201).set_body_string(create_response_body("PR1")))
        .expect(0)
        .mount(&app.mock_server)
        .await;

    let response = app
        .post_request(json!({
            "amount": "50.00",
            "purpose": "Product",
            "redirect_url": "https://example.com/done",
            "send_sms": true,
        }))
        .await;

    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn send_email_without_email_fails_before_any_external_call() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;

    Mock::given(method("POST"))
        .and(path("/payment-requests/"))
        .respond_with(ResponseTemplate::new(201).set_body_string(create_response_body("PR1")))
        .expect(0)
        .mount(&app.mock_server)
        .await;

    let response = app
        .post_request(json!({
            "amount": "50.00",
            "purpose": "Product",
            "redirect_url": "https://example.com/done",
            "send_email": true,
        }))
        .await;

    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn create_request_without_active_configuration_is_a_server_error() {
    let app = TestApp::spawn().await;

    let response = app
        .post_request(json!({
            "amount": "50.00",
            "purpose": "Product",
            "redirect_url": "https://example.com/done",
        }))
        .await;

    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn requests_require_an_owner_identity() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;

    let response = app
        .client
        .get(format!("{}/requests", app.address))
        .send()
        .await
        .expect("Failed to list requests");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn requests_are_scoped_to_their_owner() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;

    Mock::given(method("POST"))
        .and(path("/payment-requests/"))
        .respond_with(ResponseTemplate::new(201).set_body_string(create_response_body("PR777")))
        .mount(&app.mock_server)
        .await;

    let response = app
        .post_request(json!({
            "amount": "75.00",
            "purpose": "Product",
            "redirect_url": "https://example.com/done",
        }))
        .await;
    assert_eq!(response.status(), 201);

    // Another owner cannot see the request.
    let response = app
        .client
        .get(format!("{}/requests/PR777", app.address))
        .header("X-User-ID", "someone-else")
        .send()
        .await
        .expect("Failed to get request");
    assert_eq!(response.status(), 404);

    // The creating owner can.
    let response = app
        .client
        .get(format!("{}/requests/PR777", app.address))
        .header("X-User-ID", TEST_USER_ID)
        .send()
        .await
        .expect("Failed to get request");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn disabled_request_rejects_new_payments() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;

    Mock::given(method("POST"))
        .and(path("/payment-requests/"))
        .respond_with(ResponseTemplate::new(201).set_body_string(create_response_body("PR950")))
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

    let response = app
        .client
        .patch(format!("{}/requests/PR950", app.address))
        .header("X-User-ID", TEST_USER_ID)
        .json(&json!({ "is_enabled": false }))
        .send()
        .await
        .expect("Failed to patch request");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["is_enabled"], false);

    // The disabled flag is consulted before any processor call.
    Mock::given(method("GET"))
        .and(path("/payment-requests/PR950/p1/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.mock_server)
        .await;

    let response = app.post_payment("PR950", "p1").await;
    assert_eq!(response.status(), 400);

    let payments = app
        .service
        .payments(Some("PR950"))
        .await
        .expect("Failed to list payments");
    assert!(payments.is_empty());
}

#[tokio::test]
async fn only_the_owner_can_disable_a_request() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;

    Mock::given(method("POST"))
        .and(path("/payment-requests/"))
        .respond_with(ResponseTemplate::new(201).set_body_string(create_response_body("PR951")))
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

    let response = app
        .client
        .patch(format!("{}/requests/PR951", app.address))
        .header("X-User-ID", "someone-else")
        .json(&json!({ "is_enabled": false }))
        .send()
        .await
        .expect("Failed to patch request");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn activating_a_second_configuration_conflicts() {
    let app = TestApp::spawn().await;
    app.create_active_configuration().await;

    let response = app
        .client
        .post(format!("{}/configurations", app.address))
        .json(&json!({
            "api_key": "other-key",
            "auth_token": "other-token",
            "salt": "other-salt",
            "is_active": true,
            "base_url": app.mock_server.uri(),
        }))
        .send()
        .await
        .expect("Failed to post configuration");

    assert_eq!(response.status(), 409);
}
