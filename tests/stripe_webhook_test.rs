//! End-to-end tests for the Stripe webhook endpoint.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use sha2::Sha256;
use std::sync::Arc;
use tower::ServiceExt;

use clearway::routes::{router, AppState};
use clearway::webhook::{StripeSignatureVerifier, StripeWebhookPipeline};
use clearway::{InvoiceStatus, LedgerStore, MemoryLedgerStore, ReconciliationEngine};

const SECRET: &str = "whsec_test";

fn test_app() -> (Router, Arc<MemoryLedgerStore>) {
    let store = Arc::new(MemoryLedgerStore::new());
    let engine = Arc::new(ReconciliationEngine::new(Arc::clone(&store)));
    let stripe = Arc::new(StripeWebhookPipeline::new(
        StripeSignatureVerifier::new(SecretString::new(SECRET.to_string())),
        engine,
    ));

    let app = router(AppState {
        stripe: Some(stripe),
        paypal: None,
    });
    (app, store)
}

fn sign(payload: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let signed = format!("{timestamp}.{payload}");
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(signed.as_bytes());
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

async fn deliver(app: &Router, payload: &str, signature: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/payments/stripe/webhook")
        .header("stripe-signature", signature)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

fn invoice_paid_payload() -> String {
    serde_json::json!({
        "id": "evt_test1",
        "type": "invoice.payment_succeeded",
        "data": {
            "object": {
                "id": "in_test1",
                "amount_paid": 5000,
                "currency": "gbp",
                "metadata": {"invoiceId": "INV-1"}
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn invoice_payment_succeeded_settles_invoice() {
    let (app, store) = test_app();
    let payload = invoice_paid_payload();

    let (status, body) = deliver(&app, &payload, &sign(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"received": true}));

    let invoice = store
        .get_invoice_by_external_id("INV-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.amount, 5000);
    assert_eq!(invoice.currency, "gbp");
    assert_eq!(invoice.status, InvoiceStatus::Paid);

    let recon = store.get_reconciliation(&invoice.id).await.unwrap();
    assert_eq!(recon.status, "invoice_paid");
}

#[tokio::test]
async fn redelivered_event_reports_duplicate_without_new_rows() {
    let (app, store) = test_app();
    let payload = invoice_paid_payload();
    let signature = sign(&payload);

    let (status, _) = deliver(&app, &payload, &signature).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = deliver(&app, &payload, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"received": true, "duplicate": true}));

    assert_eq!(store.invoice_count().await, 1);
    assert_eq!(store.processed_count().await, 1);
}

#[tokio::test]
async fn tampered_body_is_rejected_with_no_writes() {
    let (app, store) = test_app();
    let payload = invoice_paid_payload();
    let signature = sign(&payload);

    // One byte changed after signing.
    let tampered = payload.replace("5000", "9000");
    let (status, body) = deliver(&app, &tampered, &signature).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid Stripe signature");
    assert_eq!(store.invoice_count().await, 0);
    assert_eq!(store.processed_count().await, 0);
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let (app, store) = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/payments/stripe/webhook")
        .header("content-type", "application/json")
        .body(Body::from(invoice_paid_payload()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.processed_count().await, 0);
}

#[tokio::test]
async fn unconfigured_provider_answers_503() {
    let app: Router = router(AppState::<MemoryLedgerStore> {
        stripe: None,
        paypal: None,
    });

    let payload = invoice_paid_payload();
    let request = Request::builder()
        .method("POST")
        .uri("/payments/stripe/webhook")
        .header("stripe-signature", sign(&payload))
        .body(Body::from(payload))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn malformed_json_with_valid_signature_is_rejected() {
    let (app, store) = test_app();
    let payload = "{ not json";

    let (status, _) = deliver(&app, payload, &sign(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(store.processed_count().await, 0);
}

#[tokio::test]
async fn payout_failed_without_prior_row_is_a_noop() {
    let (app, store) = test_app();
    let payload = serde_json::json!({
        "id": "evt_po_fail",
        "type": "payout.failed",
        "data": {"object": {"id": "po_1", "amount": 1000, "currency": "usd"}}
    })
    .to_string();

    let (status, body) = deliver(&app, &payload, &sign(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"received": true}));

    assert_eq!(store.payout_count().await, 0);
    // Still recorded as processed so a redelivery dedupes.
    assert_eq!(store.processed_count().await, 1);
}

#[tokio::test]
async fn unknown_event_type_is_accepted() {
    let (app, store) = test_app();
    let payload = serde_json::json!({
        "id": "evt_sub",
        "type": "customer.subscription.updated",
        "data": {"object": {"id": "sub_1"}}
    })
    .to_string();

    let (status, body) = deliver(&app, &payload, &sign(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"received": true}));
    assert_eq!(store.invoice_count().await, 0);
    assert_eq!(store.processed_count().await, 1);
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (app, _store) = test_app();

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "ok");
}
