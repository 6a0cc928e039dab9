//! HTTP surface: the two provider webhook endpoints and a health check.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::{ClearwayError, Result};
use crate::ledger::store::LedgerStore;
use crate::webhook::{PayPalWebhookPipeline, StripeWebhookPipeline, WebhookOutcome};

/// Shared handler state. An absent pipeline means the provider is not
/// configured and its endpoint answers 503; the check happens once at
/// startup, not per request.
pub struct AppState<S> {
    pub stripe: Option<Arc<StripeWebhookPipeline<S>>>,
    pub paypal: Option<Arc<PayPalWebhookPipeline<S>>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            stripe: self.stripe.clone(),
            paypal: self.paypal.clone(),
        }
    }
}

/// Acknowledgement body returned to the provider.
#[derive(Debug, Serialize)]
pub struct WebhookReceipt {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
}

impl From<WebhookOutcome> for WebhookReceipt {
    fn from(outcome: WebhookOutcome) -> Self {
        Self {
            received: true,
            duplicate: match outcome {
                WebhookOutcome::Processed => None,
                WebhookOutcome::Duplicate => Some(true),
            },
        }
    }
}

/// Build the service router.
pub fn router<S: LedgerStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/payments/stripe/webhook", post(stripe_webhook::<S>))
        .route("/payments/paypal/webhook", post(paypal_webhook::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn stripe_webhook<S: LedgerStore + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookReceipt>> {
    let Some(pipeline) = &state.stripe else {
        return Err(ClearwayError::service_unavailable(
            "Stripe webhooks not configured",
        ));
    };

    let signature = header_str(&headers, "stripe-signature")
        .ok_or_else(|| ClearwayError::bad_request("Invalid Stripe signature"))?;

    let outcome = pipeline.process(&body, signature).await?;
    Ok(Json(outcome.into()))
}

async fn paypal_webhook<S: LedgerStore + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookReceipt>> {
    let Some(pipeline) = &state.paypal else {
        return Err(ClearwayError::service_unavailable(
            "PayPal webhooks not configured",
        ));
    };

    let signature = header_str(&headers, "paypal-transmission-sig")
        .ok_or_else(|| ClearwayError::bad_request("Invalid PayPal signature"))?;
    let transmission_time = header_str(&headers, "paypal-transmission-time")
        .ok_or_else(|| ClearwayError::bad_request("Invalid PayPal signature"))?;

    let outcome = pipeline.process(&body, transmission_time, signature).await?;
    Ok(Json(outcome.into()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
