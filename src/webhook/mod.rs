//! Webhook ingestion pipelines.
//!
//! Each provider pipeline runs the same stages over the raw request body:
//! verify the signature, parse the event, short-circuit known duplicates,
//! normalize, apply to the ledger, and finally commit the idempotency
//! reservation. The reservation is deliberately the last step: a crash
//! mid-pipeline leaves no reservation, so the provider's redelivery reruns
//! the whole pipeline against idempotent upserts.

use chrono::Utc;
use std::sync::Arc;

use crate::error::Result;
use crate::ledger::model::ProcessedEvent;
use crate::ledger::store::LedgerStore;
use crate::ledger::ReconciliationEngine;

pub mod event;
pub mod normalize;
pub mod signature;

pub use event::{PayPalEvent, Provider, StripeEvent};
pub use normalize::{normalize_paypal, normalize_stripe, CanonicalEvent};
pub use signature::{PayPalSignatureVerifier, StripeSignatureVerifier};

/// Result of a fully processed webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event was applied to the ledger.
    Processed,
    /// The event had already been processed; nothing was changed.
    Duplicate,
}

/// Ingestion pipeline for Stripe webhook deliveries.
pub struct StripeWebhookPipeline<S> {
    verifier: StripeSignatureVerifier,
    engine: Arc<ReconciliationEngine<S>>,
}

impl<S: LedgerStore + 'static> StripeWebhookPipeline<S> {
    pub fn new(verifier: StripeSignatureVerifier, engine: Arc<ReconciliationEngine<S>>) -> Self {
        Self { verifier, engine }
    }

    /// Process one raw delivery.
    ///
    /// # Errors
    /// `BadRequest` for signature or payload failures; storage errors
    /// propagate so the provider sees a 500 and redelivers.
    pub async fn process(&self, payload: &[u8], signature_header: &str) -> Result<WebhookOutcome> {
        self.verifier.verify(payload, signature_header)?;
        let event = StripeEvent::from_slice(payload)?;

        // Cheap read-only check; the authoritative reservation happens after
        // the pipeline succeeds.
        if self
            .engine
            .store()
            .is_event_processed(Provider::Stripe, &event.id)
            .await?
        {
            tracing::info!(event_id = %event.id, "Duplicate Stripe event, skipping");
            return Ok(WebhookOutcome::Duplicate);
        }

        let canonical = normalize_stripe(&event);
        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            canonical = canonical.len(),
            "Processing Stripe event"
        );

        for domain_event in &canonical {
            self.engine.apply(domain_event).await?;
        }

        commit(self.engine.store(), Provider::Stripe, event.id, event.event_type).await
    }
}

/// Ingestion pipeline for PayPal webhook deliveries.
pub struct PayPalWebhookPipeline<S> {
    verifier: PayPalSignatureVerifier,
    engine: Arc<ReconciliationEngine<S>>,
}

impl<S: LedgerStore + 'static> PayPalWebhookPipeline<S> {
    pub fn new(verifier: PayPalSignatureVerifier, engine: Arc<ReconciliationEngine<S>>) -> Self {
        Self { verifier, engine }
    }

    /// Process one raw delivery.
    pub async fn process(
        &self,
        payload: &[u8],
        transmission_time: &str,
        transmission_sig: &str,
    ) -> Result<WebhookOutcome> {
        self.verifier
            .verify(payload, transmission_time, transmission_sig)?;
        let event = PayPalEvent::from_slice(payload)?;

        if self
            .engine
            .store()
            .is_event_processed(Provider::Paypal, &event.id)
            .await?
        {
            tracing::info!(event_id = %event.id, "Duplicate PayPal event, skipping");
            return Ok(WebhookOutcome::Duplicate);
        }

        let canonical = normalize_paypal(&event);
        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            canonical = canonical.len(),
            "Processing PayPal event"
        );

        for domain_event in &canonical {
            self.engine.apply(domain_event).await?;
        }

        commit(self.engine.store(), Provider::Paypal, event.id, event.event_type).await
    }
}

/// Reserve the event id as the final pipeline step. Losing the reservation
/// race to a concurrent delivery of the same event reports a duplicate.
async fn commit<S: LedgerStore>(
    store: &Arc<S>,
    provider: Provider,
    event_id: String,
    event_type: String,
) -> Result<WebhookOutcome> {
    let reserved = store
        .reserve_event(ProcessedEvent {
            provider,
            event_id,
            event_type,
            processed_at: Utc::now(),
        })
        .await?;

    Ok(if reserved {
        WebhookOutcome::Processed
    } else {
        WebhookOutcome::Duplicate
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::store::MemoryLedgerStore;
    use hmac::{Hmac, Mac};
    use secrecy::SecretString;
    use sha2::Sha256;

    fn sign_stripe(secret: &str, payload: &[u8]) -> String {
        let timestamp = Utc::now().timestamp();
        let signed = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        )
    }

    fn stripe_pipeline() -> StripeWebhookPipeline<MemoryLedgerStore> {
        let engine = Arc::new(ReconciliationEngine::new(Arc::new(MemoryLedgerStore::new())));
        StripeWebhookPipeline::new(
            StripeSignatureVerifier::new(SecretString::new("whsec_test".to_string())),
            engine,
        )
    }

    #[tokio::test]
    async fn test_stripe_pipeline_processes_then_dedupes() {
        let pipeline = stripe_pipeline();
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "invoice.payment_succeeded",
            "data": {"object": {"id": "in_1", "amount_paid": 5000, "currency": "gbp"}}
        })
        .to_string();
        let sig = sign_stripe("whsec_test", payload.as_bytes());

        let first = pipeline.process(payload.as_bytes(), &sig).await.unwrap();
        assert_eq!(first, WebhookOutcome::Processed);

        let second = pipeline.process(payload.as_bytes(), &sig).await.unwrap();
        assert_eq!(second, WebhookOutcome::Duplicate);

        let store = pipeline.engine.store();
        assert_eq!(store.invoice_count().await, 1);
        assert_eq!(store.processed_count().await, 1);
    }

    #[tokio::test]
    async fn test_stripe_pipeline_rejects_bad_signature() {
        let pipeline = stripe_pipeline();
        let payload = br#"{"id":"evt_1","type":"invoice.payment_succeeded","data":{"object":{}}}"#;

        let result = pipeline.process(payload, "t=1,v1=deadbeef").await;
        assert!(result.is_err());
        assert_eq!(pipeline.engine.store().processed_count().await, 0);
    }

    #[tokio::test]
    async fn test_stripe_pipeline_unknown_event_is_recorded() {
        let pipeline = stripe_pipeline();
        let payload = serde_json::json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_1"}}
        })
        .to_string();
        let sig = sign_stripe("whsec_test", payload.as_bytes());

        // Irrelevant events are accepted and reserved so redeliveries dedupe.
        let outcome = pipeline.process(payload.as_bytes(), &sig).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let store = pipeline.engine.store();
        assert_eq!(store.invoice_count().await, 0);
        assert_eq!(store.processed_count().await, 1);
    }
}
