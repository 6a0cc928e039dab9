//! Clearway: payment webhook reconciliation.
//!
//! Ingests untrusted webhook deliveries from Stripe and PayPal, verifies
//! them cryptographically, and converges an internal ledger of invoices,
//! payouts, and their reconciliation links. Providers deliver at least once
//! and in any order, so every ledger write is an idempotent upsert and the
//! HTTP status code is the only retry mechanism.
//!
//! ```rust,ignore
//! use clearway::{ConfigBuilder, MemoryLedgerStore, ReconciliationEngine};
//! use clearway::routes::{router, AppState};
//! use clearway::webhook::{StripeSignatureVerifier, StripeWebhookPipeline};
//! use std::sync::Arc;
//!
//! let config = ConfigBuilder::new().from_env().build()?;
//! let store = Arc::new(MemoryLedgerStore::new());
//! let engine = Arc::new(ReconciliationEngine::new(store));
//! let stripe = config.providers.stripe_webhook_secret.clone().map(|secret| {
//!     Arc::new(StripeWebhookPipeline::new(
//!         StripeSignatureVerifier::new(secret),
//!         engine.clone(),
//!     ))
//! });
//! let app = router(AppState { stripe, paypal: None });
//! ```

pub mod config;
pub mod email;
pub mod error;
pub mod ledger;
pub mod money;
pub mod notify;
pub mod routes;
pub mod webhook;

pub use config::{Config, ConfigBuilder};
pub use error::{ClearwayError, Result};
pub use ledger::{
    InvoiceStatus, LedgerStore, MemoryLedgerStore, PayoutStatus, ReconciliationEngine,
};
pub use money::Money;
pub use notify::{MemoryUserDirectory, Notifier, UserDirectory};
pub use webhook::{
    PayPalWebhookPipeline, Provider, StripeWebhookPipeline, WebhookOutcome,
};

#[cfg(feature = "database")]
pub use ledger::SeaOrmLedgerStore;

/// Initialize the global tracing subscriber from logging config.
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(config: &config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
