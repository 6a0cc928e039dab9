use std::sync::Arc;

use clearway::config::Config;
use clearway::email::{ConsoleMailer, Mailer};
use clearway::ledger::store::LedgerStore;
use clearway::routes::{router, AppState};
use clearway::webhook::{
    PayPalSignatureVerifier, PayPalWebhookPipeline, StripeSignatureVerifier,
    StripeWebhookPipeline,
};
use clearway::{
    ConfigBuilder, MemoryLedgerStore, MemoryUserDirectory, Notifier, ReconciliationEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new().from_env().build()?;
    clearway::init_tracing(&config.logging);

    #[cfg(feature = "database")]
    if let Some(url) = config.database_url.clone() {
        let db = sea_orm::Database::connect(&url).await?;
        let store = Arc::new(clearway::SeaOrmLedgerStore::new(db));
        return serve(config, store).await;
    }

    tracing::warn!("No database configured, ledger state is in-memory only");
    serve(config, Arc::new(MemoryLedgerStore::new())).await
}

async fn serve<S: LedgerStore + 'static>(config: Config, store: Arc<S>) -> anyhow::Result<()> {
    let notifier = Arc::new(Notifier::new(
        Arc::new(MemoryUserDirectory::default()),
        build_mailer(),
        config.mail.from.clone(),
    ));

    let engine = Arc::new(ReconciliationEngine::new(store).with_notifier(notifier));

    let stripe = config
        .providers
        .stripe_webhook_secret
        .clone()
        .map(|secret| {
            Arc::new(StripeWebhookPipeline::new(
                StripeSignatureVerifier::new(secret),
                Arc::clone(&engine),
            ))
        });
    if stripe.is_none() {
        tracing::warn!("Stripe webhook secret not configured, endpoint will answer 503");
    }

    let paypal = match (
        config.providers.paypal_webhook_id.clone(),
        config.providers.paypal_webhook_secret.clone(),
    ) {
        (Some(webhook_id), Some(secret)) => Some(Arc::new(PayPalWebhookPipeline::new(
            PayPalSignatureVerifier::new(webhook_id, secret),
            Arc::clone(&engine),
        ))),
        _ => {
            tracing::warn!("PayPal webhook credentials not configured, endpoint will answer 503");
            None
        }
    };

    let app = router(AppState { stripe, paypal });

    let addr = config.server.addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "clearway listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_mailer() -> Arc<dyn Mailer> {
    #[cfg(feature = "email-smtp")]
    if std::env::var("SMTP_HOST").is_ok() {
        match clearway::email::SmtpMailer::from_env() {
            Ok(mailer) => return Arc::new(mailer),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build SMTP mailer, falling back to console");
            }
        }
    }

    Arc::new(ConsoleMailer::new())
}
