//! Reconciliation engine.
//!
//! Consumes canonical events and converges the Invoice/Payout ledger through
//! idempotent upserts. Every write keys on a unique column, so replayed or
//! reordered deliveries land on the same rows instead of duplicating them.

use chrono::Utc;
use std::sync::Arc;

use crate::error::Result;
use crate::ledger::model::{Invoice, InvoiceStatus, Payout, PayoutStatus};
use crate::ledger::store::{
    InvoiceUpsert, LedgerStore, PayoutUpsert, ReconciliationUpsert,
};
use crate::notify::{Notifier, SettlementKind, SettlementNotice};
use crate::webhook::normalize::{CanonicalEvent, InvoiceEvent, PayoutEvent};

/// Applies canonical events to the ledger and triggers settlement
/// notifications.
pub struct ReconciliationEngine<S> {
    store: Arc<S>,
    notifier: Option<Arc<Notifier>>,
}

impl<S: LedgerStore + 'static> ReconciliationEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Apply one canonical event to the ledger.
    pub async fn apply(&self, event: &CanonicalEvent) -> Result<()> {
        match event {
            CanonicalEvent::InvoiceFinalized(invoice) => {
                self.apply_invoice(invoice, InvoiceStatus::Finalized).await
            }
            CanonicalEvent::InvoiceSettled(invoice) => {
                self.apply_invoice(invoice, InvoiceStatus::Paid).await
            }
            CanonicalEvent::InvoiceFailed(invoice) => {
                self.apply_invoice(invoice, InvoiceStatus::Failed).await
            }
            CanonicalEvent::PayoutInitiated(payout) => {
                self.apply_payout_upsert(payout, PayoutStatus::Pending).await
            }
            CanonicalEvent::PayoutSettled(payout) => {
                self.apply_payout_upsert(payout, PayoutStatus::Paid).await
            }
            CanonicalEvent::PayoutFailed(payout) => {
                self.apply_payout_update(payout, PayoutStatus::Failed).await
            }
            CanonicalEvent::PayoutCanceled(payout) => {
                self.apply_payout_update(payout, PayoutStatus::Canceled).await
            }
        }
    }

    async fn apply_invoice(&self, event: &InvoiceEvent, status: InvoiceStatus) -> Result<()> {
        let invoice = self
            .store
            .upsert_invoice(InvoiceUpsert {
                external_id: event.external_id.clone(),
                amount: event.amount.minor_units,
                currency: event.amount.currency.clone(),
                status,
                issued_at: event.issued_at,
                due_at: event.due_at,
                invoice_number: event.invoice_number.clone(),
                user_id: event.user_id.clone(),
                deal_id: event.deal_id.clone(),
            })
            .await?;

        let recon_status = match status {
            InvoiceStatus::Paid => "invoice_paid".to_string(),
            other => other.as_str().to_string(),
        };

        self.store
            .upsert_reconciliation(ReconciliationUpsert {
                invoice_id: invoice.id.clone(),
                side: "invoice".to_string(),
                reference_id: invoice.external_id.clone(),
                amount: invoice.amount,
                status: recon_status,
            })
            .await?;

        tracing::info!(
            external_id = %invoice.external_id,
            status = %invoice.status,
            amount = invoice.amount,
            currency = %invoice.currency,
            "Invoice upserted"
        );

        if status == InvoiceStatus::Paid {
            self.spawn_notification(
                SettlementKind::InvoicePaid,
                invoice.external_id.clone(),
                &invoice,
                event.contact.clone(),
            );
        }

        Ok(())
    }

    /// Initiation and settlement create the payout row when it is missing.
    async fn apply_payout_upsert(&self, event: &PayoutEvent, status: PayoutStatus) -> Result<()> {
        let paid_at = (status == PayoutStatus::Paid).then(Utc::now);

        let payout = self
            .store
            .upsert_payout(PayoutUpsert {
                reference_id: event.reference_id.clone(),
                amount: event.amount.minor_units,
                currency: event.amount.currency.clone(),
                status,
                paid_at,
                creator_id: event.user_id.clone(),
                deal_id: event.deal_id.clone(),
            })
            .await?;

        tracing::info!(
            reference_id = %payout.reference_id,
            status = %payout.status,
            amount = payout.amount,
            "Payout upserted"
        );

        self.reconcile_payout(event, &payout, status).await?;

        if status == PayoutStatus::Paid {
            self.spawn_payout_notification(event, &payout);
        }

        Ok(())
    }

    /// Failure and cancellation only touch payout rows that already exist.
    /// A terminal event for a payout whose initiation was never delivered
    /// matches zero rows, which is a no-op rather than an error.
    async fn apply_payout_update(&self, event: &PayoutEvent, status: PayoutStatus) -> Result<()> {
        let Some(payout) = self
            .store
            .update_payout_status(&event.reference_id, status, None)
            .await?
        else {
            tracing::info!(
                reference_id = %event.reference_id,
                status = %status,
                "Payout status event matched no ledger row, skipping"
            );
            return Ok(());
        };

        tracing::info!(
            reference_id = %payout.reference_id,
            status = %payout.status,
            "Payout status updated"
        );

        self.reconcile_payout(event, &payout, status).await
    }

    /// Point the linked invoice's reconciliation at this payout.
    async fn reconcile_payout(
        &self,
        event: &PayoutEvent,
        payout: &Payout,
        status: PayoutStatus,
    ) -> Result<()> {
        let Some(invoice_ref) = &event.invoice_ref else {
            return Ok(());
        };

        let Some(invoice) = self.store.get_invoice_by_external_id(invoice_ref).await? else {
            tracing::debug!(
                invoice_ref = %invoice_ref,
                reference_id = %payout.reference_id,
                "Payout references unknown invoice, skipping reconciliation"
            );
            return Ok(());
        };

        let recon_status = match status {
            PayoutStatus::Paid => "payout_paid".to_string(),
            other => other.as_str().to_string(),
        };

        self.store
            .upsert_reconciliation(ReconciliationUpsert {
                invoice_id: invoice.id,
                side: "payout".to_string(),
                reference_id: payout.reference_id.clone(),
                amount: payout.amount,
                status: recon_status,
            })
            .await?;

        Ok(())
    }

    fn spawn_payout_notification(&self, event: &PayoutEvent, payout: &Payout) {
        let notice = SettlementNotice {
            kind: SettlementKind::PayoutPaid,
            reference: payout.reference_id.clone(),
            amount_minor_units: payout.amount,
            currency: payout.currency.clone(),
            user_id: payout.creator_id.clone(),
            contact_hint: event.contact.clone(),
        };
        self.spawn(notice);
    }

    fn spawn_notification(
        &self,
        kind: SettlementKind,
        reference: String,
        invoice: &Invoice,
        contact_hint: Option<String>,
    ) {
        let notice = SettlementNotice {
            kind,
            reference,
            amount_minor_units: invoice.amount,
            currency: invoice.currency.clone(),
            user_id: invoice.user_id.clone(),
            contact_hint,
        };
        self.spawn(notice);
    }

    /// Fire and forget: the webhook response never waits on email delivery.
    fn spawn(&self, notice: SettlementNotice) {
        if let Some(notifier) = &self.notifier {
            let notifier = Arc::clone(notifier);
            tokio::spawn(async move {
                notifier.notify(notice).await;
            });
        }
    }
}
