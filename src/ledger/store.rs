//! Ledger persistence trait and in-memory implementation.
//!
//! The in-memory store backs tests and local development. Uniqueness of
//! `external_id`, `reference_id`, and `(provider, event_id)` is enforced by
//! the store itself, mirroring the unique indexes a database backend carries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::ledger::model::{
    Invoice, InvoiceStatus, Payout, PayoutStatus, ProcessedEvent, Reconciliation,
};
use crate::webhook::event::Provider;

/// Fields for an invoice upsert. Optional fields only overwrite existing
/// values when present, so a sparse event never erases known data.
#[derive(Debug, Clone)]
pub struct InvoiceUpsert {
    pub external_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub invoice_number: Option<String>,
    pub user_id: Option<String>,
    pub deal_id: Option<String>,
}

/// Fields for a payout upsert.
#[derive(Debug, Clone)]
pub struct PayoutUpsert {
    pub reference_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PayoutStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub creator_id: Option<String>,
    pub deal_id: Option<String>,
}

/// Fields for a reconciliation upsert, keyed by invoice id.
#[derive(Debug, Clone)]
pub struct ReconciliationUpsert {
    pub invoice_id: String,
    pub side: String,
    pub reference_id: String,
    pub amount: i64,
    pub status: String,
}

/// Persistence operations required by the reconciliation engine.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create or update an invoice by its unique `external_id`.
    async fn upsert_invoice(&self, upsert: InvoiceUpsert) -> Result<Invoice>;

    /// Look up an invoice by its unique `external_id`.
    async fn get_invoice_by_external_id(&self, external_id: &str) -> Result<Option<Invoice>>;

    /// Create or update a payout by its unique `reference_id`.
    async fn upsert_payout(&self, upsert: PayoutUpsert) -> Result<Payout>;

    /// Update the status of an existing payout. Returns the updated row, or
    /// `None` when no payout matches the reference id.
    async fn update_payout_status(
        &self,
        reference_id: &str,
        status: PayoutStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Payout>>;

    /// Create or overwrite the reconciliation row for an invoice.
    async fn upsert_reconciliation(&self, upsert: ReconciliationUpsert) -> Result<Reconciliation>;

    /// Read-only check whether an event was already processed.
    async fn is_event_processed(&self, provider: Provider, event_id: &str) -> Result<bool>;

    /// Atomically record an event as processed. Returns `true` if this call
    /// made the reservation, `false` if the event was already recorded.
    ///
    /// Implementations must make this a single atomic operation; a separate
    /// existence check followed by an insert is racy under concurrent
    /// redelivery.
    async fn reserve_event(&self, record: ProcessedEvent) -> Result<bool>;

    /// Delete processed-event records older than the cutoff. Returns the
    /// number of rows removed.
    async fn cleanup_processed_events(&self, older_than: DateTime<Utc>) -> Result<u64>;
}

#[derive(Default)]
struct Inner {
    invoices: HashMap<String, Invoice>,
    payouts: HashMap<String, Payout>,
    reconciliations: HashMap<String, Reconciliation>,
    processed: HashMap<(Provider, String), ProcessedEvent>,
}

/// In-memory [`LedgerStore`] for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryLedgerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invoices in the ledger.
    pub async fn invoice_count(&self) -> usize {
        self.inner.read().await.invoices.len()
    }

    /// Number of payouts in the ledger.
    pub async fn payout_count(&self) -> usize {
        self.inner.read().await.payouts.len()
    }

    /// Number of processed-event records.
    pub async fn processed_count(&self) -> usize {
        self.inner.read().await.processed.len()
    }

    /// Fetch a payout by reference id.
    pub async fn get_payout(&self, reference_id: &str) -> Option<Payout> {
        self.inner.read().await.payouts.get(reference_id).cloned()
    }

    /// Fetch the reconciliation row for an invoice.
    pub async fn get_reconciliation(&self, invoice_id: &str) -> Option<Reconciliation> {
        self.inner
            .read()
            .await
            .reconciliations
            .get(invoice_id)
            .cloned()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn upsert_invoice(&self, upsert: InvoiceUpsert) -> Result<Invoice> {
        let mut inner = self.inner.write().await;

        let invoice = inner
            .invoices
            .entry(upsert.external_id.clone())
            .and_modify(|existing| {
                existing.amount = upsert.amount;
                existing.currency = upsert.currency.clone();
                existing.status = upsert.status;
                if upsert.issued_at.is_some() {
                    existing.issued_at = upsert.issued_at;
                }
                if upsert.due_at.is_some() {
                    existing.due_at = upsert.due_at;
                }
                if upsert.invoice_number.is_some() {
                    existing.invoice_number = upsert.invoice_number.clone();
                }
                if upsert.user_id.is_some() {
                    existing.user_id = upsert.user_id.clone();
                }
                if upsert.deal_id.is_some() {
                    existing.deal_id = upsert.deal_id.clone();
                }
            })
            .or_insert_with(|| Invoice {
                id: Uuid::new_v4().to_string(),
                external_id: upsert.external_id.clone(),
                deal_id: upsert.deal_id.clone(),
                user_id: upsert.user_id.clone(),
                amount: upsert.amount,
                currency: upsert.currency.clone(),
                status: upsert.status,
                issued_at: upsert.issued_at,
                due_at: upsert.due_at,
                invoice_number: upsert.invoice_number.clone(),
            });

        Ok(invoice.clone())
    }

    async fn get_invoice_by_external_id(&self, external_id: &str) -> Result<Option<Invoice>> {
        Ok(self.inner.read().await.invoices.get(external_id).cloned())
    }

    async fn upsert_payout(&self, upsert: PayoutUpsert) -> Result<Payout> {
        let mut inner = self.inner.write().await;

        let payout = inner
            .payouts
            .entry(upsert.reference_id.clone())
            .and_modify(|existing| {
                existing.amount = upsert.amount;
                existing.currency = upsert.currency.clone();
                existing.status = upsert.status;
                if upsert.paid_at.is_some() {
                    existing.paid_at = upsert.paid_at;
                }
                if upsert.creator_id.is_some() {
                    existing.creator_id = upsert.creator_id.clone();
                }
                if upsert.deal_id.is_some() {
                    existing.deal_id = upsert.deal_id.clone();
                }
            })
            .or_insert_with(|| Payout {
                id: Uuid::new_v4().to_string(),
                reference_id: upsert.reference_id.clone(),
                creator_id: upsert.creator_id.clone(),
                deal_id: upsert.deal_id.clone(),
                brand_id: None,
                amount: upsert.amount,
                currency: upsert.currency.clone(),
                status: upsert.status,
                paid_at: upsert.paid_at,
                created_by: None,
            });

        Ok(payout.clone())
    }

    async fn update_payout_status(
        &self,
        reference_id: &str,
        status: PayoutStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Payout>> {
        let mut inner = self.inner.write().await;

        Ok(inner.payouts.get_mut(reference_id).map(|payout| {
            payout.status = status;
            if paid_at.is_some() {
                payout.paid_at = paid_at;
            }
            payout.clone()
        }))
    }

    async fn upsert_reconciliation(&self, upsert: ReconciliationUpsert) -> Result<Reconciliation> {
        let mut inner = self.inner.write().await;

        let reconciliation = Reconciliation {
            invoice_id: upsert.invoice_id.clone(),
            side: upsert.side,
            reference_id: upsert.reference_id,
            amount: upsert.amount,
            status: upsert.status,
            updated_at: Utc::now(),
        };

        inner
            .reconciliations
            .insert(upsert.invoice_id, reconciliation.clone());

        Ok(reconciliation)
    }

    async fn is_event_processed(&self, provider: Provider, event_id: &str) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .await
            .processed
            .contains_key(&(provider, event_id.to_string())))
    }

    async fn reserve_event(&self, record: ProcessedEvent) -> Result<bool> {
        let mut inner = self.inner.write().await;

        // Single atomic reserve under the write lock; an occupied entry means
        // another delivery of this event already committed.
        match inner
            .processed
            .entry((record.provider, record.event_id.clone()))
        {
            std::collections::hash_map::Entry::Occupied(_) => Ok(false),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(true)
            }
        }
    }

    async fn cleanup_processed_events(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.processed.len();
        inner
            .processed
            .retain(|_, record| record.processed_at >= older_than);
        Ok((before - inner.processed.len()) as u64)
    }
}
