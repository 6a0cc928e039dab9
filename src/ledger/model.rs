//! Ledger domain records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::webhook::event::Provider;

/// Invoice lifecycle status as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Finalized,
    Paid,
    Failed,
}

impl InvoiceStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finalized => "finalized",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "finalized" => Ok(Self::Finalized),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown invoice status: {other}")),
        }
    }
}

/// Payout lifecycle status as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Paid,
    Failed,
    Canceled,
}

impl PayoutStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(format!("unknown payout status: {other}")),
        }
    }
}

/// A billed invoice, keyed by its provider-qualified `external_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    /// Provider-qualified unique key; the upsert key for invoice events.
    pub external_id: String,
    pub deal_id: Option<String>,
    pub user_id: Option<String>,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub invoice_number: Option<String>,
}

/// A payout to a creator, keyed by its provider-qualified `reference_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: String,
    /// Provider-qualified unique key; the upsert key for payout events.
    pub reference_id: String,
    pub creator_id: Option<String>,
    pub deal_id: Option<String>,
    /// Set by the campaign flow elsewhere, never by webhook events.
    pub brand_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PayoutStatus,
    pub paid_at: Option<DateTime<Utc>>,
    /// Set by the campaign flow elsewhere, never by webhook events.
    pub created_by: Option<String>,
}

/// The invoice-to-payout settlement link. Exactly one row per invoice,
/// recording the most recently processed settlement signal from either side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    pub invoice_id: String,
    /// Which side wrote last: `invoice` or `payout`.
    pub side: String,
    pub reference_id: String,
    pub amount: i64,
    /// Last-write-wins status string, e.g. `invoice_paid` or `payout_paid`.
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

/// Immutable record that a provider event has been fully processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub provider: Provider,
    pub event_id: String,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
}
