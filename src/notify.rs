//! Best-effort settlement notifications.
//!
//! Notification delivery is advisory, never authoritative: every failure is
//! logged and swallowed so the webhook response is never held hostage by an
//! email problem. There is no retry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::email::{Email, Mailer};
use crate::error::Result;

/// Which settlement happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementKind {
    InvoicePaid,
    PayoutPaid,
}

impl SettlementKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvoicePaid => "invoice_paid",
            Self::PayoutPaid => "payout_paid",
        }
    }
}

/// The facts a settlement email is rendered from.
#[derive(Debug, Clone)]
pub struct SettlementNotice {
    pub kind: SettlementKind,
    /// The invoice external id or payout reference id.
    pub reference: String,
    pub amount_minor_units: i64,
    pub currency: String,
    /// Internal user to notify, if the event carried one.
    pub user_id: Option<String>,
    /// Contact email carried in provider metadata, used when no user record
    /// resolves.
    pub contact_hint: Option<String>,
}

/// Resolves an internal user id to an email address.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn email_for(&self, user_id: &str) -> Result<Option<String>>;
}

/// In-memory [`UserDirectory`] for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct MemoryUserDirectory {
    emails: Arc<HashMap<String, String>>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new(emails: HashMap<String, String>) -> Self {
        Self {
            emails: Arc::new(emails),
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn email_for(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.emails.get(user_id).cloned())
    }
}

/// Sends settlement emails.
pub struct Notifier {
    directory: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    from: String,
}

impl Notifier {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            mailer,
            from: from.into(),
        }
    }

    /// Send a settlement email, swallowing all failures.
    ///
    /// No resolvable recipient is a silent no-op.
    pub async fn notify(&self, notice: SettlementNotice) {
        if let Err(e) = self.try_notify(&notice).await {
            tracing::warn!(
                kind = notice.kind.as_str(),
                reference = %notice.reference,
                error = %e,
                "Settlement notification failed"
            );
        }
    }

    async fn try_notify(&self, notice: &SettlementNotice) -> Result<()> {
        let Some(recipient) = self.resolve_recipient(notice).await? else {
            tracing::debug!(
                kind = notice.kind.as_str(),
                reference = %notice.reference,
                "No recipient resolved, skipping notification"
            );
            return Ok(());
        };

        let amount = format_amount(notice.amount_minor_units, &notice.currency);

        let (subject, body) = match notice.kind {
            SettlementKind::InvoicePaid => (
                format!("Invoice {} paid", notice.reference),
                format!(
                    "Payment of {} was received for invoice {}.",
                    amount, notice.reference
                ),
            ),
            SettlementKind::PayoutPaid => (
                format!("Payout {} sent", notice.reference),
                format!(
                    "A payout of {} ({}) has been sent to you.",
                    amount, notice.reference
                ),
            ),
        };

        let email = Email::new(recipient, self.from.clone())
            .subject(subject)
            .body(body);

        self.mailer.send(&email).await
    }

    async fn resolve_recipient(&self, notice: &SettlementNotice) -> Result<Option<String>> {
        if let Some(user_id) = &notice.user_id {
            if let Some(email) = self.directory.email_for(user_id).await? {
                return Ok(Some(email));
            }
        }
        Ok(notice.contact_hint.clone())
    }
}

fn format_amount(minor_units: i64, currency: &str) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    format!(
        "{}{}.{:02} {}",
        sign,
        abs / 100,
        abs % 100,
        currency.to_uppercase()
    )
}
