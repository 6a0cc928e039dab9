//! Event normalization.
//!
//! Maps each provider's event taxonomy and money representation into the
//! canonical domain events consumed by the reconciliation engine. Unrecognized
//! event types normalize to an empty result so new provider event types never
//! break ingestion.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::money::Money;
use crate::webhook::event::{PayPalEvent, StripeEvent};

/// A provider-agnostic payment lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalEvent {
    InvoiceFinalized(InvoiceEvent),
    InvoiceSettled(InvoiceEvent),
    InvoiceFailed(InvoiceEvent),
    PayoutInitiated(PayoutEvent),
    PayoutSettled(PayoutEvent),
    PayoutFailed(PayoutEvent),
    PayoutCanceled(PayoutEvent),
}

impl CanonicalEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvoiceFinalized(_) => "invoice_finalized",
            Self::InvoiceSettled(_) => "invoice_settled",
            Self::InvoiceFailed(_) => "invoice_failed",
            Self::PayoutInitiated(_) => "payout_initiated",
            Self::PayoutSettled(_) => "payout_settled",
            Self::PayoutFailed(_) => "payout_failed",
            Self::PayoutCanceled(_) => "payout_canceled",
        }
    }
}

/// Normalized invoice lifecycle event body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceEvent {
    /// Provider-qualified unique invoice key.
    pub external_id: String,
    pub amount: Money,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub invoice_number: Option<String>,
    pub user_id: Option<String>,
    pub deal_id: Option<String>,
    /// Contact email hint, used only by the notifier.
    pub contact: Option<String>,
}

/// Normalized payout lifecycle event body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutEvent {
    /// Provider-qualified unique payout key.
    pub reference_id: String,
    pub amount: Money,
    /// Counterpart invoice external id carried in provider metadata, if any.
    pub invoice_ref: Option<String>,
    pub user_id: Option<String>,
    pub deal_id: Option<String>,
    /// Contact email hint, used only by the notifier.
    pub contact: Option<String>,
}

/// Normalize a verified Stripe event into zero or more canonical events.
#[must_use]
pub fn normalize_stripe(event: &StripeEvent) -> Vec<CanonicalEvent> {
    let object = &event.data.object;

    match event.event_type.as_str() {
        "invoice.finalized" => vec![CanonicalEvent::InvoiceFinalized(stripe_invoice(object))],
        "invoice.payment_succeeded" => {
            vec![CanonicalEvent::InvoiceSettled(stripe_invoice(object))]
        }
        "invoice.payment_failed" => vec![CanonicalEvent::InvoiceFailed(stripe_invoice(object))],
        "payout.created" => vec![CanonicalEvent::PayoutInitiated(stripe_payout(object))],
        "payout.paid" => vec![CanonicalEvent::PayoutSettled(stripe_payout(object))],
        "payout.failed" => vec![CanonicalEvent::PayoutFailed(stripe_payout(object))],
        "payout.canceled" => vec![CanonicalEvent::PayoutCanceled(stripe_payout(object))],
        other => {
            tracing::debug!(event_type = other, "Ignoring unhandled Stripe event type");
            vec![]
        }
    }
}

/// Normalize a verified PayPal event into zero or more canonical events.
#[must_use]
pub fn normalize_paypal(event: &PayPalEvent) -> Vec<CanonicalEvent> {
    let resource = &event.resource;

    match event.event_type.as_str() {
        "PAYMENT.SALE.COMPLETED" => vec![CanonicalEvent::InvoiceSettled(paypal_sale(resource))],
        "PAYMENT.SALE.DENIED" => vec![CanonicalEvent::InvoiceFailed(paypal_sale(resource))],
        "PAYMENT.PAYOUTS-ITEM.SUCCEEDED" => {
            vec![CanonicalEvent::PayoutSettled(paypal_payout_item(resource))]
        }
        "PAYMENT.PAYOUTS-ITEM.FAILED" => {
            vec![CanonicalEvent::PayoutFailed(paypal_payout_item(resource))]
        }
        "PAYMENT.PAYOUTS-ITEM.CANCELED" => {
            vec![CanonicalEvent::PayoutCanceled(paypal_payout_item(resource))]
        }
        other => {
            tracing::debug!(event_type = other, "Ignoring unhandled PayPal event type");
            vec![]
        }
    }
}

fn stripe_invoice(object: &Value) -> InvoiceEvent {
    let metadata = &object["metadata"];

    // Internal invoice key from metadata when set by our billing flow,
    // otherwise fall back to the Stripe object id.
    let external_id = str_field(metadata, "invoiceId")
        .or_else(|| str_field(object, "id"))
        .unwrap_or_default();

    let minor_units = object["amount_paid"]
        .as_i64()
        .or_else(|| object["amount_due"].as_i64())
        .unwrap_or(0);

    InvoiceEvent {
        external_id,
        amount: Money::from_minor_units(minor_units, object["currency"].as_str()),
        issued_at: unix_field(object, "created"),
        due_at: unix_field(object, "due_date"),
        invoice_number: str_field(object, "number"),
        user_id: str_field(metadata, "userId"),
        deal_id: str_field(metadata, "dealId"),
        contact: str_field(object, "customer_email"),
    }
}

fn stripe_payout(object: &Value) -> PayoutEvent {
    let metadata = &object["metadata"];

    PayoutEvent {
        reference_id: str_field(object, "id").unwrap_or_default(),
        amount: Money::from_minor_units(
            object["amount"].as_i64().unwrap_or(0),
            object["currency"].as_str(),
        ),
        invoice_ref: str_field(metadata, "invoiceId"),
        user_id: str_field(metadata, "userId"),
        deal_id: str_field(metadata, "dealId"),
        contact: str_field(metadata, "email"),
    }
}

fn paypal_sale(resource: &Value) -> InvoiceEvent {
    // The `custom` field carries our internal invoice key when the sale was
    // created by our checkout flow; otherwise fall back to the provider's
    // invoice number or a qualified sale id.
    let external_id = str_field(resource, "custom")
        .or_else(|| str_field(resource, "invoice_number"))
        .or_else(|| str_field(resource, "id").map(|id| format!("paypal:{id}")))
        .unwrap_or_default();

    let (value, currency) = paypal_amount(resource);

    InvoiceEvent {
        external_id,
        amount: Money::parse_decimal(value.as_deref(), currency.as_deref()),
        issued_at: rfc3339_field(resource, "create_time"),
        due_at: None,
        invoice_number: str_field(resource, "invoice_number"),
        user_id: None,
        deal_id: None,
        contact: str_field(&resource["payer"], "email_address")
            .or_else(|| str_field(resource, "payer_email")),
    }
}

fn paypal_payout_item(resource: &Value) -> PayoutEvent {
    let item = &resource["payout_item"];

    let reference_id = str_field(resource, "payout_item_id")
        .or_else(|| str_field(resource, "id"))
        .map(|id| format!("paypal:{id}"))
        .unwrap_or_default();

    let (value, currency) = paypal_amount(resource);

    PayoutEvent {
        reference_id,
        amount: Money::parse_decimal(value.as_deref(), currency.as_deref()),
        invoice_ref: str_field(resource, "custom")
            .or_else(|| str_field(item, "sender_item_id")),
        user_id: None,
        deal_id: None,
        contact: str_field(item, "receiver"),
    }
}

/// PayPal spells the amount differently per resource shape; take the first
/// field present.
fn paypal_amount(resource: &Value) -> (Option<String>, Option<String>) {
    for candidate in [
        &resource["amount"],
        &resource["gross_amount"],
        &resource["transaction_amount"],
        &resource["payout_item"]["amount"],
    ] {
        if let Some(value) = str_field(candidate, "value") {
            let currency = str_field(candidate, "currency_code")
                .or_else(|| str_field(candidate, "currency"));
            return (Some(value), currency);
        }
    }
    (None, None)
}

fn str_field(object: &Value, key: &str) -> Option<String> {
    object[key].as_str().map(str::to_string)
}

fn unix_field(object: &Value, key: &str) -> Option<DateTime<Utc>> {
    object[key]
        .as_i64()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn rfc3339_field(object: &Value, key: &str) -> Option<DateTime<Utc>> {
    object[key]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stripe_event(event_type: &str, object: Value) -> StripeEvent {
        StripeEvent::from_slice(
            json!({"id": "evt_1", "type": event_type, "data": {"object": object}})
                .to_string()
                .as_bytes(),
        )
        .unwrap()
    }

    fn paypal_event(event_type: &str, resource: Value) -> PayPalEvent {
        PayPalEvent::from_slice(
            json!({"id": "WH-1", "event_type": event_type, "resource": resource})
                .to_string()
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_stripe_invoice_payment_succeeded() {
        let event = stripe_event(
            "invoice.payment_succeeded",
            json!({
                "id": "in_test1",
                "amount_paid": 5000,
                "currency": "gbp",
                "number": "INV-0042",
                "created": 1_700_000_000,
                "due_date": 1_700_600_000,
                "customer_email": "payer@example.com",
                "metadata": {"invoiceId": "INV-1", "userId": "user-7", "dealId": "deal-3"}
            }),
        );

        let events = normalize_stripe(&event);
        assert_eq!(events.len(), 1);
        let CanonicalEvent::InvoiceSettled(invoice) = &events[0] else {
            panic!("expected InvoiceSettled, got {:?}", events[0]);
        };
        assert_eq!(invoice.external_id, "INV-1");
        assert_eq!(invoice.amount.minor_units, 5000);
        assert_eq!(invoice.amount.currency, "gbp");
        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-0042"));
        assert_eq!(invoice.user_id.as_deref(), Some("user-7"));
        assert_eq!(invoice.contact.as_deref(), Some("payer@example.com"));
        assert!(invoice.issued_at.is_some());
        assert!(invoice.due_at.is_some());
    }

    #[test]
    fn test_stripe_invoice_falls_back_to_object_id() {
        let event = stripe_event(
            "invoice.payment_failed",
            json!({"id": "in_9", "amount_due": 1200, "currency": "usd"}),
        );

        let events = normalize_stripe(&event);
        let CanonicalEvent::InvoiceFailed(invoice) = &events[0] else {
            panic!("expected InvoiceFailed");
        };
        assert_eq!(invoice.external_id, "in_9");
        // amount_paid absent, amount_due used.
        assert_eq!(invoice.amount.minor_units, 1200);
    }

    #[test]
    fn test_stripe_invoice_finalized() {
        let event = stripe_event("invoice.finalized", json!({"id": "in_2", "amount_due": 900}));
        assert!(matches!(
            normalize_stripe(&event)[0],
            CanonicalEvent::InvoiceFinalized(_)
        ));
    }

    #[test]
    fn test_stripe_payout_lifecycle() {
        let object = json!({
            "id": "po_1",
            "amount": 7500,
            "currency": "usd",
            "metadata": {"invoiceId": "INV-1", "userId": "user-7"}
        });

        let paid = normalize_stripe(&stripe_event("payout.paid", object.clone()));
        let CanonicalEvent::PayoutSettled(payout) = &paid[0] else {
            panic!("expected PayoutSettled");
        };
        assert_eq!(payout.reference_id, "po_1");
        assert_eq!(payout.amount.minor_units, 7500);
        assert_eq!(payout.invoice_ref.as_deref(), Some("INV-1"));

        assert!(matches!(
            normalize_stripe(&stripe_event("payout.created", object.clone()))[0],
            CanonicalEvent::PayoutInitiated(_)
        ));
        assert!(matches!(
            normalize_stripe(&stripe_event("payout.failed", object.clone()))[0],
            CanonicalEvent::PayoutFailed(_)
        ));
        assert!(matches!(
            normalize_stripe(&stripe_event("payout.canceled", object))[0],
            CanonicalEvent::PayoutCanceled(_)
        ));
    }

    #[test]
    fn test_stripe_unknown_type_is_ignored() {
        let event = stripe_event("customer.subscription.updated", json!({"id": "sub_1"}));
        assert!(normalize_stripe(&event).is_empty());
    }

    #[test]
    fn test_paypal_sale_completed() {
        let event = paypal_event(
            "PAYMENT.SALE.COMPLETED",
            json!({
                "id": "SALE-1",
                "custom": "INV-2",
                "amount": {"value": "25.50", "currency_code": "USD"},
                "create_time": "2026-02-01T10:00:00Z",
                "payer": {"email_address": "buyer@example.com"}
            }),
        );

        let events = normalize_paypal(&event);
        let CanonicalEvent::InvoiceSettled(invoice) = &events[0] else {
            panic!("expected InvoiceSettled");
        };
        assert_eq!(invoice.external_id, "INV-2");
        assert_eq!(invoice.amount.minor_units, 2550);
        assert_eq!(invoice.amount.currency, "usd");
        assert_eq!(invoice.contact.as_deref(), Some("buyer@example.com"));
        assert!(invoice.issued_at.is_some());
    }

    #[test]
    fn test_paypal_sale_without_custom_qualifies_id() {
        let event = paypal_event(
            "PAYMENT.SALE.DENIED",
            json!({"id": "SALE-9", "amount": {"total": "10.00"}}),
        );

        let CanonicalEvent::InvoiceFailed(invoice) = &normalize_paypal(&event)[0] else {
            panic!("expected InvoiceFailed");
        };
        assert_eq!(invoice.external_id, "paypal:SALE-9");
        // No parseable amount field, degrades to zero.
        assert_eq!(invoice.amount.minor_units, 0);
    }

    #[test]
    fn test_paypal_payout_item_succeeded() {
        let event = paypal_event(
            "PAYMENT.PAYOUTS-ITEM.SUCCEEDED",
            json!({
                "payout_item_id": "PI-9",
                "transaction_amount": {"value": "25.50", "currency": "USD"},
                "payout_item": {"receiver": "creator@example.com", "sender_item_id": "INV-4"}
            }),
        );

        let CanonicalEvent::PayoutSettled(payout) = &normalize_paypal(&event)[0] else {
            panic!("expected PayoutSettled");
        };
        assert_eq!(payout.reference_id, "paypal:PI-9");
        assert_eq!(payout.amount.minor_units, 2550);
        assert_eq!(payout.invoice_ref.as_deref(), Some("INV-4"));
        assert_eq!(payout.contact.as_deref(), Some("creator@example.com"));
    }

    #[test]
    fn test_paypal_payout_item_amount_from_item() {
        let event = paypal_event(
            "PAYMENT.PAYOUTS-ITEM.FAILED",
            json!({
                "payout_item_id": "PI-2",
                "payout_item": {"amount": {"value": "3.00", "currency": "EUR"}}
            }),
        );

        let CanonicalEvent::PayoutFailed(payout) = &normalize_paypal(&event)[0] else {
            panic!("expected PayoutFailed");
        };
        assert_eq!(payout.amount.minor_units, 300);
        assert_eq!(payout.amount.currency, "eur");
    }

    #[test]
    fn test_paypal_unknown_type_is_ignored() {
        let event = paypal_event("BILLING.SUBSCRIPTION.CREATED", json!({}));
        assert!(normalize_paypal(&event).is_empty());
    }
}
