//! Raw provider webhook event types.
//!
//! These are the provider-shaped payloads as delivered on the wire, parsed
//! after signature verification and before normalization.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A payment provider this service accepts webhooks from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Stripe,
    Paypal,
}

impl Provider {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::Paypal),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// A Stripe webhook event: `{id, type, data.object}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Parse a verified raw payload.
    ///
    /// The detailed parse error is logged; the caller gets a generic message
    /// so payload internals are not echoed back to the sender.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Stripe webhook payload");
            crate::error::ClearwayError::bad_request("Invalid webhook payload")
        })
    }
}

/// A PayPal webhook event: `{id, event_type, resource}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalEvent {
    pub id: String,
    pub event_type: String,
    #[serde(default)]
    pub resource: serde_json::Value,
}

impl PayPalEvent {
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse PayPal webhook payload");
            crate::error::ClearwayError::bad_request("Invalid webhook payload")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip() {
        assert_eq!(Provider::Stripe.as_str(), "stripe");
        assert_eq!(Provider::Paypal.as_str(), "paypal");
        assert_eq!(Provider::Stripe.to_string(), "stripe");
    }

    #[test]
    fn test_parse_stripe_event() {
        let payload = br#"{"id":"evt_1","type":"invoice.payment_succeeded","data":{"object":{"id":"in_1"}}}"#;
        let event = StripeEvent::from_slice(payload).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "invoice.payment_succeeded");
        assert_eq!(event.data.object["id"], "in_1");
    }

    #[test]
    fn test_parse_stripe_event_malformed() {
        assert!(StripeEvent::from_slice(b"{ nope").is_err());
        assert!(StripeEvent::from_slice(b"{}").is_err());
    }

    #[test]
    fn test_parse_paypal_event() {
        let payload = br#"{"id":"WH-1","event_type":"PAYMENT.SALE.COMPLETED","resource":{"id":"SALE-1"}}"#;
        let event = PayPalEvent::from_slice(payload).unwrap();
        assert_eq!(event.id, "WH-1");
        assert_eq!(event.event_type, "PAYMENT.SALE.COMPLETED");
    }

    #[test]
    fn test_parse_paypal_event_missing_resource() {
        let payload = br#"{"id":"WH-1","event_type":"SOMETHING.ELSE"}"#;
        let event = PayPalEvent::from_slice(payload).unwrap();
        assert!(event.resource.is_null());
    }
}
