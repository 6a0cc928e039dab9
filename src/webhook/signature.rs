//! Webhook signature verification.
//!
//! Pure validation against the raw request body: no side effects, and the
//! pipeline must stop on failure. Both verifiers hold their secret in
//! [`SecretString`] and use constant-time comparison via the `subtle` crate.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{ClearwayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Seconds of clock skew tolerated on the Stripe signature timestamp.
const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies the Stripe `stripe-signature` header.
///
/// The header carries `t=<timestamp>,v1=<hex hmac>`; the signed payload is
/// `"{timestamp}.{raw_body}"`. Timestamps outside the tolerance window are
/// rejected to limit replay of captured deliveries.
pub struct StripeSignatureVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl StripeSignatureVerifier {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify the signature header against the raw body.
    ///
    /// # Errors
    /// Returns `BadRequest` on a malformed header, an expired timestamp, or a
    /// signature mismatch.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<()> {
        let parts = parse_signature_header(signature_header)?;

        let now = unix_now();
        if (now - parts.timestamp).abs() > self.tolerance_secs {
            return Err(ClearwayError::bad_request("Webhook timestamp too old"));
        }

        let timestamp = parts.timestamp.to_string();
        let mut signed_payload = Vec::with_capacity(timestamp.len() + payload.len() + 1);
        signed_payload.extend_from_slice(timestamp.as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(payload);

        let expected = compute_hmac(self.secret.expose_secret(), &signed_payload)?;

        let provided = hex::decode(&parts.signature)
            .map_err(|_| ClearwayError::bad_request("Invalid Stripe signature"))?;

        if expected.ct_eq(&provided).unwrap_u8() != 1 {
            return Err(ClearwayError::bad_request("Invalid Stripe signature"));
        }

        Ok(())
    }
}

/// Verifies the PayPal `paypal-transmission-sig` header.
///
/// The signed message is `"{webhook_id}:{transmission_time}:{raw_body}"` and
/// the header carries the base64-encoded HMAC-SHA256 of it.
pub struct PayPalSignatureVerifier {
    webhook_id: String,
    secret: SecretString,
}

impl PayPalSignatureVerifier {
    #[must_use]
    pub fn new(webhook_id: impl Into<String>, secret: SecretString) -> Self {
        Self {
            webhook_id: webhook_id.into(),
            secret,
        }
    }

    /// Verify the transmission signature against the raw body.
    ///
    /// # Errors
    /// Returns `BadRequest` on any mismatch.
    pub fn verify(
        &self,
        payload: &[u8],
        transmission_time: &str,
        transmission_sig: &str,
    ) -> Result<()> {
        let mut message =
            Vec::with_capacity(self.webhook_id.len() + transmission_time.len() + payload.len() + 2);
        message.extend_from_slice(self.webhook_id.as_bytes());
        message.push(b':');
        message.extend_from_slice(transmission_time.as_bytes());
        message.push(b':');
        message.extend_from_slice(payload);

        let digest = compute_hmac(self.secret.expose_secret(), &message)?;
        let expected = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, digest);

        if expected
            .as_bytes()
            .ct_eq(transmission_sig.as_bytes())
            .unwrap_u8()
            != 1
        {
            return Err(ClearwayError::bad_request("Invalid PayPal signature"));
        }

        Ok(())
    }
}

struct SignatureParts {
    timestamp: i64,
    signature: String,
}

/// Parse the `stripe-signature` header (`t=...,v1=...`).
fn parse_signature_header(header: &str) -> Result<SignatureParts> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            return Err(ClearwayError::bad_request("Invalid Stripe signature"));
        };

        match key.trim() {
            "t" => timestamp = value.parse().ok(),
            "v1" => signature = Some(value.to_string()),
            _ => {} // Ignore other scheme versions.
        }
    }

    match (timestamp, signature) {
        (Some(timestamp), Some(signature)) => Ok(SignatureParts {
            timestamp,
            signature,
        }),
        _ => Err(ClearwayError::bad_request("Invalid Stripe signature")),
    }
}

fn compute_hmac(secret: &str, message: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ClearwayError::internal("HMAC key error"))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0) as i64
}
