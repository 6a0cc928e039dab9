//! Outbound email.
//!
//! The [`Mailer`] trait is the seam between the notifier and the delivery
//! transport. [`ConsoleMailer`] logs instead of sending and is the default;
//! an SMTP transport is available behind the `email-smtp` feature.

use async_trait::async_trait;

use crate::error::{ClearwayError, Result};

#[cfg(feature = "email-smtp")]
mod smtp;
#[cfg(feature = "email-smtp")]
pub use smtp::{SmtpConfig, SmtpMailer};

/// An outbound email message.
#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    #[must_use]
    pub fn new(to: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            subject: String::new(),
            body: String::new(),
        }
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Validate addresses and required fields before handing off to a
    /// transport.
    pub fn validate(&self) -> Result<()> {
        if !looks_like_address(&self.to) {
            return Err(ClearwayError::bad_request(format!(
                "Invalid recipient address: {}",
                self.to
            )));
        }
        if !looks_like_address(&self.from) {
            return Err(ClearwayError::bad_request(format!(
                "Invalid sender address: {}",
                self.from
            )));
        }
        if self.subject.is_empty() {
            return Err(ClearwayError::bad_request("Email subject is required"));
        }
        Ok(())
    }
}

fn looks_like_address(addr: &str) -> bool {
    match addr.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// Email delivery transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Mailer that logs messages instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct ConsoleMailer;

impl ConsoleMailer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;
        tracing::info!(
            to = %email.to,
            from = %email.from,
            subject = %email.subject,
            "Console mailer: email not sent"
        );
        Ok(())
    }
}
