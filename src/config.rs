use secrecy::SecretString;
use std::net::SocketAddr;

use crate::error::{ClearwayError, Result};

/// Main configuration for the clearway service.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub providers: ProviderConfig,
    pub mail: MailConfig,
    /// Database connection URL (used when the `database` feature is enabled).
    pub database_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Webhook credentials for each payment provider.
///
/// A provider with no secret configured is simply absent: its endpoint
/// answers 503 and no verification is ever attempted. Secrets are held in
/// [`SecretString`] so they cannot leak through debug output.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub stripe_webhook_secret: Option<SecretString>,
    pub paypal_webhook_id: Option<String>,
    pub paypal_webhook_secret: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Default sender address for settlement notifications.
    pub from: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            providers: ProviderConfig::default(),
            mail: MailConfig::default(),
            database_url: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "billing@localhost".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ClearwayError::internal(format!("Invalid server address: {}", e)))
    }
}

/// Builder for [`Config`] with environment variable support.
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_stripe_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.providers.stripe_webhook_secret = Some(SecretString::new(secret.into()));
        self
    }

    pub fn with_paypal_credentials(
        mut self,
        webhook_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.config.providers.paypal_webhook_id = Some(webhook_id.into());
        self.config.providers.paypal_webhook_secret = Some(SecretString::new(secret.into()));
        self
    }

    pub fn with_mail_from(mut self, from: impl Into<String>) -> Self {
        self.config.mail.from = from.into();
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    /// Load configuration from environment variables.
    ///
    /// - `CLEARWAY_HOST`, `CLEARWAY_PORT`
    /// - `CLEARWAY_LOG_LEVEL`, `CLEARWAY_LOG_JSON`
    /// - `CLEARWAY_MAIL_FROM`
    /// - `CLEARWAY_DATABASE_URL`
    /// - `STRIPE_WEBHOOK_SECRET`
    /// - `PAYPAL_WEBHOOK_ID`, `PAYPAL_WEBHOOK_SECRET`
    pub fn from_env(mut self) -> Self {
        if let Ok(host) = std::env::var("CLEARWAY_HOST") {
            self.config.server.host = host;
        }
        if let Ok(port) = std::env::var("CLEARWAY_PORT") {
            if let Ok(port) = port.parse() {
                self.config.server.port = port;
            }
        }
        if let Ok(level) = std::env::var("CLEARWAY_LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Ok(json) = std::env::var("CLEARWAY_LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        if let Ok(from) = std::env::var("CLEARWAY_MAIL_FROM") {
            self.config.mail.from = from;
        }
        if let Ok(url) = std::env::var("CLEARWAY_DATABASE_URL") {
            self.config.database_url = Some(url);
        }
        if let Ok(secret) = std::env::var("STRIPE_WEBHOOK_SECRET") {
            self.config.providers.stripe_webhook_secret = Some(SecretString::new(secret));
        }
        if let Ok(id) = std::env::var("PAYPAL_WEBHOOK_ID") {
            self.config.providers.paypal_webhook_id = Some(id);
        }
        if let Ok(secret) = std::env::var("PAYPAL_WEBHOOK_SECRET") {
            self.config.providers.paypal_webhook_secret = Some(SecretString::new(secret));
        }
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<Config> {
        if self.config.server.port == 0 {
            return Err(ClearwayError::internal("Invalid server address: port 0"));
        }
        self.config.server.addr()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level = self.config.logging.level.to_lowercase();
        // Accept bare levels and EnvFilter directives like "clearway=debug".
        if !valid_levels.contains(&level.as_str()) && !level.contains('=') {
            return Err(ClearwayError::internal(format!(
                "Invalid log level: {}",
                self.config.logging.level
            )));
        }

        // PayPal verification needs both the webhook id and the secret.
        let providers = &self.config.providers;
        if providers.paypal_webhook_secret.is_some() != providers.paypal_webhook_id.is_some() {
            return Err(ClearwayError::internal(
                "PayPal configuration requires both PAYPAL_WEBHOOK_ID and PAYPAL_WEBHOOK_SECRET",
            ));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
