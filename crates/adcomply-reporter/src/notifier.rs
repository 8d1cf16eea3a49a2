//! Notification channels
//!
//! Recipients are plain or `mailto:` email addresses (SMTP) and `http(s)://`
//! URLs (webhook POST). Every error a notifier returns says whether another
//! attempt may succeed.

use adcomply_core::{Error, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SmtpConfig;

/// A rendered message ready for any channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub subject: String,

    /// Rendered HTML for email recipients
    #[serde(skip)]
    pub html: String,

    /// JSON body for webhook recipients
    pub payload: serde_json::Value,
}

/// Parsed recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Email(String),
    Webhook(String),
}

impl Recipient {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(Self::Webhook(trimmed.to_string()));
        }
        let address = trimmed.strip_prefix("mailto:").unwrap_or(trimmed);
        if address.contains('@') {
            return Ok(Self::Email(address.to_string()));
        }
        Err(Error::delivery_permanent(raw, "unrecognised recipient"))
    }

    /// Channel label for logs and metrics
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Webhook(_) => "webhook",
        }
    }
}

/// Delivers a notification to one recipient
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<()>;
}

/// JSON POST to webhook URLs
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build webhook client: {e}")))?;
        Ok(Self { client })
    }

    pub async fn post(&self, url: &str, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(&notification.payload)
            .send()
            .await
            .map_err(|e| Error::delivery(url, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(url, status = status.as_u16(), "Webhook delivered");
            return Ok(());
        }
        let reason = format!("webhook returned {status}");
        // Client errors other than timeout / rate limiting will not improve on retry
        if status.is_client_error() && status.as_u16() != 408 && status.as_u16() != 429 {
            Err(Error::delivery_permanent(url, reason))
        } else {
            Err(Error::delivery(url, reason))
        }
    }
}

/// HTML email over an SMTP relay
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig, timeout: Duration) -> Result<Self> {
        let sender: Mailbox = config
            .sender
            .parse()
            .map_err(|e| Error::config(format!("invalid smtp sender {:?}: {e}", config.sender)))?;

        let builder = if !config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        } else if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| Error::config(format!("invalid smtp relay {}: {e}", config.host)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| Error::config(format!("invalid smtp relay {}: {e}", config.host)))?
        };

        let mut builder = builder.port(config.port).timeout(Some(timeout));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
        })
    }

    pub async fn mail(&self, address: &str, notification: &Notification) -> Result<()> {
        let to: Mailbox = address
            .parse()
            .map_err(|e| Error::delivery_permanent(address, format!("invalid address: {e}")))?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(notification.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(notification.html.clone())
            .map_err(|e| Error::delivery_permanent(address, format!("failed to build message: {e}")))?;

        match self.transport.send(message).await {
            Ok(_) => {
                debug!(recipient = address, "Email delivered");
                Ok(())
            }
            Err(e) if e.is_permanent() => Err(Error::delivery_permanent(address, e.to_string())),
            Err(e) => Err(Error::delivery(address, e.to_string())),
        }
    }
}

/// Routes each recipient to its channel
pub struct ChannelNotifier {
    webhook: WebhookNotifier,
    smtp: Option<SmtpNotifier>,
}

impl ChannelNotifier {
    pub fn new(smtp_config: Option<&SmtpConfig>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            webhook: WebhookNotifier::new(timeout)?,
            smtp: smtp_config.map(|config| SmtpNotifier::new(config, timeout)).transpose()?,
        })
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<()> {
        match Recipient::parse(recipient)? {
            Recipient::Webhook(url) => self.webhook.post(&url, notification).await,
            Recipient::Email(address) => match &self.smtp {
                Some(smtp) => smtp.mail(&address, notification).await,
                None => Err(Error::delivery_permanent(recipient, "no smtp_config for email recipient")),
            },
        }
    }
}
