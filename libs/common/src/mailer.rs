//! Outbound transactional email
//!
//! [`Mailer`] is the dispatch contract used by the authentication flows and
//! the contact form. [`HttpMailer`] posts to a transactional email HTTP API;
//! [`LogMailer`] only logs and records messages.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// File attached to an email, base64 encoded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Email to dispatch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl EmailMessage {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
            text: text.into(),
            reply_to: None,
            attachments: Vec::new(),
        }
    }
}

/// Provider receipt for an accepted email
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentEmail {
    pub id: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email delivery failed: {0}")]
    Delivery(String),

    #[error("email provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Email dispatch contract
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<SentEmail, MailError>;
}

/// Mailer configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Endpoint accepting `POST` JSON emails
    pub api_url: String,
    /// Bearer key for the provider; no key selects the log mailer
    pub api_key: Option<String>,
    /// Sender address, e.g. `Site <no-reply@example.com>`
    pub from: String,
}

impl MailerConfig {
    /// Create a new MailerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `MAIL_API_URL`: provider endpoint (default: "https://api.resend.com/emails")
    /// - `MAIL_API_KEY`: provider key (optional)
    /// - `MAIL_FROM`: sender address (default: "no-reply@localhost")
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("MAIL_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com/emails".to_string()),
            api_key: std::env::var("MAIL_API_KEY").ok().filter(|k| !k.is_empty()),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@localhost".to_string()),
        }
    }
}

#[derive(Serialize)]
struct OutboundEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "no_attachments")]
    attachments: &'a [Attachment],
}

fn no_attachments(attachments: &&[Attachment]) -> bool {
    attachments.is_empty()
}

/// Mailer backed by a transactional email HTTP API
pub struct HttpMailer {
    client: reqwest::Client,
    config: MailerConfig,
    api_key: String,
}

impl HttpMailer {
    pub fn new(config: MailerConfig, api_key: String) -> Self {
        info!("HTTP mailer initialized for {}", config.api_url);
        Self {
            client: reqwest::Client::new(),
            config,
            api_key,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: EmailMessage) -> Result<SentEmail, MailError> {
        let body = OutboundEmail {
            from: &self.config.from,
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html,
            text: &message.text,
            reply_to: message.reply_to.as_deref(),
            attachments: &message.attachments,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Email dispatch to provider failed: {}", e);
                MailError::Delivery(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Email provider rejected message");
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let sent: SentEmail = response
            .json()
            .await
            .map_err(|e| MailError::Delivery(format!("unreadable provider response: {e}")))?;

        info!(email_id = %sent.id, subject = %message.subject, "Email dispatched");
        Ok(sent)
    }
}

/// Mailer that logs and keeps every message in memory
#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    /// Most recent message addressed to `to`
    pub async fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.to == to)
            .cloned()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<SentEmail, MailError> {
        let id = Uuid::new_v4().to_string();
        info!(email_id = %id, to = %message.to, subject = %message.subject, "Email recorded (log mailer)");
        self.sent.lock().await.push(message);
        Ok(SentEmail { id })
    }
}

/// Build the mailer selected by `config`
pub fn build_mailer(config: MailerConfig) -> Arc<dyn Mailer> {
    match config.api_key.clone() {
        Some(key) => Arc::new(HttpMailer::new(config, key)),
        None => {
            warn!("MAIL_API_KEY not set, emails will only be logged");
            Arc::new(LogMailer::new())
        }
    }
}

/// Escape text for inclusion in an HTML email body
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_records_messages() {
        let mailer = LogMailer::new();
        let receipt = mailer
            .send(EmailMessage::new("a@example.com", "Hello", "<p>Hi</p>", "Hi"))
            .await
            .unwrap();

        assert!(!receipt.id.is_empty());
        assert_eq!(mailer.sent().await.len(), 1);
        assert_eq!(
            mailer.last_to("a@example.com").await.unwrap().subject,
            "Hello"
        );
        assert!(mailer.last_to("b@example.com").await.is_none());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x & y")</script>"#),
            "&lt;script&gt;alert(&quot;x &amp; y&quot;)&lt;/script&gt;"
        );
    }
}
