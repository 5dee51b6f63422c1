//! Outbound e-mail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("no recipients")]
    NoRecipients,

    #[error("mail transport failed: {0}")]
    Transport(String),

    #[error("mail API rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub id: Uuid,
    pub to: Vec<EmailAddress>,
    pub subject: String,
    /// HTML body.
    pub content: String,
}

impl EmailMessage {
    pub fn new(to: Vec<EmailAddress>, subject: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            to,
            subject: subject.into(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends one message addressed to every recipient. All or nothing from the
    /// caller's point of view.
    async fn send_to_many(&self, message: &EmailMessage) -> Result<(), NotificationError>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_to_many(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        if message.to.is_empty() {
            return Err(NotificationError::NoRecipients);
        }
        info!(
            message_id = %message.id,
            recipients = message.to.len(),
            subject = %message.subject,
            "email not delivered (log transport)"
        );
        Ok(())
    }
}

/// Posts messages as JSON to a transactional mail API.
#[derive(Debug, Clone)]
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: EmailAddress,
}

#[derive(Serialize)]
struct MailPayload<'a> {
    message_id: String,
    from: &'a EmailAddress,
    to: &'a [EmailAddress],
    subject: &'a str,
    html: &'a str,
}

impl HttpEmailSender {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, from: EmailAddress) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            from,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_to_many(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        if message.to.is_empty() {
            return Err(NotificationError::NoRecipients);
        }

        let payload = MailPayload {
            message_id: message.id.to_string(),
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.content,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(message_id = %message.id, recipients = message.to.len(), "email accepted by mail API");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_sender_requires_recipients() {
        let sender = LogEmailSender;
        let empty = EmailMessage::new(Vec::new(), "Hi", "<p>Hello</p>");
        assert!(matches!(
            sender.send_to_many(&empty).await,
            Err(NotificationError::NoRecipients)
        ));

        let one = EmailMessage::new(
            vec![EmailAddress {
                name: "Fred Flintstone".to_string(),
                address: "fred@bedrock.ca".to_string(),
            }],
            "Hi",
            "<p>Hello</p>",
        );
        assert!(sender.send_to_many(&one).await.is_ok());
    }

    #[test]
    fn messages_get_distinct_ids() {
        let a = EmailMessage::new(Vec::new(), "a", "a");
        let b = EmailMessage::new(Vec::new(), "a", "a");
        assert_ne!(a.id, b.id);
    }
}
