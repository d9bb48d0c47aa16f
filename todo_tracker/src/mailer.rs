//! Outgoing email.
//!
//! Handlers hand a [`EmailMessage`] to a [`Mailer`] from a background task so
//! delivery never delays the response. Delivery itself is pluggable; the
//! default [`LogMailer`] writes the rendered message to the log.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

/// Templates the service knows how to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Sent on registration with the first activation token
    UserWelcome,
    /// Sent when a new activation token is requested
    TokenActivation,
}

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub recipient: String,
    pub template: Template,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Welcome email carrying the user's id and first activation token.
    pub fn user_welcome(recipient: &str, user_id: i64, activation_token: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            template: Template::UserWelcome,
            subject: "Welcome to Todo Tracker!".to_string(),
            body: format!(
                "Hi,\n\n\
                 Thanks for signing up. Your user ID number is {user_id}.\n\n\
                 To activate your account, send a PUT request to /v1/users/activation with:\n\n\
                 {{\"token\": \"{activation_token}\"}}\n\n\
                 This token is valid for 3 days and can only be used once.\n"
            ),
        }
    }

    /// Replacement activation token.
    pub fn token_activation(recipient: &str, activation_token: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            template: Template::TokenActivation,
            subject: "Activate your Todo Tracker account".to_string(),
            body: format!(
                "Hi,\n\n\
                 To activate your account, send a PUT request to /v1/users/activation with:\n\n\
                 {{\"token\": \"{activation_token}\"}}\n\n\
                 This token is valid for 3 days and can only be used once.\n"
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
}

/// Email delivery abstraction
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Logs messages instead of delivering them.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        log::info!(
            "email from {} to {} ({:?}): {}",
            self.sender,
            message.recipient,
            message.template,
            message.subject
        );
        log::debug!("email body:\n{}", message.body);
        Ok(())
    }
}

/// Keeps every sent message; used by tests to pick up activation tokens.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent message delivered to `recipient`
    pub fn last_for(&self, recipient: &str) -> Option<EmailMessage> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.recipient == recipient)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        match self.sent.lock() {
            Ok(mut sent) => {
                sent.push(message.clone());
                Ok(())
            }
            Err(_) => Err(MailError::Delivery {
                recipient: message.recipient.clone(),
                reason: "mailbox lock poisoned".to_string(),
            }),
        }
    }
}

/// Pull the activation token out of a rendered body.
pub fn extract_token(body: &str) -> Option<&str> {
    let start = body.find("{\"token\": \"")? + "{\"token\": \"".len();
    let len = body[start..].find('"')?;
    Some(&body[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_contains_token_and_id() {
        let msg = EmailMessage::user_welcome("a@b.co", 42, "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert_eq!(msg.template, Template::UserWelcome);
        assert!(msg.body.contains("user ID number is 42"));
        assert_eq!(extract_token(&msg.body), Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
    }

    #[tokio::test]
    async fn test_memory_mailer_records() {
        let mailer = MemoryMailer::new();
        mailer
            .send(&EmailMessage::token_activation("a@b.co", "TOKEN1"))
            .await
            .unwrap();
        mailer
            .send(&EmailMessage::token_activation("a@b.co", "TOKEN2"))
            .await
            .unwrap();

        assert_eq!(mailer.sent().len(), 2);
        let last = mailer.last_for("a@b.co").unwrap();
        assert_eq!(extract_token(&last.body), Some("TOKEN2"));
        assert!(mailer.last_for("c@d.co").is_none());
    }
}
