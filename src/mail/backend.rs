//! Delivery backend selection.
//!
//! `EMAIL_BACKEND` picks how mail leaves the process: over SMTP, printed to
//! the log (local development), or not at all.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Email, MailConfig, MailError, Mailer, SmtpMailer};

/// Parsed `EMAIL_BACKEND` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryBackend {
    /// Deliver over SMTP.
    Smtp,
    /// Log the message instead of sending it.
    Console,
    /// Drop all mail. Unrecognized backend names land here too.
    Disabled,
}

impl DeliveryBackend {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "smtp" => Self::Smtp,
            "console" => Self::Console,
            _ => Self::Disabled,
        }
    }
}

impl MailConfig {
    /// The parsed delivery backend.
    pub fn delivery_backend(&self) -> DeliveryBackend {
        DeliveryBackend::parse(&self.backend)
    }
}

/// Mailer that logs messages instead of sending them.
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(
            to = ?email.to,
            subject = %email.subject,
            "console mail backend:\n{}",
            email.body.text().unwrap_or("<non-text body>")
        );
        Ok(())
    }
}

/// Mailer that skips every send, warning with the reason each time.
pub struct NullMailer {
    reason: String,
}

impl NullMailer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Mailer for NullMailer {
    async fn send(&self, _email: &Email) -> Result<(), MailError> {
        tracing::warn!("{}", self.reason);
        Err(MailError::Disabled)
    }
}

/// Construct the mailer selected by `EMAIL_BACKEND`.
///
/// An `smtp` backend without a username and password downgrades to a
/// skipping mailer rather than failing startup.
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match config.delivery_backend() {
        DeliveryBackend::Smtp if !config.is_configured() => Ok(Arc::new(NullMailer::new(
            "SMTP not configured: missing SMTP_USERNAME or SMTP_PASSWORD",
        ))),
        DeliveryBackend::Smtp => Ok(Arc::new(SmtpMailer::from_config(config)?)),
        DeliveryBackend::Console => Ok(Arc::new(ConsoleMailer)),
        DeliveryBackend::Disabled => Ok(Arc::new(NullMailer::new(format!(
            "EMAIL_BACKEND={} (expected 'smtp'); skipping send",
            config.backend
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parsing() {
        assert_eq!(DeliveryBackend::parse("smtp"), DeliveryBackend::Smtp);
        assert_eq!(DeliveryBackend::parse(""), DeliveryBackend::Smtp);
        assert_eq!(DeliveryBackend::parse("SMTP"), DeliveryBackend::Smtp);
        assert_eq!(DeliveryBackend::parse("console"), DeliveryBackend::Console);
        assert_eq!(DeliveryBackend::parse("disabled"), DeliveryBackend::Disabled);
        assert_eq!(DeliveryBackend::parse("mailgun"), DeliveryBackend::Disabled);
    }

    #[tokio::test]
    async fn console_mailer_accepts_everything() {
        let email = Email::builder()
            .to("user@example.com")
            .subject("Hello")
            .text("Hi")
            .build()
            .unwrap();

        assert!(ConsoleMailer.send(&email).await.is_ok());
    }

    #[tokio::test]
    async fn null_mailer_rejects_everything() {
        let email = Email::builder()
            .to("user@example.com")
            .subject("Hello")
            .text("Hi")
            .build()
            .unwrap();

        let mailer = NullMailer::new("EMAIL_BACKEND=disabled (expected 'smtp'); skipping send");
        let err = mailer.send(&email).await.unwrap_err();
        assert!(matches!(err, MailError::Disabled));
    }

    #[test]
    fn unconfigured_smtp_downgrades_to_skipping() {
        let config: MailConfig = serde_json::from_value(serde_json::json!({
            "smtp_username": "connect@aiforimpact.net",
        }))
        .unwrap();

        assert_eq!(config.delivery_backend(), DeliveryBackend::Smtp);
        assert!(!config.is_configured());
        assert!(build_mailer(&config).is_ok());
    }
}
