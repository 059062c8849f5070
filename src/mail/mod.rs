//! Outgoing email: message model, SMTP transport, and background delivery.
//!
//! This module is a thin abstraction over [lettre](https://lettre.rs) with
//! environment-based configuration. Delivery runs either inline (`Mailer`)
//! or through the outbox queue for notifications that must not block a
//! request.
//!
//! # Quick Start
//!
//! ```ignore
//! // 1. Pick a backend from the environment
//! let config = MailConfig::from_env()?;
//! let mailer = build_mailer(&config)?;
//!
//! // 2. Send directly
//! let email = Email::builder()
//!     .to("user@example.com")
//!     .subject("Welcome!")
//!     .text("Thanks for signing up.")
//!     .build()?;
//! mailer.send(&email).await?;
//!
//! // 3. Or queue for background delivery
//! let outbox = MemoryOutbox::new();
//! enqueue(&outbox, "registration_notice", email).await?;
//! ```
//!
//! # Environment Variables
//!
//! [`MailConfig::from_env`] reads:
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `EMAIL_BACKEND` | No | `smtp` (default), `console`, or `disabled` |
//! | `SMTP_HOST` | No | SMTP server hostname (default: `smtp.zoho.com`) |
//! | `SMTP_PORT` | No | Submission port (default: 587; 465 = implicit TLS) |
//! | `SMTP_USERNAME` | No | Username for authentication |
//! | `SMTP_PASSWORD` | No | Password for authentication |
//! | `SMTP_PASSWORD_FILE` | No | File read when `SMTP_PASSWORD` is unset |
//! | `SMTP_APP_PASSWORD` | No | Final password fallback |
//! | `SMTP_FROM` | No | Default sender address |
//! | `SMTP_STARTTLS` | No | Force STARTTLS; default derived from the port |
//! | `SMTP_AUTH_METHOD` | No | Force `PLAIN`, `LOGIN`, or `XOAUTH2` |
//! | `SMTP_TIMEOUT` | No | Connection timeout in seconds (default: 10) |

mod backend;
mod mailer;
mod message;
mod outbox;

pub use backend::{build_mailer, ConsoleMailer, DeliveryBackend, NullMailer};
pub use mailer::{auth_rejection_hints, log_auth_hints, MailConfig, Mailer, SmtpMailer, TlsMode};
pub use message::{Email, EmailBody, EmailBuilder};
pub use outbox::{
    enqueue, enqueue_with, DeliveryOpts, DeliveryStatus, DeliveryWorker, MemoryOutbox,
    OutboxEntry, OutboxError, OutboxStore,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("missing required config: {0}")]
    MissingConfig(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("SMTP authentication rejected: {0}")]
    AuthRejected(String),

    #[error("email backend is disabled")]
    Disabled,
}

impl MailError {
    /// Whether a retry could plausibly succeed. Auth rejections, malformed
    /// addresses, and a disabled backend fail the same way every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Smtp(_))
    }
}
