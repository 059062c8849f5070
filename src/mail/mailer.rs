//! Mailer trait and SMTP implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use crate::config::coerce_bool;

use super::{Email, EmailBody, MailError};

/// Async email sending trait.
///
/// Implement this trait to provide alternative email backends (e.g., SES, Mailgun).
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Send an email.
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// SMTP connection security, derived from the port and `SMTP_STARTTLS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS from the first byte (SMTPS, port 465).
    Implicit,
    /// Plaintext connection upgraded via the STARTTLS command.
    StartTls,
    /// No transport encryption.
    None,
}

impl std::fmt::Display for TlsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Implicit => write!(f, "implicit TLS"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::None => write!(f, "plaintext"),
        }
    }
}

/// Configuration for outgoing email, read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Delivery backend: "smtp" (default), "console", or "disabled".
    #[serde(rename = "email_backend", default = "default_backend")]
    pub backend: String,

    /// SMTP server hostname.
    #[serde(rename = "smtp_host", default = "default_host")]
    pub host: String,

    /// SMTP server port (default: 587).
    #[serde(rename = "smtp_port", default = "default_port")]
    pub port: u16,

    /// SMTP username for authentication.
    #[serde(rename = "smtp_username")]
    pub username: Option<String>,

    /// SMTP password for authentication.
    #[serde(rename = "smtp_password")]
    pub password: Option<String>,

    /// File holding the SMTP password, consulted when `SMTP_PASSWORD` is unset.
    #[serde(rename = "smtp_password_file")]
    pub password_file: Option<String>,

    /// Last-resort password source, for providers that issue app passwords.
    #[serde(rename = "smtp_app_password")]
    pub app_password: Option<String>,

    /// Default sender address.
    #[serde(rename = "smtp_from", default = "default_from")]
    pub from: String,

    /// STARTTLS override. Unset means: derive from the port.
    #[serde(rename = "smtp_starttls")]
    pub starttls: Option<String>,

    /// Force an AUTH mechanism ("PLAIN", "LOGIN", or "XOAUTH2") instead of
    /// letting the server advertise one.
    #[serde(rename = "smtp_auth_method")]
    pub auth_method: Option<String>,

    /// Connection timeout in seconds (default: 10).
    #[serde(rename = "smtp_timeout", default = "default_timeout")]
    pub timeout: u64,
}

fn default_backend() -> String {
    "smtp".to_string()
}

fn default_host() -> String {
    "smtp.zoho.com".to_string()
}

fn default_port() -> u16 {
    587
}

fn default_from() -> String {
    "Ai For Impact <connect@aiforimpact.net>".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl MailConfig {
    /// Read configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, MailError> {
        dotenvy::dotenv().ok();

        serde_env::from_env().map_err(|e| MailError::MissingConfig(e.to_string()))
    }

    /// The explicit `SMTP_STARTTLS` setting, if it parses as a boolean.
    fn starttls_override(&self) -> Option<bool> {
        self.starttls.as_deref().and_then(coerce_bool)
    }

    /// Whether to issue STARTTLS on a plaintext connection.
    ///
    /// Defaults to true except on ports 25, 465, and 2525.
    pub fn starttls_enabled(&self) -> bool {
        self.starttls_override()
            .unwrap_or(!matches!(self.port, 25 | 465 | 2525))
    }

    /// Connection security for the configured port.
    ///
    /// Port 465 always means implicit TLS; `SMTP_STARTTLS` cannot downgrade it.
    pub fn tls_mode(&self) -> TlsMode {
        if self.port == 465 {
            TlsMode::Implicit
        } else if self.starttls_enabled() {
            TlsMode::StartTls
        } else {
            TlsMode::None
        }
    }

    /// Resolve the password chain: `SMTP_PASSWORD`, then the contents of
    /// `SMTP_PASSWORD_FILE` (trimmed), then `SMTP_APP_PASSWORD`.
    pub fn resolve_password(&self) -> Option<String> {
        if let Some(password) = self.password.as_deref() {
            if !password.is_empty() {
                return Some(password.to_string());
            }
        }

        if let Some(path) = self.password_file.as_deref() {
            if !path.is_empty() {
                match std::fs::read_to_string(path) {
                    Ok(contents) => {
                        let trimmed = contents.trim();
                        if !trimmed.is_empty() {
                            return Some(trimmed.to_string());
                        }
                    }
                    Err(e) => {
                        tracing::warn!("failed to read SMTP_PASSWORD_FILE {path}: {e}");
                    }
                }
            }
        }

        self.app_password.clone().filter(|p| !p.is_empty())
    }

    /// The forced AUTH mechanism, if `SMTP_AUTH_METHOD` is set.
    pub fn auth_mechanism(&self) -> Result<Option<Mechanism>, MailError> {
        let Some(method) = self.auth_method.as_deref() else {
            return Ok(None);
        };

        match method.trim().to_ascii_uppercase().as_str() {
            "" => Ok(None),
            "PLAIN" => Ok(Some(Mechanism::Plain)),
            "LOGIN" => Ok(Some(Mechanism::Login)),
            "XOAUTH2" => Ok(Some(Mechanism::Xoauth2)),
            other => Err(MailError::Config(format!(
                "unsupported SMTP_AUTH_METHOD: {other}"
            ))),
        }
    }

    /// Whether enough is set to attempt an authenticated SMTP session.
    pub fn is_configured(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.resolve_password().is_some()
    }
}

/// SMTP-based mailer using lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a mailer from environment variables.
    pub fn from_env() -> Result<Self, MailError> {
        Self::from_config(&MailConfig::from_env()?)
    }

    /// Create a mailer from explicit configuration.
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from.clone()))?;

        if config.port == 465 && config.starttls_override() == Some(true) {
            tracing::debug!(
                "SMTP_STARTTLS is enabled but port is 465; implicit TLS connection will be used"
            );
        }

        let mut builder = match config.tls_mode() {
            TlsMode::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout)));

        if let Some(mechanism) = config.auth_mechanism()? {
            builder = builder.authentication(vec![mechanism]);
        }

        if let (Some(username), Some(password)) = (config.username.clone(), config.resolve_password())
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        let transport = builder.build();

        Ok(Self {
            transport: Arc::new(transport),
            from,
        })
    }

    /// Build a lettre Message from our Email type.
    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let from_mailbox = email
            .from
            .as_ref()
            .map(|f| f.parse())
            .transpose()
            .map_err(|_| MailError::InvalidAddress(email.from.clone().unwrap_or_default()))?
            .unwrap_or_else(|| self.from.clone());

        let mut builder = Message::builder().from(from_mailbox);

        for to in &email.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|_| MailError::InvalidAddress(to.clone()))?;
            builder = builder.to(mailbox);
        }

        for cc in &email.cc {
            let mailbox: Mailbox = cc
                .parse()
                .map_err(|_| MailError::InvalidAddress(cc.clone()))?;
            builder = builder.cc(mailbox);
        }

        for bcc in &email.bcc {
            let mailbox: Mailbox = bcc
                .parse()
                .map_err(|_| MailError::InvalidAddress(bcc.clone()))?;
            builder = builder.bcc(mailbox);
        }

        if let Some(reply_to) = &email.reply_to {
            let mailbox: Mailbox = reply_to
                .parse()
                .map_err(|_| MailError::InvalidAddress(reply_to.clone()))?;
            builder = builder.reply_to(mailbox);
        }

        builder = builder.subject(&email.subject);

        let message = match &email.body {
            EmailBody::Text(text) => builder
                .body(text.clone())
                .map_err(|e| MailError::Build(e.to_string()))?,
            EmailBody::Html(html) => builder
                .singlepart(SinglePart::html(html.clone()))
                .map_err(|e| MailError::Build(e.to_string()))?,
            EmailBody::Multipart { text, html } => builder
                .multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))
                .map_err(|e| MailError::Build(e.to_string()))?,
        };

        Ok(message)
    }
}

/// The remediation checklist for SMTP 535 rejections, tailored to the
/// resolved configuration.
pub fn auth_rejection_hints(config: &MailConfig) -> Vec<String> {
    let mut hints = vec![
        "verify SMTP_USERNAME and SMTP_PASSWORD are the exact credentials issued by the provider"
            .to_string(),
    ];

    if config.host.contains("zoho") {
        hints.push(
            "match the host to the account's data center: smtp.zoho.com for US accounts, \
             smtp.zoho.eu for EU accounts"
                .to_string(),
        );
    }

    hints.push("accounts with MFA enabled must use an app-specific password".to_string());
    hints.push("enable IMAP/POP access for the mailbox before SMTP login will work".to_string());

    if let Some(username) = config.username.as_deref() {
        if let (Some(from_domain), Some(user_domain)) =
            (mail_domain(&config.from), mail_domain(username))
        {
            if !from_domain.eq_ignore_ascii_case(user_domain) {
                hints.push(format!(
                    "SMTP_FROM domain ({from_domain}) does not match SMTP_USERNAME domain \
                     ({user_domain}); providers often reject mismatched senders"
                ));
            }
        }
    }

    hints
}

/// Emit the 535 remediation checklist at warn level.
pub fn log_auth_hints(config: &MailConfig) {
    for hint in auth_rejection_hints(config) {
        tracing::warn!("SMTP auth hint: {hint}");
    }
}

/// Domain part of an address, accepting both `addr` and `Name <addr>` forms.
fn mail_domain(addr: &str) -> Option<&str> {
    let addr = addr
        .rsplit_once('<')
        .map_or(addr, |(_, rest)| rest.trim_end_matches('>').trim());
    addr.rsplit_once('@').map(|(_, domain)| domain.trim())
}

/// Map a lettre SMTP error, pulling authentication rejections (reply code
/// 535) out into their own variant so callers can attach provider hints.
fn classify_smtp_error(err: lettre::transport::smtp::Error) -> MailError {
    let rendered = err.to_string();
    let rejected = matches!(err.status(), Some(code) if code.to_string() == "535")
        || (err.is_permanent() && rendered.contains("535"));

    if rejected {
        MailError::AuthRejected(rendered)
    } else {
        MailError::Smtp(rendered)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = self.build_message(email)?;

        self.transport.send(message).await.map_err(classify_smtp_error)?;

        Ok(())
    }
}
