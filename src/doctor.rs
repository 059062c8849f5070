//! SMTP preflight for the `doctor` subcommand.
//!
//! Runs static checks over the resolved mail configuration, prints the
//! provider runbook for 535 rejections, and can optionally push a live test
//! message through the configured transport.

use crate::mail::{
    auth_rejection_hints, build_mailer, DeliveryBackend, Email, MailConfig, MailError, TlsMode,
};
use crate::notify;

/// Severity of a single preflight check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl CheckStatus {
    fn symbol(self) -> &'static str {
        match self {
            Self::Pass => "✓",
            Self::Warn => "!",
            Self::Fail => "✗",
        }
    }
}

/// One line of the preflight report.
#[derive(Debug)]
pub struct Check {
    pub label: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    fn pass(label: &'static str, detail: impl Into<String>) -> Self {
        Self {
            label,
            status: CheckStatus::Pass,
            detail: detail.into(),
        }
    }

    fn warn(label: &'static str, detail: impl Into<String>) -> Self {
        Self {
            label,
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn fail(label: &'static str, detail: impl Into<String>) -> Self {
        Self {
            label,
            status: CheckStatus::Fail,
            detail: detail.into(),
        }
    }
}

/// Zoho data centers and the accounts they serve.
const ZOHO_REGIONS: [(&str, &str); 2] = [("smtp.zoho.com", "US"), ("smtp.zoho.eu", "EU")];

/// Run every static check against the resolved configuration.
pub fn preflight(config: &MailConfig) -> Vec<Check> {
    let mut checks = Vec::new();

    checks.push(match config.delivery_backend() {
        DeliveryBackend::Smtp => Check::pass("backend", "delivery over SMTP"),
        DeliveryBackend::Console => Check::warn(
            "backend",
            "console backend: messages print to the log instead of sending",
        ),
        DeliveryBackend::Disabled => Check::fail(
            "backend",
            format!(
                "EMAIL_BACKEND={} is not a delivery backend; every send is skipped",
                config.backend
            ),
        ),
    });

    checks.push(
        if !config.username.as_deref().is_some_and(|u| !u.is_empty()) {
            Check::fail("credentials", "SMTP_USERNAME is not set")
        } else if config.resolve_password().is_none() {
            Check::fail(
                "credentials",
                "no password found in SMTP_PASSWORD, SMTP_PASSWORD_FILE, or SMTP_APP_PASSWORD",
            )
        } else {
            Check::pass("credentials", "username and password resolved")
        },
    );

    if let Some((host, region)) = ZOHO_REGIONS
        .iter()
        .find(|(host, _)| config.host.eq_ignore_ascii_case(host))
    {
        checks.push(Check::pass(
            "provider",
            format!("{host} serves {region}-region Zoho accounts"),
        ));
    }

    checks.push(security_check(config));

    checks.push(
        match config.from.parse::<lettre::message::Mailbox>() {
            Ok(_) => Check::pass("sender", config.from.clone()),
            Err(_) => Check::fail(
                "sender",
                format!("SMTP_FROM does not parse as a mailbox: {}", config.from),
            ),
        },
    );

    checks.push(match config.auth_mechanism() {
        Ok(None) => Check::pass("auth", "mechanism negotiated with the server"),
        Ok(Some(mechanism)) => Check::pass("auth", format!("forced {mechanism:?}")),
        Err(err) => Check::fail("auth", err.to_string()),
    });

    checks
}

fn security_check(config: &MailConfig) -> Check {
    let port = config.port;
    match config.tls_mode() {
        TlsMode::Implicit => {
            let mut detail = format!("implicit TLS on port {port}");
            if port == 465 {
                detail.push_str(" (the SSL port)");
            }
            if config.starttls_enabled() && config.starttls.is_some() {
                detail.push_str("; SMTP_STARTTLS is ignored here");
            }
            Check::pass("security", detail)
        }
        TlsMode::StartTls => {
            let mut detail = format!("STARTTLS upgrade on port {port}");
            if port == 587 {
                detail.push_str(" (the submission port)");
            }
            Check::pass("security", detail)
        }
        TlsMode::None => Check::warn(
            "security",
            format!("plaintext session on port {port}; credentials travel unencrypted"),
        ),
    }
}

/// Whether the preflight found no hard failures. Warnings still pass.
pub fn passed(checks: &[Check]) -> bool {
    !checks.iter().any(|c| c.status == CheckStatus::Fail)
}

/// Render the report shown by `doctor`.
pub fn render_report(config: &MailConfig, checks: &[Check]) -> String {
    let mut out = format!(
        "SMTP preflight for {}:{} ({})\n\n",
        config.host,
        config.port,
        config.tls_mode()
    );

    for check in checks {
        out.push_str(&format!(
            "  {} {:<12} {}\n",
            check.status.symbol(),
            check.label,
            check.detail
        ));
    }

    out.push_str("\nIf the provider rejects authentication with a 535, work through:\n");
    for (index, hint) in auth_rejection_hints(config).iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", index + 1, hint));
    }

    out
}

fn test_email(config: &MailConfig, to: &str) -> Result<Email, MailError> {
    let body = format!(
        "This is a test message from the portal's doctor command.\n\
         \n\
         Host: {}\n\
         Port: {} ({})\n\
         From: {}\n",
        config.host,
        config.port,
        config.tls_mode(),
        config.from,
    );

    Email::builder()
        .to(to)
        .subject("SMTP configuration test")
        .text(body)
        .build()
}

/// Run the preflight, print the report, and optionally send a live test
/// message. Returns whether everything succeeded.
pub async fn run(config: &MailConfig, send_to: Option<&str>) -> anyhow::Result<bool> {
    let checks = preflight(config);
    print!("{}", render_report(config, &checks));

    let mut ok = passed(&checks);

    if let Some(to) = send_to {
        println!("\nSending a test message to {to}...");
        let mailer = build_mailer(config)?;
        match notify::deliver(mailer.as_ref(), config, &test_email(config, to)?).await {
            Ok(()) => println!("  ✓ test message accepted by {}", config.host),
            Err(err) => {
                println!("  ✗ test send failed: {err}");
                ok = false;
            }
        }
    }

    Ok(ok)
}
