//! Outbound notification composition and delivery.
//!
//! Each submodule turns one flow's domain data into an [`Email`]: the
//! registration notice to the team, the subscriber welcome message, the
//! bootcamp cohort request, and the contact-form relay. Composition is pure;
//! [`deliver`] does the sending and owns the shared log markers.

pub mod bootcamp;
pub mod contact;
pub mod registration;
pub mod subscription;

pub use bootcamp::CohortRequest;

use crate::config::AppConfig;
use crate::mail::{log_auth_hints, Email, MailConfig, MailError, Mailer};

/// Send one notification inline, logging the outcome.
///
/// Success logs an info line with recipient and subject. An authentication
/// rejection additionally emits the provider remediation hints. A skipped
/// send (non-SMTP backend, incomplete credentials) already warned inside the
/// mailer and is passed through as-is.
pub async fn deliver(
    mailer: &dyn Mailer,
    config: &MailConfig,
    email: &Email,
) -> Result<(), MailError> {
    match mailer.send(email).await {
        Ok(()) => {
            tracing::info!(to = ?email.to, subject = %email.subject, "email notification sent");
            Ok(())
        }
        Err(MailError::Disabled) => Err(MailError::Disabled),
        Err(err) => {
            if matches!(err, MailError::AuthRejected(_)) {
                log_auth_hints(config);
            }
            tracing::error!(
                error = %err,
                subject = %email.subject,
                "failed to send email notification"
            );
            Err(err)
        }
    }
}

/// The public site URL with at most one trailing slash removed.
///
/// Email bodies link back to the site; an empty override falls back to the
/// production address so the links never come out relative.
pub(crate) fn site_url(config: &AppConfig) -> String {
    let trimmed = config.site_url.trim();
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        "https://aiforimpact.net".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_config(site: &str) -> AppConfig {
        serde_json::from_value(serde_json::json!({"site_url": site})).unwrap()
    }

    #[test]
    fn site_url_strips_one_trailing_slash() {
        assert_eq!(
            site_url(&app_config("https://example.com/")),
            "https://example.com"
        );
        assert_eq!(
            site_url(&app_config("https://example.com//")),
            "https://example.com/"
        );
        assert_eq!(site_url(&app_config("")), "https://aiforimpact.net");
    }
}
