//! Contact-form relay to the team mailbox.

use crate::config::AppConfig;
use crate::mail::{Email, MailError};

/// Compose the contact-form notification for `CONTACT_TO`.
///
/// The visitor's address goes in `Reply-To` so the team can answer directly.
pub fn contact_email(
    config: &AppConfig,
    name: &str,
    email: &str,
    message: &str,
) -> Result<Email, MailError> {
    let subject = if name.is_empty() {
        "Website contact form submission".to_string()
    } else {
        format!("Website contact — {name}")
    };

    let site = super::site_url(config);
    let body = [
        "A visitor submitted the contact form.".to_string(),
        String::new(),
        format!("Name: {}", if name.is_empty() { "N/A" } else { name }),
        format!("Email: {email}"),
        String::new(),
        message.to_string(),
        String::new(),
        format!("Sent from {site}/contact/."),
    ]
    .join("\n");

    Email::builder()
        .to(config.contact_to.as_str())
        .subject(subject)
        .text(body)
        .reply_to(email)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }

    #[test]
    fn named_visitor_lands_in_the_subject() {
        let email = contact_email(&config(), "Sam", "sam@example.com", "Hello there").unwrap();

        assert_eq!(email.to, vec!["connect@aiforimpact.net"]);
        assert_eq!(email.subject, "Website contact — Sam");
        assert_eq!(email.reply_to.as_deref(), Some("sam@example.com"));

        let body = email.body.text().unwrap();
        assert_eq!(
            body,
            "A visitor submitted the contact form.\n\
             \n\
             Name: Sam\n\
             Email: sam@example.com\n\
             \n\
             Hello there\n\
             \n\
             Sent from https://aiforimpact.net/contact/."
        );
    }

    #[test]
    fn anonymous_visitor_gets_the_generic_subject() {
        let email = contact_email(&config(), "", "sam@example.com", "Hi").unwrap();

        assert_eq!(email.subject, "Website contact form submission");
        assert!(email.body.text().unwrap().contains("Name: N/A\n"));
    }
}
