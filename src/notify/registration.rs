//! Registration notice sent to the team mailbox.

use time::macros::format_description;

use crate::config::AppConfig;
use crate::mail::{Email, MailError};
use crate::store::Registration;

/// Compose the "new registration" notice for `REG_NOTIFY_TO`.
///
/// Optional fields render as `N/A` so the notice always has the same shape.
pub fn notice_email(config: &AppConfig, registration: &Registration) -> Result<Email, MailError> {
    let name = {
        let full = registration.full_name();
        if full.is_empty() {
            "Unknown".to_string()
        } else {
            full
        }
    };
    let email = nonempty(Some(&registration.user_email)).unwrap_or("N/A");
    let company = nonempty(registration.company.as_deref()).unwrap_or("N/A");
    let session = nonempty(Some(&registration.course_session_code)).unwrap_or("N/A");
    let referral = nonempty(registration.referral_source.as_deref()).unwrap_or("N/A");

    let created_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    let created = registration
        .created_at
        .format(created_format)
        .unwrap_or_else(|_| "N/A".to_string());

    let subject = format!("New registration — {name} ({email})");
    let body = format!(
        "A new customer has registered.\n\
         \n\
         Name: {name}\n\
         Email: {email}\n\
         Company: {company}\n\
         Session: {session}\n\
         Referral: {referral}\n\
         Created: {created}\n\
         \n\
         — AiForImpactPortal"
    );

    Email::builder()
        .to(config.reg_notify_to.as_str())
        .subject(subject)
        .text(body)
        .build()
}

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
