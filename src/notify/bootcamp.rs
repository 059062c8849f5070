//! Bootcamp cohort request notification.

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::Date;

use crate::config::AppConfig;
use crate::mail::{Email, MailError};

/// A validated cohort request, as submitted by a company.
///
/// Timeline dates are ISO `YYYY-MM-DD` strings and arrive either both set or
/// both unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortRequest {
    pub company_name: String,
    pub contact_name: String,
    pub contact_email: String,
    pub team_size: Option<String>,
    pub timeline_start: Option<String>,
    pub timeline_end: Option<String>,
    pub goals: Option<String>,
    pub notes: Option<String>,
}

impl CohortRequest {
    /// The archive payload: every field present, blanks for unset optionals.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "company_name": self.company_name,
            "contact_name": self.contact_name,
            "contact_email": self.contact_email,
            "team_size": self.team_size.as_deref().unwrap_or(""),
            "timeline_start": self.timeline_start.as_deref().unwrap_or(""),
            "timeline_end": self.timeline_end.as_deref().unwrap_or(""),
            "goals": self.goals.as_deref().unwrap_or(""),
            "notes": self.notes.as_deref().unwrap_or(""),
        })
    }
}

/// Render the preferred timeline as human-readable dates.
///
/// `2026-03-02` becomes `Mar 02, 2026`; values that do not parse pass
/// through unchanged, and a fully absent timeline renders as `N/A`.
pub fn format_preferred_dates(start: Option<&str>, end: Option<&str>) -> String {
    let start = start.filter(|v| !v.is_empty());
    let end = end.filter(|v| !v.is_empty());

    match (start, end) {
        (None, None) => "N/A".to_string(),
        (Some(start), Some(end)) => format!("{} → {}", humanize(start), humanize(end)),
        (Some(start), None) => humanize(start),
        (None, Some(end)) => humanize(end),
    }
}

fn humanize(raw: &str) -> String {
    let iso = format_description!("[year]-[month]-[day]");
    let pretty = format_description!("[month repr:short] [day], [year]");

    Date::parse(raw, iso)
        .ok()
        .and_then(|date| date.format(pretty).ok())
        .unwrap_or_else(|| raw.to_string())
}

/// Compose the cohort request notice for `BOOTCAMP_REQUEST_TO`.
pub fn request_email(config: &AppConfig, request: &CohortRequest) -> Result<Email, MailError> {
    let team_size = optional(&request.team_size);
    let goals = optional(&request.goals);
    let notes = optional(&request.notes);
    let timeline = format_preferred_dates(
        request.timeline_start.as_deref(),
        request.timeline_end.as_deref(),
    );

    let subject = format!("Bootcamp cohort request — {}", request.company_name);
    let body = format!(
        "A company submitted a bootcamp cohort request.\n\
         \n\
         Company: {}\n\
         Contact: {}\n\
         Email: {}\n\
         Team size: {team_size}\n\
         Preferred dates: {timeline}\n\
         Goals: {goals}\n\
         Notes: {notes}\n",
        request.company_name, request.contact_name, request.contact_email,
    );

    let mut builder = Email::builder()
        .to(config.bootcamp_request_to.as_str())
        .subject(subject)
        .text(body);
    if !request.contact_email.is_empty() {
        builder = builder.reply_to(request.contact_email.as_str());
    }
    builder.build()
}

fn optional(value: &Option<String>) -> &str {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or("N/A")
}
