//! Bootcamp cohort request intake: validate, archive, notify.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use time::macros::format_description;
use time::Date;

use crate::error::{reject_if_invalid, ApiError, ApiResult};
use crate::notify::{self, CohortRequest};

use super::{valid_email, AppState, JsonOrForm};

#[derive(Debug, Default, Deserialize)]
pub struct BootcampPayload {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub team_size: Option<String>,
    #[serde(default)]
    pub timeline_start: Option<String>,
    #[serde(default)]
    pub timeline_end: Option<String>,
    #[serde(default)]
    pub goals: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn submit(
    State(state): State<AppState>,
    JsonOrForm(payload): JsonOrForm<BootcampPayload>,
) -> ApiResult<Json<Value>> {
    let company_name = trimmed(payload.company_name.as_deref());
    let contact_name = trimmed(payload.contact_name.as_deref());
    let contact_email = trimmed(payload.contact_email.as_deref());
    let team_size = trimmed(payload.team_size.as_deref());
    let timeline_start = trimmed(payload.timeline_start.as_deref());
    let timeline_end = trimmed(payload.timeline_end.as_deref());
    let goals = trimmed(payload.goals.as_deref());
    let notes = trimmed(payload.notes.as_deref());

    let mut errors = Vec::new();

    if company_name.is_empty() {
        errors.push("Company name is required.".to_string());
    }
    if contact_name.is_empty() {
        errors.push("Contact name is required.".to_string());
    }
    if contact_email.is_empty() {
        errors.push("Contact email is required.".to_string());
    } else if !valid_email(&contact_email) {
        errors.push("Contact email must be valid.".to_string());
    }

    if !team_size.is_empty() && !team_size.chars().all(|c| c.is_ascii_digit()) {
        errors.push("Team size must be a number.".to_string());
    }

    if !timeline_start.is_empty() && timeline_end.is_empty() {
        errors.push("Please select an end date for your preferred timeline.".to_string());
    } else if timeline_start.is_empty() && !timeline_end.is_empty() {
        errors.push("Please select a start date for your preferred timeline.".to_string());
    } else if !timeline_start.is_empty() && !timeline_end.is_empty() {
        let iso = format_description!("[year]-[month]-[day]");
        match (
            Date::parse(&timeline_start, &iso),
            Date::parse(&timeline_end, &iso),
        ) {
            (Ok(start), Ok(end)) => {
                if end < start {
                    errors.push(
                        "Preferred end date must be on or after the start date.".to_string(),
                    );
                }
            }
            _ => errors.push("Preferred dates must be valid calendar dates.".to_string()),
        }
    }

    reject_if_invalid(errors)?;

    let request = CohortRequest {
        company_name,
        contact_name,
        contact_email,
        team_size: non_empty(team_size),
        timeline_start: non_empty(timeline_start),
        timeline_end: non_empty(timeline_end),
        goals: non_empty(goals),
        notes: non_empty(notes),
    };

    // Two independent sinks; the request survives as long as one of them does.
    let archived = state.archive.append(&request.payload()).await;

    let email_sent = match notify::bootcamp::request_email(&state.config, &request) {
        Ok(email) => notify::deliver(state.mailer.as_ref(), &state.mail, &email)
            .await
            .is_ok(),
        Err(err) => {
            tracing::error!(error = %err, "cohort request email could not be composed");
            false
        }
    };

    if !archived && !email_sent {
        tracing::error!("bootcamp cohort request lost: unable to archive or send email");
        return Err(ApiError::RequestNotRecorded);
    }
    if !email_sent {
        tracing::warn!("bootcamp request email delivery failed; payload archived for manual follow-up");
    }

    Ok(Json(json!({ "ok": true })))
}

fn trimmed(value: Option<&str>) -> String {
    value.unwrap_or("").trim().to_string()
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
