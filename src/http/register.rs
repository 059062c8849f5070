//! Course registration: access gate, validation, pricing, and the queued
//! team notice.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::compute_price;
use crate::error::{reject_if_invalid, ApiError, ApiResult};
use crate::mail::enqueue;
use crate::notify;
use crate::store::{NewRegistration, Registration};

use super::{clip, flag, opt, AppState, Boolish, JsonOrForm};

/// Referral options shown on the registration form. Submitted values
/// normalize back to these labels.
pub const REFERRAL_CHOICES: [&str; 10] = [
    "Search",
    "YouTube",
    "TikTok/Instagram",
    "X/Twitter",
    "LinkedIn",
    "Friend/Colleague",
    "Event/Conference",
    "Partner",
    "Newsletter",
    "Other",
];

#[derive(Debug, Default, Deserialize)]
pub struct RegisterPayload {
    #[serde(default)]
    pub access_code: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub referral_source: Option<String>,
    #[serde(default)]
    pub course_session_code: Option<String>,
    #[serde(default)]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub consent_contact_ok: Option<Boolish>,
    #[serde(default)]
    pub consent_marketing_ok: Option<Boolish>,
    #[serde(default)]
    pub data_processing_ok: Option<Boolish>,
}

pub async fn submit(
    State(state): State<AppState>,
    JsonOrForm(payload): JsonOrForm<RegisterPayload>,
) -> ApiResult<Json<Value>> {
    let config = &state.config;

    let session_code = opt(payload.course_session_code.as_deref());
    let course = session_code
        .as_deref()
        .and_then(|code| state.catalog.find(code));

    // Open-enrollment courses skip the access code; everything else needs it.
    let access_code = opt(payload.access_code.as_deref());
    let open_enrollment = course.is_some_and(|c| c.open_enrollment);
    if !open_enrollment && access_code.as_deref() != Some(config.course_access_code.as_str()) {
        return Err(ApiError::AccessDenied);
    }

    let mut errors = Vec::new();

    let user_email = opt(payload.user_email.as_deref());
    if user_email.is_none() {
        errors.push("Email is required.".to_string());
    }

    let first_name = opt(payload.first_name.as_deref());
    if first_name.is_none() {
        errors.push("First name is required.".to_string());
    }
    let last_name = opt(payload.last_name.as_deref());
    if last_name.is_none() {
        errors.push("Last name is required.".to_string());
    }

    let mut age = None;
    if let Some(raw) = opt(payload.age.as_deref()) {
        match raw.parse::<i64>() {
            Ok(value) if (10..=120).contains(&value) => age = Some(value as u32),
            Ok(_) => errors.push("Age must be between 10 and 120.".to_string()),
            Err(_) => errors.push("Age must be a whole number.".to_string()),
        }
    }

    let mut seat_cap = None;
    match course {
        None => errors.push("Please select a valid course.".to_string()),
        Some(course) => {
            seat_cap = course.seat_cap;
            if let Some(cap) = course.seat_cap {
                let taken = state.registrations.count_for_session(&course.code).await;
                if taken >= cap as usize {
                    errors.push(
                        "This cohort is full. Please choose a different session or contact us."
                            .to_string(),
                    );
                }
            }
        }
    }

    let base_price = course.map_or(config.base_price_eur, |c| c.price_eur);
    let quote = compute_price(config, base_price, payload.promo_code.as_deref().unwrap_or(""));

    let data_processing_ok = flag(payload.data_processing_ok.as_ref(), false);
    if !data_processing_ok {
        errors.push("You must consent to data processing to register.".to_string());
    }

    reject_if_invalid(errors)?;

    // Validation rejected any request missing these.
    let input = NewRegistration {
        user_email: user_email.unwrap_or_default(),
        first_name: first_name.unwrap_or_default(),
        last_name: last_name.unwrap_or_default(),
        age,
        job_title: opt(payload.job_title.as_deref()).unwrap_or_else(|| "Other".to_string()),
        company: opt(payload.company.as_deref()),
        referral_source: normalize_referral(payload.referral_source.as_deref()),
        referral_details: quote.referral_details(),
        course_session_code: session_code.unwrap_or_default(),
        notes: clip(payload.notes.as_deref(), 500),
        consent_contact_ok: flag(payload.consent_contact_ok.as_ref(), true),
        consent_marketing_ok: flag(payload.consent_marketing_ok.as_ref(), false),
        data_processing_ok,
    };

    let registration = state
        .registrations
        .insert_with_cap(input, seat_cap)
        .await
        .map_err(|_| {
            ApiError::SeatCapReached(
                "This cohort is now full. Please choose another session or contact us."
                    .to_string(),
            )
        })?;

    if config.reg_notify_enabled {
        queue_notice(&state, &registration).await;
    }

    Ok(Json(json!({
        "ok": true,
        "id": registration.id,
        "message": "Thank you! Your registration has been recorded.",
    })))
}

/// Queue the team notice. Failures are logged and never fail the request.
async fn queue_notice(state: &AppState, registration: &Registration) {
    let email = match notify::registration::notice_email(&state.config, registration) {
        Ok(email) => email,
        Err(err) => {
            tracing::warn!(error = %err, "registration notice could not be composed");
            return;
        }
    };

    match enqueue(&state.outbox, "registration_notice", email).await {
        Ok(mail_id) => tracing::debug!(%mail_id, "registration notice queued"),
        Err(err) => tracing::warn!(error = %err, "registration notice could not be queued"),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PricePreviewPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub course: Option<String>,
}

pub async fn price_preview_get(
    State(state): State<AppState>,
    Query(payload): Query<PricePreviewPayload>,
) -> Json<Value> {
    preview(&state, payload)
}

pub async fn price_preview_post(
    State(state): State<AppState>,
    JsonOrForm(payload): JsonOrForm<PricePreviewPayload>,
) -> Json<Value> {
    preview(&state, payload)
}

fn preview(state: &AppState, payload: PricePreviewPayload) -> Json<Value> {
    let config = &state.config;
    let course = opt(payload.course.as_deref()).and_then(|code| state.catalog.find(&code).cloned());
    let base_price = course.map_or(config.base_price_eur, |c| c.price_eur);
    let quote = compute_price(config, base_price, payload.code.as_deref().unwrap_or(""));

    Json(json!({
        "price_eur": quote.price_eur,
        "promo_applied": quote.promo_applied(),
        "is_free": quote.is_free,
        "base_price_eur": base_price,
    }))
}

/// Lowercase, map whitespace and slashes to `_`, drop everything else.
fn slug(raw: &str) -> Option<String> {
    let mut mapped = String::with_capacity(raw.len());
    for ch in raw.to_lowercase().chars() {
        if ch.is_whitespace() || ch == '/' || ch == '_' {
            mapped.push('_');
        } else if ch.is_ascii_alphanumeric() {
            mapped.push(ch);
        }
    }

    let mut slug = String::with_capacity(mapped.len());
    for ch in mapped.chars() {
        if ch == '_' && slug.ends_with('_') {
            continue;
        }
        slug.push(ch);
    }

    let slug = slug.trim_matches('_');
    (!slug.is_empty()).then(|| slug.to_string())
}

/// Map free-form referral input onto the canonical labels.
fn normalize_referral(raw: Option<&str>) -> Option<String> {
    let needle = slug(raw?)?;
    REFERRAL_CHOICES
        .iter()
        .find(|choice| slug(choice).as_deref() == Some(needle.as_str()))
        .map(|choice| choice.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_normalizes_labels() {
        assert_eq!(slug("TikTok/Instagram").as_deref(), Some("tiktok_instagram"));
        assert_eq!(slug("  X/Twitter ").as_deref(), Some("x_twitter"));
        assert_eq!(slug("Friend / Colleague").as_deref(), Some("friend_colleague"));
        assert_eq!(slug("???"), None);
        assert_eq!(slug(""), None);
    }

    #[test]
    fn referral_normalization_maps_variants() {
        assert_eq!(
            normalize_referral(Some("tiktok instagram")).as_deref(),
            Some("TikTok/Instagram")
        );
        assert_eq!(normalize_referral(Some("LINKEDIN")).as_deref(), Some("LinkedIn"));
        assert_eq!(
            normalize_referral(Some("Event/Conference")).as_deref(),
            Some("Event/Conference")
        );
        assert_eq!(normalize_referral(Some("carrier pigeon")), None);
        assert_eq!(normalize_referral(None), None);
    }
}
