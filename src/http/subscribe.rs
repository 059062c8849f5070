//! Mailing-list subscribe endpoint: upsert plus the welcome email.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::notify;
use crate::store::{NewSubscription, SubscriptionStatus};

use super::{opt, AppState, Boolish, ClientMeta, JsonOrForm};

#[derive(Debug, Default, Deserialize)]
pub struct SubscribePayload {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub plan_code: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub consent_marketing: Option<Boolish>,
    #[serde(default)]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub subscription_status: Option<String>,
    #[serde(default)]
    pub reason_unsub: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Tags arrive as a JSON list or as a comma-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Tags {
    List(Vec<String>),
    Csv(String),
}

impl Tags {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(tags) => tags,
            Self::Csv(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

pub async fn submit(
    State(state): State<AppState>,
    meta: ClientMeta,
    JsonOrForm(payload): JsonOrForm<SubscribePayload>,
) -> ApiResult<Json<Value>> {
    let email = payload
        .email
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest(
            "Please provide a valid email address.".to_string(),
        ));
    }

    let plan_code = opt(payload.plan_code.as_deref())
        .or_else(|| opt(payload.plan.as_deref()))
        .unwrap_or_else(|| "newsletter".to_string());

    let status_raw = opt(payload.status.as_deref())
        .or_else(|| opt(payload.subscription_status.as_deref()));
    let status = SubscriptionStatus::normalize(status_raw.as_deref());

    let locale = opt(payload.locale.as_deref())
        .or_else(|| best_language(meta.accept_language.as_deref()));

    let outcome = state
        .subscribers
        .upsert(NewSubscription {
            email: email.clone(),
            status,
            plan_code: Some(plan_code.clone()),
            source: opt(payload.source.as_deref()).unwrap_or_else(|| "web_form".to_string()),
            reason_unsub: opt(payload.reason_unsub.as_deref()),
            consent_marketing: payload.consent_marketing.as_ref().and_then(Boolish::as_bool),
            locale,
            ip_signup: meta.ip,
            user_agent_signup: meta.user_agent,
            tags: payload.tags.map(Tags::into_vec),
        })
        .await;

    if outcome.should_send_welcome() {
        let welcome = notify::subscription::welcome_email(&state.config, &email, Some(&plan_code))
            .map_err(|err| {
                tracing::error!(error = %err, "welcome email could not be composed");
                ApiError::EmailSendFailed
            })?;
        notify::deliver(state.mailer.as_ref(), &state.mail, &welcome)
            .await
            .map_err(|_| ApiError::EmailSendFailed)?;
    }

    Ok(Json(json!({
        "ok": true,
        "id": outcome.subscriber.id,
        "created": outcome.created,
    })))
}

/// The highest-q language tag from an `Accept-Language` header.
fn best_language(header: Option<&str>) -> Option<String> {
    let header = header?;
    let mut best: Option<(f32, &str)> = None;

    for entry in header.split(',') {
        let mut pieces = entry.split(';');
        let tag = pieces.next().map(str::trim).unwrap_or_default();
        if tag.is_empty() || tag == "*" {
            continue;
        }

        let quality = pieces
            .find_map(|piece| piece.trim().strip_prefix("q="))
            .and_then(|q| q.parse::<f32>().ok())
            .unwrap_or(1.0);

        if best.is_none_or(|(best_quality, _)| quality > best_quality) {
            best = Some((quality, tag));
        }
    }

    best.map(|(_, tag)| tag.to_string())
}
