//! Contact form with a color-selection confirmation step.

use axum::extract::State;
use axum::Json;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{reject_if_invalid, ApiError, ApiResult};
use crate::notify;

use super::{valid_email, AppState, JsonOrForm};

pub const MESSAGE_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeOption {
    pub value: &'static str,
    pub label: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub prompt: &'static str,
    pub answer: &'static str,
    pub options: [ChallengeOption; 3],
}

pub(crate) const CHALLENGES: [Challenge; 3] = [
    Challenge {
        prompt: "Select BLUE",
        answer: "blue",
        options: [
            ChallengeOption { value: "blue", label: "Blue", color: "#3b82f6" },
            ChallengeOption { value: "red", label: "Red", color: "#ef4444" },
            ChallengeOption { value: "green", label: "Green", color: "#22c55e" },
        ],
    },
    Challenge {
        prompt: "Select RED",
        answer: "red",
        options: [
            ChallengeOption { value: "yellow", label: "Yellow", color: "#facc15" },
            ChallengeOption { value: "red", label: "Red", color: "#ef4444" },
            ChallengeOption { value: "purple", label: "Purple", color: "#a855f7" },
        ],
    },
    Challenge {
        prompt: "Select GREEN",
        answer: "green",
        options: [
            ChallengeOption { value: "orange", label: "Orange", color: "#fb923c" },
            ChallengeOption { value: "green", label: "Green", color: "#22c55e" },
            ChallengeOption { value: "blue", label: "Blue", color: "#3b82f6" },
        ],
    },
];

/// Hand the client a random challenge, answer included. The check guards
/// against drive-by form bots, not determined abuse.
pub async fn challenge() -> Json<Challenge> {
    let index = rand::thread_rng().gen_range(0..CHALLENGES.len());
    Json(CHALLENGES[index].clone())
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub challenge_selection: Option<String>,
    #[serde(default)]
    pub challenge_answer: Option<String>,
}

pub async fn submit(
    State(state): State<AppState>,
    JsonOrForm(payload): JsonOrForm<ContactPayload>,
) -> ApiResult<Json<Value>> {
    let name = payload.name.as_deref().unwrap_or("").trim().to_string();
    let email = payload.email.as_deref().unwrap_or("").trim().to_string();
    let message = payload.message.as_deref().unwrap_or("").trim().to_string();
    let selection = payload
        .challenge_selection
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    let answer = payload
        .challenge_answer
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let mut errors = Vec::new();

    if email.is_empty() {
        errors.push("Email is required.".to_string());
    } else if !valid_email(&email) {
        errors.push("Enter a valid email address.".to_string());
    }

    if message.is_empty() {
        errors.push("Message is required.".to_string());
    } else if message.chars().count() > MESSAGE_LIMIT {
        errors.push(format!(
            "Message must be {MESSAGE_LIMIT} characters or fewer."
        ));
    }

    if selection.is_empty() || answer.is_empty() {
        errors.push("Please complete the color confirmation step.".to_string());
    } else if selection != answer {
        errors.push("The selected color doesn't match the prompt. Please try again.".to_string());
    }

    reject_if_invalid(errors)?;

    let email_msg = notify::contact::contact_email(&state.config, &name, &email, &message)
        .map_err(|err| {
            tracing::error!(error = %err, "contact email could not be composed");
            ApiError::ContactSendFailed
        })?;
    notify::deliver(state.mailer.as_ref(), &state.mail, &email_msg)
        .await
        .map_err(|_| ApiError::ContactSendFailed)?;

    Ok(Json(json!({
        "ok": true,
        "message": "Message sent.",
    })))
}
