//! HTTP API: request parsing, validation, and the per-flow handlers.

pub mod bootcamp;
pub mod contact;
pub mod register;
pub mod subscribe;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header::{ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::archive::RequestArchive;
use crate::catalog::Catalog;
use crate::config::{coerce_bool, AppConfig};
use crate::error::ApiError;
use crate::mail::{build_mailer, MailConfig, MailError, Mailer, MemoryOutbox};
use crate::store::{RegistrationStore, SubscriberStore};

/// Everything the handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub mail: Arc<MailConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub catalog: Arc<Catalog>,
    pub subscribers: SubscriberStore,
    pub registrations: RegistrationStore,
    pub outbox: MemoryOutbox,
    pub archive: RequestArchive,
}

impl AppState {
    pub fn new(config: AppConfig, mail: MailConfig) -> Result<Self, MailError> {
        let mailer = build_mailer(&mail)?;
        let catalog = Catalog::from_config(&config);
        let archive = RequestArchive::from_config(&config);

        Ok(Self {
            config: Arc::new(config),
            mail: Arc::new(mail),
            mailer,
            catalog: Arc::new(catalog),
            subscribers: SubscriberStore::new(),
            registrations: RegistrationStore::new(),
            outbox: MemoryOutbox::new(),
            archive,
        })
    }
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/register/submit", post(register::submit))
        .route(
            "/register/price-preview",
            get(register::price_preview_get).post(register::price_preview_post),
        )
        .route("/subscribe", post(subscribe::submit))
        .route("/bootcamp/request", post(bootcamp::submit))
        .route("/contact/challenge", get(contact::challenge))
        .route("/contact/submit", post(contact::submit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Extracts a request body that may arrive as JSON or as an urlencoded form.
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        if content_type.starts_with("application/json") {
            let Json(payload) = Json::<T>::from_request(req, state)
                .await
                .map_err(|err| ApiError::BadRequest(err.to_string()))?;
            return Ok(Self(payload));
        }

        let Form(payload) = Form::<T>::from_request(req, state)
            .await
            .map_err(|err| ApiError::BadRequest(err.to_string()))?;
        Ok(Self(payload))
    }
}

/// Client details captured for stored records: IP, user agent, language.
///
/// The IP prefers the first `X-Forwarded-For` entry and falls back to the
/// peer address when the server was built with connect info.
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        let ip = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .find(|entry| !entry.is_empty())
            })
            .map(str::to_string)
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });

        Ok(Self {
            ip,
            user_agent: header(USER_AGENT),
            accept_language: header(ACCEPT_LANGUAGE),
        })
    }
}

/// A boolean field that arrives as a JSON bool, 0/1, or a checkbox string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Boolish {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Boolish {
    pub(crate) fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            Self::Int(_) => None,
            Self::Text(raw) => coerce_bool(raw),
        }
    }
}

/// Resolve an optional boolean field against its default.
pub(crate) fn flag(value: Option<&Boolish>, default: bool) -> bool {
    value.and_then(Boolish::as_bool).unwrap_or(default)
}

/// Trimmed non-empty value, `None` otherwise.
pub(crate) fn opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Like [`opt`], capped at `limit` characters.
pub(crate) fn clip(value: Option<&str>, limit: usize) -> Option<String> {
    opt(value).map(|v| v.chars().take(limit).collect())
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

pub(crate) fn valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}
