use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceExt;

use aiforimpact_portal::archive::RequestArchive;
use aiforimpact_portal::catalog::Catalog;
use aiforimpact_portal::config::AppConfig;
use aiforimpact_portal::http::{api_router, AppState};
use aiforimpact_portal::mail::{Email, MailConfig, MailError, Mailer, MemoryOutbox};
use aiforimpact_portal::store::{RegistrationStore, SubscriberStore, SubscriptionStatus};

#[derive(Clone)]
struct RecordingMailer {
    sent: Arc<Mutex<Vec<Email>>>,
    fail: Option<fn() -> MailError>,
}

impl RecordingMailer {
    fn working() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail: None,
        }
    }

    fn failing(fail: fn() -> MailError) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail: Some(fail),
        }
    }

    async fn sent(&self) -> Vec<Email> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        if let Some(fail) = self.fail {
            return Err(fail());
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

fn app_config(overrides: Value) -> AppConfig {
    serde_json::from_value(overrides).unwrap()
}

fn test_state(mailer: &RecordingMailer, config: AppConfig) -> AppState {
    let mail: MailConfig =
        serde_json::from_value(json!({ "email_backend": "console" })).unwrap();
    AppState {
        catalog: Arc::new(Catalog::from_config(&config)),
        archive: RequestArchive::from_config(&config),
        config: Arc::new(config),
        mail: Arc::new(mail),
        mailer: Arc::new(mailer.clone()),
        subscribers: SubscriberStore::new(),
        registrations: RegistrationStore::new(),
        outbox: MemoryOutbox::new(),
    }
}

fn app(state: &AppState) -> Router {
    api_router(state.clone())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read_json(response).await
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

async fn post_form(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn errors(body: &Value) -> Vec<&str> {
    body["errors"]
        .as_array()
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn healthz_returns_plain_ok() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let response = app(&state)
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

// --- /subscribe ---

#[tokio::test]
async fn subscribe_creates_and_sends_a_welcome() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(
        app(&state),
        "/subscribe",
        json!({ "email": "  User@Example.COM ", "plan_code": "newsletter" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["created"], json!(true));
    assert!(body["id"].is_string());

    let stored = state
        .subscribers
        .find_by_email("user@example.com")
        .await
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Subscribed);
    assert_eq!(stored.source, "web_form");
    assert_eq!(stored.plan_code.as_deref(), Some("newsletter"));

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["user@example.com"]);
    assert_eq!(sent[0].subject, "Thanks for subscribing to Ai For Impact");
}

#[tokio::test]
async fn subscribe_rejects_a_bad_email() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(app(&state), "/subscribe", json!({ "email": "nope" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"], "Please provide a valid email address.");
    assert!(mailer.sent().await.is_empty());
}

#[tokio::test]
async fn subscribe_returns_502_when_the_welcome_fails() {
    let mailer = RecordingMailer::failing(|| MailError::Smtp("connection reset".into()));
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) =
        post_json(app(&state), "/subscribe", json!({ "email": "a@b.co" })).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "email_send_failed");
    assert!(body["message"].as_str().unwrap().contains("confirmation email"));

    // The record was written before the send was attempted.
    assert!(state.subscribers.find_by_email("a@b.co").await.is_some());
}

#[tokio::test]
async fn subscribe_repeat_signups_get_one_welcome() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) =
        post_json(app(&state), "/subscribe", json!({ "email": "a@b.co" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], json!(true));

    let (status, body) =
        post_json(app(&state), "/subscribe", json!({ "email": "a@b.co" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], json!(false));

    assert_eq!(mailer.sent().await.len(), 1);
}

#[tokio::test]
async fn subscribe_unsubscribe_skips_the_welcome_and_keeps_the_reason() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, _) = post_json(
        app(&state),
        "/subscribe",
        json!({
            "email": "a@b.co",
            "status": "unsubscribed",
            "reason_unsub": "too many emails",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(mailer.sent().await.is_empty());

    let stored = state.subscribers.find_by_email("a@b.co").await.unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Unsubscribed);
    assert_eq!(stored.reason_unsub.as_deref(), Some("too many emails"));
    assert!(stored.unsubscribed_at.is_some());
}

#[tokio::test]
async fn subscribe_accepts_form_bodies() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_form(
        app(&state),
        "/subscribe",
        "email=form%40example.com&plan=insights&consent_marketing=yes",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], json!(true));

    let stored = state
        .subscribers
        .find_by_email("form@example.com")
        .await
        .unwrap();
    assert_eq!(stored.plan_code.as_deref(), Some("insights"));
    assert_eq!(stored.consent_marketing, Some(true));
}

// --- /contact ---

#[tokio::test]
async fn contact_challenge_carries_its_own_answer() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = get(app(&state), "/contact/challenge").await;

    assert_eq!(status, StatusCode::OK);
    let answer = body["answer"].as_str().unwrap();
    assert!(body["prompt"].as_str().unwrap().starts_with("Select "));

    let options = body["options"].as_array().unwrap();
    assert_eq!(options.len(), 3);
    assert!(options.iter().any(|o| o["value"] == answer));
    for option in options {
        assert!(option["color"].as_str().unwrap().starts_with('#'));
    }
}

#[tokio::test]
async fn contact_submit_sends_the_message() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(
        app(&state),
        "/contact/submit",
        json!({
            "name": "Ada",
            "email": "ada@example.com",
            "message": "Do you run on-site trainings?",
            "challenge_selection": "Blue",
            "challenge_answer": "blue",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "message": "Message sent." }));

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Website contact — Ada");
    assert_eq!(sent[0].to, vec!["connect@aiforimpact.net"]);
    assert_eq!(sent[0].reply_to.as_deref(), Some("ada@example.com"));
}

#[tokio::test]
async fn contact_validation_reports_every_problem() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(app(&state), "/contact/submit", json!({})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        errors(&body),
        vec![
            "Email is required.",
            "Message is required.",
            "Please complete the color confirmation step.",
        ]
    );
}

#[tokio::test]
async fn contact_rejects_a_mismatched_color() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(
        app(&state),
        "/contact/submit",
        json!({
            "email": "ada@example.com",
            "message": "hi",
            "challenge_selection": "red",
            "challenge_answer": "blue",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        errors(&body),
        vec!["The selected color doesn't match the prompt. Please try again."]
    );
    assert!(mailer.sent().await.is_empty());
}

#[tokio::test]
async fn contact_send_failure_returns_503() {
    let mailer = RecordingMailer::failing(|| MailError::Disabled);
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(
        app(&state),
        "/contact/submit",
        json!({
            "email": "ada@example.com",
            "message": "hi",
            "challenge_selection": "blue",
            "challenge_answer": "blue",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body["error"],
        "We couldn't send your message right now. Please try again later."
    );
}

// --- /bootcamp/request ---

fn cohort_request() -> Value {
    json!({
        "company_name": "Acme GmbH",
        "contact_name": "Grace",
        "contact_email": "grace@acme.example",
        "team_size": "12",
        "timeline_start": "2026-03-02",
        "timeline_end": "2026-03-05",
        "goals": "Automate reporting",
    })
}

#[tokio::test]
async fn bootcamp_request_archives_and_mails() {
    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("requests.jsonl");

    let mailer = RecordingMailer::working();
    let state = test_state(
        &mailer,
        app_config(json!({
            "bootcamp_request_archive": archive_path.to_str().unwrap(),
        })),
    );

    let (status, body) = post_json(app(&state), "/bootcamp/request", cohort_request()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Bootcamp cohort request — Acme GmbH");
    assert_eq!(sent[0].reply_to.as_deref(), Some("grace@acme.example"));

    let archived = std::fs::read_to_string(&archive_path).unwrap();
    let line: Value = serde_json::from_str(archived.lines().next().unwrap()).unwrap();
    assert_eq!(line["payload"]["company_name"], "Acme GmbH");
    assert_eq!(line["payload"]["notes"], "");
    assert!(line["received_at"].is_string());
}

#[tokio::test]
async fn bootcamp_request_survives_a_mail_failure_when_archived() {
    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("requests.jsonl");

    let mailer = RecordingMailer::failing(|| MailError::Smtp("boom".into()));
    let state = test_state(
        &mailer,
        app_config(json!({
            "bootcamp_request_archive": archive_path.to_str().unwrap(),
        })),
    );

    let (status, body) = post_json(app(&state), "/bootcamp/request", cohort_request()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert!(archive_path.exists());
}

#[tokio::test]
async fn bootcamp_request_lost_on_both_sinks_returns_503() {
    let mailer = RecordingMailer::failing(|| MailError::Smtp("boom".into()));
    let state = test_state(
        &mailer,
        app_config(json!({ "bootcamp_request_archive": "" })),
    );

    let (status, body) = post_json(app(&state), "/bootcamp/request", cohort_request()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ok"], json!(false));
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("We could not record your request"));
}

#[tokio::test]
async fn bootcamp_request_validation_messages() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(app(&state), "/bootcamp/request", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        errors(&body),
        vec![
            "Company name is required.",
            "Contact name is required.",
            "Contact email is required.",
        ]
    );

    let (status, body) = post_json(
        app(&state),
        "/bootcamp/request",
        json!({
            "company_name": "Acme",
            "contact_name": "Grace",
            "contact_email": "not-an-email",
            "team_size": "a few",
            "timeline_start": "2026-03-02",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        errors(&body),
        vec![
            "Contact email must be valid.",
            "Team size must be a number.",
            "Please select an end date for your preferred timeline.",
        ]
    );

    let (status, body) = post_json(
        app(&state),
        "/bootcamp/request",
        json!({
            "company_name": "Acme",
            "contact_name": "Grace",
            "contact_email": "grace@acme.example",
            "timeline_start": "2026-03-05",
            "timeline_end": "2026-03-02",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        errors(&body),
        vec!["Preferred end date must be on or after the start date."]
    );
}

// --- /register ---

fn registration(extra: Value) -> Value {
    let mut base = json!({
        "course_session_code": "AAI-RTD",
        "access_code": "letmein",
        "user_email": "new@example.com",
        "first_name": "Nina",
        "last_name": "Okafor",
        "age": "34",
        "company": "Okafor Ltd",
        "referral_source": "LinkedIn",
        "data_processing_ok": "yes",
    });
    base.as_object_mut()
        .unwrap()
        .extend(extra.as_object().unwrap().clone());
    base
}

#[tokio::test]
async fn register_without_the_access_code_is_denied() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(
        app(&state),
        "/register/submit",
        registration(json!({ "access_code": "wrong" })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Please sign in with the course access code.");
    assert!(state.registrations.all().await.is_empty());
}

#[tokio::test]
async fn register_happy_path_stores_and_queues_the_notice() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) =
        post_json(app(&state), "/register/submit", registration(json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["message"], "Thank you! Your registration has been recorded.");
    assert!(body["id"].is_string());

    let stored = state.registrations.all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].user_email, "new@example.com");
    assert_eq!(stored[0].age, Some(34));
    assert_eq!(stored[0].job_title, "Other");
    assert_eq!(stored[0].referral_source.as_deref(), Some("LinkedIn"));
    assert_eq!(stored[0].referral_details, "PRICE_EUR:900");
    assert!(stored[0].consent_contact_ok);
    assert!(!stored[0].consent_marketing_ok);

    // The notice goes through the outbox, not the inline mailer.
    assert!(mailer.sent().await.is_empty());
    let queued = state.outbox.entries().await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].kind, "registration_notice");
    assert_eq!(
        queued[0].email.subject,
        "New registration — Nina Okafor (new@example.com)"
    );
    assert_eq!(queued[0].email.to, vec!["connect@aiforimpact.net"]);
}

#[tokio::test]
async fn register_open_enrollment_skips_the_gate() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, _) = post_json(
        app(&state),
        "/register/submit",
        registration(json!({
            "course_session_code": "BOOT-AI-2024",
            "access_code": "",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn register_validation_lists_all_messages_in_order() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(
        app(&state),
        "/register/submit",
        json!({ "course_session_code": "BOOT-AI-2024", "age": "abc" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        errors(&body),
        vec![
            "Email is required.",
            "First name is required.",
            "Last name is required.",
            "Age must be a whole number.",
            "You must consent to data processing to register.",
        ]
    );
}

#[tokio::test]
async fn register_age_must_be_in_range() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(
        app(&state),
        "/register/submit",
        registration(json!({ "age": "7" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors(&body), vec!["Age must be between 10 and 120."]);
}

#[tokio::test]
async fn register_unknown_course_is_invalid() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(
        app(&state),
        "/register/submit",
        registration(json!({ "course_session_code": "NOPE" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(errors(&body), vec!["Please select a valid course."]);
}

#[tokio::test]
async fn register_full_cohort_is_rejected() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({ "bootcamp_seat_cap": 1 })));

    let (status, _) = post_json(
        app(&state),
        "/register/submit",
        registration(json!({ "course_session_code": "BOOT-AI-2024" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(
        app(&state),
        "/register/submit",
        registration(json!({
            "course_session_code": "BOOT-AI-2024",
            "user_email": "second@example.com",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        errors(&body),
        vec!["This cohort is full. Please choose a different session or contact us."]
    );
    assert_eq!(state.registrations.all().await.len(), 1);
}

#[tokio::test]
async fn register_free_promo_is_recorded() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, _) = post_json(
        app(&state),
        "/register/submit",
        registration(json!({ "promo_code": "impact-100" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let stored = state.registrations.all().await;
    assert_eq!(stored[0].referral_details, "PROMO_APPLIED:1;FREE:1;PRICE_EUR:0");
}

#[tokio::test]
async fn register_notice_can_be_disabled() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({ "reg_notify_enabled": false })));

    let (status, _) =
        post_json(app(&state), "/register/submit", registration(json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(state.outbox.entries().await.is_empty());
}

// --- /register/price-preview ---

#[tokio::test]
async fn price_preview_get_applies_the_promo() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = get(
        app(&state),
        "/register/price-preview?code=IMPACT-439&course=AAI-RTD",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "price_eur": 439,
            "promo_applied": true,
            "is_free": false,
            "base_price_eur": 900,
        })
    );
}

#[tokio::test]
async fn price_preview_post_defaults_to_the_base_price() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(app(&state), "/register/price-preview", json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "price_eur": 900,
            "promo_applied": false,
            "is_free": false,
            "base_price_eur": 900,
        })
    );
}

#[tokio::test]
async fn price_preview_uses_the_course_price() {
    let mailer = RecordingMailer::working();
    let state = test_state(&mailer, app_config(json!({})));

    let (status, body) = post_json(
        app(&state),
        "/register/price-preview",
        json!({ "course": "BOOT-AI-2024", "code": "IMPACT-439" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // The promo price is above the bootcamp price, so it does not apply.
    assert_eq!(body["price_eur"], 350);
    assert_eq!(body["promo_applied"], json!(false));
    assert_eq!(body["base_price_eur"], 350);
}
