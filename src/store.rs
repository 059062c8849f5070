//! In-memory stores for subscribers and registrations.
//!
//! Rows live in a `Vec` behind a mutex, mirroring the shape of the portal's
//! database tables. Not durable; swap in a persistent implementation behind
//! the same methods for production use.

use std::sync::Arc;

use base64::Engine as _;
use rand::Rng as _;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Confirmed,
    Unsubscribed,
}

impl SubscriptionStatus {
    /// Normalize a client-supplied status. `subscribe`/`subscribed` count as
    /// `confirmed`; anything unrecognized falls back to `confirmed`.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Confirmed;
        };

        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "confirmed" | "subscribe" | "subscribed" => Self::Confirmed,
            "unsubscribed" => Self::Unsubscribed,
            _ => Self::Confirmed,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Unsubscribed => write!(f, "unsubscribed"),
        }
    }
}

/// A stored subscription row.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: String,
    pub plan_code: Option<String>,
    pub status: SubscriptionStatus,
    pub source: String,
    pub double_opt_in_token: Option<String>,
    pub confirmed_at: Option<OffsetDateTime>,
    pub unsubscribed_at: Option<OffsetDateTime>,
    pub reason_unsub: Option<String>,
    pub consent_marketing: Option<bool>,
    pub locale: Option<String>,
    pub ip_signup: Option<String>,
    pub user_agent_signup: Option<String>,
    pub tags: Option<Vec<String>>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Input for [`SubscriberStore::upsert`]. The email must already be trimmed
/// and lowercased.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub email: String,
    pub status: SubscriptionStatus,
    pub plan_code: Option<String>,
    pub source: String,
    pub reason_unsub: Option<String>,
    pub consent_marketing: Option<bool>,
    pub locale: Option<String>,
    pub ip_signup: Option<String>,
    pub user_agent_signup: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Result of an upsert, carrying what the welcome-email decision needs.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub subscriber: Subscriber,
    pub created: bool,
    pub previous_status: Option<SubscriptionStatus>,
}

impl UpsertOutcome {
    /// A welcome email goes to new records and to records that just became
    /// `confirmed`; never to unsubscribed ones.
    pub fn should_send_welcome(&self) -> bool {
        if self.subscriber.status == SubscriptionStatus::Unsubscribed {
            return false;
        }

        self.created
            || (self.previous_status != Some(SubscriptionStatus::Confirmed)
                && self.subscriber.status == SubscriptionStatus::Confirmed)
    }
}

/// 18 random bytes, URL-safe base64 without padding.
fn new_confirm_token() -> String {
    let mut bytes = [0u8; 18];
    rand::thread_rng().fill(&mut bytes[..]);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone, Default)]
pub struct SubscriberStore {
    rows: Arc<Mutex<Vec<Subscriber>>>,
}

impl SubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update the record for `input.email`.
    ///
    /// Updates recompute every status-derived field from the incoming status:
    /// `confirmed_at`/`unsubscribed_at` stamp only when the new status
    /// matches, `reason_unsub` survives only on unsubscribes, and a fresh
    /// double-opt-in token is issued whenever the record is not confirmed.
    pub async fn upsert(&self, input: NewSubscription) -> UpsertOutcome {
        let now = OffsetDateTime::now_utc();
        let is_confirmed = input.status == SubscriptionStatus::Confirmed;
        let is_unsubscribed = input.status == SubscriptionStatus::Unsubscribed;

        let confirmed_at = is_confirmed.then_some(now);
        let unsubscribed_at = is_unsubscribed.then_some(now);
        let reason_unsub = if is_unsubscribed { input.reason_unsub } else { None };
        let double_opt_in_token = (!is_confirmed).then(new_confirm_token);

        let mut rows = self.rows.lock().await;

        if let Some(existing) = rows.iter_mut().find(|s| s.email == input.email) {
            let previous_status = Some(existing.status);

            existing.plan_code = input.plan_code;
            existing.status = input.status;
            existing.source = input.source;
            existing.double_opt_in_token = double_opt_in_token;
            existing.confirmed_at = confirmed_at;
            existing.unsubscribed_at = unsubscribed_at;
            existing.reason_unsub = reason_unsub;
            existing.consent_marketing = input.consent_marketing;
            existing.locale = input.locale;
            existing.ip_signup = input.ip_signup;
            existing.user_agent_signup = input.user_agent_signup;
            existing.tags = input.tags;
            existing.updated_at = now;

            UpsertOutcome {
                subscriber: existing.clone(),
                created: false,
                previous_status,
            }
        } else {
            let subscriber = Subscriber {
                id: Uuid::new_v4(),
                email: input.email,
                plan_code: input.plan_code,
                status: input.status,
                source: input.source,
                double_opt_in_token,
                confirmed_at,
                unsubscribed_at,
                reason_unsub,
                consent_marketing: input.consent_marketing,
                locale: input.locale,
                ip_signup: input.ip_signup,
                user_agent_signup: input.user_agent_signup,
                tags: input.tags,
                created_at: now,
                updated_at: now,
            };
            rows.push(subscriber.clone());

            UpsertOutcome {
                subscriber,
                created: true,
                previous_status: None,
            }
        }
    }

    pub async fn find_by_email(&self, email: &str) -> Option<Subscriber> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|s| s.email == email)
            .cloned()
    }
}

/// A stored course registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: Uuid,
    pub user_email: String,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<u32>,
    pub job_title: String,
    pub company: Option<String>,
    pub referral_source: Option<String>,
    /// Promo/pricing ledger, e.g. `PROMO_APPLIED:1;FREE:0;PRICE_EUR:439`.
    pub referral_details: String,
    pub course_session_code: String,
    pub notes: Option<String>,
    pub consent_contact_ok: bool,
    pub consent_marketing_ok: bool,
    pub data_processing_ok: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Registration {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Input for [`RegistrationStore::insert_with_cap`].
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub user_email: String,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<u32>,
    pub job_title: String,
    pub company: Option<String>,
    pub referral_source: Option<String>,
    pub referral_details: String,
    pub course_session_code: String,
    pub notes: Option<String>,
    pub consent_contact_ok: bool,
    pub consent_marketing_ok: bool,
    pub data_processing_ok: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("course has reached its seat capacity")]
pub struct SeatCapReached;

#[derive(Clone, Default)]
pub struct RegistrationStore {
    rows: Arc<Mutex<Vec<Registration>>>,
}

impl RegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count_for_session(&self, course_session_code: &str) -> usize {
        self.rows
            .lock()
            .await
            .iter()
            .filter(|r| r.course_session_code == course_session_code)
            .count()
    }

    /// Insert a registration, re-checking the seat cap under the same lock
    /// that performs the insert. Two racing requests for the last seat cannot
    /// both succeed.
    pub async fn insert_with_cap(
        &self,
        input: NewRegistration,
        seat_cap: Option<u32>,
    ) -> Result<Registration, SeatCapReached> {
        let mut rows = self.rows.lock().await;

        if let Some(cap) = seat_cap {
            let current = rows
                .iter()
                .filter(|r| r.course_session_code == input.course_session_code)
                .count();
            if current >= cap as usize {
                return Err(SeatCapReached);
            }
        }

        let now = OffsetDateTime::now_utc();
        let registration = Registration {
            id: Uuid::new_v4(),
            user_email: input.user_email,
            first_name: input.first_name,
            last_name: input.last_name,
            age: input.age,
            job_title: input.job_title,
            company: input.company,
            referral_source: input.referral_source,
            referral_details: input.referral_details,
            course_session_code: input.course_session_code,
            notes: input.notes,
            consent_contact_ok: input.consent_contact_ok,
            consent_marketing_ok: input.consent_marketing_ok,
            data_processing_ok: input.data_processing_ok,
            created_at: now,
            updated_at: now,
        };
        rows.push(registration.clone());

        Ok(registration)
    }

    pub async fn all(&self) -> Vec<Registration> {
        self.rows.lock().await.clone()
    }
}
