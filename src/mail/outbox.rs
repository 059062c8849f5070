//! Background delivery queue with retry and expiry.
//!
//! - [`OutboxEntry`] — A queued email plus its delivery state. Maps directly
//!   to a database row when using a persistent backend.
//! - [`OutboxStore`] — Backend-agnostic storage trait. Implement for
//!   Postgres, Redis, etc.
//! - [`MemoryOutbox`] — In-memory provider for development and testing.
//! - [`DeliveryWorker`] — Polls any `OutboxStore` and hands entries to a
//!   [`Mailer`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use super::mailer::log_auth_hints;
use super::{Email, MailConfig, MailError, Mailer};

/// Delivery state of a queued email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Expired,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Options controlling retry, expiry, and scheduling for a queued email.
#[derive(Debug, Clone)]
pub struct DeliveryOpts {
    /// Maximum number of attempts (including the first).
    pub max_attempts: i32,
    /// If set, the entry is skipped when claimed after this duration from creation.
    pub expires_in: Option<Duration>,
    /// Delay before the entry becomes eligible for delivery.
    pub delay: Option<Duration>,
}

impl Default for DeliveryOpts {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            expires_in: None,
            delay: None,
        }
    }
}

/// A queued email and its delivery state.
///
/// This is the unit of work stored in any outbox backend. All fields map
/// directly to database columns when using a persistent backend like Postgres.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    /// Which notification produced this email (e.g. `"registration_notice"`).
    pub kind: String,
    pub email: Email,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    pub locked_at: Option<OffsetDateTime>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
}

impl OutboxEntry {
    /// Queue an email with default options.
    pub fn new(kind: impl Into<String>, email: Email) -> Self {
        Self::with_opts(kind, email, DeliveryOpts::default())
    }

    /// Queue an email with explicit options.
    pub fn with_opts(kind: impl Into<String>, email: Email, opts: DeliveryOpts) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            email,
            status: DeliveryStatus::Pending,
            attempts: 0,
            max_attempts: opts.max_attempts,
            run_at: opts.delay.map(|d| now + d).unwrap_or(now),
            expires_at: opts.expires_in.map(|d| now + d),
            locked_at: None,
            locked_by: None,
            last_error: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// Whether the entry expired before `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }

    /// Mark the entry delivered.
    pub fn record_success(&mut self) {
        self.status = DeliveryStatus::Sent;
        self.completed_at = Some(OffsetDateTime::now_utc());
    }

    /// Mark the entry expired without an attempt.
    pub fn record_expired(&mut self) {
        self.status = DeliveryStatus::Expired;
        self.completed_at = Some(OffsetDateTime::now_utc());
    }

    /// Record a failed attempt. Retryable errors reschedule the entry with
    /// exponential backoff (`2^attempts` seconds, capped at 300) while
    /// attempts remain; everything else marks it failed. Returns the backoff
    /// in seconds when a retry was scheduled.
    pub fn record_failure(&mut self, error: &MailError) -> Option<u64> {
        self.last_error = Some(error.to_string());
        self.locked_at = None;
        self.locked_by = None;

        if error.is_retryable() && self.attempts < self.max_attempts {
            let backoff_secs = (2_u64.saturating_pow(self.attempts as u32)).min(300);
            self.status = DeliveryStatus::Pending;
            self.run_at = OffsetDateTime::now_utc() + Duration::from_secs(backoff_secs);
            Some(backoff_secs)
        } else {
            self.status = DeliveryStatus::Failed;
            self.completed_at = Some(OffsetDateTime::now_utc());
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("outbox storage error: {0}")]
    Storage(String),
}

/// Backend-agnostic outbox storage.
///
/// Implement this trait to plug in any persistence layer. The
/// [`DeliveryWorker`] polls an `OutboxStore`, handles all state transitions
/// (retry, expiry, completion), and calls `update` with the modified entry.
#[async_trait]
pub trait OutboxStore: Send + Sync + Clone + 'static {
    /// Insert a new entry into the outbox.
    async fn insert(&self, entry: &OutboxEntry) -> Result<(), OutboxError>;

    /// Atomically claim the next eligible entry (status=pending, run_at <= now).
    ///
    /// The implementation must:
    /// - Select a pending entry with `run_at <= now`
    /// - Set `status` to `Sending`, `locked_at` to now, `locked_by` to the
    ///   worker id, and increment `attempts`
    /// - Return `None` when no eligible entries exist
    ///
    /// For Postgres, this is the `SELECT ... FOR UPDATE SKIP LOCKED` pattern.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<OutboxEntry>, OutboxError>;

    /// Persist an updated entry. The [`DeliveryWorker`] sets all fields
    /// before calling this; the implementation only writes the entry back by id.
    async fn update(&self, entry: &OutboxEntry) -> Result<(), OutboxError>;
}

/// In-memory [`OutboxStore`] for development and testing.
///
/// Entries are stored in a `Vec` behind a mutex. Not durable; all queued mail
/// is lost on restart.
#[derive(Clone, Default)]
pub struct MemoryOutbox {
    entries: Arc<Mutex<Vec<OutboxEntry>>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, in insertion order.
    pub async fn entries(&self) -> Vec<OutboxEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn insert(&self, entry: &OutboxEntry) -> Result<(), OutboxError> {
        let mut entries = self.entries.lock().await;
        entries.push(entry.clone());
        Ok(())
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<OutboxEntry>, OutboxError> {
        let mut entries = self.entries.lock().await;
        let now = OffsetDateTime::now_utc();

        let pos = entries
            .iter()
            .position(|e| e.status == DeliveryStatus::Pending && e.run_at <= now);

        if let Some(idx) = pos {
            let entry = &mut entries[idx];
            entry.status = DeliveryStatus::Sending;
            entry.locked_at = Some(now);
            entry.locked_by = Some(worker_id.to_string());
            entry.attempts += 1;
            Ok(Some(entry.clone()))
        } else {
            Ok(None)
        }
    }

    async fn update(&self, entry: &OutboxEntry) -> Result<(), OutboxError> {
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry.clone();
        }
        Ok(())
    }
}

/// Queue an email for background delivery with default options.
pub async fn enqueue(
    store: &impl OutboxStore,
    kind: &str,
    email: Email,
) -> Result<Uuid, OutboxError> {
    let entry = OutboxEntry::new(kind, email);
    let id = entry.id;
    store.insert(&entry).await?;
    Ok(id)
}

/// Queue an email for background delivery with explicit options.
pub async fn enqueue_with(
    store: &impl OutboxStore,
    kind: &str,
    email: Email,
    opts: DeliveryOpts,
) -> Result<Uuid, OutboxError> {
    let entry = OutboxEntry::with_opts(kind, email, opts);
    let id = entry.id;
    store.insert(&entry).await?;
    Ok(id)
}

/// Background processor that polls an [`OutboxStore`] and delivers entries
/// through a [`Mailer`].
///
/// The worker owns all state-transition logic: on success it marks the entry
/// sent, on failure it decides whether to retry (with backoff) or mark it
/// permanently failed, and it checks expiry before attempting delivery.
///
/// ```ignore
/// DeliveryWorker::new(outbox, mailer, config)
///     .concurrency(2)
///     .poll_interval(Duration::from_millis(500))
///     .start();
/// ```
pub struct DeliveryWorker<S: OutboxStore> {
    store: S,
    mailer: Arc<dyn Mailer>,
    config: Arc<MailConfig>,
    concurrency: usize,
    poll_interval: Duration,
    worker_id: String,
}

impl<S: OutboxStore> DeliveryWorker<S> {
    pub fn new(store: S, mailer: Arc<dyn Mailer>, config: Arc<MailConfig>) -> Self {
        Self {
            store,
            mailer,
            config,
            concurrency: 4,
            poll_interval: Duration::from_secs(1),
            worker_id: Uuid::new_v4().to_string(),
        }
    }

    /// Maximum number of sends in flight at once (default: 4).
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    /// How often to poll when idle (default: 1s). Backs off slightly during
    /// idle streaks.
    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    /// Start the worker loop. Spawns a background tokio task and returns
    /// immediately.
    pub fn start(self) {
        let store = self.store;
        let mailer = self.mailer;
        let config = self.config;
        let concurrency = self.concurrency;
        let poll_interval = self.poll_interval;
        let worker_id = self.worker_id;

        tokio::spawn(async move {
            let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency));
            let mut idle_streak: u32 = 0;

            loop {
                let permit = semaphore.clone().acquire_owned().await.unwrap();

                let claimed = store.claim_next(&worker_id).await;

                let mut entry = match claimed {
                    Ok(Some(e)) => e,
                    Ok(None) => {
                        drop(permit);
                        idle_streak = idle_streak.saturating_add(1);
                        let backoff = poll_interval
                            .mul_f64((1.5_f64).min(1.0 + idle_streak as f64 * 0.1));
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    Err(e) => {
                        drop(permit);
                        tracing::error!(error = %e, "failed to poll outbox");
                        tokio::time::sleep(poll_interval).await;
                        continue;
                    }
                };

                idle_streak = 0;

                let mail_id = entry.id;
                let kind = entry.kind.clone();

                // Check expiry
                if entry.is_expired_at(OffsetDateTime::now_utc()) {
                    tracing::info!(%mail_id, %kind, "email expired, skipping");
                    entry.record_expired();
                    let _ = store.update(&entry).await;
                    drop(permit);
                    continue;
                }

                let store2 = store.clone();
                let mailer2 = mailer.clone();
                let config2 = config.clone();

                tokio::spawn(async move {
                    let _permit = permit;

                    let span = tracing::info_span!("outbox", %mail_id, %kind);
                    let result = mailer2.send(&entry.email).instrument(span).await;

                    match result {
                        Ok(()) => {
                            tracing::info!(
                                %mail_id, %kind,
                                to = ?entry.email.to,
                                subject = %entry.email.subject,
                                "email notification sent"
                            );
                            entry.record_success();
                            let _ = store2.update(&entry).await;
                        }
                        Err(e) => {
                            if matches!(e, MailError::AuthRejected(_)) {
                                log_auth_hints(&config2);
                            }

                            let error_msg = e.to_string();
                            match entry.record_failure(&e) {
                                Some(backoff_secs) => {
                                    tracing::warn!(
                                        %mail_id, %kind,
                                        attempt = entry.attempts,
                                        %error_msg,
                                        backoff_secs,
                                        "email delivery failed, scheduling retry"
                                    );
                                }
                                None => {
                                    tracing::error!(
                                        %mail_id, %kind,
                                        attempts = entry.attempts,
                                        %error_msg,
                                        "email delivery permanently failed"
                                    );
                                }
                            }
                            let _ = store2.update(&entry).await;
                        }
                    }
                });
            }
        });

        tracing::info!("⏳ Outbox worker running");
    }
}
