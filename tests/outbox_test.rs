use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use aiforimpact_portal::mail::{
    enqueue, enqueue_with, DeliveryOpts, DeliveryStatus, DeliveryWorker, Email, MailConfig,
    MailError, Mailer, MemoryOutbox,
};

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

fn mail_config() -> Arc<MailConfig> {
    Arc::new(serde_json::from_value(json!({})).unwrap())
}

fn email(subject: &str) -> Email {
    Email::builder()
        .to("connect@aiforimpact.net")
        .subject(subject)
        .text("body")
        .build()
        .unwrap()
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 4s");
}

#[tokio::test]
async fn worker_delivers_queued_mail() {
    let outbox = MemoryOutbox::new();
    let mailer = RecordingMailer::working();

    enqueue(&outbox, "registration_notice", email("hello"))
        .await
        .unwrap();

    DeliveryWorker::new(outbox.clone(), Arc::new(mailer.clone()), mail_config())
        .poll_interval(Duration::from_millis(10))
        .start();

    wait_until(|| {
        let outbox = outbox.clone();
        async move { outbox.entries().await[0].status == DeliveryStatus::Sent }
    })
    .await;

    let entries = outbox.entries().await;
    assert_eq!(entries[0].attempts, 1);
    assert!(entries[0].completed_at.is_some());

    let sent = mailer.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "hello");
}

#[tokio::test]
async fn worker_fails_auth_rejections_without_retry() {
    let outbox = MemoryOutbox::new();
    let mailer =
        RecordingMailer::failing(|| MailError::AuthRejected("535 Authentication Failed".into()));

    enqueue(&outbox, "registration_notice", email("doomed"))
        .await
        .unwrap();

    DeliveryWorker::new(outbox.clone(), Arc::new(mailer), mail_config())
        .poll_interval(Duration::from_millis(10))
        .start();

    wait_until(|| {
        let outbox = outbox.clone();
        async move { outbox.entries().await[0].status == DeliveryStatus::Failed }
    })
    .await;

    let entries = outbox.entries().await;
    assert_eq!(entries[0].attempts, 1);
    assert_eq!(
        entries[0].last_error.as_deref(),
        Some("SMTP authentication rejected: 535 Authentication Failed")
    );
}

#[tokio::test]
async fn worker_exhausts_attempts_on_persistent_smtp_errors() {
    let outbox = MemoryOutbox::new();
    let mailer = RecordingMailer::failing(|| MailError::Smtp("connection refused".into()));

    enqueue_with(
        &outbox,
        "registration_notice",
        email("flaky"),
        DeliveryOpts {
            max_attempts: 1,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    DeliveryWorker::new(outbox.clone(), Arc::new(mailer), mail_config())
        .poll_interval(Duration::from_millis(10))
        .start();

    wait_until(|| {
        let outbox = outbox.clone();
        async move { outbox.entries().await[0].status == DeliveryStatus::Failed }
    })
    .await;

    let entries = outbox.entries().await;
    assert_eq!(entries[0].attempts, 1);
    assert!(entries[0].completed_at.is_some());
}

#[tokio::test]
async fn worker_expires_stale_entries_without_sending() {
    let outbox = MemoryOutbox::new();
    let mailer = RecordingMailer::working();

    enqueue_with(
        &outbox,
        "registration_notice",
        email("stale"),
        DeliveryOpts {
            expires_in: Some(Duration::from_millis(10)),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    DeliveryWorker::new(outbox.clone(), Arc::new(mailer.clone()), mail_config())
        .poll_interval(Duration::from_millis(10))
        .start();

    wait_until(|| {
        let outbox = outbox.clone();
        async move { outbox.entries().await[0].status == DeliveryStatus::Expired }
    })
    .await;

    assert!(mailer.sent.lock().await.is_empty());
}
