//! Rate-limited, audit-logged confirmation sends.
//!
//! For a `(template, recipient)` pair the ledger counts rows created within
//! the template's window. A send is refused only when more than
//! `max_requests` rows already fall inside the window, so a window holds at
//! most `max_requests + 1` messages.
//!
//! Check and send for one pair are serialized by an in-process keyed lock,
//! so concurrent requests for the same recipient cannot both pass the check.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};
use warden_core::config::{NotificationConfig, RateWindowConfig};
use warden_core::db::unix_timestamp;

use super::dispatch::Dispatcher;
use super::{NotificationError, Template};
use crate::idgen::IdAllocators;
use crate::storage::WardenDatabase;

/// `max_requests` messages per `interval_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub max_requests: u32,
    pub interval_secs: i64,
}

impl RateWindow {
    /// Whether one more send fits after `sent_in_window` sends. Refused only
    /// once the window holds more than `max_requests` rows.
    pub fn admits(self, sent_in_window: i64) -> bool {
        sent_in_window <= i64::from(self.max_requests)
    }
}

impl From<RateWindowConfig> for RateWindow {
    fn from(c: RateWindowConfig) -> Self {
        Self {
            max_requests: c.max_requests,
            interval_secs: c.interval_secs,
        }
    }
}

/// What to deliver. The variant must match the template's channel.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    ConfirmationEmail { display_name: &'a str, code: &'a str },
    Sms { body: &'a str },
}

type LockKey = (Template, String);

/// Per-key async locks. Entries are pruned once nobody holds them.
#[derive(Default)]
struct KeyedLocks {
    inner: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    /// Acquire every key in sorted order; callers pass a sorted, deduplicated set.
    async fn lock_all(&self, keys: &BTreeSet<LockKey>) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let handle = Arc::clone(self.inner.lock().entry(key.clone()).or_default());
            guards.push(handle.lock_owned().await);
        }
        guards
    }

    fn prune(&self) {
        self.inner.lock().retain(|_, m| Arc::strong_count(m) > 1);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// The notification quota ledger.
pub struct QuotaLedger {
    db: WardenDatabase,
    ids: Arc<IdAllocators>,
    dispatcher: Arc<dyn Dispatcher>,
    windows: HashMap<Template, RateWindow>,
    locks: KeyedLocks,
}

impl QuotaLedger {
    pub fn new(
        db: WardenDatabase,
        ids: Arc<IdAllocators>,
        dispatcher: Arc<dyn Dispatcher>,
        config: &NotificationConfig,
    ) -> Self {
        let windows = HashMap::from([
            (
                Template::ConfirmHolderRegistration,
                RateWindow::from(config.confirmation_email),
            ),
            (
                Template::ConfirmHolderRegistrationSms,
                RateWindow::from(config.confirmation_sms),
            ),
        ]);
        Self {
            db,
            ids,
            dispatcher,
            windows,
            locks: KeyedLocks::default(),
        }
    }

    pub fn window(&self, template: Template) -> RateWindow {
        self.windows.get(&template).copied().unwrap_or(RateWindow {
            max_requests: 0,
            interval_secs: 0,
        })
    }

    async fn admits(&self, template: Template, recipient: &str) -> Result<bool, NotificationError> {
        let window = self.window(template);
        let since = unix_timestamp() - window.interval_secs;
        let count = self
            .db
            .count_sent_notifications_since(template.name(), recipient, since)
            .await?;
        debug!(template = %template, recipient, count, max = window.max_requests, "Quota check");
        Ok(window.admits(count))
    }

    /// True iff every recipient is under quota right now.
    pub async fn can_send(
        &self,
        template: Template,
        recipients: &[String],
    ) -> Result<bool, NotificationError> {
        for recipient in recipients {
            if !self.admits(template, recipient).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Check quota, dispatch, and record one ledger row per delivered recipient.
    ///
    /// A quota refusal dispatches nothing. A transport failure stops at the
    /// failing recipient; earlier deliveries stay recorded.
    #[instrument(skip(self, template, recipients, payload), fields(template = %template, recipients = recipients.len()))]
    pub async fn send(
        &self,
        template: Template,
        recipients: &[String],
        sender: &str,
        payload: Payload<'_>,
    ) -> Result<(), NotificationError> {
        let matches_channel = matches!(
            (template.channel(), payload),
            (super::Channel::Email, Payload::ConfirmationEmail { .. })
                | (super::Channel::Sms, Payload::Sms { .. })
        );
        if !matches_channel {
            return Err(NotificationError::PayloadMismatch(template));
        }

        let keys: BTreeSet<LockKey> = recipients
            .iter()
            .map(|r| (template, r.clone()))
            .collect();

        let guards = self.locks.lock_all(&keys).await;
        let result = self.send_locked(template, &keys, sender, payload).await;
        drop(guards);
        self.locks.prune();
        result
    }

    async fn send_locked(
        &self,
        template: Template,
        keys: &BTreeSet<LockKey>,
        sender: &str,
        payload: Payload<'_>,
    ) -> Result<(), NotificationError> {
        for (_, recipient) in keys {
            if !self.admits(template, recipient).await? {
                warn!(template = %template, recipient = %recipient, "Confirmation quota exceeded");
                return Err(NotificationError::QuotaExceeded {
                    template,
                    recipient: recipient.clone(),
                });
            }
        }

        for (_, recipient) in keys {
            match payload {
                Payload::ConfirmationEmail { display_name, code } => {
                    self.dispatcher
                        .send_confirmation_email(recipient, display_name, code)
                        .await?;
                }
                Payload::Sms { body } => self.dispatcher.send_sms(recipient, body).await?,
            }

            let id = self.ids.sent_notifications.generate()?;
            self.db
                .insert_sent_notification(id, sender, recipient, template.name())
                .await?;
            info!(template = %template, recipient = %recipient, notification_id = id, "Notification sent");
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notifications::dispatch::RecordingDispatcher;

    const EMAIL: &str = "alice@example.com";

    async fn ledger_with(
        max_requests: u32,
    ) -> (QuotaLedger, Arc<RecordingDispatcher>, WardenDatabase) {
        let db = WardenDatabase::open_in_memory().await.unwrap();
        let ids = Arc::new(IdAllocators::new(0).unwrap());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let mut config = NotificationConfig::default();
        config.confirmation_email = RateWindowConfig {
            max_requests,
            interval_secs: 300,
        };
        let ledger = QuotaLedger::new(db.clone(), ids, dispatcher.clone(), &config);
        (ledger, dispatcher, db)
    }

    fn email(code: &str) -> Payload<'_> {
        Payload::ConfirmationEmail {
            display_name: EMAIL,
            code,
        }
    }

    fn to(recipient: &str) -> Vec<String> {
        vec![recipient.to_string()]
    }

    #[test]
    fn window_admits_up_to_max_inclusive() {
        let w = RateWindow {
            max_requests: 3,
            interval_secs: 300,
        };
        assert!(w.admits(0));
        assert!(w.admits(3));
        assert!(!w.admits(4));
        let zero = RateWindow {
            max_requests: 0,
            interval_secs: 1,
        };
        assert!(zero.admits(0));
        assert!(!zero.admits(1));
    }

    #[tokio::test]
    async fn send_past_max_rows_is_refused() {
        let (ledger, dispatcher, _db) = ledger_with(3).await;
        let template = Template::ConfirmHolderRegistration;

        // Still admitted with exactly three rows in the window.
        for i in 0..4 {
            assert!(ledger.can_send(template, &to(EMAIL)).await.unwrap());
            ledger
                .send(template, &to(EMAIL), "no-reply@w", email(&i.to_string()))
                .await
                .unwrap();
        }

        assert!(!ledger.can_send(template, &to(EMAIL)).await.unwrap());
        let err = ledger
            .send(template, &to(EMAIL), "no-reply@w", email("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::QuotaExceeded { .. }), "got {err}");
        assert_eq!(dispatcher.sent().len(), 4);
    }

    #[tokio::test]
    async fn window_elapsing_reopens_quota() {
        let (ledger, _dispatcher, db) = ledger_with(3).await;
        let template = Template::ConfirmHolderRegistration;
        for _ in 0..4 {
            ledger
                .send(template, &to(EMAIL), "no-reply@w", email("1"))
                .await
                .unwrap();
        }
        assert!(!ledger.can_send(template, &to(EMAIL)).await.unwrap());

        sqlx::query("UPDATE sent_notifications SET created_at = created_at - 301")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(ledger.can_send(template, &to(EMAIL)).await.unwrap());
        ledger
            .send(template, &to(EMAIL), "no-reply@w", email("2"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn transport_failure_records_nothing() {
        let (ledger, dispatcher, db) = ledger_with(3).await;
        dispatcher.set_failing(true);

        let err = ledger
            .send(Template::ConfirmHolderRegistration, &to(EMAIL), "s", email("1"))
            .await
            .unwrap_err();
        assert!(err.is_transport());

        let count = db
            .count_sent_notifications_since(Template::ConfirmHolderRegistration.name(), EMAIL, 0)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn templates_have_independent_windows() {
        let (ledger, _dispatcher, _db) = ledger_with(1).await;
        for code in ["1", "2"] {
            ledger
                .send(Template::ConfirmHolderRegistration, &to(EMAIL), "s", email(code))
                .await
                .unwrap();
        }
        assert!(!ledger
            .can_send(Template::ConfirmHolderRegistration, &to(EMAIL))
            .await
            .unwrap());
        assert!(ledger
            .can_send(Template::ConfirmHolderRegistrationSms, &to(EMAIL))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn one_refused_recipient_blocks_the_batch() {
        let (ledger, dispatcher, _db) = ledger_with(1).await;
        let template = Template::ConfirmHolderRegistration;
        ledger.send(template, &to(EMAIL), "s", email("1")).await.unwrap();
        ledger.send(template, &to(EMAIL), "s", email("2")).await.unwrap();

        let both = vec!["bob@example.com".to_string(), EMAIL.to_string()];
        assert!(!ledger.can_send(template, &both).await.unwrap());
        assert!(ledger.send(template, &both, "s", email("2")).await.is_err());
        assert!(dispatcher.sent_to("bob@example.com").is_empty());
    }

    #[tokio::test]
    async fn duplicate_recipients_are_collapsed() {
        let (ledger, dispatcher, _db) = ledger_with(3).await;
        let twice = vec![EMAIL.to_string(), EMAIL.to_string()];
        ledger
            .send(Template::ConfirmHolderRegistration, &twice, "s", email("1"))
            .await
            .unwrap();
        assert_eq!(dispatcher.sent().len(), 1);
    }

    #[tokio::test]
    async fn payload_must_match_channel() {
        let (ledger, _dispatcher, _db) = ledger_with(3).await;
        let err = ledger
            .send(
                Template::ConfirmHolderRegistrationSms,
                &to("+14155552671"),
                "s",
                email("1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::PayloadMismatch(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_respect_quota() {
        let (ledger, dispatcher, _db) = ledger_with(3).await;
        let ledger = Arc::new(ledger);

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move {
                    let code = i.to_string();
                    ledger
                        .send(
                            Template::ConfirmHolderRegistration,
                            &to(EMAIL),
                            "s",
                            email(&code),
                        )
                        .await
                })
            })
            .collect();

        let mut delivered = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                delivered += 1;
            }
        }
        assert_eq!(delivered, 4);
        assert_eq!(dispatcher.sent().len(), 4);
        assert_eq!(ledger.locks.len(), 0);
    }
}
