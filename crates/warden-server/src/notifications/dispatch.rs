//! The transport seam for confirmation messages.

#[cfg(any(test, feature = "test-utils"))]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-utils"))]
use parking_lot::Mutex;
use tracing::info;

use super::NotificationError;

/// Delivers confirmation messages. Implementations only report success or
/// failure; quota and bookkeeping live in the ledger.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send_confirmation_email(
        &self,
        to: &str,
        display_name: &str,
        code: &str,
    ) -> Result<(), NotificationError>;

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    async fn send_confirmation_email(
        &self,
        to: &str,
        display_name: &str,
        code: &str,
    ) -> Result<(), NotificationError> {
        info!(to, display_name, code, "Confirmation email (not delivered)");
        Ok(())
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError> {
        info!(to, body, "SMS (not delivered)");
        Ok(())
    }
}

/// A message captured by [`RecordingDispatcher`].
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Email {
        to: String,
        display_name: String,
        code: String,
    },
    Sms {
        to: String,
        body: String,
    },
}

#[cfg(any(test, feature = "test-utils"))]
impl SentMessage {
    pub fn recipient(&self) -> &str {
        match self {
            Self::Email { to, .. } | Self::Sms { to, .. } => to,
        }
    }
}

/// Test double that keeps every message in memory and can be told to fail.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<SentMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.recipient() == recipient)
            .cloned()
            .collect()
    }

    /// The code carried by the most recent email to `recipient`.
    pub fn last_email_code(&self, recipient: &str) -> Option<String> {
        self.sent.lock().iter().rev().find_map(|m| match m {
            SentMessage::Email { to, code, .. } if to == recipient => Some(code.clone()),
            _ => None,
        })
    }

    fn check(&self) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Dispatch("transport unavailable".into()));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn send_confirmation_email(
        &self,
        to: &str,
        display_name: &str,
        code: &str,
    ) -> Result<(), NotificationError> {
        self.check()?;
        self.sent.lock().push(SentMessage::Email {
            to: to.to_string(),
            display_name: display_name.to_string(),
            code: code.to_string(),
        });
        Ok(())
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError> {
        self.check()?;
        self.sent.lock().push(SentMessage::Sms {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
