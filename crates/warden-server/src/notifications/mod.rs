//! Outbound confirmation notifications.
//!
//! - [`Dispatcher`] is the transport seam (email and SMS).
//! - [`QuotaLedger`] gates every send through a per-template sliding window
//!   and records each delivered message.
//! - [`gateway::HttpDispatcher`] posts messages to an HTTP mail/SMS gateway
//!   when the `http-dispatch` feature is enabled.

pub mod dispatch;
#[cfg(feature = "http-dispatch")]
pub mod gateway;
pub mod ledger;

pub use dispatch::{Dispatcher, LogDispatcher};
#[cfg(any(test, feature = "test-utils"))]
pub use dispatch::{RecordingDispatcher, SentMessage};
pub use ledger::{Payload, QuotaLedger, RateWindow};

use serde::{Deserialize, Serialize};

use crate::idgen::IdGenError;

/// Delivery channel of a confirmation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::Sms => "sms",
        })
    }
}

/// A message template. Each template has its own quota window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Template {
    ConfirmHolderRegistration,
    ConfirmHolderRegistrationSms,
}

impl Template {
    /// Name recorded in the ledger.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConfirmHolderRegistration => "confirm-holder-registration",
            Self::ConfirmHolderRegistrationSms => "confirm-holder-registration-sms",
        }
    }

    pub const fn subject(self) -> &'static str {
        match self {
            Self::ConfirmHolderRegistration | Self::ConfirmHolderRegistrationSms => {
                "Confirmation of Registration"
            }
        }
    }

    pub const fn channel(self) -> Channel {
        match self {
            Self::ConfirmHolderRegistration => Channel::Email,
            Self::ConfirmHolderRegistrationSms => Channel::Sms,
        }
    }

    /// The confirmation template for a channel.
    pub const fn confirmation(channel: Channel) -> Self {
        match channel {
            Channel::Email => Self::ConfirmHolderRegistration,
            Channel::Sms => Self::ConfirmHolderRegistrationSms,
        }
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur in the notification subsystem.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The recipient has used up the template's window.
    #[error("quota exceeded for {template} to {recipient}")]
    QuotaExceeded { template: Template, recipient: String },

    /// Payload shape does not fit the template's channel.
    #[error("payload does not match template {0}")]
    PayloadMismatch(Template),

    /// Transport refused or failed to deliver the message.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// HTTP request to the gateway failed.
    #[error("gateway request error: {0}")]
    Request(String),

    /// Gateway returned a non-success status code.
    #[error("gateway error (status {status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("ID allocation error: {0}")]
    IdAllocation(#[from] IdGenError),
}

impl From<warden_core::db::DatabaseError> for NotificationError {
    fn from(e: warden_core::db::DatabaseError) -> Self {
        Self::Database(e.to_string())
    }
}

impl NotificationError {
    /// Whether the failure came from the transport rather than the ledger.
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Dispatch(_) | Self::Request(_) | Self::ApiError { .. }
        )
    }
}
