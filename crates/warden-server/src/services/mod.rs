//! Control plane services.
//!
//! - [`identity::IdentityService`]: holder registration, confirmation, sessions
//! - [`admin::AdminService`]: operator accounts and sessions
//! - [`admission::AdmissionService`]: member node lifecycle and warden registration
//! - [`directory::DirectoryService`]: paginated listings and lookups
//!
//! Authenticated operations take a [`HolderSession`] or [`AdminSession`],
//! which can only be obtained from the matching `authenticate` call.

pub mod admin;
pub mod admission;
pub mod directory;
pub mod identity;
mod sessions;

#[cfg(test)]
mod directory_tests;
#[cfg(test)]
pub(crate) mod test_support;

use warden_core::config::DirectoryConfig;
use warden_core::db::DatabaseError;

use crate::idgen::IdGenError;
use crate::notifications::{NotificationError, Template};

pub use sessions::SessionManager;

/// Errors surfaced by every service operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed or conflicting input. Message is safe to show verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid password")]
    InvalidPassword,

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("quota exceeded for {template} to {recipient}")]
    QuotaExceeded { template: Template, recipient: String },

    /// The entity is not in a state that allows the operation.
    #[error("{0}")]
    FailedPrecondition(String),

    /// Lost a compare-and-swap race; retrying may succeed.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("password hashing error: {0}")]
    Hash(String),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("ID allocation error: {0}")]
    IdAllocation(#[from] IdGenError),
}

impl ServiceError {
    /// Errors whose detail must not reach the caller.
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Token(_)
                | Self::Hash(_)
                | Self::Dispatch(_)
                | Self::IdAllocation(_)
        )
    }

    pub(crate) fn no_permissions() -> Self {
        Self::PermissionDenied("no permissions".into())
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            DatabaseError::Stale(detail) | DatabaseError::UniqueViolation(detail) => {
                Self::Conflict(detail)
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<NotificationError> for ServiceError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::QuotaExceeded {
                template,
                recipient,
            } => Self::QuotaExceeded {
                template,
                recipient,
            },
            NotificationError::Database(detail) => Self::Database(detail),
            NotificationError::IdAllocation(e) => Self::IdAllocation(e),
            other => Self::Dispatch(other.to_string()),
        }
    }
}

impl From<warden_core::Error> for ServiceError {
    fn from(e: warden_core::Error) -> Self {
        match e {
            warden_core::Error::Validation(msg) => Self::Validation(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ServiceError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Self::Token(e.to_string())
    }
}

impl From<argon2::password_hash::Error> for ServiceError {
    fn from(e: argon2::password_hash::Error) -> Self {
        Self::Hash(e.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Observed network identity of the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub ip: Option<String>,
    /// Caller-supplied; only checked when present.
    pub mac: Option<String>,
}

impl RemoteEndpoint {
    pub fn new(ip: Option<&str>, mac: Option<&str>) -> Self {
        Self {
            ip: ip.map(ToString::to_string),
            mac: mac.map(ToString::to_string),
        }
    }
}

/// Proof that a holder access token was validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderSession {
    holder_id: i64,
    session_id: i64,
}

impl HolderSession {
    pub(crate) const fn new(holder_id: i64, session_id: i64) -> Self {
        Self {
            holder_id,
            session_id,
        }
    }

    pub const fn holder_id(&self) -> i64 {
        self.holder_id
    }

    pub const fn session_id(&self) -> i64 {
        self.session_id
    }
}

/// Proof that an admin access token was validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminSession {
    admin_id: i64,
    session_id: i64,
}

impl AdminSession {
    pub(crate) const fn new(admin_id: i64, session_id: i64) -> Self {
        Self {
            admin_id,
            session_id,
        }
    }

    pub const fn admin_id(&self) -> i64 {
        self.admin_id
    }

    pub const fn session_id(&self) -> i64 {
        self.session_id
    }
}

/// `limit`/`offset` as requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Pagination {
    pub const fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Resolve to a concrete `(limit, offset)`: the default limit when unset,
    /// clamped to `1..=max_page_size`.
    pub fn resolve(self, config: &DirectoryConfig) -> (u32, u32) {
        let limit = self
            .limit
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size.max(1));
        (limit, self.offset.unwrap_or(0))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let config = DirectoryConfig::default();
        assert_eq!(Pagination::default().resolve(&config), (50, 0));
        assert_eq!(Pagination::new(0, 5).resolve(&config), (1, 5));
        assert_eq!(Pagination::new(10_000, 0).resolve(&config), (500, 0));
        assert_eq!(
            Pagination {
                limit: Some(20),
                offset: None
            }
            .resolve(&config),
            (20, 0)
        );
    }

    #[test]
    fn database_errors_map_to_service_kinds() {
        assert!(matches!(
            ServiceError::from(DatabaseError::NotFound("Holder 1".into())),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            ServiceError::from(DatabaseError::Stale("x".into())),
            ServiceError::Conflict(_)
        ));
        let internal = ServiceError::from(DatabaseError::Query("boom".into()));
        assert!(internal.is_internal());
    }

    #[test]
    fn quota_error_keeps_its_kind() {
        let err = ServiceError::from(NotificationError::QuotaExceeded {
            template: Template::ConfirmHolderRegistration,
            recipient: "a@example.com".into(),
        });
        assert!(matches!(err, ServiceError::QuotaExceeded { .. }));
        assert!(!err.is_internal());
    }
}
