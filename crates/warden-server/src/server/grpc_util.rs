//! Shared gRPC utility helpers.

use tonic::{Request, Status};
use tracing::error;

use crate::services::{RemoteEndpoint, ServiceError};

impl From<ServiceError> for Status {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(msg) => Self::invalid_argument(msg),
            ServiceError::NotFound(msg) => Self::not_found(msg),
            ServiceError::InvalidPassword => Self::invalid_argument("invalid password"),
            ServiceError::Unauthenticated(msg) => Self::unauthenticated(msg),
            ServiceError::PermissionDenied(msg) => Self::permission_denied(msg),
            ServiceError::QuotaExceeded { .. } => Self::resource_exhausted(e.to_string()),
            ServiceError::FailedPrecondition(msg) => Self::failed_precondition(msg),
            ServiceError::Conflict(msg) => Self::aborted(msg),
            ServiceError::Database(_)
            | ServiceError::Token(_)
            | ServiceError::Hash(_)
            | ServiceError::Dispatch(_)
            | ServiceError::IdAllocation(_) => {
                error!(error = %e, "Internal error");
                Self::internal("Internal error")
            }
        }
    }
}

/// IP address of the peer, without the port.
pub fn remote_ip_address<T>(request: &Request<T>) -> Option<String> {
    request.remote_addr().map(|addr| addr.ip().to_string())
}

/// The caller's endpoint: the observed peer IP plus a self-reported MAC.
pub fn remote_endpoint<T>(request: &Request<T>, mac: Option<&str>) -> RemoteEndpoint {
    RemoteEndpoint {
        ip: remote_ip_address(request),
        mac: mac.filter(|m| !m.is_empty()).map(ToString::to_string),
    }
}
