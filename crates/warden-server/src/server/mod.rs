//! gRPC surface of the warden.
//!
//! The binary serves the standard `grpc.health.v1.Health` service. Handlers
//! for the control plane map [`ServiceError`](crate::services::ServiceError)
//! into `tonic::Status` through [`grpc_util`].

pub mod grpc_util;
pub mod health;

pub use grpc_util::{remote_endpoint, remote_ip_address};
pub use health::{SERVICE_NAME, health_service};
