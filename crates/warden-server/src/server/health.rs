//! Standard `grpc.health.v1.Health` for load balancers and probes.

use tonic_health::ServingStatus;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::server::health_reporter;

/// Service name reported as serving.
pub const SERVICE_NAME: &str = "warden";

/// Build the health service with [`SERVICE_NAME`] and the empty (whole
/// server) name both marked serving.
pub async fn health_service() -> HealthServer<impl Health> {
    let (reporter, service) = health_reporter();
    reporter
        .set_service_status(SERVICE_NAME, ServingStatus::Serving)
        .await;
    reporter.set_service_status("", ServingStatus::Serving).await;
    service
}
