//! Health check endpoints.
//!
//! These endpoints are used by load balancers and orchestrators to verify
//! service health.

use async_trait::async_trait;
use axum::{Json, extract::State, http::StatusCode};
use std::sync::Arc;
use vacation_ledger_runtime::health::HealthReport;

/// Something that can tell whether the service may receive traffic.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Check every dependency the service needs.
    async fn check(&self) -> HealthReport;
}

/// Simple health check endpoint (for basic liveness).
///
/// Does NOT check dependencies.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness endpoint.
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
pub async fn readiness_check(
    State(probe): State<Arc<dyn ReadinessProbe>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = probe.check().await;

    let status = if report.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use vacation_ledger_runtime::health::{HealthCheck, HealthStatus};

    struct Fixed(HealthCheck);

    #[async_trait]
    impl ReadinessProbe for Fixed {
        async fn check(&self) -> HealthReport {
            HealthReport::new(vec![self.0.clone()])
        }
    }

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn healthy_probe_is_ready() {
        let probe: Arc<dyn ReadinessProbe> = Arc::new(Fixed(HealthCheck::healthy("store")));
        let (status, Json(report)) = readiness_check(State(probe)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn unhealthy_probe_is_unavailable() {
        let probe: Arc<dyn ReadinessProbe> =
            Arc::new(Fixed(HealthCheck::unhealthy("store", "connection refused")));
        let (status, Json(report)) = readiness_check(State(probe)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.checks[0].message.as_deref(), Some("connection refused"));
    }
}
