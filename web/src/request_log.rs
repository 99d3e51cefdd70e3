//! Per-request tracing span and access log.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::Instrument;

/// Axum middleware that runs each request inside an `http_request` span and
/// logs its outcome.
///
/// ```ignore
/// let app = Router::new()
///     .route("/vacations", get(list))
///     .layer(axum::middleware::from_fn(log_requests));
/// ```
pub async fn log_requests(request: Request, next: Next) -> Response {
    let span = tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
    );
    let started = Instant::now();

    async move {
        let response = next.run(request).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = response.status().as_u16();

        if response.status().is_server_error() {
            tracing::warn!(status, latency_ms, "Request finished");
        } else {
            tracing::debug!(status, latency_ms, "Request finished");
        }
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use axum_test::TestServer;

    #[tokio::test]
    async fn passes_responses_through() {
        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/boom", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .layer(axum::middleware::from_fn(log_requests));
        let server = TestServer::new(app).unwrap();

        server.get("/ok").await.assert_text("ok");
        server
            .get("/boom")
            .await
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }
}
