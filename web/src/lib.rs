//! Axum integration for the vacation ledger.
//!
//! - [`AppError`]: domain errors rendered as `{"code", "message"}` JSON with a status
//! - [`extractors`]: JSON bodies that reject with [`AppError`]
//! - [`health`]: liveness and readiness endpoints
//! - [`request_log`]: per-request tracing span
//!
//! # Example
//!
//! ```ignore
//! use vacation_ledger_web::{AppError, health};
//! use axum::{Router, routing::get};
//!
//! let app = Router::new()
//!     .route("/health", get(health::health_check))
//!     .route("/ready", get(health::readiness_check))
//!     .with_state(probe);
//! ```

pub mod error;
pub mod extractors;
pub mod health;
pub mod request_log;

pub use error::AppError;
pub use extractors::{OptionalJson, ValidJson};
pub use health::ReadinessProbe;
pub use request_log::log_requests;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
