//! HTTP server for the vacation ledger.
//!
//! - Application state
//! - Readiness probe
//! - Router configuration

pub mod health;
pub mod routes;
pub mod state;

pub use health::LedgerReadiness;
pub use routes::build_router;
pub use state::AppState;
