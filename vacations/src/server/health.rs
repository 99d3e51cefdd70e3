//! Readiness probe for the vacation service.
//!
//! The store must answer a ping. Pending dead letters do not block traffic
//! but mark the service degraded so operators notice them.

use crate::store::LedgerStore;
use async_trait::async_trait;
use std::sync::Arc;
use vacation_ledger_postgres::PostgresDeadLetterQueue;
use vacation_ledger_runtime::health::{HealthCheck, HealthReport};
use vacation_ledger_web::ReadinessProbe;

/// Store and dead-letter backlog check.
pub struct LedgerReadiness {
    store: Arc<dyn LedgerStore>,
    dead_letters: Option<PostgresDeadLetterQueue>,
}

impl LedgerReadiness {
    /// Probe that only pings the store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            dead_letters: None,
        }
    }

    /// Also report the pending dead-letter backlog.
    #[must_use]
    pub fn with_dead_letters(mut self, dead_letters: PostgresDeadLetterQueue) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }
}

#[async_trait]
impl ReadinessProbe for LedgerReadiness {
    async fn check(&self) -> HealthReport {
        let mut checks = vec![match self.store.ping().await {
            Ok(()) => HealthCheck::healthy("store"),
            Err(e) => HealthCheck::unhealthy("store", e.to_string()),
        }];

        if let Some(dead_letters) = &self.dead_letters {
            checks.push(match dead_letters.count_pending().await {
                Ok(0) => HealthCheck::healthy("dead_letters"),
                Ok(pending) => {
                    HealthCheck::degraded("dead_letters", format!("{pending} pending messages"))
                }
                Err(e) => HealthCheck::degraded("dead_letters", e.to_string()),
            });
        }

        HealthReport::new(checks)
    }
}
