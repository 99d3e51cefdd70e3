//! Classification of `sqlx` errors by what a caller can do about them.

/// Broad class of a database failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// `lock_timeout` fired while waiting for a row lock (SQLSTATE 55P03)
    LockTimeout,
    /// Serialization failure or deadlock (40001, 40P01)
    Serialization,
    /// Unique constraint violation (23505)
    UniqueViolation,
    /// The row itself was refused: data exception class (22xxx, e.g. numeric
    /// overflow) or a check constraint (23514). Retrying the same values fails again.
    DataRejected,
    /// Connection could not be obtained or was lost
    Unavailable,
    /// Row did not decode into the expected type
    Decode,
    /// Anything else
    Other,
}

impl DbErrorKind {
    /// Whether retrying the whole transaction may succeed.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::LockTimeout | Self::Serialization | Self::Unavailable
        )
    }
}

/// Classify a `sqlx` error.
#[must_use]
pub fn classify(err: &sqlx::Error) -> DbErrorKind {
    match err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("55P03") => DbErrorKind::LockTimeout,
            Some("40001" | "40P01") => DbErrorKind::Serialization,
            Some("23505") => DbErrorKind::UniqueViolation,
            Some("23514") => DbErrorKind::DataRejected,
            Some(code) if code.starts_with("22") => DbErrorKind::DataRejected,
            // connection_exception class, admin/crash shutdown, cannot_connect_now
            Some(code) if code.starts_with("08") => DbErrorKind::Unavailable,
            Some("57P01" | "57P02" | "57P03") => DbErrorKind::Unavailable,
            _ => DbErrorKind::Other,
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DbErrorKind::Unavailable,
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            DbErrorKind::Decode
        }
        _ => DbErrorKind::Other,
    }
}
