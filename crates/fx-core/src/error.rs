use thiserror::Error;

/// Shared error taxonomy for every component that sits in front of
/// persisted or cached state (candle series, signals, subscriptions,
/// positions, model versions, notification receipts).
///
/// Every other crate's own error enum carries a `Store(StoreError)` variant
/// rather than redefining these cases.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Data was returned but is past its freshness window; callers decide
    /// whether to use it anyway.
    #[error("stale data: {0}")]
    Stale(String),

    /// Worth retrying (timeout, connection reset, upstream 5xx).
    #[error("transient error: {0}")]
    Transient(String),

    /// Not worth retrying (schema mismatch, programmer error, disk full).
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::Unavailable("row not found".into()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                StoreError::Transient(err.to_string())
            }
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(err.to_string())
            }
            other => StoreError::Fatal(other.to_string()),
        }
    }
}
