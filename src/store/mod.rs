//! Chat history and long-term fact storage on top of the SQLite schema in
//! [`crate::db`].

pub mod facts;
pub mod messages;
pub mod sessions;
pub mod types;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Current time as an RFC 3339 string with microsecond precision, so rows
/// inserted in quick succession still sort by creation time.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
