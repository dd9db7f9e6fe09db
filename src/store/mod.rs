//! Activity persistence and the reminder source seam.
//!
//! The refresher never reads rows directly; it sees only the
//! [`ReminderSource`] trait, which returns fully materialized
//! [`Reminder`]s for a time horizon. The SQLite implementation lives in
//! [`sqlite`].

mod schema;
pub mod sqlite;

pub use sqlite::{Activity, ActivityTask, SqliteActivityStore};

use crate::error::NotifyError;
use crate::reminder::Reminder;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Read side of the activity store: every reminder whose computed fire
/// time falls strictly inside `(now, now + horizon]`, soft-deleted rows
/// excluded, duplicates collapsed.
#[async_trait]
pub trait ReminderSource: Send + Sync {
    /// Materialize pending reminders for the horizon.
    ///
    /// # Errors
    ///
    /// A read failure is transient: callers retry on the next refresh
    /// trigger rather than crash.
    async fn pending_reminders(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> crate::Result<Vec<Reminder>>;
}

/// Store-local error type, converted to [`NotifyError::Store`] at the
/// module boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure creating or opening the database.
    #[error("I/O error: {0}")]
    Io(String),

    /// Row referenced by id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Connection mutex poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// Caller-supplied argument out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<StoreError> for NotifyError {
    fn from(e: StoreError) -> Self {
        NotifyError::Store(e.to_string())
    }
}
