use agenda_core::{AgendaError, NotificationStatus};
use agenda_events::EventError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The event store could not be read.
    #[error("Event store error: {0}")]
    Events(#[from] EventError),

    /// No ledger entry with the given ID exists.
    #[error("Notification not found: {id}")]
    NotificationNotFound { id: i64 },

    /// Only `pending` entries may be settled.
    #[error("Notification {id} is already {status}")]
    InvalidTransition { id: i64, status: NotificationStatus },

    /// A due reminder belongs to an event that was never persisted.
    #[error("Event has no id: {title}")]
    UnsavedEvent { title: String },

    /// The channel accepted the message but the `sent` transition failed, so
    /// the entry stays `pending` and the next cycle will send it again.
    #[error("Notification {id} was delivered but could not be marked sent: {reason}")]
    UnrecordedDelivery { id: i64, reason: String },

    /// A ledger row could not be decoded.
    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),

    /// `start()` was called while the loop is already running.
    #[error("Scheduler is already running")]
    AlreadyRunning,
}

impl From<SchedulerError> for AgendaError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Events(inner) => inner.into(),
            SchedulerError::Database(inner) => AgendaError::Database(inner.to_string()),
            other => AgendaError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
