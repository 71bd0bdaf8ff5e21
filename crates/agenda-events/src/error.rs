use agenda_core::AgendaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("event not found: {id}")]
    NotFound { id: i64 },

    #[error("invalid event: {0}")]
    Invalid(#[from] AgendaError),

    #[error("corrupt event row: {0}")]
    Corrupt(String),
}

impl From<EventError> for AgendaError {
    fn from(e: EventError) -> Self {
        match e {
            EventError::NotFound { id } => AgendaError::EventNotFound { id },
            EventError::Invalid(inner) => inner,
            other => AgendaError::Database(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EventError>;
