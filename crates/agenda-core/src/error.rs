use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgendaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Event not found: {id}")]
    EventNotFound { id: i64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgendaError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            AgendaError::Config(_) => "CONFIG_ERROR",
            AgendaError::Validation(_) => "VALIDATION_ERROR",
            AgendaError::EventNotFound { .. } => "EVENT_NOT_FOUND",
            AgendaError::Database(_) => "DATABASE_ERROR",
            AgendaError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgendaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_distinguish_client_errors() {
        assert_eq!(AgendaError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(AgendaError::EventNotFound { id: 3 }.code(), "EVENT_NOT_FOUND");
        assert_eq!(AgendaError::Database("locked".into()).code(), "DATABASE_ERROR");
        assert_eq!(
            AgendaError::EventNotFound { id: 3 }.to_string(),
            "Event not found: 3"
        );
    }
}

