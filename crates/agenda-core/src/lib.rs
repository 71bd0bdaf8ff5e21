//! `agenda-core` holds domain types, configuration and the shared error type.

pub mod config;
pub mod error;
pub mod types;

pub use error::{AgendaError, Result};
pub use types::{
    DedupKey, Event, Notification, NotificationStatus, Reminder, EMAIL_CHANNEL,
};
