//! `agenda-events` is a SQLite-backed store for events and their reminder lead times.

pub mod db;
pub mod error;
pub mod store;

pub use error::{EventError, Result};
pub use store::EventStore;
