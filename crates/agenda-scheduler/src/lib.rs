//! `agenda-scheduler` polls the event store and delivers due reminders exactly once.
//!
//! # Overview
//!
//! Every `poll_interval` the [`engine::SchedulerEngine`] runs one cycle:
//!
//! 1. list all events with their reminders ([`engine::EventSource`]);
//! 2. pick the `(event, reminder)` pairs whose trigger instant has passed
//!    ([`evaluator::due_reminders`]);
//! 3. for each pair, skip it if the ledger already holds a `sent` entry for its
//!    dedup key, otherwise record a `pending` attempt, call the delivery
//!    channel and settle the attempt as `sent` or `failed`
//!    ([`orchestrator::Orchestrator`]).
//!
//! Failed attempts stay in the ledger untouched; the next cycle creates a new
//! attempt for the same key until one succeeds.
//!
//! | Ledger status | Meaning                                             |
//! |---------------|-----------------------------------------------------|
//! | `pending`     | Attempt recorded, channel not yet answered          |
//! | `sent`        | Delivered; at most one per dedup key                |
//! | `failed`      | Channel error, detail kept in `error`               |

pub mod clock;
pub mod db;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod ledger;
pub mod orchestrator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{CycleReport, EventSource, ReminderScheduler, SchedulerEngine, SchedulerState};
pub use error::{Result, SchedulerError};
pub use evaluator::{due_reminders, DueReminder};
pub use ledger::{NotificationLedger, SqliteLedger};
pub use orchestrator::{DeliveryOutcome, Orchestrator};
