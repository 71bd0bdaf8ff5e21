use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AgendaError, Result};

/// Channel tag recorded in the ledger for email deliveries.
pub const EMAIL_CHANNEL: &str = "email";

/// How many minutes before an event's start its owner should be notified.
///
/// Only constructible through [`Reminder::new`], so `lead_minutes` is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawReminder")]
pub struct Reminder {
    lead_minutes: u32,
}

#[derive(Deserialize)]
struct RawReminder {
    lead_minutes: i64,
}

impl TryFrom<RawReminder> for Reminder {
    type Error = AgendaError;

    fn try_from(raw: RawReminder) -> Result<Self> {
        Reminder::new(raw.lead_minutes)
    }
}

impl Reminder {
    pub fn new(minutes: i64) -> Result<Self> {
        if minutes < 0 {
            return Err(AgendaError::Validation(format!(
                "reminder lead time cannot be negative (got {minutes})"
            )));
        }
        let lead_minutes = u32::try_from(minutes).map_err(|_| {
            AgendaError::Validation(format!("reminder lead time too large (got {minutes})"))
        })?;
        Ok(Self { lead_minutes })
    }

    pub fn lead_minutes(&self) -> u32 {
        self.lead_minutes
    }

    /// The instant at which this reminder becomes due for an event starting at `occurs_at`.
    pub fn trigger_at(&self, occurs_at: DateTime<Utc>) -> DateTime<Utc> {
        occurs_at - Duration::minutes(i64::from(self.lead_minutes))
    }
}

/// A scheduled appointment and the lead times at which its recipient is reminded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned by the event store on creation.
    pub id: Option<i64>,
    pub title: String,
    pub occurs_at: DateTime<Utc>,
    /// Contact address the reminders are delivered to.
    pub recipient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

impl Event {
    pub fn new(
        title: impl Into<String>,
        occurs_at: DateTime<Utc>,
        recipient: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self> {
        let title = title.into();
        let recipient = recipient.into();
        if title.trim().is_empty() {
            return Err(AgendaError::Validation("event title cannot be empty".into()));
        }
        validate_recipient(&recipient)?;
        Ok(Self {
            id: None,
            title,
            occurs_at,
            recipient,
            description,
            reminders: Vec::new(),
        })
    }

    /// Add a reminder `minutes` before the event. Leaves the event untouched on error.
    ///
    /// Reminders are keyed by lead time, so adding one that already exists is a no-op.
    pub fn add_reminder(&mut self, minutes: i64) -> Result<()> {
        let reminder = Reminder::new(minutes)?;
        if !self.reminders.contains(&reminder) {
            self.reminders.push(reminder);
        }
        Ok(())
    }

    /// Attach a whole reminder list, failing without changes if any lead time is invalid.
    pub fn with_reminders(mut self, minutes: impl IntoIterator<Item = i64>) -> Result<Self> {
        let mut reminders = self.reminders.clone();
        for m in minutes {
            let reminder = Reminder::new(m)?;
            if !reminders.contains(&reminder) {
                reminders.push(reminder);
            }
        }
        self.reminders = reminders;
        Ok(self)
    }
}

fn validate_recipient(recipient: &str) -> Result<()> {
    let valid = match recipient.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !recipient.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AgendaError::Validation(format!(
            "invalid recipient address: {recipient:?}"
        )))
    }
}

/// Lifecycle of a single delivery attempt in the notification ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Recorded before the channel is invoked.
    Pending,
    /// The channel accepted the message.
    Sent,
    /// The channel failed; `error` holds the detail.
    Failed,
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(format!("unknown notification status: {other}")),
        }
    }
}

/// Identifies "the same reminder on the same channel" across attempts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub event_id: i64,
    pub lead_minutes: u32,
    pub channel: String,
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}m/{}", self.event_id, self.lead_minutes, self.channel)
    }
}

/// A persisted delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub event_id: i64,
    pub lead_minutes: u32,
    pub channel: String,
    pub status: NotificationStatus,
    /// Set when the attempt reaches `Sent` or `Failed`.
    pub sent_at: Option<DateTime<Utc>>,
    /// Only set on `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            event_id: self.event_id,
            lead_minutes: self.lead_minutes,
            channel: self.channel.clone(),
        }
    }
}
