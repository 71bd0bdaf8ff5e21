use std::sync::Arc;

use agenda_channels::{render_reminder, DeliveryChannel};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::{Result, SchedulerError},
    evaluator::DueReminder,
    ledger::NotificationLedger,
};

/// What happened to one due reminder.
///
/// A channel failure is an outcome, not an error: it is recorded in the ledger
/// and the caller moves on to the next reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A `sent` entry already existed for the dedup key; nothing was done.
    AlreadySent,
    Sent { notification_id: i64 },
    Failed { notification_id: i64, detail: String },
}

/// Turns due reminders into ledger entries and channel calls.
pub struct Orchestrator {
    ledger: Arc<dyn NotificationLedger>,
    channel: Arc<dyn DeliveryChannel>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn NotificationLedger>,
        channel: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            channel,
            clock,
        }
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Deliver one due reminder at most once per dedup key.
    ///
    /// `Err` is reserved for ledger faults; the channel's own failures come
    /// back as [`DeliveryOutcome::Failed`]. A fault after a successful send
    /// is [`SchedulerError::UnrecordedDelivery`].
    pub async fn deliver(&self, due: &DueReminder<'_>) -> Result<DeliveryOutcome> {
        let key = due
            .dedup_key(self.channel.name())
            .ok_or_else(|| SchedulerError::UnsavedEvent {
                title: due.event.title.clone(),
            })?;

        if self.ledger.has_sent_entry(&key)? {
            debug!(key = %key, "reminder already delivered, skipping");
            return Ok(DeliveryOutcome::AlreadySent);
        }

        let notification_id = self.ledger.create_pending(&key)?;
        let message = render_reminder(due.event);

        match self.channel.send(&message).await {
            Ok(()) => {
                self.ledger
                    .mark_sent(notification_id, self.clock.now())
                    .map_err(|e| SchedulerError::UnrecordedDelivery {
                        id: notification_id,
                        reason: e.to_string(),
                    })?;
                info!(
                    notification_id,
                    event_id = key.event_id,
                    lead_minutes = key.lead_minutes,
                    channel = %key.channel,
                    "reminder delivered"
                );
                Ok(DeliveryOutcome::Sent { notification_id })
            }
            Err(e) => {
                let detail = e.to_string();
                self.ledger
                    .mark_failed(notification_id, self.clock.now(), &detail)?;
                warn!(
                    notification_id,
                    event_id = key.event_id,
                    lead_minutes = key.lead_minutes,
                    channel = %key.channel,
                    error = %detail,
                    "reminder delivery failed"
                );
                Ok(DeliveryOutcome::Failed {
                    notification_id,
                    detail,
                })
            }
        }
    }
}
