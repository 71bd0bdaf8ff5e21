use agenda_core::{DedupKey, Event, Reminder};
use chrono::{DateTime, Utc};

/// An `(event, reminder)` pair whose trigger instant is at or before "now".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueReminder<'a> {
    pub event: &'a Event,
    pub reminder: Reminder,
}

impl DueReminder<'_> {
    pub fn trigger_at(&self) -> DateTime<Utc> {
        self.reminder.trigger_at(self.event.occurs_at)
    }

    /// `None` when the event was never persisted.
    pub fn dedup_key(&self, channel: &str) -> Option<DedupKey> {
        Some(DedupKey {
            event_id: self.event.id?,
            lead_minutes: self.reminder.lead_minutes(),
            channel: channel.to_string(),
        })
    }
}

/// Every reminder of every event whose trigger instant (`occurs_at - lead`)
/// is at or before `now`.
///
/// Being due never expires: an event long in the past keeps yielding all of
/// its reminders, and it is the ledger that stops them from being re-sent.
pub fn due_reminders(now: DateTime<Utc>, events: &[Event]) -> Vec<DueReminder<'_>> {
    events
        .iter()
        .flat_map(|event| {
            event
                .reminders
                .iter()
                .filter(move |reminder| now >= reminder.trigger_at(event.occurs_at))
                .map(move |reminder| DueReminder {
                    event,
                    reminder: *reminder,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    fn event(id: i64, occurs_at: DateTime<Utc>, leads: &[i64]) -> Event {
        let mut event = Event::new("Dentist", occurs_at, "ana@example.com", None)
            .unwrap()
            .with_reminders(leads.iter().copied())
            .unwrap();
        event.id = Some(id);
        event
    }

    #[test]
    fn reminder_is_due_from_its_trigger_instant() {
        let events = vec![event(1, at(14, 30), &[30])];

        assert!(due_reminders(at(13, 59), &events).is_empty());

        let due = due_reminders(at(14, 0), &events);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].event.id, Some(1));
        assert_eq!(due[0].reminder.lead_minutes(), 30);
        assert_eq!(due[0].trigger_at(), at(14, 0));
    }

    #[test]
    fn one_second_early_is_not_due() {
        let events = vec![event(1, at(14, 30), &[30])];
        assert!(due_reminders(at(14, 0) - Duration::seconds(1), &events).is_empty());
    }

    #[test]
    fn yields_every_due_reminder_of_an_event() {
        let events = vec![event(1, at(9, 0), &[60, 10])];
        let due = due_reminders(at(8, 50), &events);
        let mut leads: Vec<u32> = due.iter().map(|d| d.reminder.lead_minutes()).collect();
        leads.sort();
        assert_eq!(leads, vec![10, 60]);

        // only the 60 minute one before 08:50
        let due = due_reminders(at(8, 10), &events);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].reminder.lead_minutes(), 60);
    }

    #[test]
    fn past_events_stay_due() {
        let events = vec![event(1, at(9, 0), &[0, 15])];
        let much_later = at(9, 0) + Duration::days(30);
        assert_eq!(due_reminders(much_later, &events).len(), 2);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let events = vec![
            event(1, at(9, 0), &[60, 10]),
            event(2, at(18, 0), &[30]),
            event(3, at(8, 0), &[]),
        ];
        let now = at(8, 55);
        assert_eq!(due_reminders(now, &events), due_reminders(now, &events));
    }

    #[test]
    fn dedup_key_needs_a_persisted_event() {
        let events = vec![event(7, at(9, 0), &[5])];
        let due = due_reminders(at(9, 0), &events);
        let key = due[0].dedup_key("email").unwrap();
        assert_eq!(key.event_id, 7);
        assert_eq!(key.lead_minutes, 5);
        assert_eq!(key.channel, "email");

        let mut unsaved = events[0].clone();
        unsaved.id = None;
        let unsaved = [unsaved];
        let due = due_reminders(at(9, 0), &unsaved);
        assert!(due[0].dedup_key("email").is_none());
    }
}
