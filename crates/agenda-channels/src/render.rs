use agenda_core::Event;

use crate::types::OutboundMessage;

/// Signature line appended to every reminder.
pub const FOOTER: &str = "SmartAgenda - automatic notification";

/// Build the reminder message for `event`.
pub fn render_reminder(event: &Event) -> OutboundMessage {
    let when = event.occurs_at.format("%Y-%m-%d %H:%M UTC");
    let mut body = format!(
        "You have an upcoming appointment!\n\nTitle: {}\nWhen: {}\n",
        event.title, when
    );
    if let Some(description) = event.description.as_deref().filter(|d| !d.trim().is_empty()) {
        body.push_str(&format!("Notes: {description}\n"));
    }
    body.push('\n');
    body.push_str(FOOTER);

    OutboundMessage {
        recipient: event.recipient.clone(),
        subject: format!("Reminder: {}", event.title),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn renders_subject_body_and_footer() {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 14, 30, 0).unwrap();
        let event = Event::new("Dentist", at, "ana@example.com", None).unwrap();
        let msg = render_reminder(&event);

        assert_eq!(msg.recipient, "ana@example.com");
        assert_eq!(msg.subject, "Reminder: Dentist");
        assert!(msg.body.contains("Title: Dentist"));
        assert!(msg.body.contains("When: 2026-03-10 14:30 UTC"));
        assert!(msg.body.ends_with(FOOTER));
        assert!(!msg.body.contains("Notes:"));
    }

    #[test]
    fn includes_description_when_present() {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 14, 30, 0).unwrap();
        let event =
            Event::new("Dentist", at, "ana@example.com", Some("bring x-rays".into())).unwrap();
        assert!(render_reminder(&event).body.contains("Notes: bring x-rays"));
    }
}
