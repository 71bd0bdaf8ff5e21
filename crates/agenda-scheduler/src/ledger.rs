use std::sync::{Mutex, MutexGuard};

use agenda_core::{DedupKey, Notification, NotificationStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
};

const NOTIFICATION_SELECT_SQL: &str =
    "SELECT id, event_id, lead_minutes, channel, status, sent_at, error, created_at
     FROM notifications";

/// Durable record of delivery attempts, keyed by (event, lead time, channel).
///
/// Only the scheduler settles entries; other readers (HTTP history, audits)
/// use the `list_*` methods.
pub trait NotificationLedger: Send + Sync {
    /// Whether an entry for `key` has already reached `sent`.
    fn has_sent_entry(&self, key: &DedupKey) -> Result<bool>;

    /// Record a new `pending` attempt for `key` and return its id.
    fn create_pending(&self, key: &DedupKey) -> Result<i64>;

    /// `pending` → `sent`; clears any error text.
    fn mark_sent(&self, id: i64, sent_at: DateTime<Utc>) -> Result<()>;

    /// `pending` → `failed` with the failure detail.
    fn mark_failed(&self, id: i64, sent_at: DateTime<Utc>, error: &str) -> Result<()>;

    /// Settle every entry still `pending` as `failed`, returning how many were
    /// touched. Used at startup, when no attempt can legitimately be in flight.
    fn fail_abandoned(&self, at: DateTime<Utc>, error: &str) -> Result<usize>;

    fn list_by_status(&self, status: NotificationStatus) -> Result<Vec<Notification>>;

    /// Attempt history of one event, oldest first.
    fn list_for_event(&self, event_id: i64) -> Result<Vec<Notification>>;
}

/// [`NotificationLedger`] over the `notifications` SQLite table.
pub struct SqliteLedger {
    db: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply a `pending` → `status` transition, telling apart unknown ids and
    /// entries that were already settled.
    fn settle(
        &self,
        id: i64,
        status: NotificationStatus,
        sent_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE notifications SET status = ?1, sent_at = ?2, error = ?3
             WHERE id = ?4 AND status = 'pending'",
            params![status.to_string(), sent_at.to_rfc3339(), error, id],
        )?;
        if n == 1 {
            return Ok(());
        }

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM notifications WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        match current {
            None => Err(SchedulerError::NotificationNotFound { id }),
            Some(s) => Err(SchedulerError::InvalidTransition {
                id,
                status: s.parse().map_err(SchedulerError::Corrupt)?,
            }),
        }
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Notification>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, row_to_raw)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.decode()?);
        }
        Ok(out)
    }
}

impl NotificationLedger for SqliteLedger {
    fn has_sent_entry(&self, key: &DedupKey) -> Result<bool> {
        let conn = self.conn();
        let found = conn
            .query_row(
                "SELECT 1 FROM notifications
                 WHERE event_id = ?1 AND lead_minutes = ?2 AND channel = ?3 AND status = 'sent'
                 LIMIT 1",
                params![key.event_id, key.lead_minutes, key.channel],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn create_pending(&self, key: &DedupKey) -> Result<i64> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO notifications (event_id, lead_minutes, channel, status, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)",
            params![key.event_id, key.lead_minutes, key.channel, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!(notification_id = id, key = %key, "pending notification recorded");
        Ok(id)
    }

    fn mark_sent(&self, id: i64, sent_at: DateTime<Utc>) -> Result<()> {
        self.settle(id, NotificationStatus::Sent, sent_at, None)
    }

    fn mark_failed(&self, id: i64, sent_at: DateTime<Utc>, error: &str) -> Result<()> {
        self.settle(id, NotificationStatus::Failed, sent_at, Some(error))
    }

    fn fail_abandoned(&self, at: DateTime<Utc>, error: &str) -> Result<usize> {
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE notifications SET status = 'failed', sent_at = ?1, error = ?2
             WHERE status = 'pending'",
            params![at.to_rfc3339(), error],
        )?;
        if n > 0 {
            warn!(count = n, "abandoned pending notifications marked failed");
        } else {
            info!("no abandoned pending notifications");
        }
        Ok(n)
    }

    fn list_by_status(&self, status: NotificationStatus) -> Result<Vec<Notification>> {
        self.query(
            &format!("{NOTIFICATION_SELECT_SQL} WHERE status = ?1 ORDER BY id"),
            [status.to_string()],
        )
    }

    fn list_for_event(&self, event_id: i64) -> Result<Vec<Notification>> {
        self.query(
            &format!("{NOTIFICATION_SELECT_SQL} WHERE event_id = ?1 ORDER BY id"),
            [event_id],
        )
    }
}

/// Column values as stored, before text columns are parsed.
struct RawNotification {
    id: i64,
    event_id: i64,
    lead_minutes: u32,
    channel: String,
    status: String,
    sent_at: Option<String>,
    error: Option<String>,
    created_at: String,
}

/// Map a row (column order from NOTIFICATION_SELECT_SQL).
fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawNotification> {
    Ok(RawNotification {
        id: row.get(0)?,
        event_id: row.get(1)?,
        lead_minutes: row.get(2)?,
        channel: row.get(3)?,
        status: row.get(4)?,
        sent_at: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl RawNotification {
    fn decode(self) -> Result<Notification> {
        let status = self.status.parse().map_err(SchedulerError::Corrupt)?;
        let sent_at = self.sent_at.as_deref().map(parse_ts).transpose()?;
        Ok(Notification {
            id: self.id,
            event_id: self.event_id,
            lead_minutes: self.lead_minutes,
            channel: self.channel,
            status,
            sent_at,
            error: self.error,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SchedulerError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

#[cfg(test)]
impl SqliteLedger {
    /// Insert a bare `events` row so ledger entries can reference it.
    pub(crate) fn seed_event(&self, id: i64) {
        self.conn()
            .execute(
                "INSERT INTO events (id, title, occurs_at, recipient, created_at, updated_at)
                 VALUES (?1, 'Dentist', '2026-03-10T14:30:00+00:00', 'ana@example.com', 'x', 'x')",
                [id],
            )
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ledger_with_events(ids: &[i64]) -> SqliteLedger {
        let ledger = SqliteLedger::new(Connection::open_in_memory().unwrap()).unwrap();
        for id in ids {
            ledger.seed_event(*id);
        }
        ledger
    }

    fn key(event_id: i64, lead_minutes: u32) -> DedupKey {
        DedupKey {
            event_id,
            lead_minutes,
            channel: "email".into(),
        }
    }

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn pending_then_sent() {
        let ledger = ledger_with_events(&[1]);
        assert!(!ledger.has_sent_entry(&key(1, 30)).unwrap());

        let id = ledger.create_pending(&key(1, 30)).unwrap();
        assert!(!ledger.has_sent_entry(&key(1, 30)).unwrap());

        ledger.mark_sent(id, ts(14, 0)).unwrap();
        assert!(ledger.has_sent_entry(&key(1, 30)).unwrap());

        let history = ledger.list_for_event(1).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, NotificationStatus::Sent);
        assert_eq!(history[0].sent_at, Some(ts(14, 0)));
        assert_eq!(history[0].error, None);
        assert_eq!(history[0].dedup_key(), key(1, 30));
    }

    #[test]
    fn failed_entry_keeps_detail_and_does_not_count_as_sent() {
        let ledger = ledger_with_events(&[1]);
        let id = ledger.create_pending(&key(1, 30)).unwrap();
        ledger.mark_failed(id, ts(14, 0), "SMTP timeout").unwrap();

        assert!(!ledger.has_sent_entry(&key(1, 30)).unwrap());
        let failed = ledger.list_by_status(NotificationStatus::Failed).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("SMTP timeout"));
        assert_eq!(failed[0].sent_at, Some(ts(14, 0)));
    }

    #[test]
    fn dedup_key_includes_lead_time_and_channel() {
        let ledger = ledger_with_events(&[1]);
        let id = ledger.create_pending(&key(1, 30)).unwrap();
        ledger.mark_sent(id, ts(14, 0)).unwrap();

        assert!(!ledger.has_sent_entry(&key(1, 10)).unwrap());
        let mut other_channel = key(1, 30);
        other_channel.channel = "sms".into();
        assert!(!ledger.has_sent_entry(&other_channel).unwrap());
    }

    #[test]
    fn settled_entries_cannot_transition_again() {
        let ledger = ledger_with_events(&[1]);
        let id = ledger.create_pending(&key(1, 30)).unwrap();
        ledger.mark_failed(id, ts(14, 0), "boom").unwrap();

        let err = ledger.mark_sent(id, ts(14, 5)).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidTransition {
                status: NotificationStatus::Failed,
                ..
            }
        ));
        // the failed row is untouched
        let row = &ledger.list_for_event(1).unwrap()[0];
        assert_eq!(row.status, NotificationStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("boom"));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let ledger = ledger_with_events(&[]);
        assert!(matches!(
            ledger.mark_sent(99, ts(14, 0)),
            Err(SchedulerError::NotificationNotFound { id: 99 })
        ));
    }

    #[test]
    fn storage_refuses_a_second_sent_entry() {
        let ledger = ledger_with_events(&[1]);
        let first = ledger.create_pending(&key(1, 30)).unwrap();
        let second = ledger.create_pending(&key(1, 30)).unwrap();
        ledger.mark_sent(first, ts(14, 0)).unwrap();

        assert!(matches!(
            ledger.mark_sent(second, ts(14, 1)),
            Err(SchedulerError::Database(_))
        ));
        assert_eq!(ledger.list_by_status(NotificationStatus::Sent).unwrap().len(), 1);
    }

    #[test]
    fn abandoned_pending_entries_are_failed() {
        let ledger = ledger_with_events(&[1]);
        let stuck = ledger.create_pending(&key(1, 30)).unwrap();
        let done = ledger.create_pending(&key(1, 10)).unwrap();
        ledger.mark_sent(done, ts(14, 0)).unwrap();

        let n = ledger.fail_abandoned(ts(15, 0), "interrupted").unwrap();
        assert_eq!(n, 1);
        let failed = ledger.list_by_status(NotificationStatus::Failed).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, stuck);
        assert!(ledger.list_by_status(NotificationStatus::Pending).unwrap().is_empty());
    }

    #[test]
    fn entries_reference_existing_events() {
        let ledger = ledger_with_events(&[]);
        assert!(ledger.create_pending(&key(404, 30)).is_err());
    }
}
